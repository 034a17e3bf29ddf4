use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global `fmt` subscriber. `RUST_LOG` wins over
/// `default_directive` (e.g. `"harvest=info,warn"`).
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)?,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()?;
    Ok(())
}
