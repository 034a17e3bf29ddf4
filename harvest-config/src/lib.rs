//! Configuration, proxy rotation and the anti-bot request executor.
pub mod config;
pub mod http;
pub mod proxy;

pub use backoff;
pub use config::{AppConfig, ConfigError, Configurable, Settings};
pub use http::{HttpResponse, RequestError, RequestExecutor};
pub use proxy::{ProxyConfig, ProxyEndpoint, ProxyPool};
pub use reqwest;
