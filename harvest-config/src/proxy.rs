use rand::{rng, seq::IndexedRandom};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    sync::{LazyLock, Mutex, MutexGuard},
};
use tracing::{debug, info, warn};

static PORT_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(\d+)-(\d+)\}").expect("Failed to compile port range regex")
});

static CREDENTIALS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"://([^:/@]+):([^@]+)@").expect("Failed to compile credentials regex")
});

/// Proxy section of the configuration.
///
/// Accepts either a single `uri` or a list of `uris`; each one may carry a
/// port range such as `http://proxy.example.com:{8080-8090}`, which expands
/// into one endpoint per port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawProxyConfig", into = "RawProxyConfig")]
pub struct ProxyConfig {
    pub use_proxy: bool,
    pub uris: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawProxyConfig {
    #[serde(rename = "use")]
    use_proxy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
    uris: Vec<String>,
}

impl From<RawProxyConfig> for ProxyConfig {
    fn from(raw: RawProxyConfig) -> Self {
        let uris = raw
            .uris
            .iter()
            .chain(raw.uri.iter())
            .flat_map(|uri| ProxyConfig::expand_uri(uri))
            .collect();
        ProxyConfig {
            use_proxy: raw.use_proxy,
            uris,
        }
    }
}

impl From<ProxyConfig> for RawProxyConfig {
    fn from(config: ProxyConfig) -> Self {
        RawProxyConfig {
            use_proxy: config.use_proxy,
            uri: None,
            uris: config.uris,
        }
    }
}

impl ProxyConfig {
    fn expand_uri(uri: &str) -> Vec<String> {
        if let Some(captures) = PORT_RANGE_RE.captures(uri) {
            if let (Some(start), Some(end)) = (
                captures.get(1).and_then(|m| m.as_str().parse::<u16>().ok()),
                captures.get(2).and_then(|m| m.as_str().parse::<u16>().ok()),
            ) {
                if start <= end {
                    return (start..=end)
                        .map(|port| uri.replace(&captures[0], &port.to_string()))
                        .collect();
                }
            }
        }
        vec![uri.to_string()]
    }

    pub fn from_config(config: &serde_yaml::Value) -> Option<Self> {
        serde_yaml::from_value(config.clone()).ok()
    }
}

/// One upstream proxy. The address is an opaque proxy URI and may include
/// credentials; `Display` masks the password.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    address: String,
}

impl ProxyEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", CREDENTIALS_RE.replace(&self.address, "://$1:***@"))
    }
}

/// Set of proxies with failure tracking.
///
/// Selection is uniformly random over the endpoints that are not marked
/// failed. Once every endpoint has failed the failed set is cleared, so the
/// pool never ends up with nothing to hand out.
#[derive(Debug, Default)]
pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    failed: Mutex<HashSet<usize>>,
}

impl ProxyPool {
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self {
            endpoints,
            failed: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        if !config.use_proxy {
            return Self::default();
        }
        let pool = Self::new(config.uris.iter().map(ProxyEndpoint::new).collect());
        info!(proxies = pool.len(), "proxy pool configured");
        pool
    }

    fn failed(&self) -> MutexGuard<'_, HashSet<usize>> {
        self.failed.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[ProxyEndpoint] {
        &self.endpoints
    }

    pub fn failed_count(&self) -> usize {
        self.failed().len()
    }

    pub fn is_failed(&self, endpoint: &ProxyEndpoint) -> bool {
        self.index_of(endpoint)
            .is_some_and(|index| self.failed().contains(&index))
    }

    fn index_of(&self, endpoint: &ProxyEndpoint) -> Option<usize> {
        self.endpoints.iter().position(|e| e == endpoint)
    }

    pub fn get_next_proxy(&self) -> Option<ProxyEndpoint> {
        if self.endpoints.is_empty() {
            return None;
        }

        let mut failed = self.failed();
        if failed.len() >= self.endpoints.len() {
            info!("all proxies marked failed, resetting failed set");
            failed.clear();
        }

        let available: Vec<&ProxyEndpoint> = self
            .endpoints
            .iter()
            .enumerate()
            .filter(|(index, _)| !failed.contains(index))
            .map(|(_, endpoint)| endpoint)
            .collect();

        let proxy = available.choose(&mut rng()).map(|p| (*p).clone());
        if let Some(proxy) = &proxy {
            debug!(proxy = %proxy, "selected proxy");
        }
        proxy
    }

    /// Mark `endpoint` as failed. Unknown endpoints are ignored.
    pub fn mark_failed(&self, endpoint: &ProxyEndpoint) {
        match self.index_of(endpoint) {
            Some(index) => {
                if self.failed().insert(index) {
                    warn!(proxy = %endpoint, "proxy marked as failed");
                }
            }
            None => debug!(proxy = %endpoint, "ignoring unknown proxy"),
        }
    }
}
