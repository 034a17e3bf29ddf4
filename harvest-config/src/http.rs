//! HTTP request executor with proxy rotation and anti-bot handling.
//!
//! Every request goes through two retry layers:
//! - transport: retries on connection failures and on the configured status
//!   codes (`500, 502, 503, 504, 429` by default) with exponential backoff
//! - application: a blocked response or a proxy failure marks the proxy as
//!   failed and tries again with a fresh proxy and fresh headers
//!
//! # Example
//! ```no_run
//! use harvest_config::{http::RequestExecutor, proxy::ProxyPool, Settings};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), harvest_config::http::RequestError> {
//! let settings = Settings::default();
//! let proxies = Arc::new(ProxyPool::from_config(&settings.proxy));
//! let executor = RequestExecutor::new((&settings.http).into(), proxies);
//! let page = executor.execute("https://example.com/item/1").await?;
//! println!("{} {}", page.status, page.body.len());
//! # Ok(())
//! # }
//! ```
use crate::config::{secs, HttpSettings};
use crate::proxy::{ProxyEndpoint, ProxyPool};
use backoff::ExponentialBackoffBuilder;
use rand::{rng, seq::IndexedRandom, Rng};
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Proxy error: {0}")]
    Proxy(#[source] reqwest::Error),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unexpected status {0}")]
    Status(u16),
    #[error("All {attempts} attempts failed for {url}: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

impl RequestError {
    fn from_send(err: reqwest::Error, via_proxy: bool) -> Self {
        if via_proxy && err.is_connect() {
            RequestError::Proxy(err)
        } else {
            RequestError::Transport(err)
        }
    }

    fn is_proxy(&self) -> bool {
        matches!(self, RequestError::Proxy(_))
    }
}

/// Fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    async fn read(response: reqwest::Response) -> Result<Self, RequestError> {
        let url = response.url().to_string();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;
        Ok(Self {
            url,
            status,
            headers,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct RenderingApi {
    pub key: String,
    pub url: String,
    pub timeout: Duration,
}

/// Knobs of [`RequestExecutor`]; `Default` matches [`HttpSettings::default`].
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub page_delay: Duration,
    pub retry_delay: Duration,
    pub max_attempts: u32,
    pub transport_retries: u32,
    pub backoff_factor: f64,
    pub retry_statuses: Vec<u16>,
    pub blocked_statuses: Vec<u16>,
    pub user_agents: Vec<String>,
    pub blocked_indicators: Vec<String>,
    pub rendering_api: Option<RenderingApi>,
}

impl From<&HttpSettings> for ExecutorOptions {
    fn from(settings: &HttpSettings) -> Self {
        let rendering_api = settings
            .rendering_api
            .key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(|key| RenderingApi {
                key: key.clone(),
                url: settings.rendering_api.url.clone(),
                timeout: Duration::from_secs(settings.rendering_api.timeout),
            });

        Self {
            timeout: Duration::from_secs(settings.timeout),
            connect_timeout: Duration::from_secs(settings.connect_timeout),
            min_delay: secs(settings.delay.min),
            max_delay: secs(settings.delay.max),
            page_delay: secs(settings.delay.page),
            retry_delay: secs(settings.delay.retry),
            max_attempts: settings.retry.max_attempts,
            transport_retries: settings.retry.max_retries,
            backoff_factor: settings.retry.backoff_factor,
            retry_statuses: settings.retry.status_forcelist.clone(),
            blocked_statuses: vec![403, 429, 503],
            user_agents: settings.user_agents.clone(),
            blocked_indicators: settings
                .blocked_indicators
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            rendering_api,
        }
    }
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        (&HttpSettings::default()).into()
    }
}

/// Parameters for configuring an HTTP client.
#[derive(Debug)]
pub struct HttpClientParams<'a> {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub proxy: Option<&'a ProxyEndpoint>,
}

/// Builds a reqwest client bound to (at most) one proxy.
pub fn build_http_client(
    params: HttpClientParams,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut client_builder = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .timeout(params.timeout)
        .connect_timeout(params.connect_timeout);

    client_builder = match params.proxy {
        Some(proxy) => client_builder.proxy(reqwest::Proxy::all(proxy.address())?),
        None => client_builder.no_proxy(),
    };

    client_builder.build()
}

const BASE_HEADERS: &[(&str, &str)] = &[
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
    ),
    ("accept-language", "pt-BR,pt;q=0.9,en;q=0.8"),
    ("connection", "keep-alive"),
    ("upgrade-insecure-requests", "1"),
    ("cache-control", "max-age=0"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
];

/// Browser-like headers with a user agent picked at random from `user_agents`.
pub fn random_headers(user_agents: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for &(name, value) in BASE_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }

    if let Some(agent) = user_agents.choose(&mut rng()) {
        match HeaderValue::from_str(agent) {
            Ok(value) => {
                headers.insert(header::USER_AGENT, value);
            }
            Err(_) => warn!(agent = %agent, "skipping invalid user agent"),
        }
    }
    headers
}

/// Heuristic bot-detection check over status code and page content.
pub fn is_blocked(
    response: &HttpResponse,
    blocked_statuses: &[u16],
    indicators: &[String],
) -> bool {
    if blocked_statuses.contains(&response.status) {
        return true;
    }
    let content = response.body.to_lowercase();
    indicators
        .iter()
        .any(|indicator| content.contains(indicator.as_str()))
}

fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rng().random_range(min..=max)
}

/// Issues GET requests through the proxy pool, retrying around blocks.
#[derive(Debug)]
pub struct RequestExecutor {
    options: ExecutorOptions,
    proxies: Arc<ProxyPool>,
    // one client per proxy address, `None` for direct connections
    clients: Mutex<HashMap<Option<String>, reqwest::Client>>,
}

impl RequestExecutor {
    pub fn new(options: ExecutorOptions, proxies: Arc<ProxyPool>) -> Self {
        Self {
            options,
            proxies,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn proxies(&self) -> &Arc<ProxyPool> {
        &self.proxies
    }

    fn client_for(
        &self,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<reqwest::Client, RequestError> {
        let key = proxy.map(|p| p.address().to_string());
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_http_client(HttpClientParams {
            timeout: self.options.timeout,
            connect_timeout: self.options.connect_timeout,
            proxy,
        })
        .map_err(RequestError::Client)?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Randomized pause callers should take between consecutive pages.
    pub fn page_delay(&self) -> Duration {
        random_between(
            self.options.page_delay,
            self.options.page_delay.mul_f64(1.5),
        )
    }

    fn politeness_delay(&self) -> Duration {
        random_between(self.options.min_delay, self.options.max_delay)
    }

    pub fn is_blocked(&self, response: &HttpResponse) -> bool {
        is_blocked(
            response,
            &self.options.blocked_statuses,
            &self.options.blocked_indicators,
        )
    }

    /// Fetch `url`, rotating proxies until a non-blocked response arrives or
    /// attempts run out.
    pub async fn execute(&self, url: &str) -> Result<HttpResponse, RequestError> {
        let attempts = self.options.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let proxy = self.proxies.get_next_proxy();
            let headers = random_headers(&self.options.user_agents);
            tokio::time::sleep(self.politeness_delay()).await;

            match self.send_with_retries(url, proxy.as_ref(), headers).await {
                Ok(response) if self.is_blocked(&response) => {
                    warn!(
                        url,
                        attempt,
                        status = response.status,
                        "possible block detected"
                    );
                    if let Some(proxy) = &proxy {
                        self.proxies.mark_failed(proxy);
                    }
                    last_error =
                        format!("blocked response (status {})", response.status);
                }
                Ok(response) => {
                    debug!(url, attempt, status = response.status, "request done");
                    return Ok(response);
                }
                Err(RequestError::Status(status))
                    if self.options.blocked_statuses.contains(&status) =>
                {
                    warn!(url, attempt, status, "possible block detected");
                    if let Some(proxy) = &proxy {
                        self.proxies.mark_failed(proxy);
                    }
                    last_error = format!("blocked response (status {status})");
                }
                Err(err) if err.is_proxy() => {
                    warn!(url, attempt, error = %err, "proxy error");
                    if let Some(proxy) = &proxy {
                        self.proxies.mark_failed(proxy);
                    }
                    last_error = err.to_string();
                }
                Err(err) => {
                    error!(url, attempt, error = %err, "request error");
                    last_error = err.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.options.retry_delay).await;
            }
        }

        Err(RequestError::Exhausted {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }

    /// One logical GET with transport-level retries. A retryable status that
    /// survives every retry becomes [`RequestError::Status`].
    async fn send_with_retries(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
        headers: HeaderMap,
    ) -> Result<HttpResponse, RequestError> {
        let client = self.client_for(proxy)?;
        let via_proxy = proxy.is_some();
        let retries = self.options.transport_retries;
        let retry_statuses = &self.options.retry_statuses;
        let tries = AtomicU32::new(0);

        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(
                Duration::try_from_secs_f64(self.options.backoff_factor)
                    .unwrap_or_default(),
            )
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_secs(60))
            .with_max_elapsed_time(None)
            .build();

        let (client, headers, tries) = (&client, &headers, &tries);
        backoff::future::retry(backoff, move || async move {
            let try_no = tries.fetch_add(1, Ordering::SeqCst);
            let can_retry = try_no < retries;

            let response = match client.get(url).headers(headers.clone()).send().await
            {
                Ok(response) => response,
                Err(err) if can_retry && (err.is_connect() || err.is_timeout()) => {
                    debug!(url, try_no, error = %err, "transport error, retrying");
                    return Err(backoff::Error::transient(RequestError::from_send(
                        err, via_proxy,
                    )));
                }
                Err(err) => {
                    return Err(backoff::Error::permanent(RequestError::from_send(
                        err, via_proxy,
                    )));
                }
            };

            let status = response.status().as_u16();
            if retry_statuses.contains(&status) {
                if can_retry {
                    debug!(url, try_no, status, "retryable status");
                    return Err(backoff::Error::transient(RequestError::Status(status)));
                }
                return Err(backoff::Error::permanent(RequestError::Status(status)));
            }

            HttpResponse::read(response)
                .await
                .map_err(backoff::Error::permanent)
        })
        .await
    }

    /// Fetch `url` through the JavaScript rendering API. Without an API key
    /// this is a plain [`RequestExecutor::execute`].
    pub async fn execute_via_rendering_api(
        &self,
        url: &str,
    ) -> Result<HttpResponse, RequestError> {
        let Some(api) = &self.options.rendering_api else {
            warn!("rendering API key not configured, using direct request");
            return self.execute(url).await;
        };

        info!(url, "requesting page via rendering API");
        let client = self.client_for(None)?;
        let response = client
            .get(&api.url)
            .query(&[("api_key", api.key.as_str()), ("url", url), ("render", "true")])
            .timeout(api.timeout)
            .send()
            .await
            .map_err(|err| {
                error!(url, error = %err, "rendering API request failed");
                RequestError::Transport(err)
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(url, status = status.as_u16(), "rendering API returned error");
            return Err(RequestError::Status(status.as_u16()));
        }

        HttpResponse::read(response).await
    }
}
