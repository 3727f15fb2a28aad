//! HTTP client construction and the shared client handle.
//!
//! [`ClientFactory::build`] turns a [`RuntimeConfig`] plus the loaded OpenAPI
//! document into an [`HttpClientHandle`]. The handle owns the base URL, the
//! default headers, the authentication hook and a `reqwest` client wrapped in
//! retry middleware. Every operation call goes through
//! [`HttpClientHandle::execute`], so credentials and defaults are applied in
//! exactly one place.
//!
//! # Retries and timeouts
//!
//! Transient failures (connection errors, 408, 429 and 5xx responses) are
//! retried with exponential backoff up to `retries` times. A retry whose start
//! would fall after the configured timeout is not attempted, so the caller sees
//! the last upstream failure. The timeout still bounds the whole call; when it
//! elapses mid-attempt the call fails with [`ProxyError::Timeout`].

use std::error::Error as _;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use log::{debug, warn};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{Jitter, RetryDecision, RetryPolicy, RetryTransientMiddleware};
use reqwest_retry_after::RetryAfterMiddleware;
use secrecy::ExposeSecret;
use serde_json::Value;
use url::Url;

use openapi_proxy_common::{HeaderPair, ProxyError, ProxySetting, Result, RuntimeConfig};

use crate::auth::AuthApplier;
use crate::request::OutboundRequest;

/// Backoff bounds between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Builds [`HttpClientHandle`]s from resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientFactory {
    backoff: RetryBackoff,
}

impl ClientFactory {
    /// Creates a factory with default backoff bounds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the retry backoff bounds.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Builds a configured client for the API described by `spec`.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::MissingBaseUrl`] if neither the configuration nor the
    ///   document yields an absolute base URL
    /// - [`ProxyError::ConfigSource`] for an unusable base URL, header or proxy
    /// - [`ProxyError::ClientBuild`] if the underlying client cannot be built
    pub fn build(&self, config: &RuntimeConfig, spec: &Value) -> Result<HttpClientHandle> {
        let base_url = resolve_base_url(config.base_url.as_deref(), spec)?;
        let default_headers = default_headers(&config.headers)?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_ssl);
        if !config.verify_ssl {
            warn!("TLS certificate verification is disabled");
        }
        if let Some(setting) = &config.proxy {
            for proxy in proxies(setting)? {
                builder = builder.proxy(proxy);
            }
        }
        let http = builder
            .build()
            .map_err(|e| ProxyError::ClientBuild(e.to_string()))?;

        let retry_policy = DeadlineBackoff {
            backoff: ExponentialBackoff::builder()
                .retry_bounds(self.backoff.min_delay, self.backoff.max_delay)
                .jitter(Jitter::Bounded)
                .build_with_max_retries(config.retries),
            budget: config.timeout,
        };

        // RetryAfterMiddleware goes first so Retry-After is honored before backoff.
        let client = reqwest_middleware::ClientBuilder::new(http)
            .with(RetryAfterMiddleware::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        debug!(
            "Built HTTP client for {base_url} (timeout {:?}, retries {}, auth {})",
            config.timeout,
            config.retries,
            config.auth.kind()
        );

        Ok(HttpClientHandle {
            client: RwLock::new(Some(client)),
            base_url,
            default_headers,
            auth: AuthApplier::new(config.auth.clone()),
            timeout: config.timeout,
        })
    }
}

/// Exponential backoff that never schedules an attempt past the call budget.
#[derive(Debug)]
struct DeadlineBackoff {
    backoff: ExponentialBackoff,
    budget: Duration,
}

impl RetryPolicy for DeadlineBackoff {
    fn should_retry(&self, request_start_time: SystemTime, n_past_retries: u32) -> RetryDecision {
        let deadline = request_start_time.checked_add(self.budget);
        match self.backoff.should_retry(request_start_time, n_past_retries) {
            RetryDecision::Retry { execute_after }
                if deadline.is_none_or(|deadline| execute_after < deadline) =>
            {
                RetryDecision::Retry { execute_after }
            }
            RetryDecision::Retry { .. } => {
                debug!(
                    "Skipping retry #{}: it would start after the {:?} budget",
                    n_past_retries + 1,
                    self.budget
                );
                RetryDecision::DoNotRetry
            }
            RetryDecision::DoNotRetry => RetryDecision::DoNotRetry,
        }
    }
}

/// Picks the base URL: the explicit value if set, else the document's first
/// usable `servers` entry.
///
/// The result never ends with `/`.
///
/// # Errors
///
/// Returns [`ProxyError::MissingBaseUrl`] when no absolute URL is available and
/// [`ProxyError::ConfigSource`] when the explicit value does not parse.
pub fn resolve_base_url(explicit: Option<&str>, spec: &Value) -> Result<String> {
    if let Some(raw) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Url::parse(raw)
            .map_err(|e| ProxyError::config_source("base_url", format!("'{raw}' is not a valid URL: {e}")))?;
        return Ok(raw.trim_end_matches('/').to_string());
    }

    let Some(server) = spec_server_url(spec) else {
        return Err(ProxyError::MissingBaseUrl {
            detail: "no base URL configured and the OpenAPI document declares no servers".into(),
        });
    };

    match Url::parse(&server) {
        Ok(_) => Ok(server.trim_end_matches('/').to_string()),
        Err(_) => Err(ProxyError::MissingBaseUrl {
            detail: format!(
                "the OpenAPI document's server URL '{server}' is not absolute; configure base_url"
            ),
        }),
    }
}

/// First non-blank `servers[].url`, with server variables replaced by their
/// declared defaults.
#[must_use]
pub fn spec_server_url(spec: &Value) -> Option<String> {
    spec.get("servers")?
        .as_array()?
        .iter()
        .find_map(|server| {
            let url = server.get("url")?.as_str()?.trim();
            if url.is_empty() {
                return None;
            }
            let mut url = url.to_string();
            if let Some(variables) = server.get("variables").and_then(Value::as_object) {
                for (name, variable) in variables {
                    if let Some(default) = variable.get("default").and_then(Value::as_str) {
                        url = url.replace(&format!("{{{name}}}"), default);
                    }
                }
            }
            Some(url)
        })
}

fn default_headers(pairs: &[HeaderPair]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for pair in pairs {
        let name = HeaderName::from_bytes(pair.name.as_bytes()).map_err(|_| {
            ProxyError::config_source("headers", format!("'{}' is not a valid header name", pair.name))
        })?;
        let value = HeaderValue::from_str(&pair.value).map_err(|_| {
            ProxyError::config_source(
                "headers",
                format!("value for header '{}' is not a valid header value", pair.name),
            )
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn proxies(setting: &ProxySetting) -> Result<Vec<reqwest::Proxy>> {
    let invalid = |e: reqwest::Error| ProxyError::config_source("proxy", e.to_string());
    match setting {
        ProxySetting::All(url) => Ok(vec![reqwest::Proxy::all(url).map_err(invalid)?]),
        ProxySetting::PerScheme { http, https } => {
            let mut out = Vec::new();
            if let Some(url) = http {
                out.push(reqwest::Proxy::http(url).map_err(invalid)?);
            }
            if let Some(url) = https {
                out.push(reqwest::Proxy::https(url).map_err(invalid)?);
            }
            Ok(out)
        }
    }
}

/// Shared, thread-safe handle to the configured upstream client.
///
/// Cloning is not supported; share it behind an `Arc`.
pub struct HttpClientHandle {
    client: RwLock<Option<ClientWithMiddleware>>,
    base_url: String,
    default_headers: HeaderMap,
    auth: AuthApplier,
    timeout: Duration,
}

impl fmt::Debug for HttpClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClientHandle")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers.keys().collect::<Vec<_>>())
            .field("auth", &self.auth.scheme())
            .field("timeout", &self.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl HttpClientHandle {
    /// Base URL every request path is appended to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Per-call timeout budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether [`close`](Self::close) has released the client.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Releases the underlying client. Returns `true` on the first call only.
    pub fn close(&self) -> bool {
        let released = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if released {
            debug!("Closed HTTP client for {}", self.base_url);
        }
        released
    }

    fn client(&self) -> Result<ClientWithMiddleware> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ProxyError::ClientClosed)
    }

    /// Layers default headers and credentials onto `request`.
    ///
    /// Operation headers win over defaults; credentials win over both.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::AuthApplication`] if credentials cannot be attached.
    pub fn prepare(&self, mut request: OutboundRequest) -> Result<OutboundRequest> {
        for (name, value) in &self.default_headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }
        self.auth.apply(request)
    }

    /// Builds the concrete `reqwest` request for `request`.
    ///
    /// # Errors
    ///
    /// Fails if the client is closed, credentials cannot be applied, or the
    /// resulting URL is invalid.
    pub fn build_request(&self, request: OutboundRequest) -> Result<reqwest::Request> {
        let client = self.client()?;
        self.build_with(&client, request)
    }

    fn build_with(
        &self,
        client: &ClientWithMiddleware,
        request: OutboundRequest,
    ) -> Result<reqwest::Request> {
        let request = self.prepare(request)?;

        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))
            .map_err(|e| ProxyError::Transport(format!("invalid request URL: {e}")))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        let mut builder = client
            .request(request.method, url)
            .headers(request.headers);
        if let Some((username, password)) = &request.basic_auth {
            builder = builder.basic_auth(username, Some(password.expose_secret()));
        }
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| ProxyError::Transport(format!("cannot encode request body: {e}")))?;
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(bytes);
        }
        builder
            .build()
            .map_err(|e| ProxyError::Transport(e.without_url().to_string()))
    }

    /// Sends `request` and decodes the response body.
    ///
    /// JSON responses are returned as parsed values, other non-empty bodies as
    /// a JSON string, and empty bodies as `null`.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::ClientClosed`] after [`close`](Self::close)
    /// - [`ProxyError::AuthApplication`] if credentials cannot be attached
    /// - [`ProxyError::Timeout`] when the timeout budget is exhausted
    /// - [`ProxyError::Transport`] for connection failures
    /// - [`ProxyError::Upstream`] for non-2xx responses
    pub async fn execute(&self, request: OutboundRequest) -> Result<Value> {
        let client = self.client()?;
        let built = self.build_with(&client, request)?;
        debug!("{} {}", built.method(), built.url().path());

        let exchange = async {
            let response = client.execute(built).await.map_err(transport_error)?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| ProxyError::Transport(describe_reqwest(&e)))?;
            Ok::<_, ProxyError>((status, text))
        };

        let (status, text) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ProxyError::Timeout(self.timeout))??;

        if !status.is_success() {
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(decode_body(text))
    }
}

fn decode_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Describes a `reqwest` error without its URL, which may carry a query credential.
fn describe_reqwest(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_redirect() {
        "redirect failed"
    } else if err.is_body() || err.is_decode() {
        "failed to read response body"
    } else if err.is_builder() {
        "invalid request"
    } else {
        "error sending request"
    };
    kind.to_string()
}

fn transport_error(err: reqwest_middleware::Error) -> ProxyError {
    match err {
        reqwest_middleware::Error::Reqwest(e) => {
            let mut parts = vec![describe_reqwest(&e)];
            let mut source = e.source();
            while let Some(cause) = source {
                parts.push(cause.to_string());
                source = cause.source();
            }
            ProxyError::Transport(parts.join(": "))
        }
        reqwest_middleware::Error::Middleware(e) => {
            let parts: Vec<String> = e.chain().map(describe_cause).collect();
            ProxyError::Transport(parts.join(": "))
        }
    }
}

/// Retry middleware nests the final error in its own; both error types print
/// the URL, so they are described by kind instead.
fn describe_cause(cause: &(dyn std::error::Error + 'static)) -> String {
    if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
        return describe_reqwest(e);
    }
    match cause.downcast_ref::<reqwest_middleware::Error>() {
        Some(reqwest_middleware::Error::Reqwest(e)) => describe_reqwest(e),
        Some(reqwest_middleware::Error::Middleware(e)) => describe_cause(e.as_ref()),
        None => cause.to_string(),
    }
}
