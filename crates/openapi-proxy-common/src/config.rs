//! Configuration fragments and the merged runtime configuration.
//!
//! Every configuration source (command-line flags, environment, config file)
//! produces a [`ConfigFragment`]. The merge step folds the fragments into a
//! single [`RuntimeConfig`] with every default filled in.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::{ApiKeyLocation, AuthConfig, AuthKind};

/// Server name used when no source supplies one.
pub const DEFAULT_SERVER_NAME: &str = "OpenAPI MCP Proxy";
/// Request timeout used when no source supplies one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Retry count used when no source supplies one.
pub const DEFAULT_RETRIES: u32 = 0;

const REDACTED: &str = "[REDACTED]";

/// A single `KEY=VALUE` header entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderPair {
    /// Header name as written by the user.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl HeaderPair {
    /// Creates a header pair.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Header names compare case-insensitively.
    #[must_use]
    pub fn same_key(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl FromStr for HeaderPair {
    type Err = String;

    /// Parses `KEY=VALUE` or `KEY:VALUE`, splitting on whichever separator
    /// appears first.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let split_at = raw
            .find(['=', ':'])
            .ok_or_else(|| format!("header '{raw}' must be in KEY=VALUE or KEY:VALUE format"))?;

        let name = raw[..split_at].trim();
        let value = raw[split_at + 1..].trim();
        if name.is_empty() {
            return Err(format!("header '{raw}' has an empty name"));
        }

        Ok(Self::new(name, value))
    }
}

/// Outbound HTTP proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxySetting {
    /// One proxy for every scheme.
    All(String),
    /// Separate proxies per target scheme.
    PerScheme {
        /// Proxy for plain HTTP targets.
        http: Option<String>,
        /// Proxy for HTTPS targets.
        https: Option<String>,
    },
}

impl ProxySetting {
    /// Builds a setting from a scheme → proxy URL mapping.
    ///
    /// Keys may be written `http`, `https`, `all`, or with a `://` suffix.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys or an empty mapping.
    pub fn from_mapping<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Result<Self, String>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut all = None;
        let mut http = None;
        let mut https = None;

        for (key, value) in entries {
            let key = key.as_ref().trim().trim_end_matches("://").to_ascii_lowercase();
            match key.as_str() {
                "all" => all = Some(value.into()),
                "http" => http = Some(value.into()),
                "https" => https = Some(value.into()),
                other => return Err(format!("unsupported proxy scheme key '{other}'")),
            }
        }

        if let Some(all) = all {
            return Ok(Self::All(all));
        }
        if http.is_none() && https.is_none() {
            return Err("proxy mapping must define at least one of http, https or all".into());
        }
        Ok(Self::PerScheme { http, https })
    }
}

impl FromStr for ProxySetting {
    type Err = String;

    /// Accepts a proxy URL or a JSON object mapping schemes to proxy URLs.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("proxy value is empty".into());
        }
        if raw.starts_with('{') {
            let mapping: BTreeMap<String, String> = serde_json::from_str(raw)
                .map_err(|e| format!("proxy mapping must be a JSON object of strings: {e}"))?;
            return Self::from_mapping(mapping);
        }
        Ok(Self::All(raw.to_string()))
    }
}

impl<'de> Deserialize<'de> for ProxySetting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Url(String),
            Mapping(BTreeMap<String, String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Url(url) => url.parse().map_err(serde::de::Error::custom),
            Raw::Mapping(mapping) => Self::from_mapping(mapping).map_err(serde::de::Error::custom),
        }
    }
}

/// Where a configuration fragment came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigOrigin {
    /// Command-line flags.
    #[default]
    Flags,
    /// Process environment.
    Environment,
    /// A configuration file at the given path.
    File(PathBuf),
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flags => f.write_str("command-line flags"),
            Self::Environment => f.write_str("environment"),
            Self::File(path) => write!(f, "config file {}", path.display()),
        }
    }
}

/// Partial configuration produced by one source.
///
/// `None` means the source did not mention the field.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigFragment {
    pub origin: ConfigOrigin,
    pub openapi_spec: Option<String>,
    pub server_name: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<u64>,
    pub retries: Option<u32>,
    pub verify_ssl: Option<bool>,
    pub proxy: Option<ProxySetting>,
    pub headers: Option<Vec<HeaderPair>>,
    pub auth_type: Option<AuthKind>,
    pub auth_token: Option<String>,
    pub auth_username: Option<String>,
    pub auth_password: Option<String>,
    pub auth_headers: Option<Vec<HeaderPair>>,
    pub auth_key_name: Option<String>,
    pub auth_key_value: Option<String>,
    pub auth_key_location: Option<ApiKeyLocation>,
}

impl ConfigFragment {
    /// Creates an empty fragment for the given origin.
    #[must_use]
    pub fn new(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    /// Whether the source left every field unset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::new(self.origin.clone())
    }
}

// Credential fields stay out of Debug output.
impl fmt::Debug for ConfigFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| REDACTED);
        fn header_names(pairs: &Option<Vec<HeaderPair>>) -> Option<Vec<&str>> {
            pairs
                .as_ref()
                .map(|p| p.iter().map(|h| h.name.as_str()).collect::<Vec<_>>())
        }

        f.debug_struct("ConfigFragment")
            .field("origin", &self.origin)
            .field("openapi_spec", &self.openapi_spec)
            .field("server_name", &self.server_name)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("verify_ssl", &self.verify_ssl)
            .field("proxy", &self.proxy)
            .field("headers", &self.headers)
            .field("auth_type", &self.auth_type)
            .field("auth_token", &redact(&self.auth_token))
            .field("auth_username", &self.auth_username)
            .field("auth_password", &redact(&self.auth_password))
            .field("auth_headers", &header_names(&self.auth_headers))
            .field("auth_key_name", &self.auth_key_name)
            .field("auth_key_value", &redact(&self.auth_key_value))
            .field("auth_key_location", &self.auth_key_location)
            .finish()
    }
}

/// Fully merged configuration used to build the client and bind operations.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Location (path or URL) of the OpenAPI document.
    pub openapi_spec: String,
    /// Display name for the proxy server.
    pub server_name: String,
    /// Explicit base URL; resolved from the document when absent.
    pub base_url: Option<String>,
    /// Per-call timeout budget.
    pub timeout: Duration,
    /// Automatic retries for transient failures.
    pub retries: u32,
    /// Whether TLS certificates are verified.
    pub verify_ssl: bool,
    /// Optional outbound proxy.
    pub proxy: Option<ProxySetting>,
    /// Default headers, unique by key, in first-appearance order.
    pub headers: Vec<HeaderPair>,
    /// Resolved authentication strategy.
    pub auth: AuthConfig,
}

impl RuntimeConfig {
    /// Creates a configuration for the given document with every default applied.
    pub fn new(openapi_spec: impl Into<String>) -> Self {
        Self {
            openapi_spec: openapi_spec.into(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            verify_ssl: true,
            proxy: None,
            headers: Vec::new(),
            auth: AuthConfig::None,
        }
    }

    /// Sets an explicit base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Adds a default header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(HeaderPair::new(name, value));
        self
    }

    /// Sets the authentication strategy.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Produces a serializable view with every credential masked.
    #[must_use]
    pub fn redacted(&self) -> RedactedConfig {
        let auth = match &self.auth {
            AuthConfig::None => RedactedAuth::default(),
            AuthConfig::Bearer { .. } => RedactedAuth {
                scheme: AuthKind::Bearer,
                token: Some(REDACTED),
                ..Default::default()
            },
            AuthConfig::Basic { username, .. } => RedactedAuth {
                scheme: AuthKind::Basic,
                username: Some(username.clone()),
                password: Some(REDACTED),
                ..Default::default()
            },
            AuthConfig::Header { pairs } => RedactedAuth {
                scheme: AuthKind::Header,
                headers: pairs
                    .iter()
                    .map(|p| (p.name.clone(), REDACTED))
                    .collect(),
                ..Default::default()
            },
            AuthConfig::ApiKey { name, location, .. } => RedactedAuth {
                scheme: AuthKind::ApiKey,
                key_name: Some(name.clone()),
                key_value: Some(REDACTED),
                key_location: Some(*location),
                ..Default::default()
            },
        };

        RedactedConfig {
            openapi_spec: self.openapi_spec.clone(),
            server_name: self.server_name.clone(),
            base_url: self.base_url.clone(),
            timeout_seconds: self.timeout.as_secs(),
            retries: self.retries,
            verify_ssl: self.verify_ssl,
            proxy: self.proxy.clone(),
            headers: self.headers.clone(),
            auth,
        }
    }
}

/// Inspection view of a [`RuntimeConfig`] that is safe to print.
#[derive(Debug, Clone, Serialize)]
pub struct RedactedConfig {
    pub openapi_spec: String,
    pub server_name: String,
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
    pub retries: u32,
    pub verify_ssl: bool,
    pub proxy: Option<ProxySetting>,
    pub headers: Vec<HeaderPair>,
    pub auth: RedactedAuth,
}

/// Authentication summary inside a [`RedactedConfig`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RedactedAuth {
    pub scheme: AuthKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, &'static str)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_value: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_location: Option<ApiKeyLocation>,
}
