//! Environment variables.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use openapi_proxy_common::{ConfigFragment, ConfigOrigin, HeaderPair, ProxyError, Result};

/// Prefix shared by every recognized variable.
pub const ENV_PREFIX: &str = "MCP_PROXY_";

const SPEC: &[&str] = &["MCP_PROXY_SPEC", "MCP_OPENAPI_SPEC"];
const CONFIG: &[&str] = &["MCP_PROXY_CONFIG"];
const SERVER_NAME: &[&str] = &["MCP_PROXY_SERVER_NAME"];
const BASE_URL: &[&str] = &["MCP_PROXY_BASE_URL"];
const TIMEOUT: &[&str] = &["MCP_PROXY_TIMEOUT"];
const RETRIES: &[&str] = &["MCP_PROXY_RETRIES"];
const VERIFY_SSL: &[&str] = &["MCP_PROXY_VERIFY_SSL"];
const PROXIES: &[&str] = &["MCP_PROXY_PROXIES", "MCP_PROXY_PROXY"];
const HEADERS: &[&str] = &["MCP_PROXY_HEADERS", "MCP_PROXY_HEADER"];
const AUTH_TYPE: &[&str] = &["MCP_PROXY_AUTH_TYPE"];
const AUTH_TOKEN: &[&str] = &["MCP_PROXY_AUTH_TOKEN"];
const AUTH_USERNAME: &[&str] = &["MCP_PROXY_AUTH_USERNAME"];
const AUTH_PASSWORD: &[&str] = &["MCP_PROXY_AUTH_PASSWORD"];
const AUTH_HEADERS: &[&str] = &["MCP_PROXY_AUTH_HEADERS", "MCP_PROXY_AUTH_HEADER"];
const AUTH_KEY_NAME: &[&str] = &["MCP_PROXY_AUTH_KEY_NAME"];
const AUTH_KEY_VALUE: &[&str] = &["MCP_PROXY_AUTH_KEY_VALUE"];
const AUTH_KEY_LOCATION: &[&str] = &["MCP_PROXY_AUTH_KEY_LOCATION"];

/// A snapshot of the variables relevant to the proxy.
#[derive(Clone, Default)]
pub struct EnvReader {
    vars: HashMap<String, String>,
}

impl fmt::Debug for EnvReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("EnvReader").field("vars", &names).finish()
    }
}

impl EnvReader {
    /// Snapshots the given variables, keeping only proxy-related names.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with(ENV_PREFIX) || SPEC.contains(&k.as_str()))
            .collect();
        Self { vars }
    }

    /// Snapshots the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// First non-empty value among `names`, with the name that supplied it.
    fn lookup(&self, names: &[&'static str]) -> Option<(&'static str, &str)> {
        names.iter().find_map(|name| {
            self.vars
                .get(*name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| (*name, v))
        })
    }

    fn string(&self, names: &[&'static str]) -> Option<String> {
        self.lookup(names).map(|(_, v)| v.to_string())
    }

    fn parsed<T>(&self, names: &[&'static str]) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.lookup(names)
            .map(|(name, raw)| {
                raw.parse::<T>()
                    .map_err(|e| ProxyError::config_source(name, format!("'{raw}': {e}")))
            })
            .transpose()
    }

    fn flag(&self, names: &[&'static str]) -> Result<Option<bool>> {
        self.lookup(names)
            .map(|(name, raw)| {
                parse_bool(raw).ok_or_else(|| {
                    ProxyError::config_source(
                        name,
                        format!("'{raw}' is not a boolean (use 1/true/yes/on or 0/false/no/off)"),
                    )
                })
            })
            .transpose()
    }

    fn header_list(&self, names: &[&'static str]) -> Result<Option<Vec<HeaderPair>>> {
        let Some((name, raw)) = self.lookup(names) else {
            return Ok(None);
        };
        let pairs = split_header_list(raw)
            .map_err(|e| ProxyError::config_source(name, e))?;
        Ok((!pairs.is_empty()).then_some(pairs))
    }

    /// Configuration file path from `MCP_PROXY_CONFIG`.
    #[must_use]
    pub fn config_path(&self) -> Option<PathBuf> {
        self.string(CONFIG).map(PathBuf::from)
    }

    /// Reads every recognized variable into a fragment.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::ConfigSource`] naming the variable whose value
    /// cannot be parsed.
    pub fn read(&self) -> Result<ConfigFragment> {
        Ok(ConfigFragment {
            openapi_spec: self.string(SPEC),
            server_name: self.string(SERVER_NAME),
            base_url: self.string(BASE_URL),
            timeout: self.parsed(TIMEOUT)?,
            retries: self.parsed(RETRIES)?,
            verify_ssl: self.flag(VERIFY_SSL)?,
            proxy: self.parsed(PROXIES)?,
            headers: self.header_list(HEADERS)?,
            auth_type: self.parsed(AUTH_TYPE)?,
            auth_token: self.string(AUTH_TOKEN),
            auth_username: self.string(AUTH_USERNAME),
            auth_password: self.string(AUTH_PASSWORD),
            auth_headers: self.header_list(AUTH_HEADERS)?,
            auth_key_name: self.string(AUTH_KEY_NAME),
            auth_key_value: self.string(AUTH_KEY_VALUE),
            auth_key_location: self.parsed(AUTH_KEY_LOCATION)?,
            ..ConfigFragment::new(ConfigOrigin::Environment)
        })
    }
}

/// Reads a fragment from `vars`.
///
/// # Errors
///
/// See [`EnvReader::read`].
pub fn read_env<I, K, V>(vars: I) -> Result<ConfigFragment>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    EnvReader::from_vars(vars).read()
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
#[must_use]
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Splits `A=1,B:2` into header pairs; blank items are skipped.
fn split_header_list(raw: &str) -> std::result::Result<Vec<HeaderPair>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::parse)
        .collect()
}
