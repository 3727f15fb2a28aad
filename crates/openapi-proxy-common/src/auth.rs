//! Authentication descriptors.
//!
//! [`AuthConfig`] is the resolved, closed set of authentication strategies the
//! proxy understands. It is produced once by the configuration merge and then
//! handed to the client factory, which installs the matching request mutation.
//!
//! Credential values are held in [`SecretString`] so they never show up in
//! `Debug` output or logs.

use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::config::HeaderPair;

/// Default name used for API key authentication when none is configured.
pub const DEFAULT_API_KEY_NAME: &str = "X-API-Key";

/// Authentication scheme selector as it appears in configuration sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuthKind {
    /// No authentication.
    #[default]
    None,
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// HTTP basic authentication.
    Basic,
    /// Arbitrary credential headers.
    Header,
    /// A single API key placed in a header, query parameter or cookie.
    ApiKey,
}

impl AuthKind {
    /// Canonical configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bearer => "bearer",
            Self::Basic => "basic",
            Self::Header => "header",
            Self::ApiKey => "api-key",
        }
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "bearer" => Ok(Self::Bearer),
            "basic" => Ok(Self::Basic),
            "header" => Ok(Self::Header),
            "api-key" | "api_key" | "apikey" => Ok(Self::ApiKey),
            other => Err(format!(
                "unsupported authentication scheme '{other}' (expected none, bearer, basic, header or api-key)"
            )),
        }
    }
}

impl TryFrom<String> for AuthKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AuthKind> for String {
    fn from(kind: AuthKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Where an API key is injected into the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ApiKeyLocation {
    /// Request header named after the key.
    #[default]
    Header,
    /// Query string parameter.
    Query,
    /// Cookie sent in the `Cookie` header.
    Cookie,
}

impl ApiKeyLocation {
    /// Canonical configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Query => "query",
            Self::Cookie => "cookie",
        }
    }
}

impl fmt::Display for ApiKeyLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiKeyLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" => Ok(Self::Header),
            "query" => Ok(Self::Query),
            "cookie" => Ok(Self::Cookie),
            other => Err(format!(
                "unsupported API key location '{other}' (expected header, query or cookie)"
            )),
        }
    }
}

impl TryFrom<String> for ApiKeyLocation {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiKeyLocation> for String {
    fn from(location: ApiKeyLocation) -> Self {
        location.as_str().to_string()
    }
}

/// Resolved authentication strategy.
///
/// Exactly one variant is active for a running proxy. Matching on this enum is
/// exhaustive everywhere, so a new scheme is a compile-checked extension.
#[derive(Debug, Clone, Default)]
pub enum AuthConfig {
    /// Requests are sent without credentials.
    #[default]
    None,
    /// Bearer token in the `Authorization` header.
    Bearer {
        /// The token, without the `Bearer ` prefix.
        token: SecretString,
    },
    /// HTTP basic credentials supplied through the transport.
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: SecretString,
    },
    /// One or more credential headers, applied in order.
    Header {
        /// Header pairs; a later pair with the same key overwrites an earlier one.
        pairs: Vec<SecretHeader>,
    },
    /// A single API key.
    ApiKey {
        /// Header, query parameter or cookie name.
        name: String,
        /// The key itself.
        value: SecretString,
        /// Where the key is placed.
        location: ApiKeyLocation,
    },
}

impl AuthConfig {
    /// Creates a bearer configuration.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: SecretString::new(token.into().into()),
        }
    }

    /// Creates a basic-auth configuration.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: SecretString::new(password.into().into()),
        }
    }

    /// Creates a header configuration from plain pairs.
    pub fn headers(pairs: impl IntoIterator<Item = HeaderPair>) -> Self {
        Self::Header {
            pairs: pairs.into_iter().map(SecretHeader::from).collect(),
        }
    }

    /// Creates an API key configuration.
    pub fn api_key(
        name: impl Into<String>,
        value: impl Into<String>,
        location: ApiKeyLocation,
    ) -> Self {
        Self::ApiKey {
            name: name.into(),
            value: SecretString::new(value.into().into()),
            location,
        }
    }

    /// The scheme this configuration implements.
    #[must_use]
    pub const fn kind(&self) -> AuthKind {
        match self {
            Self::None => AuthKind::None,
            Self::Bearer { .. } => AuthKind::Bearer,
            Self::Basic { .. } => AuthKind::Basic,
            Self::Header { .. } => AuthKind::Header,
            Self::ApiKey { .. } => AuthKind::ApiKey,
        }
    }
}

/// A credential header whose value is kept secret.
#[derive(Debug, Clone)]
pub struct SecretHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: SecretString,
}

impl From<HeaderPair> for SecretHeader {
    fn from(pair: HeaderPair) -> Self {
        Self {
            name: pair.name,
            value: SecretString::new(pair.value.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_auth_kind_parsing() {
        assert_eq!("Bearer".parse::<AuthKind>().unwrap(), AuthKind::Bearer);
        assert_eq!("api_key".parse::<AuthKind>().unwrap(), AuthKind::ApiKey);
        assert_eq!("API-KEY".parse::<AuthKind>().unwrap(), AuthKind::ApiKey);
        assert_eq!("".parse::<AuthKind>().unwrap(), AuthKind::None);
        assert!("oauth".parse::<AuthKind>().is_err());
    }

    #[test]
    fn test_api_key_location_parsing() {
        assert_eq!(
            "query".parse::<ApiKeyLocation>().unwrap(),
            ApiKeyLocation::Query
        );
        assert!("body".parse::<ApiKeyLocation>().is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let auth = AuthConfig::bearer("super-secret-token");
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("super-secret-token"));

        match &auth {
            AuthConfig::Bearer { token } => {
                assert_eq!(token.expose_secret(), "super-secret-token");
            }
            other => panic!("expected bearer auth, got {other:?}"),
        }
    }

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(AuthConfig::None.kind(), AuthKind::None);
        assert_eq!(AuthConfig::basic("u", "p").kind(), AuthKind::Basic);
        assert_eq!(
            AuthConfig::api_key("k", "v", ApiKeyLocation::Cookie).kind(),
            AuthKind::ApiKey
        );
    }
}
