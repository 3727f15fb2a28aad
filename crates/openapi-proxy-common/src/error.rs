//! Error types shared by every openapi-proxy crate.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while resolving configuration, building the client, binding
/// operations, or calling an upstream operation.
///
/// Variants fall into two classes. Startup errors abort initialization of the
/// proxy entirely; per-call errors are returned to the caller of a single
/// operation and never affect other in-flight calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProxyError {
    /// A required configuration field was not supplied by any source.
    #[error(
        "No OpenAPI specification source provided for `{field}`. Use --openapi-spec, \
         MCP_PROXY_SPEC/MCP_OPENAPI_SPEC, or the configuration file"
    )]
    MissingRequiredConfig {
        /// Logical name of the missing field.
        field: &'static str,
    },

    /// A configuration source supplied a value that could not be used.
    #[error("Invalid configuration from {origin}: {message}")]
    ConfigSource {
        /// Where the value came from (flag, environment variable, or file path).
        origin: String,
        /// What was wrong with it.
        message: String,
    },

    /// Neither the configuration nor the OpenAPI document yields a base URL.
    #[error("No base URL could be resolved: {detail}")]
    MissingBaseUrl {
        /// Why resolution failed.
        detail: String,
    },

    /// The OpenAPI document does not describe a bindable operation.
    #[error("Cannot bind operation `{operation}`: {message}")]
    SpecBinding {
        /// Operation identifier (or method and path when no id is known yet).
        operation: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The OpenAPI document could not be retrieved or parsed.
    #[error("Failed to load OpenAPI specification from {location}: {message}")]
    SpecLoad {
        /// Path or URL that was requested.
        location: String,
        /// Underlying failure.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// A call omitted a parameter the operation marks as required.
    #[error("Missing required parameter `{parameter}` for operation `{operation}`")]
    MissingParameter {
        /// Operation being called.
        operation: String,
        /// The first required parameter that was absent.
        parameter: String,
    },

    /// A supplied argument cannot be encoded into the request.
    #[error("Invalid value for parameter `{parameter}` of operation `{operation}`: {message}")]
    InvalidParameter {
        /// Operation being called.
        operation: String,
        /// Offending parameter.
        parameter: String,
        /// Why the value was rejected.
        message: String,
    },

    /// No operation with this identifier was bound.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Credentials could not be attached to the outbound request.
    #[error("Authentication could not be applied: {0}")]
    AuthApplication(String),

    /// Connection-level failure talking to the upstream service.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The call did not finish within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// The client handle was released by shutdown.
    #[error("HTTP client has been shut down")]
    ClientClosed,
}

/// Result type alias using [`ProxyError`].
pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    /// Build a [`ProxyError::ConfigSource`] from any displayable origin.
    pub fn config_source(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigSource {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts process initialization.
    #[must_use]
    pub const fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredConfig { .. }
                | Self::ConfigSource { .. }
                | Self::MissingBaseUrl { .. }
                | Self::SpecBinding { .. }
                | Self::SpecLoad { .. }
                | Self::ClientBuild(_)
        )
    }

    /// Whether the failure class is eligible for automatic retry.
    ///
    /// Matches the retry middleware: transport failures plus 408, 429 and 5xx
    /// upstream responses.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Upstream { status, .. } => matches!(*status, 408 | 429 | 500..),
            _ => false,
        }
    }

    /// HTTP status code of an upstream error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_are_classified() {
        assert!(ProxyError::MissingRequiredConfig { field: "openapi_spec" }.is_startup());
        assert!(ProxyError::config_source("--timeout", "bad").is_startup());
        assert!(
            ProxyError::MissingBaseUrl {
                detail: "none".into()
            }
            .is_startup()
        );
        assert!(!ProxyError::Timeout(Duration::from_secs(1)).is_startup());
        assert!(!ProxyError::ClientClosed.is_startup());
    }

    #[test]
    fn retryable_matches_transient_classes() {
        let upstream = |status| ProxyError::Upstream {
            status,
            body: String::new(),
        };
        assert!(ProxyError::Transport("reset".into()).is_retryable());
        for status in [408, 429, 500, 503] {
            assert!(upstream(status).is_retryable(), "{status} should retry");
        }
        for status in [400, 401, 404, 422] {
            assert!(!upstream(status).is_retryable(), "{status} should not retry");
        }
        assert!(!ProxyError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!ProxyError::AuthApplication("bad".into()).is_retryable());
    }

    #[test]
    fn missing_parameter_names_the_parameter() {
        let err = ProxyError::MissingParameter {
            operation: "getPet".into(),
            parameter: "id".into(),
        };
        assert!(err.to_string().contains("`id`"));
        assert_eq!(err.status(), None);
    }
}
