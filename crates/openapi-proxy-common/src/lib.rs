//! # openapi-proxy-common
//!
//! Shared types for the openapi-proxy workspace.
//!
//! This crate holds the data model every other crate agrees on:
//! - Configuration fragments and the merged [`RuntimeConfig`]
//! - The closed [`AuthConfig`] set of authentication strategies
//! - [`OperationDescriptor`]s extracted from an OpenAPI document
//! - The [`ProxyError`] taxonomy
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//!
//! use openapi_proxy_common::{ApiKeyLocation, AuthConfig, RuntimeConfig};
//!
//! let config = RuntimeConfig::new("petstore.yaml")
//!     .with_base_url("https://api.example.com")
//!     .with_timeout(Duration::from_secs(10))
//!     .with_header("X-Client", "docs")
//!     .with_auth(AuthConfig::api_key("api_key", "secret", ApiKeyLocation::Query));
//!
//! assert_eq!(config.retries, 0);
//! ```

/// Authentication descriptors.
pub mod auth;
/// Configuration fragments and the merged runtime configuration.
pub mod config;
pub mod error;
/// Operation and parameter descriptors.
pub mod operation;

pub use auth::{ApiKeyLocation, AuthConfig, AuthKind, DEFAULT_API_KEY_NAME, SecretHeader};
pub use config::{
    ConfigFragment, ConfigOrigin, DEFAULT_RETRIES, DEFAULT_SERVER_NAME, DEFAULT_TIMEOUT_SECS,
    HeaderPair, ProxySetting, RedactedAuth, RedactedConfig, RuntimeConfig,
};
pub use error::{ProxyError, Result};
pub use operation::{OperationDescriptor, ParamDescriptor, ParamLocation};
