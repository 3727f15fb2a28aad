//! # openapi-proxy-client
//!
//! The outbound side of openapi-proxy: a configured, authenticated and
//! retrying HTTP client shared by every bound operation.
//!
//! - [`ClientFactory`] builds an [`HttpClientHandle`] from a
//!   [`RuntimeConfig`](openapi_proxy_common::RuntimeConfig) and the OpenAPI document
//! - [`AuthApplier`] attaches credentials for the configured scheme
//! - [`OutboundRequest`] describes one call before defaults and credentials are layered on
//!
//! ## Example
//!
//! ```no_run
//! use openapi_proxy_client::{ClientFactory, Method, OutboundRequest};
//! use openapi_proxy_common::{AuthConfig, RuntimeConfig};
//! use serde_json::json;
//!
//! # async fn example() -> openapi_proxy_common::Result<()> {
//! let config = RuntimeConfig::new("petstore.json").with_auth(AuthConfig::bearer("abc"));
//! let spec = json!({"servers": [{"url": "https://petstore.example.com/v1"}]});
//!
//! let handle = ClientFactory::new().build(&config, &spec)?;
//! let pets = handle.execute(OutboundRequest::new(Method::GET, "/pets")).await?;
//! println!("{pets}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod request;

pub use auth::AuthApplier;
pub use client::{ClientFactory, HttpClientHandle, RetryBackoff, resolve_base_url, spec_server_url};
pub use request::OutboundRequest;
pub use reqwest::{Method, header};
