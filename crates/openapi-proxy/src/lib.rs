//! Runtime core of an OpenAPI to MCP proxy.
//!
//! Resolves the proxy's configuration from command-line flags, `MCP_PROXY_*`
//! environment variables and an optional configuration file, loads the
//! OpenAPI document, and binds each of its operations to one authenticated
//! HTTP client.
//!
//! Precedence is flags over environment over file over defaults. Credentials
//! are attached by the client on every outbound request, so individual
//! operations never see them.
//!
//! # Example
//!
//! ```no_run
//! use openapi_proxy::{ConfigSources, ProxyArgs, ProxyRuntime, SpecLoader};
//! use serde_json::Map;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sources = ConfigSources::from_process(ProxyArgs {
//!     openapi_spec: Some("petstore.yaml".into()),
//!     ..ProxyArgs::default()
//! });
//! let runtime = ProxyRuntime::start(&sources, &SpecLoader::new()?).await?;
//!
//! for operation in runtime.operations() {
//!     println!("{} {} {}", operation.operation_id, operation.method, operation.path);
//! }
//! let pets = runtime.call("listPets", &Map::new()).await?;
//! println!("{pets}");
//!
//! runtime.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod merge;
pub mod runtime;
pub mod sources;

pub use loader::{DEFAULT_SPEC_TIMEOUT, SpecLoader, SpecSource, parse_document};
pub use merge::{ConfigMerger, merge, merge_headers};
pub use runtime::ProxyRuntime;
pub use sources::{ConfigSources, EnvReader, ProxyArgs, read_env, read_file, read_flags};

pub use openapi_proxy_common::{
    ApiKeyLocation, AuthConfig, AuthKind, ConfigFragment, ConfigOrigin, HeaderPair,
    OperationDescriptor, ParamDescriptor, ParamLocation, ProxyError, ProxySetting, Result,
    RuntimeConfig,
};
