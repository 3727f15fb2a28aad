//! The assembled proxy: resolved configuration, one shared HTTP client, and
//! the operations bound to it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use openapi_proxy_client::{ClientFactory, HttpClientHandle};
use openapi_proxy_common::{OperationDescriptor, ProxyError, Result, RuntimeConfig};
use openapi_proxy_tools::{OperationBinder, OperationRegistry, RemoteOperation};

use crate::loader::SpecSource;
use crate::merge::merge;
use crate::sources::ConfigSources;

/// A running proxy instance.
///
/// Every bound operation shares the same [`HttpClientHandle`]. Shutting the
/// runtime down closes that handle, so calls made afterwards fail with
/// [`ProxyError::ClientClosed`].
pub struct ProxyRuntime {
    config: RuntimeConfig,
    spec: Arc<Value>,
    client: Arc<HttpClientHandle>,
    operations: OperationRegistry,
    shut_down: AtomicBool,
}

impl fmt::Debug for ProxyRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRuntime")
            .field("server_name", &self.config.server_name)
            .field("client", &self.client)
            .field("operations", &self.operations.ids())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl ProxyRuntime {
    /// Resolves configuration, loads the document, builds the client and binds
    /// every operation.
    ///
    /// # Errors
    ///
    /// Returns the first startup error. Nothing stays alive on failure.
    pub async fn start(sources: &ConfigSources, loader: &impl SpecSource) -> Result<Self> {
        let (file, env, flags) = sources.read()?;
        let config = merge(file.as_ref(), &env, &flags)?;
        info!(
            server_name = %config.server_name,
            spec = %config.openapi_spec,
            auth = %config.auth.kind(),
            "Resolved configuration"
        );

        let spec = loader.load(&config.openapi_spec).await?;
        Self::from_config(config, spec)
    }

    /// Builds a runtime from an already-resolved configuration and document.
    ///
    /// # Errors
    ///
    /// Returns client construction or binding errors.
    pub fn from_config(config: RuntimeConfig, spec: Arc<Value>) -> Result<Self> {
        Self::with_factory(config, spec, &ClientFactory::new())
    }

    /// Like [`Self::from_config`] with a custom client factory.
    ///
    /// # Errors
    ///
    /// Returns client construction or binding errors. The client is closed
    /// before a binding error is returned.
    pub fn with_factory(
        config: RuntimeConfig,
        spec: Arc<Value>,
        factory: &ClientFactory,
    ) -> Result<Self> {
        let client = Arc::new(factory.build(&config, &spec)?);
        debug!(base_url = %client.base_url(), "HTTP client ready");

        let operations = match OperationBinder::bind(&spec, &client)
            .and_then(OperationRegistry::from_operations)
        {
            Ok(operations) => operations,
            Err(e) => {
                client.close();
                return Err(e);
            }
        };

        if operations.is_empty() {
            warn!("OpenAPI document exposes no operations");
        }
        info!(
            server_name = %config.server_name,
            operations = operations.len(),
            "Proxy runtime started"
        );

        Ok(Self {
            config,
            spec,
            client,
            operations,
            shut_down: AtomicBool::new(false),
        })
    }

    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The loaded OpenAPI document.
    #[must_use]
    pub fn spec(&self) -> &Value {
        &self.spec
    }

    /// Name advertised to MCP clients.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.config.server_name
    }

    /// The shared HTTP client handle.
    #[must_use]
    pub const fn client(&self) -> &Arc<HttpClientHandle> {
        &self.client
    }

    /// Bound operations in document order.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.descriptors()
    }

    /// Looks up a bound operation.
    #[must_use]
    pub fn operation(&self, id: &str) -> Option<Arc<dyn RemoteOperation>> {
        self.operations.get(id)
    }

    /// Calls a bound operation.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UnknownOperation`] for an unbound id,
    /// [`ProxyError::ClientClosed`] after shutdown, or the call's own error.
    pub async fn call(&self, id: &str, args: &Map<String, Value>) -> Result<Value> {
        if self.is_shut_down() {
            return Err(ProxyError::ClientClosed);
        }
        self.operations.call(id, args).await
    }

    /// Releases the HTTP client. Returns `true` only for the call that did so.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.client.close();
        info!(server_name = %self.config.server_name, "Proxy runtime shut down");
        true
    }

    /// Whether [`Self::shutdown`] has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for ProxyRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use openapi_proxy_common::AuthConfig;

    use super::*;

    fn spec() -> Arc<Value> {
        Arc::new(json!({
            "openapi": "3.0.0",
            "servers": [{"url": "https://api.example.com/v1"}],
            "paths": {
                "/pets": {
                    "get": {"operationId": "listPets"},
                    "post": {"operationId": "createPet"}
                },
                "/pets/{petId}": {
                    "get": {
                        "operationId": "showPet",
                        "parameters": [{"name": "petId", "in": "path", "required": true}]
                    }
                }
            }
        }))
    }

    #[test]
    fn test_operations_in_document_order() {
        let runtime = ProxyRuntime::from_config(RuntimeConfig::new("petstore.json"), spec()).unwrap();
        let ids: Vec<&str> = runtime.operations().map(|d| d.operation_id.as_str()).collect();
        assert_eq!(ids, vec!["listPets", "createPet", "showPet"]);
        assert_eq!(runtime.client().base_url(), "https://api.example.com/v1");
        assert!(runtime.operation("showPet").is_some());
        assert!(runtime.operation("deletePet").is_none());
    }

    #[test]
    fn test_binding_failure_is_startup_error() {
        let spec = Arc::new(json!({
            "servers": [{"url": "https://api.example.com"}],
            "paths": {"/pets/{petId}": {"get": {"operationId": "showPet"}}}
        }));
        let err = ProxyRuntime::from_config(RuntimeConfig::new("x"), spec).unwrap_err();
        assert!(matches!(err, ProxyError::SpecBinding { .. }));
        assert!(err.is_startup());
    }

    #[test]
    fn test_missing_base_url() {
        let spec = Arc::new(json!({"paths": {}}));
        let err = ProxyRuntime::from_config(RuntimeConfig::new("x"), spec).unwrap_err();
        assert!(matches!(err, ProxyError::MissingBaseUrl { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let config = RuntimeConfig::new("x").with_auth(AuthConfig::bearer("t"));
        let runtime = ProxyRuntime::from_config(config, spec()).unwrap();

        assert!(runtime.shutdown());
        assert!(!runtime.shutdown());
        assert!(runtime.is_shut_down());
        assert!(runtime.client().is_closed());

        let err = runtime.call("listPets", &Map::new()).await.unwrap_err();
        assert!(matches!(err, ProxyError::ClientClosed));
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let runtime = ProxyRuntime::from_config(RuntimeConfig::new("x"), spec()).unwrap();
        let err = runtime.call("nope", &Map::new()).await.unwrap_err();
        assert!(matches!(err, ProxyError::UnknownOperation(ref id) if id == "nope"));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = RuntimeConfig::new("x").with_auth(AuthConfig::bearer("very-secret"));
        let runtime = ProxyRuntime::from_config(config, spec()).unwrap();
        let debug = format!("{runtime:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("listPets"));
    }
}
