//! # openapi-proxy-tools
//!
//! Remote operations derived from an OpenAPI document.
//!
//! ## Core Components
//!
//! - [`RemoteOperation`]: trait for anything callable by operation id with a JSON argument object
//! - [`OperationBinder`]: walks the document and binds each operation to the shared client
//! - [`BoundOperation`]: the default [`RemoteOperation`], rendering arguments into HTTP requests
//! - [`OperationRegistry`]: ordered listing plus concurrent lookup by id
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use openapi_proxy_client::ClientFactory;
//! use openapi_proxy_common::RuntimeConfig;
//! use openapi_proxy_tools::{OperationBinder, OperationRegistry};
//! use serde_json::json;
//!
//! # async fn example() -> openapi_proxy_common::Result<()> {
//! let spec = json!({
//!     "servers": [{"url": "https://petstore.example.com"}],
//!     "paths": {"/pets": {"get": {"operationId": "listPets"}}}
//! });
//! let client = Arc::new(ClientFactory::new().build(&RuntimeConfig::new("inline"), &spec)?);
//!
//! let registry = OperationRegistry::from_operations(OperationBinder::bind(&spec, &client)?)?;
//! let pets = registry.call("listPets", &serde_json::Map::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! [`OperationRegistry`] uses `DashMap` for lookups, so concurrent tasks may
//! resolve and call operations without extra synchronization.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};

use openapi_proxy_common::{OperationDescriptor, ProxyError, Result};

pub mod binder;
pub mod operation;

pub use binder::{BODY_PARAM, HTTP_METHODS, OperationBinder, placeholders};
pub use operation::BoundOperation;

/// A callable remote operation.
#[async_trait]
pub trait RemoteOperation: Send + Sync {
    fn descriptor(&self) -> &OperationDescriptor;

    /// JSON schema of the accepted arguments.
    fn input_schema(&self) -> Value {
        self.descriptor().input_schema()
    }

    async fn call(&self, args: &Map<String, Value>) -> Result<Value>;
}

/// Operations in declaration order with lookup by id.
pub struct OperationRegistry {
    ordered: Vec<Arc<dyn RemoteOperation>>,
    by_id: DashMap<String, Arc<dyn RemoteOperation>>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.ids())
            .finish()
    }
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ordered: Vec::new(),
            by_id: DashMap::new(),
        }
    }

    /// Builds a registry from bound operations, keeping their order.
    ///
    /// # Errors
    /// Returns [`ProxyError::SpecBinding`] if two operations share an id.
    pub fn from_operations<I, O>(operations: I) -> Result<Self>
    where
        I: IntoIterator<Item = O>,
        O: RemoteOperation + 'static,
    {
        let mut registry = Self::new();
        for operation in operations {
            registry.register(Arc::new(operation))?;
        }
        Ok(registry)
    }

    /// Appends an operation.
    ///
    /// # Errors
    /// Returns [`ProxyError::SpecBinding`] if the id is already registered.
    pub fn register(&mut self, operation: Arc<dyn RemoteOperation>) -> Result<()> {
        let id = operation.descriptor().operation_id.clone();
        if self.by_id.contains_key(&id) {
            return Err(ProxyError::SpecBinding {
                operation: id,
                message: "operation id is already registered".into(),
            });
        }
        self.by_id.insert(id, Arc::clone(&operation));
        self.ordered.push(operation);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn RemoteOperation>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Descriptors in declaration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.ordered.iter().map(|op| op.descriptor())
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.descriptors().map(|d| d.operation_id.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Calls the operation named `id`.
    ///
    /// # Errors
    /// Returns [`ProxyError::UnknownOperation`] if no such operation is
    /// registered, otherwise whatever the operation returns.
    pub async fn call(&self, id: &str, args: &Map<String, Value>) -> Result<Value> {
        let operation = self
            .get(id)
            .ok_or_else(|| ProxyError::UnknownOperation(id.to_string()))?;
        operation.call(args).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    struct EchoOperation {
        descriptor: OperationDescriptor,
    }

    impl EchoOperation {
        fn new(id: &str) -> Self {
            Self {
                descriptor: OperationDescriptor::builder()
                    .operation_id(id)
                    .method("GET")
                    .path(format!("/{id}"))
                    .build(),
            }
        }
    }

    #[async_trait]
    impl RemoteOperation for EchoOperation {
        fn descriptor(&self) -> &OperationDescriptor {
            &self.descriptor
        }

        async fn call(&self, args: &Map<String, Value>) -> Result<Value> {
            Ok(json!({"id": self.descriptor.operation_id, "args": args}))
        }
    }

    #[test]
    fn test_registry_keeps_declaration_order() {
        let registry = OperationRegistry::from_operations(
            ["zeta", "alpha", "mid"].map(EchoOperation::new),
        )
        .unwrap();
        assert_eq!(registry.ids(), ["zeta", "alpha", "mid"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("alpha"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = OperationRegistry::new();
        registry.register(Arc::new(EchoOperation::new("a"))).unwrap();
        let err = registry
            .register(Arc::new(EchoOperation::new("a")))
            .unwrap_err();
        assert!(matches!(err, ProxyError::SpecBinding { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_call_dispatches_by_id() {
        let registry =
            OperationRegistry::from_operations([EchoOperation::new("ping")]).unwrap();
        let mut args = Map::new();
        args.insert("x".into(), json!(1));

        let result = registry.call("ping", &args).await.unwrap();
        assert_eq!(result, json!({"id": "ping", "args": {"x": 1}}));

        let err = registry.call("pong", &args).await.unwrap_err();
        assert!(matches!(err, ProxyError::UnknownOperation(ref id) if id == "pong"));
    }

    #[test]
    fn test_default_input_schema_comes_from_descriptor() {
        let op = EchoOperation::new("ping");
        assert_eq!(op.input_schema()["type"], "object");
    }
}
