//! A single OpenAPI operation bound to the shared client.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value};

use openapi_proxy_client::header::{HeaderName, HeaderValue};
use openapi_proxy_client::{HttpClientHandle, Method, OutboundRequest};
use openapi_proxy_common::{OperationDescriptor, ParamLocation, ProxyError, Result};

use crate::RemoteOperation;

/// Characters left unescaped in a path segment (RFC 3986 unreserved).
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// An operation descriptor plus the client that serves it.
#[derive(Debug, Clone)]
pub struct BoundOperation {
    descriptor: Arc<OperationDescriptor>,
    client: Arc<HttpClientHandle>,
}

impl BoundOperation {
    /// Binds `descriptor` to `client`.
    #[must_use]
    pub fn new(descriptor: OperationDescriptor, client: Arc<HttpClientHandle>) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            client,
        }
    }

    /// Operation identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.descriptor.operation_id
    }

    /// Renders `args` into a request without sending it.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::MissingParameter`] naming the first absent required parameter
    /// - [`ProxyError::InvalidParameter`] for a value that cannot be encoded
    pub fn build_request(&self, args: &Map<String, Value>) -> Result<OutboundRequest> {
        let op = &*self.descriptor;

        if let Some(missing) = op
            .required_params()
            .find(|p| args.get(&p.name).is_none_or(Value::is_null))
        {
            return Err(ProxyError::MissingParameter {
                operation: op.operation_id.clone(),
                parameter: missing.name.clone(),
            });
        }

        let method = Method::from_bytes(op.method.as_bytes()).map_err(|_| ProxyError::SpecBinding {
            operation: op.operation_id.clone(),
            message: format!("unsupported HTTP method {}", op.method),
        })?;

        let mut path = op.path.clone();
        for param in op.params_in(ParamLocation::Path) {
            if let Some(value) = args.get(&param.name) {
                let rendered = scalar(value);
                // URL parsing collapses dot segments, which would leave the template.
                if matches!(rendered.as_str(), "." | "..") {
                    return Err(ProxyError::InvalidParameter {
                        operation: op.operation_id.clone(),
                        parameter: param.name.clone(),
                        message: "path values may not be `.` or `..`".to_string(),
                    });
                }
                let encoded = utf8_percent_encode(&rendered, PATH_SEGMENT).to_string();
                path = path.replace(&format!("{{{}}}", param.name), &encoded);
            }
        }

        let mut request = OutboundRequest::new(method, path);

        for param in op.params_in(ParamLocation::Query) {
            match args.get(&param.name) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => {
                    for item in items.iter().filter(|v| !v.is_null()) {
                        request = request.with_query(&param.name, scalar(item));
                    }
                }
                Some(value) => request = request.with_query(&param.name, scalar(value)),
            }
        }

        for param in op.params_in(ParamLocation::Header) {
            let Some(value) = args.get(&param.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let invalid = |message: &str| ProxyError::InvalidParameter {
                operation: op.operation_id.clone(),
                parameter: param.name.clone(),
                message: message.to_string(),
            };
            let name = HeaderName::from_bytes(param.name.as_bytes())
                .map_err(|_| invalid("not a valid header name"))?;
            let value = HeaderValue::from_str(&scalar(value))
                .map_err(|_| invalid("not a valid header value"))?;
            request = request.with_header(name, value);
        }

        if let Some(param) = op.params_in(ParamLocation::Body).next()
            && let Some(body) = args.get(&param.name).filter(|v| !v.is_null())
        {
            request = request.with_json(body.clone());
        }

        for name in args.keys().filter(|name| op.param(name).is_none()) {
            debug!("Ignoring undeclared argument `{name}` for `{}`", op.operation_id);
        }

        Ok(request)
    }
}

/// Renders a JSON value as it appears in a path, query string or header.
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RemoteOperation for BoundOperation {
    fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    async fn call(&self, args: &Map<String, Value>) -> Result<Value> {
        let request = self.build_request(args)?;
        self.client.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use openapi_proxy_client::ClientFactory;
    use openapi_proxy_common::{ApiKeyLocation, AuthConfig, ParamDescriptor, RuntimeConfig};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn descriptor() -> OperationDescriptor {
        OperationDescriptor::builder()
            .operation_id("updatePet")
            .method("PUT")
            .path("/owners/{owner}/pets/{petId}")
            .parameters(vec![
                ParamDescriptor::builder()
                    .name("owner")
                    .location(ParamLocation::Path)
                    .required(true)
                    .build(),
                ParamDescriptor::builder()
                    .name("petId")
                    .location(ParamLocation::Path)
                    .required(true)
                    .type_hint("integer")
                    .build(),
                ParamDescriptor::builder()
                    .name("tags")
                    .location(ParamLocation::Query)
                    .type_hint("array")
                    .build(),
                ParamDescriptor::builder()
                    .name("X-Request-Id")
                    .location(ParamLocation::Header)
                    .build(),
                ParamDescriptor::builder()
                    .name("body")
                    .location(ParamLocation::Body)
                    .required(true)
                    .type_hint("object")
                    .build(),
            ])
            .build()
    }

    fn bound(config: &RuntimeConfig) -> BoundOperation {
        let client = ClientFactory::new().build(config, &json!({})).unwrap();
        BoundOperation::new(descriptor(), Arc::new(client))
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_first_missing_required_param_is_named() {
        let op = bound(&RuntimeConfig::new("spec.json").with_base_url("https://api.example.com"));
        let err = op
            .build_request(&args(json!({"owner": "ann", "petId": null})))
            .unwrap_err();
        match err {
            ProxyError::MissingParameter {
                operation,
                parameter,
            } => {
                assert_eq!(operation, "updatePet");
                assert_eq!(parameter, "petId");
            }
            other => panic!("expected missing parameter, got {other:?}"),
        }
    }

    #[test]
    fn test_request_rendering() {
        let op = bound(&RuntimeConfig::new("spec.json").with_base_url("https://api.example.com"));
        let request = op
            .build_request(&args(json!({
                "owner": "ann smith/jr",
                "petId": 7,
                "tags": ["a", "b"],
                "X-Request-Id": "r-1",
                "body": {"name": "Rex"},
                "extra": true
            })))
            .unwrap();

        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.path, "/owners/ann%20smith%2Fjr/pets/7");
        assert_eq!(
            request.query,
            vec![
                ("tags".to_string(), "a".to_string()),
                ("tags".to_string(), "b".to_string())
            ]
        );
        assert_eq!(request.headers["x-request-id"], "r-1");
        assert_eq!(request.body, Some(json!({"name": "Rex"})));
    }

    #[test]
    fn test_dot_segment_path_argument_rejected() {
        let op = bound(&RuntimeConfig::new("spec.json").with_base_url("https://api.example.com"));
        for value in [".", ".."] {
            let err = op
                .build_request(&args(json!({"owner": value, "petId": 1, "body": {}})))
                .unwrap_err();
            assert!(
                matches!(err, ProxyError::InvalidParameter { ref parameter, .. } if parameter == "owner"),
                "unexpected error for {value:?}: {err:?}"
            );
        }

        let request = op
            .build_request(&args(json!({"owner": "...", "petId": "a.b", "body": {}})))
            .unwrap();
        assert_eq!(request.path, "/owners/.../pets/a.b");
    }

    #[test]
    fn test_invalid_header_argument() {
        let op = bound(&RuntimeConfig::new("spec.json").with_base_url("https://api.example.com"));
        let err = op
            .build_request(&args(json!({
                "owner": "ann",
                "petId": 1,
                "X-Request-Id": "bad\nvalue",
                "body": {}
            })))
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_call_round_trip_with_auth() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/owners/ann/pets/7"))
            .and(query_param("tags", "x"))
            .and(query_param("api_key", "configured"))
            .and(header("x-request-id", "r-9"))
            .and(body_json(json!({"name": "Rex"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7, "name": "Rex"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = RuntimeConfig::new("spec.json")
            .with_base_url(server.uri())
            .with_auth(AuthConfig::api_key("api_key", "configured", ApiKeyLocation::Query));
        let op = bound(&config);

        let result = op
            .call(&args(json!({
                "owner": "ann",
                "petId": 7,
                "tags": "x",
                "X-Request-Id": "r-9",
                "body": {"name": "Rex"}
            })))
            .await
            .unwrap();
        assert_eq!(result, json!({"id": 7, "name": "Rex"}));
    }

    #[tokio::test]
    async fn test_upstream_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid pet"))
            .mount(&server)
            .await;

        let op = bound(&RuntimeConfig::new("spec.json").with_base_url(server.uri()));
        let err = op
            .call(&args(json!({"owner": "a", "petId": 1, "body": {}})))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(422));
    }
}
