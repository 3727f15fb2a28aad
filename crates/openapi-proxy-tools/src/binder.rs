//! Turns an OpenAPI document into bound, callable operations.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use log::{debug, warn};
use regex::Regex;
use serde_json::Value;

use openapi_proxy_client::HttpClientHandle;
use openapi_proxy_common::{
    OperationDescriptor, ParamDescriptor, ParamLocation, ProxyError, Result,
};

use crate::operation::BoundOperation;

/// HTTP methods a path item may declare, as OpenAPI spells them.
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Name of the parameter that carries the JSON request body.
pub const BODY_PARAM: &str = "body";

#[allow(clippy::expect_used)] // constant pattern
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}/]+)\}").expect("placeholder pattern is valid"));

/// Walks an OpenAPI document and binds its operations to a client.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationBinder;

impl OperationBinder {
    /// Binds every operation in `spec` to `client`, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::SpecBinding`] for malformed operations, duplicate
    /// operation ids, or path placeholders without a matching parameter.
    pub fn bind(spec: &Value, client: &Arc<HttpClientHandle>) -> Result<Vec<BoundOperation>> {
        let operations: Vec<BoundOperation> = Self::describe(spec)?
            .into_iter()
            .map(|descriptor| BoundOperation::new(descriptor, Arc::clone(client)))
            .collect();
        debug!("Bound {} operations", operations.len());
        Ok(operations)
    }

    /// Extracts operation descriptors without binding them.
    ///
    /// # Errors
    ///
    /// Same as [`bind`](Self::bind).
    pub fn describe(spec: &Value) -> Result<Vec<OperationDescriptor>> {
        let Some(paths) = spec.get("paths").and_then(Value::as_object) else {
            warn!("OpenAPI document declares no paths; no operations bound");
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let mut descriptors = Vec::new();

        for (path, item) in paths {
            let item = resolve(spec, item);
            let Some(item) = item.as_object() else {
                return Err(binding_error(path, "path item is not an object"));
            };
            let shared = item.get("parameters");

            for (method, operation) in item {
                let method = method.to_ascii_lowercase();
                if !HTTP_METHODS.contains(&method.as_str()) {
                    continue;
                }
                let descriptor = describe_operation(spec, path, &method, operation, shared)?;
                if !seen.insert(descriptor.operation_id.clone()) {
                    return Err(binding_error(
                        &descriptor.operation_id,
                        "operation id is declared more than once",
                    ));
                }
                descriptors.push(descriptor);
            }
        }

        Ok(descriptors)
    }
}

fn binding_error(operation: &str, message: impl Into<String>) -> ProxyError {
    ProxyError::SpecBinding {
        operation: operation.to_string(),
        message: message.into(),
    }
}

/// Follows a local `$ref` (`#/...`) chain; anything else is returned unchanged.
fn resolve<'a>(spec: &'a Value, value: &'a Value) -> &'a Value {
    let mut current = value;
    // Bounded to stop reference cycles.
    for _ in 0..32 {
        let Some(pointer) = current
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| r.strip_prefix('#'))
        else {
            return current;
        };
        match spec.pointer(pointer) {
            Some(target) => current = target,
            None => return current,
        }
    }
    current
}

/// `get /pets/{petId}` becomes `get_pets_petId`.
fn derive_operation_id(method: &str, path: &str) -> String {
    let raw = format!("{method}_{path}");
    let mut id = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c);
        } else if !id.ends_with('_') {
            id.push('_');
        }
    }
    id.trim_end_matches('_').to_string()
}

fn describe_operation(
    spec: &Value,
    path: &str,
    method: &str,
    operation: &Value,
    shared_params: Option<&Value>,
) -> Result<OperationDescriptor> {
    let operation = resolve(spec, operation);
    let fallback_id = format!("{} {path}", method.to_ascii_uppercase());
    let Some(op) = operation.as_object() else {
        return Err(binding_error(&fallback_id, "operation is not an object"));
    };

    let operation_id = op
        .get("operationId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map_or_else(|| derive_operation_id(method, path), str::to_string);

    let mut parameters: Vec<ParamDescriptor> = Vec::new();
    for raw in [shared_params, op.get("parameters")].into_iter().flatten() {
        let Some(list) = raw.as_array() else {
            return Err(binding_error(&operation_id, "parameters must be a list"));
        };
        for param in list {
            let Some(param) = describe_parameter(spec, &operation_id, param)? else {
                continue;
            };
            // Operation-level parameters override path-level ones.
            if let Some(existing) = parameters
                .iter_mut()
                .find(|p| p.name == param.name && p.location == param.location)
            {
                *existing = param;
            } else {
                parameters.push(param);
            }
        }
    }

    if let Some(body) = op.get("requestBody") {
        let body = describe_body(spec, body);
        if parameters.iter().any(|p| p.name == body.name) {
            return Err(binding_error(
                &operation_id,
                format!("parameter `{BODY_PARAM}` collides with the request body"),
            ));
        }
        parameters.push(body);
    }

    check_placeholders(&operation_id, path, &parameters)?;

    let summary = op
        .get("summary")
        .or_else(|| op.get("description"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(OperationDescriptor::builder()
        .operation_id(operation_id)
        .method(method.to_ascii_uppercase())
        .path(path)
        .summary(summary)
        .parameters(parameters)
        .build())
}

fn describe_parameter(
    spec: &Value,
    operation_id: &str,
    raw: &Value,
) -> Result<Option<ParamDescriptor>> {
    let param = resolve(spec, raw);
    let name = param
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| binding_error(operation_id, "parameter without a name"))?;
    let location = match param.get("in").and_then(Value::as_str) {
        Some("path") => ParamLocation::Path,
        Some("query") => ParamLocation::Query,
        Some("header") => ParamLocation::Header,
        Some("cookie") => {
            warn!("Skipping cookie parameter `{name}` of operation `{operation_id}`");
            return Ok(None);
        }
        other => {
            return Err(binding_error(
                operation_id,
                format!("parameter `{name}` has unsupported location {other:?}"),
            ));
        }
    };

    let required = location == ParamLocation::Path
        || param.get("required").and_then(Value::as_bool).unwrap_or(false);
    let schema = param
        .get("schema")
        .map(|s| resolve(spec, s).clone())
        .unwrap_or_default();

    Ok(Some(
        ParamDescriptor::builder()
            .name(name)
            .location(location)
            .required(required)
            .type_hint(type_hint(&schema, "string"))
            .description(
                param
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            )
            .schema(schema)
            .build(),
    ))
}

fn describe_body(spec: &Value, raw: &Value) -> ParamDescriptor {
    let body = resolve(spec, raw);
    let content = body.get("content").and_then(Value::as_object);
    let media = content.and_then(|c| {
        c.get("application/json")
            .or_else(|| c.iter().find(|(k, _)| k.ends_with("+json")).map(|(_, v)| v))
            .or_else(|| c.values().next())
    });
    let schema = media
        .and_then(|m| m.get("schema"))
        .map(|s| resolve(spec, s).clone())
        .unwrap_or_default();

    ParamDescriptor::builder()
        .name(BODY_PARAM)
        .location(ParamLocation::Body)
        .required(body.get("required").and_then(Value::as_bool).unwrap_or(false))
        .type_hint(type_hint(&schema, "object"))
        .description(
            body.get("description")
                .and_then(Value::as_str)
                .unwrap_or("Request body"),
        )
        .schema(schema)
        .build()
}

fn type_hint(schema: &Value, fallback: &str) -> String {
    schema
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn check_placeholders(operation_id: &str, path: &str, params: &[ParamDescriptor]) -> Result<()> {
    let declared: HashSet<&str> = params
        .iter()
        .filter(|p| p.location == ParamLocation::Path)
        .map(|p| p.name.as_str())
        .collect();
    let used = placeholders(path);

    if let Some(name) = used.iter().find(|name| !declared.contains(*name)) {
        return Err(binding_error(
            operation_id,
            format!("path placeholder `{{{name}}}` has no matching path parameter"),
        ));
    }
    for name in declared.iter().filter(|name| !used.contains(*name)) {
        warn!("Path parameter `{name}` of `{operation_id}` does not appear in `{path}`");
    }
    Ok(())
}

/// Placeholder names in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}
