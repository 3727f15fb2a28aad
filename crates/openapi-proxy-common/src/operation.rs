//! Descriptors for operations declared by an OpenAPI document.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value, json};
use typed_builder::TypedBuilder;

/// Where a parameter value goes in the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    /// Substituted into the path template.
    Path,
    /// Appended to the query string.
    Query,
    /// Sent as a request header.
    Header,
    /// Sent as the JSON request body.
    Body,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
        })
    }
}

/// One parameter of an operation.
///
/// # Examples
///
/// ```
/// use openapi_proxy_common::{ParamDescriptor, ParamLocation};
///
/// let param = ParamDescriptor::builder()
///     .name("petId")
///     .location(ParamLocation::Path)
///     .required(true)
///     .type_hint("integer")
///     .build();
/// assert!(param.required);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TypedBuilder)]
pub struct ParamDescriptor {
    /// Parameter name, matched exactly against call arguments.
    #[builder(setter(into))]
    pub name: String,
    /// Placement in the request.
    pub location: ParamLocation,
    /// Whether a call must supply the parameter.
    #[builder(default)]
    pub required: bool,
    /// JSON schema type (`string`, `integer`, `object`, ...).
    #[builder(default = "string".to_string(), setter(into))]
    pub type_hint: String,
    /// Human-readable description from the document.
    #[builder(default, setter(into))]
    pub description: String,
    /// Full JSON schema, when the document declares one.
    #[builder(default)]
    pub schema: Value,
}

/// A callable operation extracted from the OpenAPI document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TypedBuilder)]
pub struct OperationDescriptor {
    /// Stable identifier used as the callable's name.
    #[builder(setter(into))]
    pub operation_id: String,
    /// Upper-case HTTP method.
    #[builder(setter(into))]
    pub method: String,
    /// Path template, e.g. `/pets/{petId}`.
    #[builder(setter(into))]
    pub path: String,
    /// Summary or description text.
    #[builder(default, setter(into))]
    pub summary: String,
    /// Parameters in declaration order.
    #[builder(default)]
    pub parameters: Vec<ParamDescriptor>,
}

impl OperationDescriptor {
    /// Looks up a parameter by exact name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameters placed at the given location.
    pub fn params_in(&self, location: ParamLocation) -> impl Iterator<Item = &ParamDescriptor> {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }

    /// Parameters a call must supply.
    pub fn required_params(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.parameters.iter().filter(|p| p.required)
    }

    /// JSON schema describing the call arguments, for tool-calling clients.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut schema = match &param.schema {
                Value::Object(obj) => obj.clone(),
                _ => {
                    let mut obj = Map::new();
                    obj.insert("type".into(), Value::String(param.type_hint.clone()));
                    obj
                }
            };
            if !param.description.is_empty() && !schema.contains_key("description") {
                schema.insert(
                    "description".into(),
                    Value::String(param.description.clone()),
                );
            }
            properties.insert(param.name.clone(), Value::Object(schema));
        }

        let required: Vec<&str> = self.required_params().map(|p| p.name.as_str()).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
