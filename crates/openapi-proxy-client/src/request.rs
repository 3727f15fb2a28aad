//! Transport-neutral description of one outbound call.
//!
//! Operations fill in an [`OutboundRequest`]; the client handle then layers
//! default headers and authentication on top before handing it to `reqwest`.

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::SecretString;
use serde_json::Value;

/// An outbound request before it is bound to a concrete base URL.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URL, already substituted and encoded.
    pub path: String,
    /// Query pairs in the order they are sent.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: HeaderMap,
    /// JSON body.
    pub body: Option<Value>,
    /// Basic credentials, encoded by the transport.
    pub basic_auth: Option<(String, SecretString)>,
}

impl OutboundRequest {
    /// Creates a request with no query, headers or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            basic_auth: None,
        }
    }

    /// Appends a query pair, keeping any existing pair with the same name.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Replaces every query pair named `name` with a single new pair.
    pub fn set_query(&mut self, name: &str, value: impl Into<String>) {
        self.query.retain(|(key, _)| key != name);
        self.query.push((name.to_string(), value.into()));
    }

    /// Value of the first query pair named `name`.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Inserts a header, overwriting any previous value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}
