//! Request mutation for each authentication scheme.
//!
//! The [`AuthApplier`] is built once from the resolved [`AuthConfig`] and runs
//! against every outbound request after default and operation headers are in
//! place, so configured credentials always win a header collision.

use log::debug;
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use openapi_proxy_common::{ApiKeyLocation, AuthConfig, AuthKind, ProxyError, Result};

use crate::request::OutboundRequest;

/// Attaches credentials to outbound requests.
#[derive(Debug, Clone, Default)]
pub struct AuthApplier {
    auth: AuthConfig,
}

impl AuthApplier {
    /// Creates an applier for the given strategy.
    #[must_use]
    pub const fn new(auth: AuthConfig) -> Self {
        Self { auth }
    }

    /// The scheme this applier implements.
    #[must_use]
    pub const fn scheme(&self) -> AuthKind {
        self.auth.kind()
    }

    /// Mutates `request` so it carries the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::AuthApplication`] when a credential cannot be
    /// encoded as a header name or value. The message never contains the
    /// credential itself.
    pub fn apply(&self, mut request: OutboundRequest) -> Result<OutboundRequest> {
        match &self.auth {
            AuthConfig::None => return Ok(request),
            AuthConfig::Bearer { token } => {
                let value = secret_value(&format!("Bearer {}", token.expose_secret()))
                    .ok_or_else(|| auth_error("bearer token is not a valid header value"))?;
                request.headers.insert(AUTHORIZATION, value);
            }
            AuthConfig::Basic { username, password } => {
                // The transport encodes basic credentials; drop any competing header.
                request.headers.remove(AUTHORIZATION);
                request.basic_auth = Some((username.clone(), password.clone()));
            }
            AuthConfig::Header { pairs } => {
                for pair in pairs {
                    insert_secret_header(&mut request, &pair.name, &pair.value)?;
                }
            }
            AuthConfig::ApiKey {
                name,
                value,
                location,
            } => match location {
                ApiKeyLocation::Header => insert_secret_header(&mut request, name, value)?,
                ApiKeyLocation::Query => request.set_query(name, value.expose_secret()),
                ApiKeyLocation::Cookie => set_cookie(&mut request, name, value)?,
            },
        }

        debug!("Applied {} authentication", self.scheme());
        Ok(request)
    }
}

fn auth_error(message: impl Into<String>) -> ProxyError {
    ProxyError::AuthApplication(message.into())
}

fn secret_value(raw: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(raw).ok()?;
    value.set_sensitive(true);
    Some(value)
}

fn insert_secret_header(
    request: &mut OutboundRequest,
    name: &str,
    value: &SecretString,
) -> Result<()> {
    let header = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| auth_error(format!("'{name}' is not a valid header name")))?;
    let value = secret_value(value.expose_secret())
        .ok_or_else(|| auth_error(format!("value for header '{name}' is not a valid header value")))?;
    request.headers.insert(header, value);
    Ok(())
}

/// Adds `name=value` to the `Cookie` header, replacing a cookie of the same name.
fn set_cookie(request: &mut OutboundRequest, name: &str, value: &SecretString) -> Result<()> {
    let prefix = format!("{name}=");
    let mut cookies: Vec<String> = request
        .headers
        .get(COOKIE)
        .and_then(|existing| existing.to_str().ok())
        .map(|existing| {
            existing
                .split(';')
                .map(str::trim)
                .filter(|c| !c.is_empty() && !c.starts_with(&prefix))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    cookies.push(format!("{prefix}{}", value.expose_secret()));

    let value = secret_value(&cookies.join("; "))
        .ok_or_else(|| auth_error(format!("cookie '{name}' is not a valid header value")))?;
    request.headers.insert(COOKIE, value);
    Ok(())
}
