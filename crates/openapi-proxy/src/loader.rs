//! Loading the OpenAPI document.
//!
//! [`SpecSource`] is the seam the runtime loads documents through. The default
//! [`SpecLoader`] reads `http(s)://` URLs, `file://` URLs and plain paths, and
//! parses JSON or YAML.
//!
//! Remote documents are cached by URL for the loader's lifetime. Local
//! documents are cached by canonical path and re-read when the file's
//! modification time changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use openapi_proxy_common::{ProxyError, Result};

/// Timeout for fetching a remote document.
pub const DEFAULT_SPEC_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can produce a parsed OpenAPI document for a location.
#[async_trait]
pub trait SpecSource: Send + Sync {
    /// Loads the document at `location` (path or URL).
    async fn load(&self, location: &str) -> Result<Arc<Value>>;
}

/// Default loader for local files and HTTP URLs.
#[derive(Debug)]
pub struct SpecLoader {
    http: reqwest::Client,
    remote: DashMap<String, Arc<Value>>,
    local: DashMap<PathBuf, (Option<SystemTime>, Arc<Value>)>,
}

impl SpecLoader {
    /// Creates a loader with the default fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_SPEC_TIMEOUT)
    }

    /// Creates a loader with a custom fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::ClientBuild`] if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::ClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            remote: DashMap::new(),
            local: DashMap::new(),
        })
    }

    async fn load_remote(&self, location: &str, url: Url) -> Result<Arc<Value>> {
        if let Some(cached) = self.remote.get(location) {
            debug!(%location, "Using cached OpenAPI document");
            return Ok(Arc::clone(cached.value()));
        }

        let fail = |message: String| load_error(location, message);
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fail(e.without_url().to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("server answered {status}")));
        }
        let content = response
            .text()
            .await
            .map_err(|e| fail(e.without_url().to_string()))?;

        let document = Arc::new(parse_document(location, extension(url.path()), &content)?);
        self.remote
            .insert(location.to_string(), Arc::clone(&document));
        info!(%location, "Loaded OpenAPI document");
        Ok(document)
    }

    async fn load_local(&self, location: &str, path: &Path) -> Result<Arc<Value>> {
        let fail = |message: String| load_error(location, message);
        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let modified = tokio::fs::metadata(&canonical)
            .await
            .map_err(|e| fail(e.to_string()))?
            .modified()
            .ok();

        if let Some(entry) = self.local.get(&canonical) {
            let (cached_at, document) = entry.value();
            if modified.is_some() && *cached_at == modified {
                debug!(%location, "Using cached OpenAPI document");
                return Ok(Arc::clone(document));
            }
        }

        let content = tokio::fs::read_to_string(&canonical)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let hint = canonical.to_str().and_then(extension);
        let document = Arc::new(parse_document(location, hint, &content)?);
        self.local
            .insert(canonical, (modified, Arc::clone(&document)));
        info!(%location, "Loaded OpenAPI document");
        Ok(document)
    }
}

#[async_trait]
impl SpecSource for SpecLoader {
    async fn load(&self, location: &str) -> Result<Arc<Value>> {
        let location = location.trim();
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                self.load_remote(location, url).await
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|()| {
                    load_error(location, "file URLs must point at the local host".into())
                })?;
                self.load_local(location, &path).await
            }
            // Plain paths, including Windows drive letters that parse as schemes.
            _ => self.load_local(location, Path::new(location)).await,
        }
    }
}

fn load_error(location: &str, message: String) -> ProxyError {
    ProxyError::SpecLoad {
        location: location.to_string(),
        message,
    }
}

fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Parses a document by extension hint, falling back to YAML then JSON.
///
/// # Errors
///
/// Returns [`ProxyError::SpecLoad`] when the content does not parse or its top
/// level is not a mapping.
pub fn parse_document(location: &str, extension: Option<&str>, content: &str) -> Result<Value> {
    let fail = |message: String| load_error(location, message);
    let value: Value = match extension.map(str::to_ascii_lowercase).as_deref() {
        Some("json") => serde_json::from_str(content).map_err(|e| fail(e.to_string()))?,
        Some("yaml" | "yml") => serde_yaml::from_str(content).map_err(|e| fail(e.to_string()))?,
        _ => serde_yaml::from_str(content).or_else(|yaml_err| {
            serde_json::from_str(content).map_err(|json_err| {
                fail(format!(
                    "not valid YAML ({yaml_err}) or JSON ({json_err})"
                ))
            })
        })?,
    };

    if !value.is_object() {
        return Err(fail("top level of an OpenAPI document must be a mapping".into()));
    }
    Ok(value)
}
