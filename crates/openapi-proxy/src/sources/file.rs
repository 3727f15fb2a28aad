//! Configuration files.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use openapi_proxy_common::{
    ApiKeyLocation, AuthKind, ConfigFragment, ConfigOrigin, HeaderPair, ProxyError, ProxySetting,
    Result,
};

/// On-disk layout. Keys mirror the snake-cased field names.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    openapi_spec: Option<String>,
    server_name: Option<String>,
    base_url: Option<String>,
    timeout: Option<u64>,
    retries: Option<u32>,
    verify_ssl: Option<bool>,
    #[serde(alias = "proxies")]
    proxy: Option<ProxySetting>,
    headers: Option<HeaderList>,
    auth_type: Option<AuthKind>,
    auth_token: Option<String>,
    auth_username: Option<String>,
    auth_password: Option<String>,
    #[serde(alias = "auth_header")]
    auth_headers: Option<HeaderList>,
    auth_key_name: Option<String>,
    auth_key_value: Option<String>,
    auth_key_location: Option<ApiKeyLocation>,
}

/// Headers written either as `["K=V", ...]` or as a `{K: V}` mapping.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HeaderList {
    Pairs(Vec<String>),
    Mapping(serde_json::Map<String, Value>),
}

impl HeaderList {
    fn into_pairs(self, field: &str) -> std::result::Result<Vec<HeaderPair>, String> {
        match self {
            Self::Pairs(items) => items.iter().map(|raw| raw.parse()).collect(),
            Self::Mapping(map) => map
                .into_iter()
                .map(|(name, value)| {
                    let value = match value {
                        Value::String(s) => s,
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        other => {
                            return Err(format!("{field}.{name} must be a scalar, got {other}"));
                        }
                    };
                    Ok(HeaderPair::new(name, value))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Format {
    Yaml,
    Json,
    Toml,
    Unknown,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml" | "yml") => Self::Yaml,
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            _ => Self::Unknown,
        }
    }
}

fn parse(format: Format, content: &str) -> std::result::Result<FileConfig, String> {
    match format {
        Format::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        Format::Unknown => parse(Format::Yaml, content).or_else(|yaml_err| {
            parse(Format::Toml, content).map_err(|toml_err| {
                format!("not valid YAML ({yaml_err}) or TOML ({toml_err})")
            })
        }),
    }
}

/// Reads a configuration file into a fragment.
///
/// # Errors
///
/// Returns [`ProxyError::ConfigSource`] naming the file when it is missing,
/// unreadable, empty, malformed, not a mapping, or contains unknown keys.
pub fn read_file(path: &Path) -> Result<ConfigFragment> {
    let origin = ConfigOrigin::File(path.to_path_buf());
    let fail = |message: String| ProxyError::config_source(origin.to_string(), message);

    let content = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
    if content.trim().is_empty() {
        return Err(fail("file is empty; expected a mapping of settings".to_string()));
    }

    let file = parse(Format::of(path), &content).map_err(fail)?;
    debug!(path = %path.display(), "Loaded configuration file");

    let headers = file
        .headers
        .map(|h| h.into_pairs("headers"))
        .transpose()
        .map_err(fail)?;
    let auth_headers = file
        .auth_headers
        .map(|h| h.into_pairs("auth_headers"))
        .transpose()
        .map_err(fail)?;

    Ok(ConfigFragment {
        openapi_spec: file.openapi_spec,
        server_name: file.server_name,
        base_url: file.base_url,
        timeout: file.timeout,
        retries: file.retries,
        verify_ssl: file.verify_ssl,
        proxy: file.proxy,
        headers,
        auth_type: file.auth_type,
        auth_token: file.auth_token,
        auth_username: file.auth_username,
        auth_password: file.auth_password,
        auth_headers,
        auth_key_name: file.auth_key_name,
        auth_key_value: file.auth_key_value,
        auth_key_location: file.auth_key_location,
        ..ConfigFragment::new(origin.clone())
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_yaml_with_mapping_headers() {
        let file = write(
            ".yaml",
            "openapi_spec: petstore.json\ntimeout: 15\nheaders:\n  X-A: one\n  X-N: 2\nproxies: http://p:1\n",
        );
        let fragment = read_file(file.path()).unwrap();

        assert_eq!(fragment.openapi_spec.as_deref(), Some("petstore.json"));
        assert_eq!(fragment.timeout, Some(15));
        assert_eq!(
            fragment.headers,
            Some(vec![HeaderPair::new("X-A", "one"), HeaderPair::new("X-N", "2")])
        );
        assert_eq!(fragment.proxy, Some(ProxySetting::All("http://p:1".into())));
        assert_eq!(fragment.origin, ConfigOrigin::File(file.path().to_path_buf()));
    }

    #[test]
    fn test_json_with_list_headers() {
        let file = write(
            ".json",
            r#"{"auth_type": "header", "auth_header": ["X-Key=abc", "X-Tenant: t1"], "verify_ssl": false}"#,
        );
        let fragment = read_file(file.path()).unwrap();

        assert_eq!(fragment.auth_type, Some(AuthKind::Header));
        assert_eq!(
            fragment.auth_headers,
            Some(vec![HeaderPair::new("X-Key", "abc"), HeaderPair::new("X-Tenant", "t1")])
        );
        assert_eq!(fragment.verify_ssl, Some(false));
    }

    #[test]
    fn test_toml() {
        let file = write(
            ".toml",
            "base_url = \"https://api.example.com\"\nretries = 2\nauth_key_location = \"query\"\n\n[proxy]\nhttps = \"http://secure:3128\"\n",
        );
        let fragment = read_file(file.path()).unwrap();

        assert_eq!(fragment.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(fragment.retries, Some(2));
        assert_eq!(fragment.auth_key_location, Some(ApiKeyLocation::Query));
        assert_eq!(
            fragment.proxy,
            Some(ProxySetting::PerScheme {
                http: None,
                https: Some("http://secure:3128".into())
            })
        );
    }

    #[test]
    fn test_unknown_extension_falls_back_to_toml() {
        let file = write(".conf", "server_name = \"Pets\"\n");
        let fragment = read_file(file.path()).unwrap();
        assert_eq!(fragment.server_name.as_deref(), Some("Pets"));
    }

    #[test]
    fn test_errors_name_the_file() {
        let file = write(".yaml", "- just\n- a list\n");
        let err = read_file(file.path()).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigSource { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));

        let file = write(".yaml", "timeout: 5\nunexpected: true\n");
        let err = read_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("unexpected"));

        let err = read_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let file = write(".yml", "  \n");
        let err = read_file(file.path()).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigSource { .. }));
        let rendered = err.to_string();
        assert!(rendered.contains(&file.path().display().to_string()));
        assert!(rendered.contains("empty"));
    }
}
