//! Command-line flags.

use std::fmt;
use std::path::PathBuf;

use clap::Args;

use openapi_proxy_common::{
    ApiKeyLocation, AuthKind, ConfigFragment, ConfigOrigin, HeaderPair, ProxySetting,
};

/// Configuration flags shared by every subcommand.
#[derive(Args, Clone, Default)]
pub struct ProxyArgs {
    /// Path or URL of the OpenAPI document
    #[arg(long, value_name = "PATH_OR_URL")]
    pub openapi_spec: Option<String>,

    /// Configuration file (.yaml, .yml, .json or .toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Display name of the proxy server
    #[arg(long)]
    pub server_name: Option<String>,

    /// Base URL of the upstream API (defaults to the document's first server)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Retries for transient upstream failures
    #[arg(long)]
    pub retries: Option<u32>,

    /// Verify TLS certificates
    #[arg(long, overrides_with = "no_verify_ssl")]
    pub verify_ssl: bool,

    /// Skip TLS certificate verification
    #[arg(long, overrides_with = "verify_ssl")]
    pub no_verify_ssl: bool,

    /// Outbound proxy URL, or a JSON object mapping schemes to proxy URLs
    #[arg(long, value_name = "URL_OR_JSON")]
    pub proxy: Option<ProxySetting>,

    /// Default header sent with every request (repeatable)
    #[arg(long = "header", value_name = "KEY=VALUE")]
    pub headers: Vec<HeaderPair>,

    /// Authentication scheme: none, bearer, basic, header or api-key
    #[arg(long, value_name = "SCHEME")]
    pub auth_type: Option<AuthKind>,

    /// Token for bearer authentication
    #[arg(long)]
    pub auth_token: Option<String>,

    /// Username for basic authentication
    #[arg(long)]
    pub auth_username: Option<String>,

    /// Password for basic authentication
    #[arg(long)]
    pub auth_password: Option<String>,

    /// Credential header for header authentication (repeatable)
    #[arg(long = "auth-header", value_name = "KEY=VALUE")]
    pub auth_headers: Vec<HeaderPair>,

    /// Name of the API key header, query parameter or cookie
    #[arg(long)]
    pub auth_key_name: Option<String>,

    /// API key value
    #[arg(long)]
    pub auth_key_value: Option<String>,

    /// Where the API key goes: header, query or cookie
    #[arg(long, value_name = "LOCATION")]
    pub auth_key_location: Option<ApiKeyLocation>,
}

impl fmt::Debug for ProxyArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The fragment's Debug redacts credentials.
        fmt::Debug::fmt(&read_flags(self), f)
    }
}

/// Collects the flags that were actually given into a fragment.
#[must_use]
pub fn read_flags(args: &ProxyArgs) -> ConfigFragment {
    let verify_ssl = if args.verify_ssl {
        Some(true)
    } else if args.no_verify_ssl {
        Some(false)
    } else {
        None
    };

    ConfigFragment {
        openapi_spec: non_empty(args.openapi_spec.as_ref()),
        server_name: non_empty(args.server_name.as_ref()),
        base_url: non_empty(args.base_url.as_ref()),
        timeout: args.timeout,
        retries: args.retries,
        verify_ssl,
        proxy: args.proxy.clone(),
        headers: non_empty_list(&args.headers),
        auth_type: args.auth_type,
        auth_token: non_empty(args.auth_token.as_ref()),
        auth_username: non_empty(args.auth_username.as_ref()),
        auth_password: non_empty(args.auth_password.as_ref()),
        auth_headers: non_empty_list(&args.auth_headers),
        auth_key_name: non_empty(args.auth_key_name.as_ref()),
        auth_key_value: non_empty(args.auth_key_value.as_ref()),
        auth_key_location: args.auth_key_location,
        ..ConfigFragment::new(ConfigOrigin::Flags)
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn non_empty_list(pairs: &[HeaderPair]) -> Option<Vec<HeaderPair>> {
    (!pairs.is_empty()).then(|| pairs.to_vec())
}
