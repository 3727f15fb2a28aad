//! Folding configuration fragments into a [`RuntimeConfig`].
//!
//! Precedence is flags over environment over file over defaults. Scalars take
//! the value from the highest-precedence source that set them. Header lists are
//! concatenated and deduplicated case-insensitively, the highest-precedence
//! value winning while the key keeps the position where it first appeared.

use std::time::Duration;

use tracing::{debug, warn};

use openapi_proxy_common::{
    AuthConfig, AuthKind, ConfigFragment, ConfigOrigin, DEFAULT_API_KEY_NAME, DEFAULT_RETRIES,
    DEFAULT_SERVER_NAME, DEFAULT_TIMEOUT_SECS, HeaderPair, ProxyError, Result, RuntimeConfig,
};

/// Merges fragments ordered from lowest to highest precedence.
#[derive(Debug)]
pub struct ConfigMerger<'a> {
    layers: Vec<&'a ConfigFragment>,
}

impl<'a> ConfigMerger<'a> {
    /// Standard precedence: `file` < `env` < `flags`.
    #[must_use]
    pub fn new(
        file: Option<&'a ConfigFragment>,
        env: &'a ConfigFragment,
        flags: &'a ConfigFragment,
    ) -> Self {
        Self {
            layers: file.into_iter().chain([env, flags]).collect(),
        }
    }

    /// Highest-precedence value for a field, with the source that supplied it.
    fn pick<T: ?Sized>(
        &self,
        field: impl Fn(&'a ConfigFragment) -> Option<&'a T>,
    ) -> Option<(&'a T, &'a ConfigOrigin)> {
        self.layers
            .iter()
            .rev()
            .copied()
            .find_map(|layer| field(layer).map(|value| (value, &layer.origin)))
    }

    fn value<T: ?Sized>(&self, field: impl Fn(&'a ConfigFragment) -> Option<&'a T>) -> Option<&'a T> {
        self.pick(field).map(|(value, _)| value)
    }

    fn headers(&self, field: impl Fn(&'a ConfigFragment) -> Option<&'a Vec<HeaderPair>>) -> Vec<HeaderPair> {
        merge_headers(self.layers.iter().copied().filter_map(field).flatten())
    }

    /// Produces the resolved configuration.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::MissingRequiredConfig`] when no source names the OpenAPI document
    /// - [`ProxyError::ConfigSource`] for a zero timeout or an incomplete auth setup
    pub fn merge(&self) -> Result<RuntimeConfig> {
        let openapi_spec = self
            .value(|f| f.openapi_spec.as_deref())
            .ok_or(ProxyError::MissingRequiredConfig {
                field: "openapi_spec",
            })?;

        let timeout = match self.pick(|f| f.timeout.as_ref()) {
            Some((0, origin)) => {
                return Err(ProxyError::config_source(
                    origin.to_string(),
                    "timeout must be at least one second",
                ));
            }
            Some((secs, _)) => *secs,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let config = RuntimeConfig {
            openapi_spec: openapi_spec.to_string(),
            server_name: self
                .value(|f| f.server_name.as_deref())
                .unwrap_or(DEFAULT_SERVER_NAME)
                .to_string(),
            base_url: self.value(|f| f.base_url.as_deref()).map(str::to_string),
            timeout: Duration::from_secs(timeout),
            retries: self
                .value(|f| f.retries.as_ref())
                .copied()
                .unwrap_or(DEFAULT_RETRIES),
            verify_ssl: self
                .value(|f| f.verify_ssl.as_ref())
                .copied()
                .unwrap_or(true),
            proxy: self.value(|f| f.proxy.as_ref()).cloned(),
            headers: self.headers(|f| f.headers.as_ref()),
            auth: self.auth()?,
        };

        debug!(
            spec = %config.openapi_spec,
            timeout = ?config.timeout,
            retries = config.retries,
            auth = %config.auth.kind(),
            "Resolved runtime configuration"
        );
        Ok(config)
    }

    fn auth(&self) -> Result<AuthConfig> {
        let Some((kind, origin)) = self.pick(|f| f.auth_type.as_ref()) else {
            self.warn_unused_auth_headers(AuthKind::None);
            return Ok(AuthConfig::None);
        };
        let missing = |what: &str| {
            ProxyError::config_source(
                origin.to_string(),
                format!("auth type {kind} requires {what}"),
            )
        };

        let auth = match kind {
            AuthKind::None => AuthConfig::None,
            AuthKind::Bearer => {
                let token = self
                    .value(|f| f.auth_token.as_deref())
                    .ok_or_else(|| missing("auth_token"))?;
                AuthConfig::bearer(token)
            }
            AuthKind::Basic => {
                let username = self
                    .value(|f| f.auth_username.as_deref())
                    .ok_or_else(|| missing("auth_username"))?;
                let password = self
                    .value(|f| f.auth_password.as_deref())
                    .ok_or_else(|| missing("auth_password"))?;
                AuthConfig::basic(username, password)
            }
            AuthKind::Header => {
                let pairs = self.headers(|f| f.auth_headers.as_ref());
                if pairs.is_empty() {
                    return Err(missing("at least one auth header"));
                }
                AuthConfig::headers(pairs)
            }
            AuthKind::ApiKey => {
                let value = self
                    .value(|f| f.auth_key_value.as_deref())
                    .ok_or_else(|| missing("auth_key_value"))?;
                let name = self
                    .value(|f| f.auth_key_name.as_deref())
                    .unwrap_or(DEFAULT_API_KEY_NAME);
                let location = self
                    .value(|f| f.auth_key_location.as_ref())
                    .copied()
                    .unwrap_or_default();
                AuthConfig::api_key(name, value, location)
            }
        };

        self.warn_unused_auth_headers(*kind);
        Ok(auth)
    }

    fn warn_unused_auth_headers(&self, kind: AuthKind) {
        if kind == AuthKind::Header {
            return;
        }
        if let Some((_, origin)) = self.pick(|f| f.auth_headers.as_ref()) {
            warn!(%origin, auth = %kind, "Ignoring auth headers: auth type is not `header`");
        }
    }
}

/// Resolves the standard three sources into a [`RuntimeConfig`].
///
/// # Errors
///
/// See [`ConfigMerger::merge`].
pub fn merge(
    file: Option<&ConfigFragment>,
    env: &ConfigFragment,
    flags: &ConfigFragment,
) -> Result<RuntimeConfig> {
    ConfigMerger::new(file, env, flags).merge()
}

/// Deduplicates headers by case-insensitive key.
///
/// Input runs from lowest to highest precedence, so a later pair overwrites the
/// value of an earlier one while keeping the earlier position.
pub fn merge_headers<'h>(pairs: impl IntoIterator<Item = &'h HeaderPair>) -> Vec<HeaderPair> {
    let mut merged: Vec<HeaderPair> = Vec::new();
    for pair in pairs {
        match merged.iter_mut().find(|existing| existing.same_key(pair)) {
            Some(existing) => existing.value.clone_from(&pair.value),
            None => merged.push(pair.clone()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use std::path::PathBuf;

    use openapi_proxy_common::ApiKeyLocation;
    use proptest::prelude::*;

    use super::*;

    fn file() -> ConfigFragment {
        ConfigFragment::new(ConfigOrigin::File(PathBuf::from("proxy.yaml")))
    }

    fn env() -> ConfigFragment {
        ConfigFragment::new(ConfigOrigin::Environment)
    }

    fn flags() -> ConfigFragment {
        ConfigFragment::new(ConfigOrigin::Flags)
    }

    fn with_spec(mut fragment: ConfigFragment) -> ConfigFragment {
        fragment.openapi_spec = Some("spec.yaml".into());
        fragment
    }

    #[test]
    fn test_defaults_apply() {
        let config = merge(None, &with_spec(env()), &flags()).unwrap();
        assert_eq!(config.server_name, DEFAULT_SERVER_NAME);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.retries, DEFAULT_RETRIES);
        assert!(config.verify_ssl);
        assert!(config.headers.is_empty());
        assert!(matches!(config.auth, AuthConfig::None));
    }

    #[test]
    fn test_missing_spec_is_fatal() {
        let err = merge(Some(&file()), &env(), &flags()).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::MissingRequiredConfig { field: "openapi_spec" }
        ));
        assert!(err.is_startup());
    }

    #[test]
    fn test_flags_beat_env_beat_file() {
        let mut f = with_spec(file());
        f.timeout = Some(10);
        f.retries = Some(1);
        f.server_name = Some("from-file".into());
        let mut e = env();
        e.timeout = Some(20);
        e.retries = Some(2);
        let mut c = flags();
        c.timeout = Some(30);

        let config = merge(Some(&f), &e, &c).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retries, 2);
        assert_eq!(config.server_name, "from-file");
        assert_eq!(config.openapi_spec, "spec.yaml");
    }

    #[test]
    fn test_header_merge_keeps_first_position_and_last_value() {
        let mut e = with_spec(env());
        e.headers = Some(vec![HeaderPair::new("A", "1"), HeaderPair::new("B", "2")]);
        let mut c = flags();
        c.headers = Some(vec![HeaderPair::new("b", "3")]);

        let config = merge(None, &e, &c).unwrap();
        assert_eq!(
            config.headers,
            vec![HeaderPair::new("A", "1"), HeaderPair::new("B", "3")]
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut c = with_spec(flags());
        c.timeout = Some(0);
        let err = merge(None, &env(), &c).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigSource { ref origin, .. } if origin == "command-line flags"));
    }

    #[test]
    fn test_bearer_token_from_lower_source() {
        let mut f = with_spec(file());
        f.auth_token = Some("file-token".into());
        let mut c = flags();
        c.auth_type = Some(AuthKind::Bearer);

        let config = merge(Some(&f), &env(), &c).unwrap();
        assert_eq!(config.auth.kind(), AuthKind::Bearer);
        assert_eq!(config.redacted().auth.token, Some("[REDACTED]"));
    }

    #[test]
    fn test_incomplete_auth_names_the_source() {
        let mut e = with_spec(env());
        e.auth_type = Some(AuthKind::Basic);
        e.auth_username = Some("me".into());

        let err = merge(None, &e, &flags()).unwrap_err();
        match err {
            ProxyError::ConfigSource { origin, message } => {
                assert_eq!(origin, "environment");
                assert!(message.contains("auth_password"));
            }
            other => panic!("expected config source error, got {other:?}"),
        }
    }

    #[test]
    fn test_api_key_defaults() {
        let mut e = with_spec(env());
        e.auth_type = Some(AuthKind::ApiKey);
        e.auth_key_value = Some("k".into());

        let config = merge(None, &e, &flags()).unwrap();
        match config.auth {
            AuthConfig::ApiKey { name, location, .. } => {
                assert_eq!(name, DEFAULT_API_KEY_NAME);
                assert_eq!(location, ApiKeyLocation::Header);
            }
            other => panic!("expected api key auth, got {other:?}"),
        }
    }

    #[test]
    fn test_header_auth_merges_across_sources() {
        let mut f = with_spec(file());
        f.auth_type = Some(AuthKind::Header);
        f.auth_headers = Some(vec![HeaderPair::new("X-Key", "old"), HeaderPair::new("X-Org", "o")]);
        let mut c = flags();
        c.auth_headers = Some(vec![HeaderPair::new("x-key", "new")]);

        let config = merge(Some(&f), &env(), &c).unwrap();
        match config.auth {
            AuthConfig::Header { pairs } => {
                let names: Vec<&str> = pairs.iter().map(|p| p.name.as_str()).collect();
                assert_eq!(names, ["X-Key", "X-Org"]);
            }
            other => panic!("expected header auth, got {other:?}"),
        }
    }

    #[test]
    fn test_auth_headers_ignored_for_other_schemes() {
        let mut c = with_spec(flags());
        c.auth_type = Some(AuthKind::Bearer);
        c.auth_token = Some("t".into());
        c.auth_headers = Some(vec![HeaderPair::new("X-Key", "v")]);

        let config = merge(None, &env(), &c).unwrap();
        assert_eq!(config.auth.kind(), AuthKind::Bearer);
    }

    fn header_strategy() -> impl Strategy<Value = Vec<HeaderPair>> {
        prop::collection::vec(
            ("[a-cA-C]", "[a-z0-9]{1,4}").prop_map(|(k, v)| HeaderPair::new(k, v)),
            0..6,
        )
    }

    proptest! {
        #[test]
        fn prop_highest_set_scalar_wins(
            file_timeout in proptest::option::of(1u64..1000),
            env_timeout in proptest::option::of(1u64..1000),
            flag_timeout in proptest::option::of(1u64..1000),
        ) {
            let mut f = with_spec(file());
            f.timeout = file_timeout;
            let mut e = env();
            e.timeout = env_timeout;
            let mut c = flags();
            c.timeout = flag_timeout;

            let expected = flag_timeout.or(env_timeout).or(file_timeout).unwrap_or(DEFAULT_TIMEOUT_SECS);
            let config = merge(Some(&f), &e, &c).unwrap();
            prop_assert_eq!(config.timeout, Duration::from_secs(expected));
        }

        #[test]
        fn prop_merged_headers_unique_and_latest(
            low in header_strategy(),
            mid in header_strategy(),
            high in header_strategy(),
        ) {
            let all: Vec<&HeaderPair> = low.iter().chain(&mid).chain(&high).collect();
            let merged = merge_headers(all.iter().copied());

            for (i, a) in merged.iter().enumerate() {
                for b in &merged[i + 1..] {
                    prop_assert!(!a.same_key(b));
                }
                let latest = all.iter().rev().find(|p| p.same_key(a)).unwrap();
                prop_assert_eq!(&a.value, &latest.value);
            }
            for pair in &all {
                prop_assert!(merged.iter().any(|m| m.same_key(pair)));
            }
        }
    }
}
