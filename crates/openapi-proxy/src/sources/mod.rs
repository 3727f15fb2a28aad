//! Configuration source readers.
//!
//! Each reader turns one source into a [`ConfigFragment`] whose unset fields
//! stay `None`. Precedence is applied later by [`crate::merge`].

use std::path::PathBuf;

use openapi_proxy_common::{ConfigFragment, Result};

pub mod env;
pub mod file;
pub mod flags;

pub use env::{ENV_PREFIX, EnvReader, parse_bool, read_env};
pub use file::read_file;
pub use flags::{ProxyArgs, read_flags};

/// The raw inputs to configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Parsed command-line flags.
    pub flags: ProxyArgs,
    /// Environment snapshot.
    pub env: EnvReader,
}

impl ConfigSources {
    /// Bundles flags with the current process environment.
    #[must_use]
    pub fn from_process(flags: ProxyArgs) -> Self {
        Self {
            flags,
            env: EnvReader::from_process(),
        }
    }

    /// Bundles flags with an explicit environment.
    #[must_use]
    pub const fn new(flags: ProxyArgs, env: EnvReader) -> Self {
        Self { flags, env }
    }

    /// Configuration file location: `--config`, else `MCP_PROXY_CONFIG`.
    #[must_use]
    pub fn config_path(&self) -> Option<PathBuf> {
        self.flags.config.clone().or_else(|| self.env.config_path())
    }

    /// Reads every source. The file fragment is `None` when no file is configured.
    ///
    /// # Errors
    ///
    /// Propagates the first reader failure.
    pub fn read(&self) -> Result<(Option<ConfigFragment>, ConfigFragment, ConfigFragment)> {
        let file = self.config_path().map(|p| read_file(&p)).transpose()?;
        let env = self.env.read()?;
        let flags = read_flags(&self.flags);
        Ok((file, env, flags))
    }
}
