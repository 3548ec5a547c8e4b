//! Process configuration: CLI flags with environment fallbacks, plus the
//! credential source the feed supervisors authenticate with.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::feed::message::DEFAULT_FEED_URL;
use crate::feed::supervisor::SupervisorConfig;

/// Key looked up in a credentials file.
pub const API_KEY_FIELD: &str = "API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no API credential configured: pass --api-key, set SFOX_API_KEY or point --config-file at a file containing {API_KEY_FIELD}")]
    MissingCredential,

    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {} has no non-empty `{key}` entry", path.display())]
    MissingKey { path: PathBuf, key: String },
}

#[derive(Parser, Debug, Clone)]
#[command(name = "sfox-book-feed")]
#[command(about = "Streams sFOX order books for a set of instruments and serves snapshots over HTTP")]
pub struct Config {
    /// Instruments to subscribe to (comma separated, at most 10 are used)
    #[arg(short, long, env = "SFOX_INSTRUMENTS", value_delimiter = ',', default_value = "ethbtc,btcusd")]
    pub instruments: Vec<String>,

    /// Address the snapshot API listens on
    #[arg(short, long, env = "SFOX_LISTEN", default_value = "0.0.0.0:50051")]
    pub listen: SocketAddr,

    /// Upstream websocket endpoint
    #[arg(long, env = "SFOX_FEED_URL", default_value = DEFAULT_FEED_URL)]
    pub feed_url: String,

    /// API key used to authenticate with the feed
    #[arg(long, env = "SFOX_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// key=value file holding the API key (read on every authentication)
    #[arg(long, env = "SFOX_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Delay between consecutive connection starts, in milliseconds
    #[arg(long, env = "SFOX_STAGGER_MS", default_value_t = 500)]
    pub stagger_ms: u64,
}

impl Config {
    /// Resolve the credential source.
    ///
    /// An explicit key wins over a config file. A config file is read once
    /// here so a missing or empty key is reported at startup.
    pub fn credentials(&self) -> Result<Arc<dyn CredentialSource>, ConfigError> {
        if let Some(key) = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(Arc::new(StaticCredential::new(key)));
        }
        if let Some(path) = &self.config_file {
            let source = FileCredential::new(path);
            source.api_key()?;
            return Ok(Arc::new(source));
        }
        Err(ConfigError::MissingCredential)
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            feed_url: self.feed_url.clone(),
            ..SupervisorConfig::default()
        }
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}

/// Read-only source of the feed credential.
///
/// Implementations may be asked repeatedly, once per authentication attempt.
pub trait CredentialSource: Send + Sync + fmt::Debug {
    fn api_key(&self) -> Result<String, ConfigError>;
}

/// A credential supplied directly (flag or environment).
#[derive(Clone)]
pub struct StaticCredential {
    api_key: String,
}

impl StaticCredential {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredential")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl CredentialSource for StaticCredential {
    fn api_key(&self) -> Result<String, ConfigError> {
        Ok(self.api_key.clone())
    }
}

/// A credential read from a `key=value` file each time it is requested.
#[derive(Debug, Clone)]
pub struct FileCredential {
    path: PathBuf,
    key: String,
}

impl FileCredential {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            key: API_KEY_FIELD.to_string(),
        }
    }

    /// Look up a different key than [`API_KEY_FIELD`].
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

impl CredentialSource for FileCredential {
    fn api_key(&self) -> Result<String, ConfigError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_key_values(&contents)
            .remove(&self.key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                path: self.path.clone(),
                key: self.key.clone(),
            })
    }
}

/// Parse `key=value` lines. Blank lines and `#` comments are skipped, keys and
/// values are trimmed, and only the first `=` splits a line.
pub fn parse_key_values(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}
