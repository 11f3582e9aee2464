//! Fetcher configuration, loadable from TOML.
//!
//! Every key is optional; missing keys take the defaults below.
//!
//! ```toml
//! host = "localhost"
//! port = 8194
//! poll_timeout_ms = 500
//!
//! [retry]
//! max_retries = 2
//! base_delay_ms = 500
//! ```

use crate::fetch::retry::RetryPolicy;
use crate::service::{DEFAULT_PORT, REFDATA_SERVICE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Connection and receive-loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Host of the data-service bridge.
    pub host: String,
    pub port: u16,
    /// Service that answers historical requests.
    pub service: String,
    /// Upper bound on a single wait for the next event.
    pub poll_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// How long to wait for the service-status answer after asking to open the service.
    pub service_open_timeout_ms: u64,
    /// Retry around connection setup.
    pub retry: RetryPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            service: REFDATA_SERVICE.to_string(),
            poll_timeout_ms: 500,
            connect_timeout_ms: 5_000,
            service_open_timeout_ms: 10_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl FetcherConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".into()));
        }
        if self.service.trim().is_empty() {
            return Err(ConfigError::Invalid("service must not be empty".into()));
        }
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_timeout_ms must be positive".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_ms must be positive".into(),
            ));
        }
        if self.service_open_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "service_open_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn service_open_timeout(&self) -> Duration {
        Duration::from_millis(self.service_open_timeout_ms)
    }
}
