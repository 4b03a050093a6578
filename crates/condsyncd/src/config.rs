//! Daemon configuration.
//!
//! Values are layered, later layers winning:
//! 1. built-in defaults
//! 2. TOML file (`--config` or `CONDSYNC_CONFIG`)
//! 3. environment (`CONDSYNC_BIND`, `CONDSYNC_PORT`)
//! 4. command-line flags

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9999;

/// Default bind address (all interfaces).
pub const DEFAULT_BIND_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Pause before the single bind retry.
pub const DEFAULT_BIND_RETRY_DELAY: Duration = Duration::from_secs(2);

pub const ENV_CONFIG: &str = "CONDSYNC_CONFIG";
pub const ENV_BIND: &str = "CONDSYNC_BIND";
pub const ENV_PORT: &str = "CONDSYNC_PORT";

/// Resolved daemon settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_address: IpAddr,

    /// TCP port to listen on (`0` picks an ephemeral port).
    pub port: u16,

    /// How long to wait before retrying a bind that found the port taken.
    pub bind_retry_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS,
            port: DEFAULT_PORT,
            bind_retry_delay: DEFAULT_BIND_RETRY_DELAY,
        }
    }
}

/// On-disk form; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind_address: Option<IpAddr>,
    port: Option<u16>,
    bind_retry_delay_ms: Option<u64>,
}

impl ServerConfig {
    /// Socket address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Resolves the full configuration for the daemon binary.
    ///
    /// `config_path` falls back to `CONDSYNC_CONFIG`; a missing variable
    /// means no file layer.
    pub fn resolve(
        config_path: Option<PathBuf>,
        bind_address: Option<IpAddr>,
        port: Option<u16>,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();

        let mut config = Self::default();
        if let Some(path) = config_path.or_else(|| lookup(ENV_CONFIG).map(PathBuf::from)) {
            config = config.merge_file(&path)?;
        }

        Ok(config.merge_env(lookup)?.merge_overrides(bind_address, port))
    }

    /// Applies values from a TOML file.
    pub fn merge_file(self, path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        self.merge_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Applies values from TOML text.
    pub fn merge_toml(mut self, contents: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })?;

        if let Some(bind_address) = file.bind_address {
            self.bind_address = bind_address;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(millis) = file.bind_retry_delay_ms {
            self.bind_retry_delay = Duration::from_millis(millis);
        }
        Ok(self)
    }

    /// Applies `CONDSYNC_BIND` and `CONDSYNC_PORT` as seen through `lookup`.
    pub fn merge_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BIND) {
            self.bind_address = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_BIND,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_PORT) {
            self.port = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_PORT,
                value: value.clone(),
            })?;
        }
        Ok(self)
    }

    /// Applies command-line overrides.
    pub fn merge_overrides(mut self, bind_address: Option<IpAddr>, port: Option<u16>) -> Self {
        if let Some(bind_address) = bind_address {
            self.bind_address = bind_address;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config file {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}
