//! Where the relay's configuration comes from.
//!
//! A RON file supplies the base configuration; a few environment variables
//! override it so the relay can run from a container without one.

use std::path::{Path, PathBuf};

use relais_common::error::ProtocolError;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "RELAIS_CONFIG";
pub const PORT_ENV: &str = "RELAIS_PORT";
pub const ENDPOINT_ENV: &str = "RELAIS_ENDPOINT";
pub const TOKEN_ENV: &str = "RELAIS_TOKEN";

const DEFAULT_PATHS: [&str; 2] = ["./relais.config.ron", "/etc/relais/relais.config.ron"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{env} points to non-existent file: {}", path.display())]
    Missing { env: &'static str, path: PathBuf },

    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error(transparent)]
    Invalid(#[from] ProtocolError),
}

/// How the relay reaches the internal email API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeliveryConfig {
    /// Base URL; `/email/send` is appended
    #[serde(default)]
    pub endpoint: String,
    /// Bearer token presented on every request
    #[serde(default)]
    pub token: String,
    /// Applies to the HTTP request and to the session waiting on it.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DeliveryConfig {
    ///
    /// # Errors
    /// If the endpoint or token is missing, or the timeout is zero
    ///
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.endpoint.trim().is_empty() {
            return Err(ProtocolError::MissingField("endpoint"));
        }

        if self.token.trim().is_empty() {
            return Err(ProtocolError::MissingField("token"));
        }

        if self.timeout_secs == 0 {
            return Err(ProtocolError::InvalidConfiguration {
                field: String::from("timeout_secs"),
                reason: String::from("must be at least 1"),
            });
        }

        Ok(())
    }
}

/// Values taken from the environment, applied on top of the file
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Overrides {
    pub port: Option<u16>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
}

impl Overrides {
    ///
    /// # Errors
    /// If `RELAIS_PORT` is set but is not a port number
    ///
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    ///
    /// # Errors
    /// If the port value is not a port number
    ///
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = lookup(PORT_ENV)
            .map(|port| {
                port.trim()
                    .parse::<u16>()
                    .map_err(|_| ProtocolError::InvalidConfiguration {
                        field: PORT_ENV.to_string(),
                        reason: format!("{port:?} is not a port number"),
                    })
            })
            .transpose()?;

        Ok(Self {
            port,
            endpoint: lookup(ENDPOINT_ENV),
            token: lookup(TOKEN_ENV),
        })
    }
}

///
/// Find the configuration file using the following precedence:
/// 1. An explicit path (from the command line)
/// 2. `RELAIS_CONFIG` environment variable
/// 3. `./relais.config.ron` (current working directory)
/// 4. `/etc/relais/relais.config.ron` (system-wide config)
///
/// Returns `None` when nothing is found; the relay then runs on defaults and
/// the environment.
///
/// # Errors
/// If an explicitly named file does not exist
///
pub fn find_config_file(explicit: Option<PathBuf>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(Some(path))
        } else {
            Err(ConfigError::Missing {
                env: "--config",
                path,
            })
        };
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        return if path.exists() {
            Ok(Some(path))
        } else {
            Err(ConfigError::Missing {
                env: CONFIG_ENV,
                path,
            })
        };
    }

    Ok(DEFAULT_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists()))
}

///
/// Read and parse a RON configuration file
///
/// # Errors
/// If the file can't be read or doesn't parse
///
pub fn read<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    ron::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
