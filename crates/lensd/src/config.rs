//! TOML configuration for the Lens daemon.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working in-process configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lens_store::RetryPolicy;
use lens_types::{CidConfig, ErrorKind};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub store: StoreSection,
    pub retry: RetrySection,
    /// Id format for newly created elements.
    pub cid: CidConfig,
    pub log: LogSection,
}

/// Storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Fjall,
}

/// `[store]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// `"fjall"` (default) or `"memory"`.
    pub backend: String,
    /// Directory holding the Fjall keyspace.
    pub data_dir: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".lens"))
            .unwrap_or_else(|| PathBuf::from(".lens"));
        Self {
            backend: "fjall".to_string(),
            data_dir,
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Total attempts per transaction, including the first.
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            delay_ms: policy.delay.as_millis() as u64,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`). `RUST_LOG` wins.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LensConfig {
    /// Load and validate config from a TOML file, or defaults if no path.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend()?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        lens_cid::compute_id(&serde_json::Value::Null, &self.cid).map_err(|e| {
            ConfigError::Invalid {
                field: "cid",
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }

    pub fn backend(&self) -> Result<Backend, ConfigError> {
        match self.store.backend.as_str() {
            "memory" => Ok(Backend::Memory),
            "fjall" => Ok(Backend::Fjall),
            other => Err(ConfigError::Invalid {
                field: "store.backend",
                reason: format!("unknown backend {other:?} (expected \"memory\" or \"fjall\")"),
            }),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            delay: Duration::from_millis(self.retry.delay_ms),
        }
    }

    /// Location of the Fjall keyspace under the data directory.
    pub fn graph_path(&self) -> PathBuf {
        self.store.data_dir.join("graph")
    }
}
