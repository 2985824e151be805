//! Bridge configuration parsing.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;
use crate::repository::MetadataStore;

/// Bridge configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub callbacks: CallbackConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Callback trampoline settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// What to do with callbacks that declare neither a scope nor a
    /// destroy-notify argument.
    #[serde(default)]
    pub unscoped: UnscopedCallbackPolicy,
}

/// Release policy for callbacks with no declared release point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnscopedCallbackPolicy {
    /// Keep the trampoline alive for the life of the runtime.
    #[default]
    Pin,
    /// Release the trampoline after native code calls it once.
    ReleaseAfterFirstCall,
}

/// Metadata sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Namespace documents to load, in order.
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Settings for the CLI's tracing subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        content.parse()
    }

    /// Build a repository from every configured namespace document.
    pub fn load_repository(&self) -> Result<MetadataStore> {
        let mut store = MetadataStore::new();
        for path in &self.metadata.paths {
            store.load_file(path)?;
        }
        Ok(store)
    }
}

impl FromStr for BridgeConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        Ok(toml::from_str(content)?)
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
