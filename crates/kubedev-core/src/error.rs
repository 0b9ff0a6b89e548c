//! Error types for kubedev-core

use kubedev_provider::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Configuration error: {0}")]
    Config(#[from] kubedev_config::ConfigError),

    #[error("Failed to look up persistent volume '{id}': {source}")]
    Lookup { id: String, source: ProviderError },

    #[error("Failed to create {kind} '{name}': {source}")]
    Create {
        kind: &'static str,
        name: String,
        source: ProviderError,
    },

    #[error("DevContainer pod '{id}' failed to start: {reason}")]
    Startup { id: String, reason: String },

    #[error("Failed to copy {local} into devcontainer at {target}: {source}")]
    Copy {
        local: String,
        target: String,
        source: ProviderError,
    },

    #[error("Persistent volume '{0}' not found")]
    NotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DriverError {
    /// Raw kubectl output attached to the failure, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Lookup { source, .. } | Self::Create { source, .. } | Self::Copy { source, .. } => {
                source.output()
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
