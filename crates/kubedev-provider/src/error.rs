//! Error types for the Kubernetes client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to run kubectl: {0}")]
    ConnectionError(String),

    /// kubectl ran but exited non-zero; `output` is its combined stdout/stderr
    #[error("kubectl {command} failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid kubectl output: {0}")]
    InvalidOutput(String),

    #[error("Failed to encode resource: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProviderError {
    /// Raw diagnostic output from kubectl, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
