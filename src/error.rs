//! Error types for the storage version migrator operator

use thiserror::Error;

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Errors that can occur during operator operations
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Manifest could not be decoded
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Resource or asset not found
    #[error("Resource not found: {0}")]
    NotFound(String),
    /// Invalid resource state
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// A template image still carries an unresolved placeholder
    #[error("invalid image reference {0:?}")]
    InvalidImageReference(String),
    /// Manifest kind the direct applier does not know how to handle
    #[error("unsupported manifest kind {0:?}")]
    UnsupportedKind(String),
}

impl OperatorError {
    /// True when the API server rejected a write because the resourceVersion was stale
    pub fn is_conflict(&self) -> bool {
        matches!(self, OperatorError::KubeApi(kube::Error::Api(ae)) if ae.code == 409)
    }
}
