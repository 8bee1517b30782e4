//! Remote object store error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ObjectStoreError {
    #[error("unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("listing failed for prefix {prefix}: {message}")]
    ListFailed { prefix: String, message: String },

    #[error("download failed for object {key}: {message}")]
    GetFailed { key: String, message: String },

    #[error("object not found: {key}")]
    ObjectNotFound { key: String },

    #[error("empty object hash for app {app_name}")]
    EmptyObjectHash { app_name: String },

    #[error("connection failed to endpoint {endpoint}: {message}")]
    ConnectionFailed { endpoint: String, message: String },

    #[error("request timed out for object {key}")]
    Timeout { key: String },
}

impl ObjectStoreError {
    /// Transient transport failures are worth retrying; identity problems
    /// (unknown provider, empty hash) are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ObjectStoreError::ListFailed { .. }
            | ObjectStoreError::GetFailed { .. }
            | ObjectStoreError::ConnectionFailed { .. }
            | ObjectStoreError::Timeout { .. } => true,
            ObjectStoreError::UnsupportedProvider { .. }
            | ObjectStoreError::ObjectNotFound { .. }
            | ObjectStoreError::EmptyObjectHash { .. } => false,
        }
    }
}
