//! Operator-local staging storage error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("insufficient disk space: {required} bytes required, {available} available")]
    InsufficientDiskSpace { required: u64, available: u64 },

    #[error("app package missing from operator: {path}")]
    AppPkgMissing { path: String },

    #[error("directory creation failed: {path}: {message}")]
    DirectoryCreationFailed { path: String, message: String },

    #[error("staging failed for {path}: {message}")]
    StagingFailed { path: String, message: String },

    #[error("removal failed for {path}: {message}")]
    RemovalFailed { path: String, message: String },
}

impl StorageError {
    /// Disk pressure clears on its own; the scheduler keeps the worker
    /// Pending rather than burning a retry on it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::AppPkgMissing { .. }
            | StorageError::StagingFailed { .. }
            | StorageError::RemovalFailed { .. }
            | StorageError::DirectoryCreationFailed { .. } => true,
            StorageError::InsufficientDiskSpace { .. } => false,
        }
    }
}
