//! App installation error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum InstallError {
    #[error("install command failed for app {app_name} on pod {pod}: {message}")]
    CommandFailed {
        app_name: String,
        pod: String,
        message: String,
    },

    #[error("no install slot available for pod {pod}")]
    NoInstallSlot { pod: String },

    #[error("retry budget exhausted for app {app_name} after {retries} attempts")]
    RetriesExhausted { app_name: String, retries: u32 },

    #[error("worker task failed: {message}")]
    TaskError { message: String },
}

impl InstallError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            InstallError::CommandFailed { .. } | InstallError::NoInstallSlot { .. } => true,
            InstallError::RetriesExhausted { .. } | InstallError::TaskError { .. } => false,
        }
    }
}
