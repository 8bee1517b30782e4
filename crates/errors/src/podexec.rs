//! Pod exec error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PodExecError {
    #[error("exec stream failed on pod {pod}: {message}")]
    StreamFailed { pod: String, message: String },

    #[error("command failed on pod {pod} with status {status}: {stderr}")]
    CommandFailed {
        pod: String,
        status: i32,
        stderr: String,
    },

    #[error("pod not found: {pod}")]
    PodNotFound { pod: String },

    #[error("invalid pod name: {pod}")]
    InvalidPodName { pod: String },
}

impl PodExecError {
    /// The streaming transport and the remote command are both retryable;
    /// a malformed pod name is a configuration fault.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            PodExecError::StreamFailed { .. }
            | PodExecError::CommandFailed { .. }
            | PodExecError::PodNotFound { .. } => true,
            PodExecError::InvalidPodName { .. } => false,
        }
    }
}
