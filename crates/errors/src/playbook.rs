//! Cluster bundle push playbook error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PlaybookError {
    #[error("bundle push apply failed on pod {pod}: {stderr}")]
    ApplyFailed { pod: String, stderr: String },

    #[error("bundle push already complete; no further playbook calls are valid")]
    AlreadyComplete,

    #[error("invalid bundle push stage: {stage}")]
    InvalidStage { stage: String },

    #[error("no playbook for CR kind: {kind}")]
    UnsupportedKind { kind: String },
}

impl PlaybookError {
    /// A failed apply attempt is retried on the next pass; stage
    /// violations are invariant breaches and never retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            PlaybookError::ApplyFailed { .. } => true,
            PlaybookError::AlreadyComplete
            | PlaybookError::InvalidStage { .. }
            | PlaybookError::UnsupportedKind { .. } => false,
        }
    }
}
