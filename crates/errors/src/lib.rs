#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the app framework install pipeline
//!
//! This crate provides fine-grained error types organized by domain.
//! All error types implement Clone so that a failure can be recorded in
//! phase status and still be propagated to the caller.

use thiserror::Error;

pub mod config;
pub mod install;
pub mod objstore;
pub mod playbook;
pub mod podexec;
pub mod storage;

// Re-export all error types at the root
pub use config::ConfigError;
pub use install::InstallError;
pub use objstore::ObjectStoreError;
pub use playbook::PlaybookError;
pub use podexec::PodExecError;
pub use storage::StorageError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),

    #[error("pod exec error: {0}")]
    PodExec(#[from] PodExecError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("install error: {0}")]
    Install(#[from] InstallError),

    #[error("playbook error: {0}")]
    Playbook(#[from] PlaybookError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// Whether retrying the same operation is likely to succeed.
    ///
    /// Transient I/O failures (network reads, pod exec streams) are
    /// retryable; configuration problems and invariant violations are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ObjectStore(err) => err.is_retryable(),
            Error::PodExec(err) => err.is_retryable(),
            Error::Storage(err) => err.is_retryable(),
            Error::Install(err) => err.is_retryable(),
            Error::Playbook(err) => err.is_retryable(),
            Error::Io { .. } => true,
            Error::Config(_) | Error::Internal(_) | Error::Cancelled => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;
