//! App framework configuration error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("app source not found: {app_src}")]
    AppSourceNotFound { app_src: String },

    #[error("volume not found: {volume}")]
    VolumeNotFound { volume: String },

    #[error("duplicate app source name: {app_src}")]
    DuplicateAppSource { app_src: String },

    #[error("duplicate volume name: {volume}")]
    DuplicateVolume { volume: String },

    #[error("app source {app_src} references unknown volume {volume}")]
    DanglingVolumeRef { app_src: String, volume: String },

    #[error("invalid poll interval: {seconds}s")]
    InvalidPollInterval { seconds: u64 },

    #[error("missing credentials for volume {volume}: {reason}")]
    MissingCredentials { volume: String, reason: String },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
