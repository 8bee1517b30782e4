//! Object store client contract

use appfw_config::VolumeSpec;
use appfw_errors::{ConfigError, Error};
use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Streamed body of a remote object
pub type ObjectStream = Pin<Box<dyn AsyncRead + Send>>;

/// One entry from a remote listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    /// Remote content identity; a change retriggers the pipeline.
    pub etag: String,
    pub size: u64,
    /// Epoch seconds, when the provider reports it.
    pub last_modified: Option<i64>,
}

/// Access credentials pulled from the volume's secret reference.
///
/// The reconciler resolves the Kubernetes secret; the pipeline only sees
/// the key material.
#[derive(Debug, Clone, Default)]
pub struct RemoteVolumeCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl RemoteVolumeCredentials {
    /// Reject empty key material before a provider constructor runs.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the volume and the missing key.
    pub fn validate_for(&self, volume: &VolumeSpec) -> Result<(), Error> {
        if self.access_key.is_empty() {
            return Err(ConfigError::MissingCredentials {
                volume: volume.name.clone(),
                reason: "access key is missing".to_string(),
            }
            .into());
        }
        if self.secret_key.is_empty() {
            return Err(ConfigError::MissingCredentials {
                volume: volume.name.clone(),
                reason: "secret key is missing".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// List and fetch objects from one remote bucket.
///
/// Implementations are provider-specific and constructed through the
/// [`crate::ProviderRegistry`].
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// List objects under the given key prefix.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>, Error>;

    /// Open a streaming read of one object.
    async fn get_object(&self, key: &str) -> Result<ObjectStream, Error>;
}
