//! Provider registry keyed by provider tag

use crate::client::{ObjectStoreClient, RemoteVolumeCredentials};
use appfw_config::VolumeSpec;
use appfw_errors::{Error, ObjectStoreError};
use dashmap::DashMap;
use std::sync::Arc;

/// Constructor for a provider-specific client
pub type ClientFactory = Arc<
    dyn Fn(&VolumeSpec, &RemoteVolumeCredentials) -> Result<Arc<dyn ObjectStoreClient>, Error>
        + Send
        + Sync,
>;

/// Maps a provider tag (e.g. "aws") to a client constructor.
///
/// The registry is populated once at operator start; tests swap in mock
/// factories under the same tags.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: Arc<DashMap<String, ClientFactory>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for a provider tag.
    pub fn register(&self, provider: impl Into<String>, factory: ClientFactory) {
        self.factories.insert(provider.into(), factory);
    }

    #[must_use]
    pub fn is_registered(&self, provider: &str) -> bool {
        self.factories.contains_key(provider)
    }

    /// Construct a client for the volume's provider.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedProvider` for an unregistered tag, or whatever
    /// the factory itself reports.
    pub fn client_for(
        &self,
        volume: &VolumeSpec,
        credentials: &RemoteVolumeCredentials,
    ) -> Result<Arc<dyn ObjectStoreClient>, Error> {
        let factory = self.factories.get(&volume.provider).ok_or_else(|| {
            Error::ObjectStore(ObjectStoreError::UnsupportedProvider {
                provider: volume.provider.clone(),
            })
        })?;
        factory(volume, credentials)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let providers: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("ProviderRegistry")
            .field("providers", &providers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockObjectStoreClient;

    fn volume(provider: &str) -> VolumeSpec {
        VolumeSpec {
            name: "test_volume".to_string(),
            endpoint: "https://s3-eu-west-2.amazonaws.com".to_string(),
            path: "testbucket-rs-london".to_string(),
            secret_ref: "s3-secret".to_string(),
            provider: provider.to_string(),
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let registry = ProviderRegistry::new();
        let err = match registry.client_for(&volume("azure"), &RemoteVolumeCredentials::default())
        {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            Error::ObjectStore(ObjectStoreError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn registered_factory_is_invoked() {
        let registry = ProviderRegistry::new();
        registry.register(
            "aws",
            Arc::new(|_, _| Ok(Arc::new(MockObjectStoreClient::new()) as Arc<dyn ObjectStoreClient>)),
        );
        assert!(registry.is_registered("aws"));
        registry
            .client_for(&volume("aws"), &RemoteVolumeCredentials::default())
            .unwrap();
    }

    #[test]
    fn registration_replaces_previous_factory() {
        let registry = ProviderRegistry::new();
        registry.register(
            "aws",
            Arc::new(|volume, _| {
                Err(Error::ObjectStore(ObjectStoreError::ConnectionFailed {
                    endpoint: volume.endpoint.clone(),
                    message: "first factory".to_string(),
                }))
            }),
        );
        registry.register(
            "aws",
            Arc::new(|_, _| Ok(Arc::new(MockObjectStoreClient::new()) as Arc<dyn ObjectStoreClient>)),
        );
        registry
            .client_for(&volume("aws"), &RemoteVolumeCredentials::default())
            .unwrap();
    }
}
