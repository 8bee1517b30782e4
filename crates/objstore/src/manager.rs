//! Client bound to one volume and app source location

use crate::client::{ObjectStoreClient, ObjectStream, RemoteObject};
use appfw_config::VolumeSpec;
use appfw_errors::Error;
use std::sync::Arc;

/// Scopes an [`ObjectStoreClient`] to the location prefix of one app
/// source. Download workers only ever see keys relative to the source.
#[derive(Clone)]
pub struct ObjectStoreManager {
    client: Arc<dyn ObjectStoreClient>,
    volume: VolumeSpec,
    location: String,
}

impl ObjectStoreManager {
    #[must_use]
    pub fn new(
        client: Arc<dyn ObjectStoreClient>,
        volume: VolumeSpec,
        location: impl Into<String>,
    ) -> Self {
        Self {
            client,
            volume,
            location: location.into(),
        }
    }

    #[must_use]
    pub fn volume(&self) -> &VolumeSpec {
        &self.volume
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    fn scoped_key(&self, key: &str) -> String {
        if self.location.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.location.trim_end_matches('/'))
        }
    }

    /// List the app packages under this source's location.
    ///
    /// # Errors
    ///
    /// Propagates listing failures from the provider client.
    pub async fn list_app_packages(&self) -> Result<Vec<RemoteObject>, Error> {
        self.client.list_objects(&self.location).await
    }

    /// Open a streaming read of one app package.
    ///
    /// # Errors
    ///
    /// Propagates download failures from the provider client.
    pub async fn fetch_app_package(&self, app_name: &str) -> Result<ObjectStream, Error> {
        self.client.get_object(&self.scoped_key(app_name)).await
    }
}

impl std::fmt::Debug for ObjectStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreManager")
            .field("volume", &self.volume.name)
            .field("location", &self.location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockObjectStoreClient;
    use tokio::io::AsyncReadExt;

    fn volume() -> VolumeSpec {
        VolumeSpec {
            name: "test_volume".to_string(),
            endpoint: "https://s3-eu-west-2.amazonaws.com".to_string(),
            path: "testbucket-rs-london".to_string(),
            secret_ref: "s3-secret".to_string(),
            provider: "aws".to_string(),
        }
    }

    #[tokio::test]
    async fn fetch_prepends_location_prefix() {
        let mock = Arc::new(MockObjectStoreClient::new());
        mock.put_object("adminAppsRepo/app1.tgz", "abcd1111", b"0123456789");

        let mgr = ObjectStoreManager::new(mock, volume(), "adminAppsRepo");
        let mut stream = mgr.fetch_app_package("app1.tgz").await.unwrap();
        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"0123456789");
    }

    #[tokio::test]
    async fn list_is_scoped_to_location() {
        let mock = Arc::new(MockObjectStoreClient::new());
        mock.put_object("adminAppsRepo/app1.tgz", "abcd1111", b"aa");
        mock.put_object("securityAppsRepo/app2.tgz", "efgh2222", b"bb");

        let mgr = ObjectStoreManager::new(mock, volume(), "adminAppsRepo");
        let listing = mgr.list_app_packages().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].key, "adminAppsRepo/app1.tgz");
        assert_eq!(listing[0].etag, "abcd1111");
    }
}
