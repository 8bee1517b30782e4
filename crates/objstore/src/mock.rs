//! In-memory object store for tests
//!
//! Registered under a real provider tag, this stands in for the remote
//! bucket the same way the original mock client does: scripted objects,
//! optional failure injection, no network.

use crate::client::{ObjectStoreClient, ObjectStream, RemoteObject};
use appfw_errors::{Error, ObjectStoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct MockObject {
    etag: String,
    body: Vec<u8>,
}

/// Scripted in-memory [`ObjectStoreClient`]
#[derive(Debug, Default)]
pub struct MockObjectStoreClient {
    objects: Mutex<BTreeMap<String, MockObject>>,
    fail_list: Mutex<bool>,
    fail_get: Mutex<bool>,
}

impl MockObjectStoreClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object into the bucket.
    pub fn put_object(&self, key: &str, etag: &str, body: &[u8]) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            MockObject {
                etag: etag.to_string(),
                body: body.to_vec(),
            },
        );
    }

    /// Make subsequent listings fail with a transient error.
    pub fn fail_listings(&self, fail: bool) {
        *self.fail_list.lock().unwrap() = fail;
    }

    /// Make subsequent object reads fail with a transient error.
    pub fn fail_gets(&self, fail: bool) {
        *self.fail_get.lock().unwrap() = fail;
    }
}

#[async_trait]
impl ObjectStoreClient for MockObjectStoreClient {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObject>, Error> {
        if *self.fail_list.lock().unwrap() {
            return Err(ObjectStoreError::ListFailed {
                prefix: prefix.to_string(),
                message: "injected listing failure".to_string(),
            }
            .into());
        }

        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| RemoteObject {
                key: key.clone(),
                etag: obj.etag.clone(),
                size: obj.body.len() as u64,
                last_modified: None,
            })
            .collect())
    }

    async fn get_object(&self, key: &str) -> Result<ObjectStream, Error> {
        if *self.fail_get.lock().unwrap() {
            return Err(ObjectStoreError::GetFailed {
                key: key.to_string(),
                message: "injected download failure".to_string(),
            }
            .into());
        }

        let objects = self.objects.lock().unwrap();
        let obj = objects.get(key).ok_or_else(|| ObjectStoreError::ObjectNotFound {
            key: key.to_string(),
        })?;
        Ok(Box::pin(Cursor::new(obj.body.clone())))
    }
}
