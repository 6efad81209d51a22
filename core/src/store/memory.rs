//! In-process store adapters.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BlobStore, RecordStore, generate_id, record_path};
use crate::error::StoreError;
use crate::model::{CollectionKind, Document, Fields, OwnerId};

type CollectionKey = (OwnerId, CollectionKind);

/// Record store backed by ordered maps; listings are in ascending id order.
#[derive(Default)]
pub struct MemoryRecordStore {
    collections: Mutex<HashMap<CollectionKey, BTreeMap<String, Fields>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document directly (seeding tests and fixtures).
    pub fn insert(&self, owner: &OwnerId, kind: CollectionKind, id: &str, fields: Fields) {
        self.lock()
            .entry((owner.clone(), kind))
            .or_default()
            .insert(id.to_string(), fields);
    }

    /// Number of documents in one collection.
    pub fn count(&self, owner: &OwnerId, kind: CollectionKind) -> usize {
        self.lock()
            .get(&(owner.clone(), kind))
            .map_or(0, BTreeMap::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CollectionKey, BTreeMap<String, Fields>>> {
        // A poisoned map is still structurally valid.
        self.collections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn documents(&self, owner: &OwnerId, kind: CollectionKind) -> Vec<Document> {
        self.lock()
            .get(&(owner.clone(), kind))
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_all(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self.documents(owner, kind))
    }

    async fn list_filtered(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        motorcycle_id: &str,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .documents(owner, kind)
            .into_iter()
            .filter(|doc| doc.motorcycle_id() == Some(motorcycle_id))
            .collect())
    }

    async fn create_with_generated_id(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        fields: Fields,
    ) -> Result<String, StoreError> {
        let id = generate_id();
        self.insert(owner, kind, &id, fields);
        Ok(id)
    }

    async fn reserve_id(&self, _owner: &OwnerId, _kind: CollectionKind) -> Result<String, StoreError> {
        Ok(generate_id())
    }

    async fn create_with_reserved_id(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.insert(owner, kind, id, fields);
        Ok(())
    }

    async fn delete(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        id: &str,
    ) -> Result<(), StoreError> {
        let removed = self
            .lock()
            .get_mut(&(owner.clone(), kind))
            .and_then(|docs| docs.remove(id));
        if removed.is_none() {
            tracing::debug!("Delete of missing document {}", record_path(owner, kind, id));
        }
        Ok(())
    }
}

/// Blob store keeping payloads in memory; URLs use a `memory://` scheme.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.lock().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn public_url(&self, path: &str) -> Result<String, StoreError> {
        if self.lock().contains_key(path) {
            Ok(format!("memory://{path}"))
        } else {
            Err(StoreError::NotFound {
                path: path.to_string(),
            })
        }
    }
}
