//! Record and blob store contracts.
//!
//! The controller only talks to these traits. Two adapter families ship with
//! the crate:
//! - [`memory`]: process-local maps (tests, embedders)
//! - [`file`]: JSON documents and blobs under a data directory
//!
//! ## Addressing
//!
//! ```text
//! users/{owner}/{collection}/{id}          record
//! users/{owner}/motorcycles/{id}/{file}    motorcycle photo blob
//! ```

pub mod file;
pub mod memory;

pub use file::{FileBlobStore, FileRecordStore};
pub use memory::{MemoryBlobStore, MemoryRecordStore};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{CollectionKind, Document, Fields, OwnerId, Record};

/// Document store scoped by owner and collection.
///
/// Listings come back in the store's own order (ascending id for the bundled
/// adapters); callers that need another order sort after retrieval.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_all(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
    ) -> Result<Vec<Document>, StoreError>;

    /// Documents whose `motorcycleId` equals `motorcycle_id`.
    async fn list_filtered(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        motorcycle_id: &str,
    ) -> Result<Vec<Document>, StoreError>;

    /// Write a new document under a store-generated identity.
    async fn create_with_generated_id(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        fields: Fields,
    ) -> Result<String, StoreError>;

    /// Obtain an identity without writing anything.
    async fn reserve_id(&self, owner: &OwnerId, kind: CollectionKind) -> Result<String, StoreError>;

    /// Write a document under an identity obtained from [`RecordStore::reserve_id`].
    async fn create_with_reserved_id(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError>;

    async fn delete(&self, owner: &OwnerId, kind: CollectionKind, id: &str)
    -> Result<(), StoreError>;
}

/// Binary object storage that hands out durable fetchable references.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    async fn public_url(&self, path: &str) -> Result<String, StoreError>;
}

/// Storage path for a record document.
pub fn record_path(owner: &OwnerId, kind: CollectionKind, id: &str) -> String {
    format!("users/{owner}/{kind}/{id}")
}

/// Storage path for a motorcycle photo.
pub fn photo_path(owner: &OwnerId, motorcycle_id: &str, file_name: &str) -> String {
    format!(
        "users/{owner}/{}/{motorcycle_id}/{file_name}",
        CollectionKind::Motorcycles
    )
}

/// Decode documents into `T`, skipping (and logging) the ones that don't fit.
pub fn decode_all<T: Record>(docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match doc.decode::<T>() {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping undecodable {} document {id}: {e}", T::KIND);
                    None
                }
            }
        })
        .collect()
}

/// Every `T` of the owner, in store order.
pub async fn fetch_all<T: Record>(
    store: &dyn RecordStore,
    owner: &OwnerId,
) -> Result<Vec<T>, StoreError> {
    let docs = store.list_all(owner, T::KIND).await?;
    Ok(decode_all(docs))
}

/// Every `T` of the owner that belongs to `motorcycle_id`, in store order.
pub async fn fetch_for_motorcycle<T: Record>(
    store: &dyn RecordStore,
    owner: &OwnerId,
    motorcycle_id: &str,
) -> Result<Vec<T>, StoreError> {
    let docs = store.list_filtered(owner, T::KIND, motorcycle_id).await?;
    Ok(decode_all(docs))
}

pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
