//! File-backed store adapters.
//!
//! ## Layout
//!
//! ```text
//! {data_dir}/users/{owner}/{collection}/{id}.json   record fields (pretty JSON)
//! {data_dir}/blobs/{path}                           blob payloads
//! ```
//!
//! Writes go through a `.tmp` sibling and a rename so a crash never leaves a
//! half-written document behind. Filesystem work runs on the blocking pool.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{BlobStore, RecordStore, generate_id};
use crate::error::StoreError;
use crate::model::{CollectionKind, Document, Fields, OwnerId};

const DOCUMENT_EXT: &str = "json";

/// Atomically write `data` to `path` via a `.tmp` sibling.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Run blocking filesystem work off the async worker threads.
async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Transport(format!("blocking task failed: {e}")))?
}

fn write_fields(path: &Path, fields: &Fields) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(fields)?;
    atomic_write(path, json.as_bytes())
}

fn invalid(what: &str, value: &str) -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("invalid {what}: {value:?}"),
    ))
}

/// Reject anything that is not a single plain path segment.
fn segment<'a>(what: &str, value: &'a str) -> Result<&'a str, StoreError> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.contains('/') => Ok(value),
        _ => Err(invalid(what, value)),
    }
}

/// Record store persisting one JSON file per document.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    base_dir: PathBuf,
}

impl FileRecordStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed.
    pub fn new(base_dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn collection_dir(&self, owner: &OwnerId, kind: CollectionKind) -> Result<PathBuf, StoreError> {
        Ok(self
            .base_dir
            .join("users")
            .join(segment("owner", owner.as_str())?)
            .join(kind.as_str()))
    }

    fn document_path(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        id: &str,
    ) -> Result<PathBuf, StoreError> {
        let file = format!("{}.{DOCUMENT_EXT}", segment("document id", id)?);
        Ok(self.collection_dir(owner, kind)?.join(file))
    }

    /// All documents of a collection in ascending id order.
    fn read_collection(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
    ) -> Result<Vec<Document>, StoreError> {
        let dir = self.collection_dir(owner, kind)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(DOCUMENT_EXT) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let data = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Fields>(&data) {
                Ok(fields) => docs.push(Document::new(id, fields)),
                Err(e) => tracing::warn!("Skipping unreadable document {}: {e}", path.display()),
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn list_all(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
    ) -> Result<Vec<Document>, StoreError> {
        let store = self.clone();
        let owner = owner.clone();
        blocking(move || store.read_collection(&owner, kind)).await
    }

    async fn list_filtered(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        motorcycle_id: &str,
    ) -> Result<Vec<Document>, StoreError> {
        let store = self.clone();
        let owner = owner.clone();
        let mut docs = blocking(move || store.read_collection(&owner, kind)).await?;
        docs.retain(|doc| doc.motorcycle_id() == Some(motorcycle_id));
        Ok(docs)
    }

    async fn create_with_generated_id(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        fields: Fields,
    ) -> Result<String, StoreError> {
        let id = generate_id();
        let path = self.document_path(owner, kind, &id)?;
        blocking(move || write_fields(&path, &fields)).await?;
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
        let path = self.document_path(owner, kind, id)?;
        blocking(move || write_fields(&path, &fields)).await
    }

    async fn delete(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        id: &str,
    ) -> Result<(), StoreError> {
        let path = self.document_path(owner, kind, id)?;
        blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Delete of missing document {}", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        })
        .await
    }
}

/// Blob store writing payloads under `{base_dir}/blobs`; URLs are `file://`.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    base_dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(base_dir: PathBuf) -> Result<Self, StoreError> {
        let base_dir = base_dir.join("blobs");
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn blob_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !plain {
            return Err(invalid("blob path", path));
        }
        Ok(self.base_dir.join(relative))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let target = self.blob_path(path)?;
        blocking(move || atomic_write(&target, &bytes)).await
    }

    async fn public_url(&self, path: &str) -> Result<String, StoreError> {
        let target = self.blob_path(path)?;
        let path = path.to_string();
        blocking(move || {
            if !target.exists() {
                return Err(StoreError::NotFound { path });
            }
            let absolute = std::path::absolute(&target)?;
            url::Url::from_file_path(&absolute)
                .map(String::from)
                .map_err(|()| invalid("blob path", &path))
        })
        .await
    }
}
