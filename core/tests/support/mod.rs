//! Store doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use garage_core::StoreError;
use garage_core::model::{CollectionKind, Document, Fields, OwnerId};
use garage_core::store::{BlobStore, MemoryRecordStore, RecordStore};
use serde_json::json;
use tokio::sync::Semaphore;

pub fn fields(value: serde_json::Value) -> Fields {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

/// Two motorcycles for `u1` ("m1" Red, "m2" Blue), three reminders on "m2",
/// one reminder and one service log on "m1".
pub fn seed(store: &MemoryRecordStore) {
    let owner = OwnerId::new("u1");
    for (id, nickname) in [("m1", "Red"), ("m2", "Blue")] {
        store.insert(
            &owner,
            CollectionKind::Motorcycles,
            id,
            fields(json!({"brand": "Honda", "model": "CB500", "year": 2021, "nickname": nickname, "photo": ""})),
        );
    }
    for id in ["r-m2-a", "r-m2-b", "r-m2-c"] {
        store.insert(
            &owner,
            CollectionKind::Reminders,
            id,
            fields(json!({"motorcycleId": "m2", "description": id, "dueInfo": "in 1,000 km"})),
        );
    }
    store.insert(
        &owner,
        CollectionKind::Reminders,
        "r-m1",
        fields(json!({"motorcycleId": "m1", "description": "Chain", "dueInfo": "in 500 km"})),
    );
    store.insert(
        &owner,
        CollectionKind::ServiceLogs,
        "s-m1",
        fields(json!({
            "motorcycleId": "m1", "date": "2024-03-01", "mileage": 8000,
            "serviceType": "Oil change", "partsUsed": "Filter", "partsCost": 25.0,
            "laborCost": 40.0, "notes": ""
        })),
    );
}

/// A PNG large enough to need resizing under small limits.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// A one-shot barrier for a single store read.
pub struct Gate {
    arrived: Semaphore,
    open: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self {
            arrived: Semaphore::new(0),
            open: Semaphore::new(0),
        }
    }

    /// Wait until the gated read has started.
    pub async fn arrived(&self) {
        self.arrived.acquire().await.unwrap().forget();
    }

    /// Let the gated read complete.
    pub fn release(&self) {
        self.open.add_permits(1);
    }

    async fn pass(&self) {
        self.arrived.add_permits(1);
        self.open.acquire().await.unwrap().forget();
    }
}

/// Where a held read parks.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Hold {
    /// Before reading: the response sees writes made while held.
    BeforeRead,
    /// After reading: the response misses writes made while held.
    AfterRead,
}

/// Memory store whose reads can be held or failed, and whose writes can fail.
#[derive(Default)]
pub struct ScriptedStore {
    pub inner: MemoryRecordStore,
    gates: Mutex<HashMap<String, (Hold, Arc<Gate>)>>,
    failing_reads: Mutex<HashSet<CollectionKind>>,
    failing_writes: Mutex<bool>,
}

impl ScriptedStore {
    pub fn seeded() -> Self {
        let store = Self::default();
        seed(&store.inner);
        store
    }

    /// Hold the next `list_all` of `kind` for `owner`.
    pub fn hold_all(&self, owner: &str, kind: CollectionKind) -> Arc<Gate> {
        self.hold(format!("{owner}/{kind}"), Hold::BeforeRead)
    }

    /// Let the next `list_all` of `kind` read, then hold its response.
    pub fn hold_all_after_read(&self, owner: &str, kind: CollectionKind) -> Arc<Gate> {
        self.hold(format!("{owner}/{kind}"), Hold::AfterRead)
    }

    /// Hold the next filtered listing of `kind` for one motorcycle.
    pub fn hold_filtered(&self, owner: &str, kind: CollectionKind, motorcycle_id: &str) -> Arc<Gate> {
        self.hold(format!("{owner}/{kind}/{motorcycle_id}"), Hold::BeforeRead)
    }

    /// Let the next filtered listing read, then hold its response.
    pub fn hold_filtered_after_read(
        &self,
        owner: &str,
        kind: CollectionKind,
        motorcycle_id: &str,
    ) -> Arc<Gate> {
        self.hold(format!("{owner}/{kind}/{motorcycle_id}"), Hold::AfterRead)
    }

    fn hold(&self, key: String, hold: Hold) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        self.gates.lock().unwrap().insert(key, (hold, Arc::clone(&gate)));
        gate
    }

    pub fn fail_reads(&self, kind: CollectionKind) {
        self.failing_reads.lock().unwrap().insert(kind);
    }

    pub fn fail_writes(&self) {
        *self.failing_writes.lock().unwrap() = true;
    }

    /// Run `read` under whatever hold or failure is scripted for `key`.
    async fn read<F>(&self, key: String, kind: CollectionKind, read: F) -> Result<Vec<Document>, StoreError>
    where
        F: Future<Output = Result<Vec<Document>, StoreError>>,
    {
        let gate = self.gates.lock().unwrap().remove(&key);
        if let Some((Hold::BeforeRead, gate)) = &gate {
            gate.pass().await;
        }
        if self.failing_reads.lock().unwrap().contains(&kind) {
            return Err(StoreError::Transport(format!("{kind} unavailable")));
        }
        let docs = read.await;
        if let Some((Hold::AfterRead, gate)) = &gate {
            gate.pass().await;
        }
        docs
    }

    fn before_write(&self) -> Result<(), StoreError> {
        if *self.failing_writes.lock().unwrap() {
            return Err(StoreError::Transport("write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn list_all(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
    ) -> Result<Vec<Document>, StoreError> {
        self.read(format!("{owner}/{kind}"), kind, self.inner.list_all(owner, kind))
            .await
    }

    async fn list_filtered(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        motorcycle_id: &str,
    ) -> Result<Vec<Document>, StoreError> {
        self.read(
            format!("{owner}/{kind}/{motorcycle_id}"),
            kind,
            self.inner.list_filtered(owner, kind, motorcycle_id),
        )
        .await
    }

    async fn create_with_generated_id(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        fields: Fields,
    ) -> Result<String, StoreError> {
        self.before_write()?;
        self.inner.create_with_generated_id(owner, kind, fields).await
    }

    async fn reserve_id(&self, owner: &OwnerId, kind: CollectionKind) -> Result<String, StoreError> {
        self.inner.reserve_id(owner, kind).await
    }

    async fn create_with_reserved_id(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.before_write()?;
        self.inner.create_with_reserved_id(owner, kind, id, fields).await
    }

    async fn delete(
        &self,
        owner: &OwnerId,
        kind: CollectionKind,
        id: &str,
    ) -> Result<(), StoreError> {
        self.before_write()?;
        self.inner.delete(owner, kind, id).await
    }
}

/// Blob store that rejects every upload.
pub struct BrokenBlobStore;

#[async_trait]
impl BlobStore for BrokenBlobStore {
    async fn upload(&self, path: &str, _bytes: Vec<u8>) -> Result<(), StoreError> {
        Err(StoreError::Transport(format!("upload of {path} refused")))
    }

    async fn public_url(&self, path: &str) -> Result<String, StoreError> {
        Err(StoreError::NotFound {
            path: path.to_string(),
        })
    }
}
