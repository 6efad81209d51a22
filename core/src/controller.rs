//! Selection and sync controller.
//!
//! The controller owns a [`GarageState`] and is its only writer. Views read it
//! through [`GarageController::subscribe`] or [`GarageController::snapshot`]
//! and call the operations below.
//!
//! ## Staleness
//!
//! Operations may overlap: a caller can select another motorcycle (or sign
//! out) while an earlier fetch is still suspended. Every fetch carries the
//! epoch it was issued under and its result is dropped if the epoch moved on,
//! so a late response never overwrites state produced by a newer transition.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{GarageError, ImageError, PhotoFailure, StoreError};
use crate::image::{ImageLimits, ImageProcessor, PhotoUpload};
use crate::model::{
    Document, Motorcycle, NewMotorcycle, OwnerId, Record, Reminder, ServiceLog, TechData,
    dependent_fields, to_fields,
};
use crate::state::{DeletableRecord, DependentRecord, GarageState, RefreshTicket};
use crate::store::{BlobStore, RecordStore, fetch_all, fetch_for_motorcycle, photo_path};

/// A motorcycle-set fetch that has been started but not yet settled.
struct PendingLoad {
    owner: OwnerId,
    epoch: u64,
    preferred: Option<String>,
}

pub struct GarageController {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    images: Arc<dyn ImageProcessor>,
    limits: ImageLimits,
    state: watch::Sender<GarageState>,
}

impl GarageController {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        images: Arc<dyn ImageProcessor>,
        limits: ImageLimits,
    ) -> Self {
        let (state, _) = watch::channel(GarageState::default());
        Self {
            records,
            blobs,
            images,
            limits,
            state,
        }
    }

    /// Receiver that observes every published state change.
    pub fn subscribe(&self) -> watch::Receiver<GarageState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> GarageState {
        self.state.borrow().clone()
    }

    fn update<R: Default>(&self, f: impl FnOnce(&mut GarageState) -> R) -> R {
        let mut out = R::default();
        self.state.send_modify(|state| out = f(state));
        out
    }

    fn owner(&self) -> Option<OwnerId> {
        self.state.borrow().owner().cloned()
    }

    /// Apply an owner transition and, for a present owner, wait until the
    /// motorcycle set and the dependents of the resolved selection settle.
    pub async fn session_transition(&self, owner: Option<OwnerId>) {
        if let Some(load) = self.begin_transition(owner) {
            self.settle_load(load).await;
        }
    }

    /// Synchronous half of a session transition.
    fn begin_transition(&self, owner: Option<OwnerId>) -> Option<PendingLoad> {
        match owner {
            None => {
                tracing::info!("Owner signed out, clearing garage");
                self.state.send_modify(GarageState::sign_out);
                None
            }
            Some(owner) => {
                tracing::info!("Loading garage for {owner}");
                self.update(|state| {
                    let epoch = state.begin_session(owner.clone());
                    Some(PendingLoad {
                        owner,
                        epoch,
                        preferred: state.selected_id().map(str::to_string),
                    })
                })
            }
        }
    }

    async fn settle_load(&self, load: PendingLoad) {
        let motorcycles = match fetch_all::<Motorcycle>(self.records.as_ref(), &load.owner).await {
            Ok(motorcycles) => motorcycles,
            Err(e) => {
                tracing::warn!("Failed to fetch motorcycles for {}: {e}", load.owner);
                Vec::new()
            }
        };
        let count = motorcycles.len();
        let settled = self.update(|state| {
            state.finish_motorcycle_load(load.epoch, motorcycles, load.preferred.as_deref())
        });
        match settled {
            Some(_) => {
                tracing::debug!("Loaded {count} motorcycles for {}", load.owner);
                self.refresh_dependents().await;
            }
            None => tracing::debug!("Discarding stale motorcycle fetch for {}", load.owner),
        }
    }

    /// Apply the current session value and every later transition.
    ///
    /// Each transition takes effect on state immediately; its fetches run on
    /// their own task so a sign-out is never queued behind a slow sign-in.
    pub fn follow_session(
        self: &Arc<Self>,
        mut session: watch::Receiver<Option<OwnerId>>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let owner = session.borrow_and_update().clone();
                if let Some(load) = controller.begin_transition(owner) {
                    let controller = Arc::clone(&controller);
                    tokio::spawn(async move { controller.settle_load(load).await });
                }
                if session.changed().await.is_err() {
                    tracing::debug!("Session closed, no longer following");
                    break;
                }
            }
        })
    }

    /// Move the selection cursor and refresh the dependents it drives.
    ///
    /// Returns `false` (leaving the cursor where it was) if `id` is not a
    /// known motorcycle. Re-selecting the current motorcycle does not refetch.
    pub async fn select(&self, id: Option<&str>) -> bool {
        let mut outcome = None;
        self.state.send_if_modified(|state| {
            outcome = state.select(id);
            outcome == Some(true)
        });
        match outcome {
            None => {
                tracing::debug!("Ignoring selection of unknown motorcycle {id:?}");
                false
            }
            Some(false) => true,
            Some(true) => {
                self.refresh_dependents().await;
                true
            }
        }
    }

    /// Re-read the three dependent collections for the current selection.
    async fn refresh_dependents(&self) {
        let Some(ticket) = self.update(GarageState::refresh_ticket) else {
            return;
        };
        tokio::join!(
            self.refresh_slot::<ServiceLog>(&ticket),
            self.refresh_slot::<Reminder>(&ticket),
            self.refresh_slot::<TechData>(&ticket),
        );
    }

    async fn refresh_slot<T: DependentRecord>(&self, ticket: &RefreshTicket) {
        let fetched =
            fetch_for_motorcycle::<T>(self.records.as_ref(), &ticket.owner, &ticket.motorcycle_id)
                .await;
        let records = fetched.unwrap_or_else(|e| {
            tracing::warn!(
                "Failed to fetch {} for motorcycle {}: {e}",
                T::KIND,
                ticket.motorcycle_id
            );
            Vec::new()
        });
        let applied = self
            .state
            .send_if_modified(|state| state.apply_dependents(ticket, records));
        if !applied {
            tracing::debug!(
                "Discarding stale {} for motorcycle {}",
                T::KIND,
                ticket.motorcycle_id
            );
        }
    }

    /// Create a motorcycle, uploading its photo first when one is given.
    ///
    /// Nothing is written if the photo cannot be processed or uploaded. On
    /// success the motorcycle set is re-read and the new motorcycle selected.
    /// Returns `None` when nobody is signed in.
    pub async fn create_motorcycle(
        &self,
        draft: NewMotorcycle,
        photo: Option<PhotoUpload>,
    ) -> Result<Option<Motorcycle>, GarageError> {
        let Some(owner) = self.owner() else {
            tracing::debug!("Ignoring motorcycle create without an owner");
            return Ok(None);
        };

        let id = self.records.reserve_id(&owner, Motorcycle::KIND).await?;
        let photo_url = match photo {
            Some(photo) => Some(self.store_photo(&owner, &id, photo).await?),
            None => None,
        };
        let motorcycle = Motorcycle::from_draft(id.clone(), draft, photo_url);
        let fields = to_fields(&motorcycle).map_err(StoreError::from)?;
        self.records
            .create_with_reserved_id(&owner, Motorcycle::KIND, &id, fields)
            .await?;
        tracing::info!("Created motorcycle {id} ({})", motorcycle.nickname);

        let reload = self.update(|state| {
            (state.owner() == Some(&owner)).then(|| PendingLoad {
                owner: owner.clone(),
                epoch: state.begin_reload(),
                preferred: Some(id.clone()),
            })
        });
        match reload {
            Some(load) => self.settle_load(load).await,
            None => tracing::debug!("Owner changed during create, skipping reload"),
        }
        Ok(Some(motorcycle))
    }

    /// Compress, upload and resolve the photo for motorcycle `id`.
    async fn store_photo(
        &self,
        owner: &OwnerId,
        id: &str,
        photo: PhotoUpload,
    ) -> Result<String, GarageError> {
        let images = Arc::clone(&self.images);
        let limits = self.limits;
        let processed = tokio::task::spawn_blocking(move || images.compress(photo, limits))
            .await
            .map_err(|e| GarageError::photo(ImageError::Worker(e.to_string())))?
            .map_err(GarageError::photo)?;

        let path = photo_path(owner, id, &processed.file_name);
        self.blobs
            .upload(&path, processed.bytes)
            .await
            .map_err(|e| GarageError::photo(PhotoFailure::Upload(e)))?;
        self.blobs
            .public_url(&path)
            .await
            .map_err(|e| GarageError::photo(PhotoFailure::Upload(e)))
    }

    /// Create a dependent record for the selected motorcycle.
    ///
    /// Returns `None` without touching the store when nobody is signed in or
    /// nothing is selected. The record is appended locally only if the same
    /// motorcycle is still selected when the write completes.
    pub async fn create_dependent<T: DependentRecord>(
        &self,
        draft: T::Draft,
    ) -> Result<Option<T>, GarageError> {
        let (owner, motorcycle_id) = {
            let state = self.state.borrow();
            (state.owner().cloned(), state.selected_id().map(str::to_string))
        };
        let Some(owner) = owner else {
            tracing::debug!("Ignoring {} create without an owner", T::KIND);
            return Ok(None);
        };
        let Some(motorcycle_id) = motorcycle_id else {
            tracing::debug!("Ignoring {} create without a selection", T::KIND);
            return Ok(None);
        };

        let fields = dependent_fields(&motorcycle_id, &draft).map_err(StoreError::from)?;
        let id = self
            .records
            .create_with_generated_id(&owner, T::KIND, fields.clone())
            .await?;
        let record: T = Document::new(id, fields).decode().map_err(StoreError::from)?;
        tracing::info!(
            "Created {} {} for motorcycle {motorcycle_id}",
            T::KIND,
            record.id()
        );

        let appended = self
            .state
            .send_if_modified(|state| state.append_dependent(&owner, record.clone()));
        if !appended {
            tracing::debug!("Selection moved on, not appending {} {}", T::KIND, record.id());
        }
        Ok(Some(record))
    }

    /// Delete a dependent record by id.
    ///
    /// Returns `false` without touching the store when nobody is signed in.
    pub async fn delete_dependent<T: DeletableRecord>(&self, id: &str) -> Result<bool, GarageError> {
        let Some(owner) = self.owner() else {
            tracing::debug!("Ignoring {} delete without an owner", T::KIND);
            return Ok(false);
        };
        self.records.delete(&owner, T::KIND, id).await?;
        tracing::info!("Deleted {} {id}", T::KIND);
        self.state
            .send_if_modified(|state| state.remove_dependent::<T>(&owner, id));
        Ok(true)
    }
}
