//! Controller state published to views.
//!
//! Mutators are crate-private so the controller stays the only writer. They
//! keep three invariants:
//! - the selection is `None` or the id of a motorcycle in the set
//! - dependent collections only ever hold records of the selected motorcycle
//! - `refresh_epoch` changes whenever the owner or the selection does, so a
//!   dependent fetch issued under an older epoch can be recognized as stale
//!
//! A dependent fetch can also read the store before a local create or delete
//! and settle after it. Those writes are remembered until the epoch moves on
//! and replayed over every fetched result.

use std::cmp::Reverse;
use std::collections::HashSet;

use serde::Serialize;

use crate::model::{CollectionKind, Motorcycle, NewReminder, NewServiceLog, NewTechData, OwnerId, Record};
use crate::model::{Reminder, ServiceLog, TechData};

/// A record kind that belongs to one motorcycle and has an in-memory slot.
pub trait DependentRecord: Record {
    /// User-entered fields of a new record.
    type Draft: Serialize + Send + Sync + 'static;

    fn motorcycle_id(&self) -> &str;

    fn slot(state: &GarageState) -> &[Self];

    fn slot_mut(state: &mut GarageState) -> &mut Vec<Self>;

    /// Bring the slot into its display order. Store order is kept by default.
    fn arrange(_records: &mut [Self]) {}
}

/// Dependent kinds that can be deleted.
pub trait DeletableRecord: DependentRecord {}

impl DependentRecord for ServiceLog {
    type Draft = NewServiceLog;

    fn motorcycle_id(&self) -> &str {
        &self.motorcycle_id
    }

    fn slot(state: &GarageState) -> &[Self] {
        &state.service_logs
    }

    fn slot_mut(state: &mut GarageState) -> &mut Vec<Self> {
        &mut state.service_logs
    }

    /// Most recent first; equal dates keep their relative order.
    fn arrange(records: &mut [Self]) {
        records.sort_by_key(|log| Reverse(log.date));
    }
}

impl DependentRecord for Reminder {
    type Draft = NewReminder;

    fn motorcycle_id(&self) -> &str {
        &self.motorcycle_id
    }

    fn slot(state: &GarageState) -> &[Self] {
        &state.reminders
    }

    fn slot_mut(state: &mut GarageState) -> &mut Vec<Self> {
        &mut state.reminders
    }
}

impl DependentRecord for TechData {
    type Draft = NewTechData;

    fn motorcycle_id(&self) -> &str {
        &self.motorcycle_id
    }

    fn slot(state: &GarageState) -> &[Self] {
        &state.tech_data
    }

    fn slot_mut(state: &mut GarageState) -> &mut Vec<Self> {
        &mut state.tech_data
    }
}

impl DeletableRecord for Reminder {}
impl DeletableRecord for TechData {}

/// Identifies one dependent refresh: the pair it was issued for plus the
/// epoch at issue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    pub owner: OwnerId,
    pub motorcycle_id: String,
    pub epoch: u64,
}

/// Dependent writes made under the current `refresh_epoch`.
#[derive(Debug, Clone, Default)]
struct LocalWrites {
    created: HashSet<(CollectionKind, String)>,
    deleted: HashSet<(CollectionKind, String)>,
}

impl LocalWrites {
    fn created<T: Record>(&self, record: &T) -> bool {
        self.created.contains(&(T::KIND, record.id().to_string()))
    }

    fn deleted<T: Record>(&self, record: &T) -> bool {
        self.deleted.contains(&(T::KIND, record.id().to_string()))
    }
}

/// Everything a view needs to render the garage.
#[derive(Debug, Clone, Default)]
pub struct GarageState {
    owner: Option<OwnerId>,
    motorcycles: Vec<Motorcycle>,
    service_logs: Vec<ServiceLog>,
    reminders: Vec<Reminder>,
    tech_data: Vec<TechData>,
    selected_id: Option<String>,
    /// Position of the selected motorcycle in `motorcycles`.
    selected_index: Option<usize>,
    loading: bool,
    session_epoch: u64,
    refresh_epoch: u64,
    local_writes: LocalWrites,
}

impl GarageState {
    pub fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    pub fn motorcycles(&self) -> &[Motorcycle] {
        &self.motorcycles
    }

    /// Newest first.
    pub fn service_logs(&self) -> &[ServiceLog] {
        &self.service_logs
    }

    pub fn reminders(&self) -> &[Reminder] {
        &self.reminders
    }

    pub fn tech_data(&self) -> &[TechData] {
        &self.tech_data
    }

    /// Records of kind `T` for the selected motorcycle.
    pub fn dependents<T: DependentRecord>(&self) -> &[T] {
        T::slot(self)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    pub fn selected_motorcycle(&self) -> Option<&Motorcycle> {
        self.selected_index.and_then(|i| self.motorcycles.get(i))
    }

    pub fn has_motorcycles(&self) -> bool {
        !self.motorcycles.is_empty()
    }

    /// A motorcycle-set fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    fn contains(&self, id: &str) -> bool {
        self.motorcycles.iter().any(|m| m.id == id)
    }

    fn clear_dependents(&mut self) {
        self.service_logs.clear();
        self.reminders.clear();
        self.tech_data.clear();
    }

    fn next_refresh_epoch(&mut self) {
        self.refresh_epoch += 1;
        self.local_writes = LocalWrites::default();
    }

    /// Move the cursor; the caller guarantees `id` is in the set (or `None`).
    fn set_selection(&mut self, id: Option<String>) -> bool {
        self.selected_index = id
            .as_deref()
            .and_then(|id| self.motorcycles.iter().position(|m| m.id == id));
        if self.selected_id == id {
            return false;
        }
        self.selected_id = id;
        self.clear_dependents();
        self.next_refresh_epoch();
        true
    }

    /// Point the cursor at `id`. `None` if `id` is not a known motorcycle,
    /// otherwise whether the selection changed.
    pub(crate) fn select(&mut self, id: Option<&str>) -> Option<bool> {
        match id {
            Some(id) if !self.contains(id) => None,
            id => Some(self.set_selection(id.map(str::to_string))),
        }
    }

    /// Start a session for `owner`. Switching owners drops everything the
    /// previous owner could see. Returns the session epoch to finish with.
    pub(crate) fn begin_session(&mut self, owner: OwnerId) -> u64 {
        if self.owner.as_ref() != Some(&owner) {
            self.motorcycles.clear();
            self.selected_id = None;
            self.selected_index = None;
            self.clear_dependents();
        }
        self.owner = Some(owner);
        self.loading = true;
        self.session_epoch += 1;
        self.next_refresh_epoch();
        self.session_epoch
    }

    /// Start a re-fetch of the motorcycle set within the current session.
    /// Fetches started before it can no longer settle.
    pub(crate) fn begin_reload(&mut self) -> u64 {
        self.loading = true;
        self.session_epoch += 1;
        self.session_epoch
    }

    /// Install a fetched motorcycle set. The selection becomes `preferred`
    /// when it is in the set, else the first motorcycle, else none.
    ///
    /// Returns `None` when the fetch is stale (a newer session transition
    /// happened since `epoch`), otherwise whether the selection changed.
    pub(crate) fn finish_motorcycle_load(
        &mut self,
        epoch: u64,
        motorcycles: Vec<Motorcycle>,
        preferred: Option<&str>,
    ) -> Option<bool> {
        if epoch != self.session_epoch || self.owner.is_none() {
            return None;
        }
        self.loading = false;
        self.motorcycles = motorcycles;
        let next = preferred
            .filter(|id| self.contains(id))
            .map(str::to_string)
            .or_else(|| self.motorcycles.first().map(|m| m.id.clone()));
        Some(self.set_selection(next))
    }

    /// Drop everything (owner absent).
    pub(crate) fn sign_out(&mut self) {
        let session_epoch = self.session_epoch + 1;
        let refresh_epoch = self.refresh_epoch + 1;
        *self = Self {
            session_epoch,
            refresh_epoch,
            ..Self::default()
        };
    }

    /// Ticket for a dependent refresh, or `None` (after clearing the
    /// dependents) when there is no owner or no selection.
    pub(crate) fn refresh_ticket(&mut self) -> Option<RefreshTicket> {
        if let (Some(owner), Some(motorcycle_id)) = (&self.owner, &self.selected_id) {
            return Some(RefreshTicket {
                owner: owner.clone(),
                motorcycle_id: motorcycle_id.clone(),
                epoch: self.refresh_epoch,
            });
        }
        self.clear_dependents();
        None
    }

    /// Install fetched dependents unless the ticket is stale. Local creates
    /// and deletes the fetch may have missed are kept.
    pub(crate) fn apply_dependents<T: DependentRecord>(
        &mut self,
        ticket: &RefreshTicket,
        mut records: Vec<T>,
    ) -> bool {
        if ticket.epoch != self.refresh_epoch {
            return false;
        }
        let writes = &self.local_writes;
        records.retain(|r| r.motorcycle_id() == ticket.motorcycle_id && !writes.deleted(r));
        let missed: Vec<T> = T::slot(self)
            .iter()
            .filter(|r| writes.created(*r) && !records.iter().any(|f| f.id() == r.id()))
            .cloned()
            .collect();
        records.extend(missed);
        T::arrange(&mut records);
        *T::slot_mut(self) = records;
        true
    }

    /// Whether `owner`/`motorcycle_id` is still the pair on screen.
    pub(crate) fn is_current(&self, owner: &OwnerId, motorcycle_id: &str) -> bool {
        self.owner.as_ref() == Some(owner) && self.selected_id.as_deref() == Some(motorcycle_id)
    }

    /// Append a freshly created record if its motorcycle is still selected.
    pub(crate) fn append_dependent<T: DependentRecord>(
        &mut self,
        owner: &OwnerId,
        record: T,
    ) -> bool {
        if !self.is_current(owner, record.motorcycle_id()) {
            return false;
        }
        self.local_writes
            .created
            .insert((T::KIND, record.id().to_string()));
        let slot = T::slot_mut(self);
        if !slot.iter().any(|r| r.id() == record.id()) {
            slot.push(record);
            T::arrange(slot);
        }
        true
    }

    /// Remove a record by id; absent ids are fine.
    pub(crate) fn remove_dependent<T: DependentRecord>(&mut self, owner: &OwnerId, id: &str) -> bool {
        if self.owner.as_ref() != Some(owner) {
            return false;
        }
        let key = (T::KIND, id.to_string());
        self.local_writes.created.remove(&key);
        self.local_writes.deleted.insert(key);
        let slot = T::slot_mut(self);
        let before = slot.len();
        slot.retain(|r| r.id() != id);
        slot.len() != before
    }
}
