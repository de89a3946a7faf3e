// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Observable in-memory record store
//!
//! [`RecordStore`] is the generic shape behind every data service: an
//! ordered record collection, optional derived data keyed by record id, and
//! a [`NotificationHub`] that receives a fresh [`Snapshot`] after every
//! mutation. Mutations are all-or-nothing: a failed operation leaves the
//! collection untouched and publishes nothing.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::hub::{NotificationHub, Subscription, Topic};
use crate::{AzError, Result};

/// Stable record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A domain entity owned by a [`RecordStore`]
pub trait Record: Clone + Send + Sync + 'static {
    /// Creation input, validated by [`Record::create`]
    type Input;
    /// Partial update, merged by [`Record::apply`]
    type Patch;

    /// Human readable kind, used in errors and logs
    const KIND: &'static str;

    fn id(&self) -> &RecordId;

    /// Build a record from raw input, rejecting missing or malformed fields
    fn create(id: RecordId, input: Self::Input) -> Result<Self>;

    /// Shallow-merge `patch` into `self`. Fields absent from the patch keep
    /// their value. The id must never change.
    fn apply(&mut self, patch: Self::Patch) -> Result<()>;
}

/// Immutable point-in-time view of a store
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<R, D> {
    pub version: u64,
    pub records: Arc<Vec<R>>,
    pub derived: Arc<HashMap<RecordId, D>>,
}

impl<R: Record, D> Snapshot<R, D> {
    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn derived_for(&self, id: &RecordId) -> Option<&D> {
        self.derived.get(id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.records.iter()
    }
}

/// Mutable store internals, only reachable through `RecordStore::commit`
struct StoreState<R, D> {
    version: u64,
    records: Arc<Vec<R>>,
    derived: Arc<HashMap<RecordId, D>>,
}

impl<R: Record, D: Clone> StoreState<R, D> {
    fn snapshot(&self) -> Snapshot<R, D> {
        Snapshot {
            version: self.version,
            records: Arc::clone(&self.records),
            derived: Arc::clone(&self.derived),
        }
    }

    fn position(&self, id: &RecordId) -> Result<usize> {
        self.records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| AzError::not_found(R::KIND, id.as_str()))
    }

    fn records_mut(&mut self) -> &mut Vec<R> {
        // Copy-on-write: outstanding snapshots keep the previous vector
        Arc::make_mut(&mut self.records)
    }

    fn derived_mut(&mut self) -> &mut HashMap<RecordId, D> {
        Arc::make_mut(&mut self.derived)
    }
}

/// Ordered, observable collection of records with derived per-record data
pub struct RecordStore<R, D = ()> {
    state: Arc<Mutex<StoreState<R, D>>>,
    hub: NotificationHub<Snapshot<R, D>>,
}

impl<R, D> Clone for RecordStore<R, D> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            hub: self.hub.clone(),
        }
    }
}

impl<R, D> RecordStore<R, D>
where
    R: Record,
    D: Clone + Send + Sync + 'static,
{
    /// Create an empty store publishing on `topic`
    pub fn new(topic: impl Into<Topic>) -> Self {
        let state = StoreState {
            version: 0,
            records: Arc::new(Vec::new()),
            derived: Arc::new(HashMap::new()),
        };
        let hub = NotificationHub::new(topic, state.snapshot());
        Self {
            state: Arc::new(Mutex::new(state)),
            hub,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<R, D>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `mutate` and publish the resulting snapshot.
    ///
    /// `mutate` must either fail before touching the state or succeed; on
    /// failure nothing is published.
    fn commit<F, O>(&self, mutate: F) -> Result<O>
    where
        F: FnOnce(&mut StoreState<R, D>) -> Result<O>,
    {
        let output = {
            let mut state = self.lock();
            let output = mutate(&mut state)?;
            state.version += 1;
            // Queue under the store lock so delivery order matches mutation order
            self.hub.enqueue(state.snapshot());
            output
        };
        self.hub.drain();
        Ok(output)
    }

    pub fn topic(&self) -> &Topic {
        self.hub.topic()
    }

    pub fn hub(&self) -> &NotificationHub<Snapshot<R, D>> {
        &self.hub
    }

    /// Current snapshot. Never notifies.
    pub fn list(&self) -> Snapshot<R, D> {
        self.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Result<R> {
        let state = self.lock();
        let idx = state.position(id)?;
        Ok(state.records[idx].clone())
    }

    /// Derived data stored for `id`, if any. Never notifies.
    pub fn derived(&self, id: &RecordId) -> Option<D> {
        self.lock().derived.get(id).cloned()
    }

    /// Validate `input`, append the new record and publish
    pub fn add(&self, input: R::Input) -> Result<R> {
        let record = R::create(RecordId::generate(), input)?;
        let created = self.commit(|state| {
            state.records_mut().push(record.clone());
            Ok(record)
        })?;
        debug!(topic = %self.topic(), id = %created.id(), "Added {}", R::KIND);
        Ok(created)
    }

    /// Merge `patch` into the record with `id` and publish
    pub fn update(&self, id: &RecordId, patch: R::Patch) -> Result<R> {
        self.modify(id, |record| record.apply(patch))
    }

    /// Run `change` against a copy of the record; commit only if it succeeds
    pub fn modify<F>(&self, id: &RecordId, change: F) -> Result<R>
    where
        F: FnOnce(&mut R) -> Result<()>,
    {
        let updated = self.commit(|state| {
            let idx = state.position(id)?;
            let mut record = state.records[idx].clone();
            change(&mut record)?;
            if record.id() != id {
                return Err(AzError::validation(format!("{} id cannot change", R::KIND)));
            }
            state.records_mut()[idx] = record.clone();
            Ok(record)
        })?;
        debug!(topic = %self.topic(), id = %id, "Updated {}", R::KIND);
        Ok(updated)
    }

    /// Remove the record and any derived data keyed by it, then publish
    pub fn remove(&self, id: &RecordId) -> Result<R> {
        let removed = self.commit(|state| {
            let idx = state.position(id)?;
            let removed = state.records_mut().remove(idx);
            if state.derived.contains_key(id) {
                state.derived_mut().remove(id);
            }
            Ok(removed)
        })?;
        debug!(topic = %self.topic(), id = %id, "Removed {}", R::KIND);
        Ok(removed)
    }

    /// Attach derived data to an existing record and publish
    pub fn set_derived(&self, id: &RecordId, data: D) -> Result<()> {
        self.commit(|state| {
            state.position(id)?;
            state.derived_mut().insert(id.clone(), data);
            Ok(())
        })
    }

    /// Remove every record matching `pred` in one notification.
    /// Returns the number removed; publishes nothing when it is zero.
    pub fn remove_where<P>(&self, pred: P) -> usize
    where
        P: Fn(&R) -> bool,
    {
        let result = self.commit(|state| {
            let doomed: Vec<RecordId> = state
                .records
                .iter()
                .filter(|r| pred(r))
                .map(|r| r.id().clone())
                .collect();
            if doomed.is_empty() {
                return Err(AzError::validation("nothing to remove"));
            }
            state.records_mut().retain(|r| !doomed.contains(r.id()));
            let derived = state.derived_mut();
            for id in &doomed {
                derived.remove(id);
            }
            Ok(doomed.len())
        });
        result.unwrap_or(0)
    }

    /// Replace the whole collection in one notification.
    ///
    /// Fails with a validation error, leaving the store as it was, when two
    /// records share an id.
    pub fn seed(&self, records: Vec<R>) -> Result<()> {
        let mut ids = HashSet::with_capacity(records.len());
        if let Some(dup) = records.iter().map(|r| r.id()).find(|id| !ids.insert(*id)) {
            return Err(AzError::validation(format!(
                "duplicate {} id in seed data: {}",
                R::KIND,
                dup
            )));
        }

        let count = records.len();
        self.commit(|state| {
            state.records = Arc::new(records);
            state.derived = Arc::new(HashMap::new());
            Ok(())
        })?;
        debug!(topic = %self.topic(), count, "Seeded store");
        Ok(())
    }

    /// Drop every record and derived entry in one notification
    pub fn clear(&self) {
        // An empty collection has no duplicate ids
        let _ = self.seed(Vec::new());
    }

    /// Register `callback` for the current snapshot and every later one
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Snapshot<R, D>) + Send + Sync + 'static,
    {
        self.hub.subscribe(callback)
    }
}

impl<R: Record, D: Clone + Send + Sync + 'static> fmt::Debug for RecordStore<R, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("RecordStore")
            .field("topic", self.hub.topic())
            .field("version", &state.version)
            .field("records", &state.records.len())
            .finish()
    }
}
