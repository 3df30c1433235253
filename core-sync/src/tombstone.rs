//! # Tombstones
//!
//! A grow-only set of deleted asset ids, kept on both replicas so that a
//! deletion on one device is applied on every other device instead of being
//! undone by the next download.
//!
//! ## Persistence
//!
//! - Local: JSON array under the settings key `deleted_inlays`
//! - Remote: JSON array stored as the reserved object `_deleted`
//!
//! Live mutations from local creates and deletes go through a
//! [`DeferredWriter`]; a merge writes both sides immediately.
//!
//! An id re-created locally stays out of the merged set even if the remote
//! list (or a not yet rewritten local list) still names it.

use bridge_traits::{RemoteObjectStore, SettingsStore};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::deferred::DeferredWriter;
use crate::error::Result;

/// Settings key holding the local tombstone list
pub const LOCAL_TOMBSTONES_KEY: &str = "deleted_inlays";

/// Reserved remote key holding the shared tombstone list
pub const REMOTE_TOMBSTONES_KEY: &str = "_deleted";

/// Set of deleted asset ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TombstoneSet(BTreeSet<String>);

impl TombstoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns `true` if the id was not present
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    /// Returns `true` if the id was present
    pub fn remove(&mut self, id: &str) -> bool {
        self.0.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Add every id of `other`; returns how many were new
    pub fn merge(&mut self, other: TombstoneSet) -> usize {
        let before = self.0.len();
        self.0.extend(other.0);
        self.0.len() - before
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, String> {
        self.0.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for TombstoneSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Receives local create and delete notifications
pub trait TombstoneObserver: Send + Sync {
    /// An asset was deleted locally
    fn mark_deleted(&self, id: &str);

    /// An asset was created or overwritten locally
    fn mark_restored(&self, id: &str);
}

/// Tombstones shared between the settings store and the remote namespace
pub struct TombstoneStore {
    settings: Arc<dyn SettingsStore>,
    remote: Arc<dyn RemoteObjectStore>,
    set: Mutex<TombstoneSet>,
    /// Ids re-created since the last merge
    restored: Mutex<BTreeSet<String>>,
    writer: DeferredWriter,
}

impl TombstoneStore {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        remote: Arc<dyn RemoteObjectStore>,
        persist_delay: Duration,
    ) -> Self {
        let writer = DeferredWriter::new(Arc::clone(&settings), LOCAL_TOMBSTONES_KEY, persist_delay);
        Self {
            settings,
            remote,
            set: Mutex::new(TombstoneSet::new()),
            restored: Mutex::new(BTreeSet::new()),
            writer,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TombstoneSet> {
        self.set.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_restored(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.restored.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn read_local(&self) -> Result<TombstoneSet> {
        match self.settings.get_string(LOCAL_TOMBSTONES_KEY).await? {
            Some(text) if !text.trim().is_empty() => TombstoneSet::from_json(&text),
            _ => Ok(TombstoneSet::new()),
        }
    }

    async fn read_remote(&self) -> Result<TombstoneSet> {
        match self.remote.get_raw(REMOTE_TOMBSTONES_KEY).await? {
            Some(body) => Ok(serde_json::from_slice(&body)?),
            None => Ok(TombstoneSet::new()),
        }
    }

    /// Load the local list into memory.
    ///
    /// A malformed value is logged and replaced by the next write.
    pub async fn load(&self) -> Result<usize> {
        let local = match self.read_local().await {
            Ok(set) => set,
            Err(e) if matches!(e, crate::SyncError::Serialization(_)) => {
                warn!(error = %e, "Ignoring malformed local tombstones");
                TombstoneSet::new()
            }
            Err(e) => return Err(e),
        };

        let mut set = self.lock();
        set.merge(local);
        Ok(set.len())
    }

    /// Union local, remote and in-memory tombstones and persist the result
    /// to both sides.
    #[instrument(skip(self))]
    pub async fn merge(&self) -> Result<TombstoneSet> {
        let local = self.read_local().await?;
        let remote = self.read_remote().await?;
        let (local_len, remote_len) = (local.len(), remote.len());

        let merged = {
            let mut set = self.lock();
            set.merge(local);
            set.merge(remote);
            for id in std::mem::take(&mut *self.lock_restored()) {
                if set.remove(&id) {
                    debug!(id = %id, "Kept re-created asset out of tombstones");
                }
            }
            set.clone()
        };

        let json = merged.to_json()?;
        self.writer.write_now(&json).await?;
        self.remote
            .put_raw(REMOTE_TOMBSTONES_KEY, Bytes::from(json))
            .await?;

        info!(
            local = local_len,
            remote = remote_len,
            merged = merged.len(),
            "Merged tombstones"
        );
        Ok(merged)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn snapshot(&self) -> TombstoneSet {
        self.lock().clone()
    }

    /// Forget every tombstone on both sides
    pub async fn clear_all(&self) -> Result<()> {
        let json = {
            let mut set = self.lock();
            *set = TombstoneSet::new();
            self.lock_restored().clear();
            set.to_json()?
        };

        self.writer.write_now(&json).await?;
        self.remote
            .put_raw(REMOTE_TOMBSTONES_KEY, Bytes::from(json))
            .await?;

        info!("Cleared all tombstones");
        Ok(())
    }

    /// Write any pending local change now
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush().await
    }

    fn persist_later(&self, set: &TombstoneSet) {
        match set.to_json() {
            Ok(json) => self.writer.schedule(json),
            Err(e) => warn!(error = %e, "Failed to encode tombstones"),
        }
    }
}

impl TombstoneObserver for TombstoneStore {
    fn mark_deleted(&self, id: &str) {
        let mut set = self.lock();
        self.lock_restored().remove(id);
        if set.insert(id) {
            debug!(id = id, "Tombstoned");
            self.persist_later(&set);
        }
    }

    fn mark_restored(&self, id: &str) {
        let mut set = self.lock();
        self.lock_restored().insert(id.to_string());
        if set.remove(id) {
            debug!(id = id, "Tombstone removed");
            self.persist_later(&set);
        }
    }
}
