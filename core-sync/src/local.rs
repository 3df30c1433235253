//! Local replica access.
//!
//! Every create and delete made through [`LocalAssets`] is reported to a
//! [`TombstoneObserver`] so that deletions travel to the other replica and a
//! re-created id is no longer considered deleted.

use bridge_traits::{AssetRecord, AssetStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::timeline::CreationTimeIndex;
use crate::tombstone::TombstoneObserver;

pub struct LocalAssets {
    store: Arc<dyn AssetStore>,
    observer: Arc<dyn TombstoneObserver>,
    timeline: Option<Arc<CreationTimeIndex>>,
}

impl LocalAssets {
    pub fn new(store: Arc<dyn AssetStore>, observer: Arc<dyn TombstoneObserver>) -> Self {
        Self {
            store,
            observer,
            timeline: None,
        }
    }

    /// Record first-seen times of created assets
    pub fn with_timeline(mut self, timeline: Arc<CreationTimeIndex>) -> Self {
        self.timeline = Some(timeline);
        self
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.store.keys().await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<AssetRecord>> {
        Ok(self.store.get(id).await?)
    }

    /// Create or overwrite an asset; clears its tombstone
    pub async fn put(&self, id: &str, record: &AssetRecord) -> Result<()> {
        self.store.put(id, record).await?;
        self.observer.mark_restored(id);
        if let Some(timeline) = &self.timeline {
            timeline.touch(id);
        }
        Ok(())
    }

    /// Store a copy received from the other replica.
    ///
    /// Not a user create, so tombstones are left alone.
    pub async fn put_synced(&self, id: &str, record: &AssetRecord) -> Result<()> {
        self.store.put(id, record).await?;
        if let Some(timeline) = &self.timeline {
            timeline.touch(id);
        }
        Ok(())
    }

    /// Delete an asset and tombstone it
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        self.observer.mark_deleted(id);
        self.forget_time(id);
        Ok(())
    }

    /// Delete without touching tombstones.
    ///
    /// Used for removals decided by sync itself: tombstone enforcement (the
    /// id is already tombstoned) and pruning (which must not tombstone).
    pub async fn delete_untracked(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        self.forget_time(id);
        debug!(id = id, "Removed local asset without tombstone");
        Ok(())
    }

    pub async fn get_all(&self) -> Result<HashMap<String, AssetRecord>> {
        let mut all = HashMap::new();
        for id in self.store.keys().await? {
            if let Some(record) = self.store.get(&id).await? {
                all.insert(id, record);
            }
        }
        Ok(all)
    }

    pub async fn has(&self, id: &str) -> Result<bool> {
        Ok(self.store.contains(id).await?)
    }

    fn forget_time(&self, id: &str) {
        if let Some(timeline) = &self.timeline {
            timeline.remove_many([id]);
        }
    }
}
