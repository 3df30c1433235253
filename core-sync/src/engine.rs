//! # Sync Engine
//!
//! Reconciles the local asset store with the remote namespace.
//!
//! ## Session
//!
//! ```text
//! Idle → Preparing → Deleting → Uploading → Downloading → Complete → Idle
//! ```
//!
//! 1. Merge tombstones (local ∪ remote, written back to both sides)
//! 2. Preload the remote file index
//! 3. Delete every tombstoned id from whichever side still has it
//! 4. Upload ids only present locally, download ids only present remotely
//! 5. Optionally prune ids present on one side only
//!
//! Reconciliation is by existence: an id present on both sides is never
//! touched, whatever its content.
//!
//! Only one session runs per engine. A second call while one is active fails
//! with [`SyncError::AlreadyInProgress`] instead of queueing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncEngine, SyncOptions};
//!
//! let engine = SyncEngine::new(local, remote, tombstones, token_provider);
//! engine.set_progress_callback(|p| println!("{} {}/{}", p.phase, p.current, p.total));
//!
//! let report = engine.sync(SyncOptions::merge()).await?;
//! println!("up {} down {} errors {}", report.uploaded, report.downloaded, report.errors.len());
//! ```

use bridge_traits::RemoteObjectStore;
use core_auth::TokenProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::local::LocalAssets;
use crate::pool::{run_bounded, CancelFlag, CancelHandle};
use crate::progress::{ProgressReporter, SyncPhase, SyncProgress};
use crate::tombstone::{TombstoneSet, TombstoneStore, REMOTE_TOMBSTONES_KEY};

/// Default number of in-flight transfers per phase
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Identifier attached to the log span of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Idle,
    Preparing,
    Deleting,
    Uploading,
    Downloading,
    Complete,
}

/// What a session is allowed to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upload ids missing remotely
    pub upload: bool,
    /// Download ids missing locally
    pub download: bool,
    /// Delete local ids that are missing remotely
    pub delete_local: bool,
    /// Delete remote ids that are missing locally
    pub delete_drive: bool,
    /// In-flight transfers; the engine default when `None`
    pub concurrency: Option<usize>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::merge()
    }
}

impl SyncOptions {
    /// Upload only (backup)
    pub fn push() -> Self {
        Self {
            upload: true,
            download: false,
            delete_local: false,
            delete_drive: false,
            concurrency: None,
        }
    }

    /// Download only (restore)
    pub fn pull() -> Self {
        Self {
            upload: false,
            download: true,
            ..Self::push()
        }
    }

    /// Both directions, no pruning
    pub fn merge() -> Self {
        Self {
            upload: true,
            download: true,
            ..Self::push()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemError {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub uploaded: usize,
    pub downloaded: usize,
    pub deleted: usize,
    pub errors: Vec<SyncItemError>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record_error(&mut self, id: &str, error: &SyncError) {
        warn!(id = id, error = %error, "Sync item failed");
        self.errors.push(SyncItemError {
            id: id.to_string(),
            error: error.to_string(),
        });
    }
}

/// Outcome of one pooled item
enum ItemOutcome {
    Done,
    Skipped,
}

pub struct SyncEngine {
    local: Arc<LocalAssets>,
    remote: Arc<dyn RemoteObjectStore>,
    tombstones: Arc<TombstoneStore>,
    token_provider: Arc<dyn TokenProvider>,
    concurrency: usize,
    in_progress: AtomicBool,
    state: Mutex<EngineState>,
    cancel: CancelFlag,
    progress: ProgressReporter,
}

/// Releases the session on every exit path
struct SessionGuard<'a> {
    engine: &'a SyncEngine,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.engine.remote.clear_index();
        self.engine.set_state(EngineState::Idle);
        self.engine.in_progress.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    pub fn new(
        local: Arc<LocalAssets>,
        remote: Arc<dyn RemoteObjectStore>,
        tombstones: Arc<TombstoneStore>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            local,
            remote,
            tombstones,
            token_provider,
            concurrency: DEFAULT_CONCURRENCY,
            in_progress: AtomicBool::new(false),
            state: Mutex::new(EngineState::Idle),
            cancel: CancelFlag::new(),
            progress: ProgressReporter::new(),
        }
    }

    /// Default in-flight transfers for sessions that do not set their own
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Ask the running session to stop at its next checkpoint
    pub fn cancel_sync(&self) {
        if self.is_sync_in_progress() {
            info!("Sync cancellation requested");
            self.cancel.cancel();
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.handle()
    }

    pub fn set_progress_callback<F>(&self, callback: F)
    where
        F: Fn(&SyncProgress) + Send + Sync + 'static,
    {
        self.progress.set_observer(Some(Arc::new(callback)));
    }

    pub fn clear_progress_callback(&self) {
        self.progress.set_observer(None);
    }

    pub fn get_progress(&self) -> SyncProgress {
        self.progress.snapshot()
    }

    pub async fn push_to_cloud(&self) -> Result<SyncReport> {
        self.sync(SyncOptions::push()).await
    }

    pub async fn pull_from_cloud(&self) -> Result<SyncReport> {
        self.sync(SyncOptions::pull()).await
    }

    pub async fn merge_sync(&self) -> Result<SyncReport> {
        self.sync(SyncOptions::merge()).await
    }

    /// Forget every tombstone on both sides.
    ///
    /// Refused while a session runs, since the session works from a merged
    /// snapshot.
    pub async fn clear_tombstones(&self) -> Result<()> {
        if self.is_sync_in_progress() {
            return Err(SyncError::AlreadyInProgress);
        }
        self.tombstones.clear_all().await
    }

    /// Run one session.
    ///
    /// # Errors
    ///
    /// - `AlreadyInProgress` / `NotAuthenticated` before anything changes
    /// - `Cancelled` when [`cancel_sync`](Self::cancel_sync) was observed
    /// - transport or storage errors from the tombstone merge and index
    ///   preload; failures of single items land in [`SyncReport::errors`]
    pub async fn sync(&self, options: SyncOptions) -> Result<SyncReport> {
        if self.is_sync_in_progress() {
            return Err(SyncError::AlreadyInProgress);
        }

        if let Err(e) = self.token_provider.access_token().await {
            warn!(error = %e, "Sync refused without a usable credential");
            return Err(e.into());
        }

        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyInProgress);
        }
        let _guard = SessionGuard { engine: self };

        // A request made before this session started does not apply to it
        self.cancel.take();

        let session = SessionId::new();
        let span = info_span!("sync_session", session_id = %session);
        let result = self.run_session(options).instrument(span.clone()).await;

        span.in_scope(|| match &result {
            Ok(report) => info!(
                uploaded = report.uploaded,
                downloaded = report.downloaded,
                deleted = report.deleted,
                errors = report.errors.len(),
                "Sync complete"
            ),
            Err(e) if e.is_cancelled() => {
                let progress = self.progress.snapshot();
                info!(
                    phase = %progress.phase,
                    completed = progress.current,
                    planned = progress.total,
                    "Sync cancelled"
                )
            }
            Err(e) => warn!(error = %e, "Sync failed"),
        });
        result
    }

    async fn run_session(&self, options: SyncOptions) -> Result<SyncReport> {
        let concurrency = options.concurrency.unwrap_or(self.concurrency).max(1);
        let mut report = SyncReport::default();

        self.set_state(EngineState::Preparing);
        self.progress.begin_phase(SyncPhase::Preparing, 0);

        let tombstones = self.tombstones.merge().await?;
        self.remote.preload_index().await?;

        let local_ids: BTreeSet<String> = self.local.keys().await?.into_iter().collect();
        let remote_ids: BTreeSet<String> = self
            .remote
            .list()
            .await?
            .into_keys()
            .filter(|key| key != REMOTE_TOMBSTONES_KEY)
            .collect();

        info!(
            local = local_ids.len(),
            remote = remote_ids.len(),
            tombstones = tombstones.len(),
            "Starting sync"
        );
        self.cancel.check()?;

        self.enforce_tombstones(&tombstones, &local_ids, &remote_ids, concurrency, &mut report)
            .await?;

        let active_local: BTreeSet<String> = without(&local_ids, &tombstones);
        let active_remote: BTreeSet<String> = without(&remote_ids, &tombstones);

        let mut local_now = active_local.clone();
        let mut remote_now = active_remote.clone();

        if options.upload {
            let to_upload: Vec<String> = active_local.difference(&active_remote).cloned().collect();
            let uploaded = self.upload_all(to_upload, concurrency, &mut report).await?;
            remote_now.extend(uploaded);
        }

        if options.download {
            let to_download: Vec<String> =
                active_remote.difference(&active_local).cloned().collect();
            let downloaded = self.download_all(to_download, concurrency, &mut report).await?;
            local_now.extend(downloaded);
        }

        if options.delete_local || options.delete_drive {
            self.set_state(EngineState::Deleting);
            self.prune(&options, &local_now, &remote_now, &mut report)
                .await?;
        }

        self.set_state(EngineState::Complete);
        self.progress.complete();
        Ok(report)
    }

    /// Remove tombstoned ids from both sides
    async fn enforce_tombstones(
        &self,
        tombstones: &TombstoneSet,
        local_ids: &BTreeSet<String>,
        remote_ids: &BTreeSet<String>,
        concurrency: usize,
        report: &mut SyncReport,
    ) -> Result<()> {
        let doomed: Vec<(String, bool, bool)> = local_ids
            .union(remote_ids)
            .filter(|id| tombstones.contains(id.as_str()))
            .map(|id| {
                (
                    id.clone(),
                    local_ids.contains(id.as_str()),
                    remote_ids.contains(id.as_str()),
                )
            })
            .collect();

        self.set_state(EngineState::Deleting);
        self.progress.begin_phase(SyncPhase::Deleting, doomed.len());
        if doomed.is_empty() {
            return Ok(());
        }
        debug!(count = doomed.len(), "Applying tombstones");

        let ids: Vec<String> = doomed.iter().map(|(id, _, _)| id.clone()).collect();
        let results = run_bounded(doomed, concurrency, &self.cancel, move |item| async move {
            let (id, in_local, in_remote) = item;
            // Deleted records are not loaded, so the id stands in for the name
            self.progress.start_item(&id);
            let outcome = self.delete_everywhere(&id, in_local, in_remote).await;
            self.progress.finish_item();
            outcome
        })
        .await?;

        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(ItemOutcome::Done) => report.deleted += 1,
                Ok(ItemOutcome::Skipped) => debug!(id = %id, "Restored during sync, kept"),
                Err(e) => report.record_error(id, &e),
            }
        }
        Ok(())
    }

    async fn delete_everywhere(
        &self,
        id: &str,
        in_local: bool,
        in_remote: bool,
    ) -> Result<ItemOutcome> {
        // Re-created since the merge: the create wins
        if !self.tombstones.contains(id) {
            return Ok(ItemOutcome::Skipped);
        }
        if in_local {
            self.local.delete_untracked(id).await?;
        }
        if in_remote {
            self.remote.delete(id).await?;
        }
        Ok(ItemOutcome::Done)
    }

    /// Returns the ids that now exist remotely
    async fn upload_all(
        &self,
        ids: Vec<String>,
        concurrency: usize,
        report: &mut SyncReport,
    ) -> Result<Vec<String>> {
        self.set_state(EngineState::Uploading);
        self.progress.begin_phase(SyncPhase::Uploading, ids.len());
        info!(count = ids.len(), "Uploading inlays");

        let results = run_bounded(ids.clone(), concurrency, &self.cancel, move |id| async move {
            let outcome = self.upload_one(&id).await;
            self.progress.finish_item();
            outcome
        })
        .await?;

        let mut uploaded = Vec::new();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(ItemOutcome::Done) => {
                    report.uploaded += 1;
                    uploaded.push(id);
                }
                Ok(ItemOutcome::Skipped) => debug!(id = %id, "Vanished before upload"),
                Err(e) => report.record_error(&id, &e),
            }
        }
        Ok(uploaded)
    }

    async fn upload_one(&self, id: &str) -> Result<ItemOutcome> {
        let Some(record) = self.local.get(id).await? else {
            return Ok(ItemOutcome::Skipped);
        };
        self.progress.start_item(&record.name);
        self.remote.put(id, &record).await?;
        debug!(id = id, name = %record.name, "Uploaded");
        Ok(ItemOutcome::Done)
    }

    /// Returns the ids that now exist locally
    async fn download_all(
        &self,
        ids: Vec<String>,
        concurrency: usize,
        report: &mut SyncReport,
    ) -> Result<Vec<String>> {
        self.set_state(EngineState::Downloading);
        self.progress.begin_phase(SyncPhase::Downloading, ids.len());
        info!(count = ids.len(), "Downloading inlays");

        let results = run_bounded(ids.clone(), concurrency, &self.cancel, move |id| async move {
            let outcome = self.download_one(&id).await;
            self.progress.finish_item();
            outcome
        })
        .await?;

        let mut downloaded = Vec::new();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(ItemOutcome::Done) => {
                    report.downloaded += 1;
                    downloaded.push(id);
                }
                Ok(ItemOutcome::Skipped) => debug!(id = %id, "Vanished before download"),
                Err(e) => report.record_error(&id, &e),
            }
        }
        Ok(downloaded)
    }

    async fn download_one(&self, id: &str) -> Result<ItemOutcome> {
        let Some(record) = self.remote.get(id).await? else {
            return Ok(ItemOutcome::Skipped);
        };
        self.progress.start_item(&record.name);
        let record = record.into_native()?;
        self.local.put_synced(id, &record).await?;
        debug!(id = id, name = %record.name, "Downloaded");
        Ok(ItemOutcome::Done)
    }

    /// Sequential removal of ids present on one side only
    async fn prune(
        &self,
        options: &SyncOptions,
        local_now: &BTreeSet<String>,
        remote_now: &BTreeSet<String>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let local_only: Vec<&String> = if options.delete_local {
            local_now.difference(remote_now).collect()
        } else {
            Vec::new()
        };
        let remote_only: Vec<&String> = if options.delete_drive {
            remote_now.difference(local_now).collect()
        } else {
            Vec::new()
        };

        self.progress
            .begin_phase(SyncPhase::Deleting, local_only.len() + remote_only.len());
        info!(
            local = local_only.len(),
            remote = remote_only.len(),
            "Pruning one-sided inlays"
        );

        for id in local_only {
            self.cancel.check()?;
            self.progress.start_item(id);
            match self.local.delete_untracked(id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => report.record_error(id, &e),
            }
            self.progress.finish_item();
        }

        for id in remote_only {
            self.cancel.check()?;
            self.progress.start_item(id);
            match self.remote.delete(id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => report.record_error(id, &SyncError::from(e)),
            }
            self.progress.finish_item();
        }
        Ok(())
    }
}

fn without(ids: &BTreeSet<String>, tombstones: &TombstoneSet) -> BTreeSet<String> {
    ids.iter()
        .filter(|id| !tombstones.contains(id.as_str()))
        .cloned()
        .collect()
}
