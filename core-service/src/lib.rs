//! Core service façade.
//!
//! Turns a validated [`CoreConfig`] into a ready-to-use sync stack: the
//! Google Drive namespace, tombstone store, creation-time index, local asset
//! wrapper, sync engine and auto-sync scheduler. Desktop hosts enable the
//! `desktop-shims` feature so the config builder fills in the SQLite stores
//! and the reqwest client.
//!
//! ```ignore
//! use core_runtime::CoreConfig;
//! use core_service::SyncService;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/inlays.db")
//!     .build()
//!     .await?;
//! let service = SyncService::new(config, token_provider).await?;
//! service.start_auto_sync().await?;
//!
//! let report = service.engine().merge_sync().await?;
//! service.shutdown().await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{RemoteObjectStore, RetryPolicy, SettingsStore};
use core_auth::TokenProvider;
use core_runtime::{CoreConfig, SyncSettings};
use core_sync::{AutoSyncScheduler, CreationTimeIndex, LocalAssets, SyncEngine, TombstoneStore};
use provider_google_drive::GoogleDriveConnector;
use tracing::{info, instrument};

/// The assembled sync stack of one signed-in host.
pub struct SyncService {
    settings: SyncSettings,
    settings_store: Arc<dyn SettingsStore>,
    drive: Arc<GoogleDriveConnector>,
    tombstones: Arc<TombstoneStore>,
    timeline: Arc<CreationTimeIndex>,
    local: Arc<LocalAssets>,
    engine: Arc<SyncEngine>,
    auto_sync: AutoSyncScheduler,
}

impl SyncService {
    /// Wire every component and load the persisted tombstones and creation
    /// times. Nothing talks to Drive until the first session.
    #[instrument(skip_all, fields(folder = %config.sync.folder_name))]
    pub async fn new(config: CoreConfig, token_provider: Arc<dyn TokenProvider>) -> Result<Self> {
        config.validate()?;
        let CoreConfig {
            http_client,
            settings_store,
            asset_store,
            clock,
            sync: settings,
            ..
        } = config;

        let retry_policy = RetryPolicy {
            max_attempts: settings.request_retries,
            ..RetryPolicy::default()
        };
        let drive = Arc::new(
            GoogleDriveConnector::new(http_client, Arc::clone(&token_provider))
                .with_folder_name(settings.folder_name.clone())
                .with_retry_policy(retry_policy),
        );
        let remote: Arc<dyn RemoteObjectStore> = drive.clone();

        let tombstones = Arc::new(TombstoneStore::new(
            Arc::clone(&settings_store),
            Arc::clone(&remote),
            settings.persist_delay,
        ));
        let deleted = tombstones.load().await?;

        let timeline = Arc::new(CreationTimeIndex::new(
            Arc::clone(&settings_store),
            clock,
            settings.persist_delay,
        ));
        let dated = timeline.load().await?;

        let local = Arc::new(
            LocalAssets::new(asset_store, tombstones.clone()).with_timeline(timeline.clone()),
        );
        let engine = Arc::new(
            SyncEngine::new(
                local.clone(),
                remote,
                tombstones.clone(),
                Arc::clone(&token_provider),
            )
            .with_concurrency(settings.concurrency),
        );
        let auto_sync = AutoSyncScheduler::new(
            engine.clone(),
            Arc::clone(&settings_store),
            token_provider,
        )
        .with_interval(settings.auto_sync_interval);

        info!(
            tombstones = deleted,
            creation_times = dated,
            concurrency = settings.concurrency,
            "Sync service ready"
        );

        Ok(Self {
            settings,
            settings_store,
            drive,
            tombstones,
            timeline,
            local,
            engine,
            auto_sync,
        })
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn settings_store(&self) -> Arc<dyn SettingsStore> {
        Arc::clone(&self.settings_store)
    }

    pub fn drive(&self) -> Arc<GoogleDriveConnector> {
        Arc::clone(&self.drive)
    }

    pub fn tombstones(&self) -> Arc<TombstoneStore> {
        Arc::clone(&self.tombstones)
    }

    pub fn timeline(&self) -> Arc<CreationTimeIndex> {
        Arc::clone(&self.timeline)
    }

    /// Local replica; creates and deletes made here maintain tombstones
    pub fn local(&self) -> Arc<LocalAssets> {
        Arc::clone(&self.local)
    }

    pub fn engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    pub fn auto_sync(&self) -> &AutoSyncScheduler {
        &self.auto_sync
    }

    /// Start auto sync if the user enabled it; see [`AutoSyncScheduler::init`]
    pub async fn start_auto_sync(&self) -> Result<bool> {
        Ok(self.auto_sync.init().await?)
    }

    /// Stop auto sync and write pending tombstones and creation times.
    ///
    /// A session that is already running is left to finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.auto_sync.stop();
        self.tombstones.flush().await?;
        self.timeline.flush().await?;
        self.drive.clear_cache();
        info!("Sync service shut down");
        Ok(())
    }
}
