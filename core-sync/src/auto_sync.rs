//! # Auto Sync
//!
//! Runs a merge sync on a fixed interval while the user keeps sync enabled
//! and stays signed in. The loop stops itself as soon as either condition
//! no longer holds; errors are logged, never propagated.

use bridge_traits::SettingsStore;
use core_auth::TokenProvider;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};

/// Settings key of the user's auto-sync switch
pub const SYNC_ENABLED_KEY: &str = "sync_enabled";

/// Default period between two runs
pub const DEFAULT_AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct Running {
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct AutoSyncScheduler {
    engine: Arc<SyncEngine>,
    settings: Arc<dyn SettingsStore>,
    token_provider: Arc<dyn TokenProvider>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl AutoSyncScheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        settings: Arc<dyn SettingsStore>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            engine,
            settings,
            token_provider,
            interval: DEFAULT_AUTO_SYNC_INTERVAL,
            running: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start the loop if sync is enabled and the user is signed in
    pub async fn init(&self) -> Result<bool> {
        if !is_enabled(self.settings.as_ref()).await? {
            debug!("Auto sync disabled in settings");
            return Ok(false);
        }
        self.start().await
    }

    /// Start the loop. Idempotent; returns whether it is running afterwards.
    pub async fn start(&self) -> Result<bool> {
        if self.is_running() {
            debug!("Auto sync already running");
            return Ok(true);
        }

        if !self.token_provider.is_signed_in().await? {
            warn!("Cannot start auto sync: not logged in");
            return Ok(false);
        }

        let mut running = self.lock();
        if running.as_ref().is_some_and(|r| !r.token.is_cancelled()) {
            return Ok(true);
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.settings),
            Arc::clone(&self.token_provider),
            self.interval,
            token.clone(),
        ));
        *running = Some(Running { token, task });

        info!(
            interval_secs = self.interval.as_secs(),
            "Auto sync started"
        );
        Ok(true)
    }

    /// Stop the loop; a session already running finishes on its own
    pub fn stop(&self) {
        if let Some(running) = self.lock().take() {
            running.token.cancel();
            info!("Auto sync stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|r| !r.token.is_cancelled() && !r.task.is_finished())
    }
}

impl Drop for AutoSyncScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.lock().take() {
            running.token.cancel();
        }
    }
}

/// `"true"` or the legacy numeric `"1"` mean enabled
async fn is_enabled(settings: &dyn SettingsStore) -> Result<bool> {
    let value = settings.get_string(SYNC_ENABLED_KEY).await?;
    Ok(matches!(value.as_deref().map(str::trim), Some("true" | "1")))
}

async fn should_continue(settings: &dyn SettingsStore, tokens: &dyn TokenProvider) -> bool {
    match is_enabled(settings).await {
        Ok(true) => {}
        Ok(false) => return false,
        Err(e) => {
            warn!(error = %e, "Could not read auto sync setting");
            return false;
        }
    }

    match tokens.is_signed_in().await {
        Ok(signed_in) => signed_in,
        Err(e) => {
            warn!(error = %e, "Could not check sign-in state");
            false
        }
    }
}

async fn run_loop(
    engine: Arc<SyncEngine>,
    settings: Arc<dyn SettingsStore>,
    token_provider: Arc<dyn TokenProvider>,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !should_continue(settings.as_ref(), token_provider.as_ref()).await {
            info!("Auto sync conditions no longer met, stopping");
            token.cancel();
            break;
        }

        run_cycle(&engine).await;
    }
}

async fn run_cycle(engine: &SyncEngine) {
    info!("Auto sync: starting merge sync");
    match engine.merge_sync().await {
        Ok(report) => {
            info!(
                uploaded = report.uploaded,
                downloaded = report.downloaded,
                deleted = report.deleted,
                "Auto sync complete"
            );
            if !report.is_clean() {
                warn!(errors = ?report.errors, "Auto sync had errors");
            }
        }
        Err(SyncError::AlreadyInProgress) => info!("Auto sync skipped: sync already in progress"),
        Err(e) if e.is_cancelled() => info!("Auto sync cancelled"),
        Err(e) => error!(error = %e, "Auto sync failed"),
    }
}
