//! # Deferred Settings Writer
//!
//! Coalesces bursts of writes to one settings key. Each [`schedule`]
//! replaces the pending value and re-arms the timer, so only the last value
//! of a burst reaches the store, `delay` after the burst ends.
//!
//! [`schedule`]: DeferredWriter::schedule

use bridge_traits::SettingsStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

pub struct DeferredWriter {
    settings: Arc<dyn SettingsStore>,
    key: String,
    delay: Duration,
    pending: Arc<Mutex<Option<String>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl DeferredWriter {
    pub fn new(settings: Arc<dyn SettingsStore>, key: impl Into<String>, delay: Duration) -> Self {
        Self {
            settings,
            key: key.into(),
            delay,
            pending: Arc::new(Mutex::new(None)),
            timer: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether a value is waiting to be written
    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Replace the pending value and restart the quiet interval.
    ///
    /// Outside a Tokio runtime nothing is spawned; the value waits for
    /// [`flush`](Self::flush).
    pub fn schedule(&self, value: String) {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(value);
        self.cancel_timer();

        let Ok(handle) = Handle::try_current() else {
            debug!(key = %self.key, "No runtime, write deferred until flush");
            return;
        };

        let settings = Arc::clone(&self.settings);
        let pending = Arc::clone(&self.pending);
        let key = self.key.clone();
        let delay = self.delay;

        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let value = pending.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(value) = value {
                if let Err(e) = settings.set_string(&key, &value).await {
                    warn!(key = %key, error = %e, "Deferred settings write failed");
                }
            }
        });

        *self.timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    /// Write the pending value now, if any
    pub async fn flush(&self) -> Result<()> {
        self.cancel_timer();
        let value = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(value) = value {
            self.settings.set_string(&self.key, &value).await?;
            debug!(key = %self.key, "Flushed deferred write");
        }
        Ok(())
    }

    /// Drop anything pending and write `value` immediately
    pub async fn write_now(&self, value: &str) -> Result<()> {
        self.cancel_timer();
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.settings.set_string(&self.key, value).await?;
        Ok(())
    }

    fn cancel_timer(&self) {
        if let Some(task) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

impl Drop for DeferredWriter {
    fn drop(&mut self) {
        self.cancel_timer();

        let value = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(value) = value else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                let settings = Arc::clone(&self.settings);
                let key = std::mem::take(&mut self.key);
                handle.spawn(async move {
                    if let Err(e) = settings.set_string(&key, &value).await {
                        warn!(key = %key, error = %e, "Final deferred write failed");
                    }
                });
            }
            Err(_) => warn!(key = %self.key, "Dropped pending write outside a runtime"),
        }
    }
}
