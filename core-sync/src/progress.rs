//! Sync progress snapshot and observer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Phase of a running session, as reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Preparing,
    Uploading,
    Downloading,
    Deleting,
    Complete,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Preparing => "preparing",
            SyncPhase::Uploading => "uploading",
            SyncPhase::Downloading => "downloading",
            SyncPhase::Deleting => "deleting",
            SyncPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// Items finished in this phase
    pub current: usize,
    /// Items planned for this phase
    pub total: usize,
    /// Asset name of the latest item; the id while deleting
    pub current_item_name: Option<String>,
}

impl SyncProgress {
    /// Completion of the current phase in percent
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return if self.phase == SyncPhase::Complete { 100 } else { 0 };
        }
        ((self.current.min(self.total) * 100) / self.total) as u8
    }
}

pub type ProgressCallback = Arc<dyn Fn(&SyncProgress) + Send + Sync>;

/// Holds the latest snapshot and notifies the observer on every update
#[derive(Default)]
pub struct ProgressReporter {
    snapshot: Mutex<SyncProgress>,
    observer: Mutex<Option<ProgressCallback>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_observer(&self, observer: Option<ProgressCallback>) {
        *self.observer.lock().unwrap_or_else(|e| e.into_inner()) = observer;
    }

    pub fn snapshot(&self) -> SyncProgress {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn begin_phase(&self, phase: SyncPhase, total: usize) {
        self.update(|p| {
            *p = SyncProgress {
                phase,
                current: 0,
                total,
                current_item_name: None,
            }
        });
    }

    pub fn start_item(&self, name: &str) {
        self.update(|p| p.current_item_name = Some(name.to_string()));
    }

    pub fn finish_item(&self) {
        self.update(|p| p.current += 1);
    }

    pub fn complete(&self) {
        self.update(|p| {
            *p = SyncProgress {
                phase: SyncPhase::Complete,
                current: p.total,
                total: p.total,
                current_item_name: None,
            }
        });
    }

    // The observer runs outside both locks so it may call back into the engine
    fn update(&self, change: impl FnOnce(&mut SyncProgress)) {
        let snapshot = {
            let mut progress = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
            change(&mut progress);
            progress.clone()
        };

        let observer = self
            .observer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(observer) = observer {
            observer(&snapshot);
        }
    }
}
