//! # Bounded Worker Pool
//!
//! Runs an async worker over a list of items with at most `concurrency`
//! requests in flight. Workers are plain futures joined on the calling task,
//! so parallelism means overlapping I/O, not threads.
//!
//! Every worker claims the next input index from a shared cursor; the result
//! is written to the slot with the same index, so output order always matches
//! input order regardless of completion order.

use crate::error::{Result, SyncError};
use futures::future::try_join_all;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cooperative cancellation flag owned by a sync engine
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    requested: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation is pending, without consuming it
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Consume a pending request; returns `true` if one was set
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    /// `Err(Cancelled)` if a request was pending
    pub fn check(&self) -> Result<()> {
        if self.take() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// A handle that can only request cancellation
    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            requested: Arc::clone(&self.requested),
        }
    }
}

/// Cloneable handle for cancelling a running session from elsewhere
#[derive(Debug, Clone)]
pub struct CancelHandle {
    requested: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run `worker` over `items` with at most `concurrency` futures in flight.
///
/// The cancellation flag is checked (and cleared) before every claim. Once
/// one worker observes it, no worker claims another item and the call
/// returns [`SyncError::Cancelled`]. Worker failures are not pool failures:
/// make `R` a `Result` and they come back in their slots.
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    cancel: &CancelFlag,
    worker: F,
) -> Result<Vec<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let len = items.len();
    if len == 0 {
        return Ok(Vec::new());
    }

    let inputs: Vec<Mutex<Option<T>>> = items.into_iter().map(|i| Mutex::new(Some(i))).collect();
    let outputs: Vec<Mutex<Option<R>>> = (0..len).map(|_| Mutex::new(None)).collect();
    let cursor = AtomicUsize::new(0);
    // The flag is consumed by the first worker to see it; the others stop on this
    let stopped = AtomicBool::new(false);

    let (inputs_ref, outputs_ref, cursor_ref, worker_ref) = (&inputs, &outputs, &cursor, &worker);
    let stopped_ref = &stopped;
    let workers = (0..concurrency.clamp(1, len)).map(|_| async move {
        loop {
            if stopped_ref.load(Ordering::SeqCst) {
                return Err(SyncError::Cancelled);
            }
            if let Err(e) = cancel.check() {
                stopped_ref.store(true, Ordering::SeqCst);
                return Err(e);
            }

            let index = cursor_ref.fetch_add(1, Ordering::SeqCst);
            if index >= len {
                return Ok::<(), SyncError>(());
            }

            let item = lock(&inputs_ref[index]).take();
            let Some(item) = item else {
                continue;
            };

            let result = worker_ref(item).await;
            *lock(&outputs_ref[index]) = Some(result);
        }
    });

    try_join_all(workers).await?;

    Ok(outputs
        .into_iter()
        .filter_map(|slot| slot.into_inner().unwrap_or_else(|e| e.into_inner()))
        .collect())
}
