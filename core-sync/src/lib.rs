//! # Inlay Sync Core
//!
//! Two-replica synchronization of inlay assets between the local store and a
//! remote namespace.
//!
//! ## Overview
//!
//! Sessions reconcile by existence: ids missing on one side are copied over,
//! tombstoned ids are deleted everywhere, and ids present on both sides are
//! left alone.
//!
//! ## Components
//!
//! - **Sync Engine** (`engine`): Session state machine, single-flight guard and reporting
//! - **Tombstones** (`tombstone`): Grow-only set of deleted ids shared by both replicas
//! - **Worker Pool** (`pool`): Bounded concurrency with cooperative cancellation
//! - **Progress** (`progress`): Snapshot plus observer callback
//! - **Local Assets** (`local`): Local store wrapper that reports creates and deletes
//! - **Creation Times** (`timeline`): First-seen timestamp per asset
//! - **Deferred Writer** (`deferred`): Debounced persistence of settings values
//! - **Auto Sync** (`auto_sync`): Periodic merge sync while enabled

pub mod auto_sync;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod local;
pub mod pool;
pub mod progress;
pub mod timeline;
pub mod tombstone;

pub use auto_sync::{AutoSyncScheduler, SYNC_ENABLED_KEY};
pub use deferred::DeferredWriter;
pub use engine::{
    EngineState, SessionId, SyncEngine, SyncItemError, SyncOptions, SyncReport,
    DEFAULT_CONCURRENCY,
};
pub use error::{Result, SyncError};
pub use local::LocalAssets;
pub use pool::{run_bounded, CancelFlag, CancelHandle};
pub use progress::{ProgressCallback, ProgressReporter, SyncPhase, SyncProgress};
pub use timeline::{CreationTimeIndex, CREATION_TIMES_KEY};
pub use tombstone::{
    TombstoneObserver, TombstoneSet, TombstoneStore, LOCAL_TOMBSTONES_KEY, REMOTE_TOMBSTONES_KEY,
};
