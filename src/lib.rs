//! Workspace placeholder crate.
//!
//! This crate exposes the `desktop-shims` feature that maps onto the
//! `core-service` façade. Host applications can depend on
//! `inlay-sync-workspace` and get the Drive-backed sync service wired with the
//! desktop bridges without listing each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreError, SyncService};
