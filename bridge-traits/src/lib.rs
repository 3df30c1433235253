//! # Host Bridge Traits
//!
//! Platform abstraction traits that the sync core relies on but that each host
//! implements differently.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync core and the host
//! environment. The core never talks to a browser store, a SQLite file or a
//! cloud API directly; it goes through the traits below.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry policy
//!
//! ### Storage
//! - [`AssetStore`](storage::AssetStore) - Local keyed store for asset records
//! - [`RemoteObjectStore`](storage::RemoteObjectStore) - Remote namespace of JSON objects
//! - [`SettingsStore`](storage::SettingsStore) - Named string values (tombstones, indices, flags)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Data Model
//!
//! [`AssetRecord`](asset::AssetRecord) is the unit exchanged between the two
//! replicas. Its payload is raw bytes on the local side and base64 text on
//! the remote side; see [`AssetPayload`](asset::AssetPayload).
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform-specific errors into it with enough context (key,
//! status code, operation) to make the failure actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so that a single implementation can
//! be shared by the sync engine's concurrent workers.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::storage::AssetStore;
//!
//! async fn count_assets(store: &dyn AssetStore) -> bridge_traits::error::Result<usize> {
//!     Ok(store.keys().await?.len())
//! }
//! ```

pub mod asset;
pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use asset::{AssetPayload, AssetRecord, MediaType};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{AssetStore, RemoteObjectStore, SettingsStore};
pub use time::{Clock, ManualClock, SystemClock};
