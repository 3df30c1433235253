//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `AssetStore` using a SQLite table of asset records
//! - `SettingsStore` using a SQLite-backed key-value table
//!
//! Both SQLite stores can share one pool opened with [`open_database`].
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{open_database, ReqwestHttpClient, SqliteAssetStore, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let pool = open_database("inlays.db".into()).await?;
//!     let assets = SqliteAssetStore::from_pool(pool.clone()).await?;
//!     let settings = SqliteSettingsStore::from_pool(pool).await?;
//!     let http_client = ReqwestHttpClient::new();
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod assets;
mod db;
mod http;
mod settings;

pub use assets::SqliteAssetStore;
pub use db::{open_database, open_in_memory};
pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;
