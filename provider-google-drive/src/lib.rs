//! # Google Drive Provider
//!
//! Implements `RemoteObjectStore` on top of the Google Drive API v3.
//!
//! ## Overview
//!
//! All objects live in one folder inside the hidden `appDataFolder` space,
//! one `<key>.json` file per key. This module provides:
//! - Idempotent folder creation with a cached folder id
//! - Paginated listing of the folder
//! - A per-session key → file id index so batch operations skip the
//!   per-file name search
//! - Media (PATCH) updates and multipart creates
//! - Exponential backoff for rate limiting and server errors

pub mod connector;
pub mod error;
pub mod types;

pub use connector::GoogleDriveConnector;
pub use error::{GoogleDriveError, Result};
