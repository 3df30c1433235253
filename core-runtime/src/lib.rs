//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the inlay sync core:
//! - Logging and tracing infrastructure
//! - Configuration management with fail-fast validation
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions and assembles the host bridges
//! (HTTP client, asset store, settings store) the sync engine is built from.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, SyncSettings};
pub use error::{Error, Result};
