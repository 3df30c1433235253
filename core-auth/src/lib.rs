//! # Authentication Module
//!
//! Bearer credentials for the remote object store.
//!
//! ## Overview
//!
//! The sync core never runs a login flow. It asks a [`TokenProvider`] for a
//! valid access token right before talking to the remote store and treats
//! any failure as "not signed in". Acquiring and refreshing tokens is the
//! host's job; the host writes the result into its settings store where
//! [`StoredTokenProvider`] picks it up.
//!
//! ## Features
//!
//! - Expiry check with a safety buffer (60 seconds by default)
//! - Redacted `Debug` output for tokens
//! - A fixed-token provider for tests and scripted hosts

pub mod error;
pub mod provider;
pub mod types;

pub use error::{AuthError, Result};
pub use provider::{StaticTokenProvider, StoredTokenProvider, TokenProvider};
pub use types::AccessToken;
