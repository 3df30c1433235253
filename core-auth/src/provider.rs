//! Token providers
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use bridge_traits::SettingsStore;
//! # use core_auth::{StoredTokenProvider, TokenProvider};
//! # async fn example(settings: Arc<dyn SettingsStore>) -> core_auth::Result<()> {
//! let provider = StoredTokenProvider::new(settings);
//! let bearer = provider.access_token().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bridge_traits::{Clock, SettingsStore, SystemClock};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AuthError, Result};
use crate::types::{AccessToken, DEFAULT_EXPIRY_BUFFER_SECS};

/// Settings key holding the signed-in flag
pub const IS_LOGGED_IN_KEY: &str = "is_logged_in";
/// Settings key holding the bearer value
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Settings key holding the RFC 3339 expiry time
pub const ACCESS_TOKEN_EXPIRES_KEY: &str = "access_token_expires";

/// Source of bearer credentials for remote calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A bearer token valid for at least the expiry buffer
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] when no credential exists,
    /// [`AuthError::TokenExpired`] when the stored one can no longer be used.
    async fn access_token(&self) -> Result<String>;

    /// Whether the user is signed in at all, regardless of token freshness
    async fn is_signed_in(&self) -> Result<bool> {
        match self.access_token().await {
            Ok(_) => Ok(true),
            Err(e) if e.requires_sign_in() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Provider that always hands out the same token
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Provider that reports a signed-out user
    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        self.token.clone().ok_or(AuthError::NotAuthenticated)
    }
}

/// Provider reading the credential the host keeps in its settings store.
///
/// The host's login and refresh flow writes `is_logged_in`, `access_token`
/// and `access_token_expires`; this provider only validates them.
pub struct StoredTokenProvider {
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    buffer_seconds: i64,
}

impl StoredTokenProvider {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            clock: Arc::new(SystemClock),
            buffer_seconds: DEFAULT_EXPIRY_BUFFER_SECS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_buffer_seconds(mut self, buffer_seconds: i64) -> Self {
        self.buffer_seconds = buffer_seconds;
        self
    }

    async fn logged_in_flag(&self) -> Result<bool> {
        let flag = self.settings.get_string(IS_LOGGED_IN_KEY).await?;
        Ok(matches!(flag.as_deref(), Some("1") | Some("true")))
    }

    /// Load the stored token without checking its expiry
    pub async fn load(&self) -> Result<AccessToken> {
        if !self.logged_in_flag().await? {
            return Err(AuthError::NotAuthenticated);
        }

        let value = self.settings.get_string(ACCESS_TOKEN_KEY).await?;
        let expires = self.settings.get_string(ACCESS_TOKEN_EXPIRES_KEY).await?;
        let (Some(value), Some(expires)) = (value, expires) else {
            debug!("Signed-in flag set but no stored access token");
            return Err(AuthError::NotAuthenticated);
        };
        if value.is_empty() {
            return Err(AuthError::NotAuthenticated);
        }

        let expires_at = DateTime::parse_from_rfc3339(expires.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                warn!(error = %e, "Stored token expiry is not a valid timestamp");
                AuthError::InvalidCredential(format!("{}: {}", ACCESS_TOKEN_EXPIRES_KEY, e))
            })?;

        Ok(AccessToken::new(value, expires_at))
    }
}

#[async_trait]
impl TokenProvider for StoredTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let token = self.load().await?;
        if token.is_expired_with_buffer(self.clock.now(), self.buffer_seconds) {
            debug!(expires_at = %token.expires_at(), "Stored access token expired");
            return Err(AuthError::TokenExpired {
                expires_at: token.expires_at(),
            });
        }
        Ok(token.into_secret())
    }

    async fn is_signed_in(&self) -> Result<bool> {
        self.logged_in_flag().await
    }
}
