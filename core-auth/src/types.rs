use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of seconds before expiry at which a token is no longer used
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 60;

/// Bearer access token with its expiry time.
///
/// # Security
///
/// The `Debug` implementation redacts the token value so it never ends up in
/// logs.
///
/// # Examples
///
/// ```
/// use core_auth::AccessToken;
/// use chrono::{Duration, Utc};
///
/// let token = AccessToken::new("ya29.a0...", Utc::now() + Duration::hours(1));
/// assert!(!token.is_expired_at(Utc::now()));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// The raw bearer value
    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Expired, or expiring within the default buffer, as seen at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_expired_with_buffer(now, DEFAULT_EXPIRY_BUFFER_SECS)
    }

    /// Expired, or expiring within `buffer_seconds`, as seen at `now`
    pub fn is_expired_with_buffer(&self, now: DateTime<Utc>, buffer_seconds: i64) -> bool {
        now + Duration::seconds(buffer_seconds) >= self.expires_at
    }

    pub fn into_secret(self) -> String {
        self.value
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
