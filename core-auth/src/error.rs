use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Access token expired at {expires_at}")]
    TokenExpired {
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("Stored credential is malformed: {0}")]
    InvalidCredential(String),

    #[error("Credential storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl AuthError {
    /// Whether the user has to sign in again before any remote call can succeed
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated | AuthError::TokenExpired { .. }
        )
    }
}

impl From<bridge_traits::BridgeError> for AuthError {
    fn from(err: bridge_traits::BridgeError) -> Self {
        AuthError::StorageUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
