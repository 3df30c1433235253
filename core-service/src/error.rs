use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),
}

impl CoreError {
    /// Whether the user has to sign in before retrying
    pub fn requires_sign_in(&self) -> bool {
        match self {
            CoreError::Auth(e) => e.requires_sign_in(),
            CoreError::Sync(e) => matches!(e, core_sync::SyncError::NotAuthenticated),
            CoreError::Runtime(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
