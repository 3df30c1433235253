use bridge_traits::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync already in progress")]
    AlreadyInProgress,

    #[error("User is not logged in")]
    NotAuthenticated,

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Cancellation is a neutral outcome, not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::NotAvailable(msg) | BridgeError::OperationFailed(msg) => {
                SyncError::Transport(msg)
            }
            BridgeError::Storage(msg) => SyncError::Storage(msg),
            BridgeError::InvalidPayload { key, reason } => {
                SyncError::Serialization(format!("{}: {}", key, reason))
            }
            BridgeError::Io(e) => SyncError::Storage(e.to_string()),
        }
    }
}

impl From<AuthError> for SyncError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::StorageUnavailable(msg) => SyncError::Storage(msg),
            _ => SyncError::NotAuthenticated,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_errors_map_to_sync_errors() {
        assert!(matches!(
            SyncError::from(BridgeError::OperationFailed("503".into())),
            SyncError::Transport(_)
        ));
        assert!(matches!(
            SyncError::from(BridgeError::Storage("locked".into())),
            SyncError::Storage(_)
        ));
        let err = SyncError::from(BridgeError::InvalidPayload {
            key: "abc".into(),
            reason: "bad base64".into(),
        });
        assert_eq!(err.to_string(), "Serialization error: abc: bad base64");
    }

    #[test]
    fn test_auth_errors_require_sign_in() {
        assert!(matches!(
            SyncError::from(AuthError::NotAuthenticated),
            SyncError::NotAuthenticated
        ));
        assert!(matches!(
            SyncError::from(AuthError::StorageUnavailable("gone".into())),
            SyncError::Storage(_)
        ));
    }

    #[test]
    fn test_only_cancelled_is_neutral() {
        assert!(SyncError::Cancelled.is_cancelled());
        assert!(!SyncError::AlreadyInProgress.is_cancelled());
    }
}
