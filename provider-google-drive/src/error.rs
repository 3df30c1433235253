//! Error types for Google Drive provider

use thiserror::Error;

/// Google Drive provider errors
#[derive(Error, Debug)]
pub enum GoogleDriveError {
    /// No usable bearer token
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Google Drive API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Failed to build a request body
    #[error("Failed to encode request: {0}")]
    EncodeError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] bridge_traits::error::BridgeError),
}

impl GoogleDriveError {
    /// The file vanished between lookup and access
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GoogleDriveError::ApiError {
                status_code: 404,
                ..
            }
        )
    }
}

impl From<core_auth::AuthError> for GoogleDriveError {
    fn from(error: core_auth::AuthError) -> Self {
        GoogleDriveError::AuthenticationFailed(error.to_string())
    }
}

/// Result type for Google Drive operations
pub type Result<T> = std::result::Result<T, GoogleDriveError>;

impl From<GoogleDriveError> for bridge_traits::error::BridgeError {
    fn from(error: GoogleDriveError) -> Self {
        use bridge_traits::error::BridgeError;

        match error {
            GoogleDriveError::AuthenticationFailed(msg) => {
                BridgeError::NotAvailable(format!("Google Drive credential: {}", msg))
            }
            GoogleDriveError::ApiError {
                status_code,
                message,
            } => BridgeError::OperationFailed(format!(
                "Google Drive API error (status {}): {}",
                status_code, message
            )),
            GoogleDriveError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            GoogleDriveError::EncodeError(msg) => {
                BridgeError::OperationFailed(format!("Encode error: {}", msg))
            }
            GoogleDriveError::BridgeError(e) => e,
        }
    }
}
