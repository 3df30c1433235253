//! Google Drive API request and response types
//!
//! Only the fields the object store asks for (`fields=files(id,name)`) are
//! modelled.

use serde::{Deserialize, Serialize};

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// MIME type of every stored object
pub const OBJECT_MIME_TYPE: &str = "application/json";

/// Google Drive API file resource, partial
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveFile {
    /// File ID
    pub id: String,

    /// File name
    #[serde(default)]
    pub name: String,
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    /// List of files
    #[serde(default)]
    pub files: Vec<DriveFile>,

    /// Token for next page
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Metadata sent when creating a file or folder
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
}

impl CreateFileRequest {
    pub fn folder(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            parents: vec![parent.into()],
        }
    }

    pub fn object(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: OBJECT_MIME_TYPE.to_string(),
            parents: vec![parent.into()],
        }
    }
}
