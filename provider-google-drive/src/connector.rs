//! Google Drive API connector implementation
//!
//! Implements the `RemoteObjectStore` trait for Google Drive API v3.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::RemoteObjectStore;
use bytes::{BufMut, Bytes, BytesMut};
use core_auth::TokenProvider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{GoogleDriveError, Result};
use crate::types::{CreateFileRequest, DriveFile, FilesListResponse, OBJECT_MIME_TYPE};

/// Google Drive API base URL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive upload API base URL
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Hidden per-application space
const APP_DATA_FOLDER: &str = "appDataFolder";

/// Maximum results per page (Google Drive API limit)
const MAX_PAGE_SIZE: u32 = 1000;

/// Boundary for multipart create requests
const MULTIPART_BOUNDARY: &str = "-------314159265358979323846";

/// Default folder holding the objects
pub const DEFAULT_FOLDER_NAME: &str = "inlays";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Drive API connector
///
/// Stores one JSON file per key inside a single folder of `appDataFolder`.
///
/// # Features
///
/// - Folder id resolved once and cached for the connector's lifetime
/// - Paginated listing (`pageSize=1000`) until no `nextPageToken` is returned
/// - Optional session index (key → file id) so `put`/`delete` skip the name
///   search during batch work
/// - Exponential backoff on 429 and 5xx responses
/// - Bearer token fetched from a [`TokenProvider`] for every request
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveConnector;
/// use bridge_traits::storage::RemoteObjectStore;
///
/// let drive = GoogleDriveConnector::new(http_client, token_provider);
/// drive.preload_index().await?;
/// let keys = drive.list().await?;
/// drive.clear_index();
/// ```
pub struct GoogleDriveConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// Source of bearer tokens
    token_provider: Arc<dyn TokenProvider>,

    /// Name of the folder inside `appDataFolder`
    folder_name: String,

    /// Backoff for throttled or failed requests
    retry_policy: RetryPolicy,

    /// Cached folder id
    folder_id: Mutex<Option<String>>,

    /// Serializes folder lookup/creation
    folder_init: tokio::sync::Mutex<()>,

    /// Session index, `None` outside a session
    file_index: RwLock<Option<HashMap<String, String>>>,
}

impl GoogleDriveConnector {
    /// Create a new Google Drive connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `token_provider` - Source of access tokens with the `drive.appdata` scope
    pub fn new(http_client: Arc<dyn HttpClient>, token_provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            http_client,
            token_provider,
            folder_name: DEFAULT_FOLDER_NAME.to_string(),
            retry_policy: RetryPolicy::default(),
            folder_id: Mutex::new(None),
            folder_init: tokio::sync::Mutex::new(()),
            file_index: RwLock::new(None),
        }
    }

    pub fn with_folder_name(mut self, folder_name: impl Into<String>) -> Self {
        self.folder_name = folder_name.into();
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Whether a session index is currently loaded
    pub fn has_index(&self) -> bool {
        self.file_index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn cached_folder_id(&self) -> Option<String> {
        self.folder_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_folder_id(&self, folder_id: Option<String>) {
        *self.folder_id.lock().unwrap_or_else(|e| e.into_inner()) = folder_id;
    }

    fn set_index(&self, index: Option<HashMap<String, String>>) {
        *self.file_index.write().unwrap_or_else(|e| e.into_inner()) = index;
    }

    fn index_snapshot(&self) -> Option<HashMap<String, String>> {
        self.file_index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// `Some(file id or None)` when an index is loaded, `None` otherwise
    fn indexed_file_id(&self, key: &str) -> Option<Option<String>> {
        self.file_index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|index| index.get(key).cloned())
    }

    fn index_insert(&self, key: &str, file_id: &str) {
        if let Some(index) = self
            .file_index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            index.insert(key.to_string(), file_id.to_string());
        }
    }

    fn index_remove(&self, key: &str) {
        if let Some(index) = self
            .file_index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            index.remove(key);
        }
    }

    fn file_name(key: &str) -> String {
        format!("{}.json", key)
    }

    /// Quote a value for a Drive `q` expression
    fn quote(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    /// Execute API request with retry logic
    ///
    /// Attaches the bearer token and retries 429/5xx responses and transport
    /// failures with exponential backoff. Any other non-2xx status is
    /// returned as [`GoogleDriveError::ApiError`].
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute_with_retry(&self, request: HttpRequest) -> Result<HttpResponse> {
        let token = self.token_provider.access_token().await?;
        let request = request.bearer_token(token).timeout(REQUEST_TIMEOUT);
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.http_client.execute(request.clone()).await {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry_policy.delay_for_attempt(attempt);
                    warn!(
                        "API request failed (attempt {}/{}): status={}, retrying in {}ms",
                        attempt,
                        max_attempts,
                        response.status,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    if response.status != 404 {
                        warn!(status = response.status, "API request failed");
                    }
                    return Err(GoogleDriveError::ApiError {
                        status_code: response.status,
                        message: String::from_utf8_lossy(&response.body).into_owned(),
                    });
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.retry_policy.delay_for_attempt(attempt);
                    warn!(
                        "API request failed (attempt {}/{}): {}, retrying in {}ms",
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("API request failed after {} attempts: {}", attempt, e);
                    return Err(e.into());
                }
            }
        }
    }

    /// One `files.list` page inside `appDataFolder`
    async fn search(
        &self,
        query: &str,
        fields: &str,
        page_token: Option<&str>,
    ) -> Result<FilesListResponse> {
        let mut url = format!(
            "{}/files?q={}&spaces={}&fields={}&pageSize={}",
            DRIVE_API_BASE,
            urlencoding::encode(query),
            APP_DATA_FOLDER,
            urlencoding::encode(fields),
            MAX_PAGE_SIZE
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let response = self
            .execute_with_retry(HttpRequest::new(HttpMethod::Get, url))
            .await?;

        response.json().map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse files list response: {}", e))
        })
    }

    /// Find the folder, creating it if absent
    #[instrument(skip(self), fields(folder = %self.folder_name))]
    pub async fn ensure_folder(&self) -> Result<String> {
        if let Some(folder_id) = self.cached_folder_id() {
            return Ok(folder_id);
        }

        let _guard = self.folder_init.lock().await;
        if let Some(folder_id) = self.cached_folder_id() {
            return Ok(folder_id);
        }

        let query = format!(
            "name={} and {} in parents and trashed=false",
            Self::quote(&self.folder_name),
            Self::quote(APP_DATA_FOLDER)
        );
        let found = self.search(&query, "files(id,name)", None).await?;

        let folder_id = match found.files.into_iter().next() {
            Some(folder) => {
                info!(folder_id = %folder.id, "Found existing folder");
                folder.id
            }
            None => {
                let request = HttpRequest::new(HttpMethod::Post, format!("{}/files", DRIVE_API_BASE))
                    .json(&CreateFileRequest::folder(&self.folder_name, APP_DATA_FOLDER))?;
                let response = self.execute_with_retry(request).await?;
                let created: DriveFile = response.json().map_err(|e| {
                    GoogleDriveError::ParseError(format!("Failed to parse created folder: {}", e))
                })?;
                info!(folder_id = %created.id, "Created folder");
                created.id
            }
        };

        self.set_folder_id(Some(folder_id.clone()));
        Ok(folder_id)
    }

    /// Every key in the folder mapped to its file id
    #[instrument(skip(self))]
    pub async fn list_objects(&self) -> Result<HashMap<String, String>> {
        let folder_id = self.ensure_folder().await?;
        let query = format!("{} in parents and trashed=false", Self::quote(&folder_id));

        let mut mapping = HashMap::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .search(&query, "nextPageToken,files(id,name)", page_token.as_deref())
                .await?;

            for file in page.files {
                let key = file
                    .name
                    .strip_suffix(".json")
                    .unwrap_or(&file.name)
                    .to_string();
                mapping.insert(key, file.id);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!("Found {} objects in drive", mapping.len());
        Ok(mapping)
    }

    /// Search for a single file by name
    async fn find_file_id(&self, key: &str, folder_id: &str) -> Result<Option<String>> {
        let query = format!(
            "name={} and {} in parents and trashed=false",
            Self::quote(&Self::file_name(key)),
            Self::quote(folder_id)
        );
        let found = self.search(&query, "files(id)", None).await?;
        Ok(found.files.into_iter().next().map(|file| file.id))
    }

    /// File id from the session index, or a name search without one
    async fn resolve_file_id(&self, key: &str, folder_id: &str) -> Result<Option<String>> {
        match self.indexed_file_id(key) {
            Some(file_id) => Ok(file_id),
            None => self.find_file_id(key, folder_id).await,
        }
    }

    fn multipart_body(metadata: &CreateFileRequest, content: &[u8]) -> Result<Bytes> {
        let metadata = serde_json::to_vec(metadata)
            .map_err(|e| GoogleDriveError::EncodeError(e.to_string()))?;
        let delimiter = format!("\r\n--{}\r\n", MULTIPART_BOUNDARY);
        let close_delimiter = format!("\r\n--{}--", MULTIPART_BOUNDARY);

        let mut body = BytesMut::with_capacity(metadata.len() + content.len() + 256);
        body.put_slice(delimiter.as_bytes());
        body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.put_slice(&metadata);
        body.put_slice(delimiter.as_bytes());
        body.put_slice(format!("Content-Type: {}\r\n\r\n", OBJECT_MIME_TYPE).as_bytes());
        body.put_slice(content);
        body.put_slice(close_delimiter.as_bytes());
        Ok(body.freeze())
    }

    /// Download the body stored under `key`
    #[instrument(skip(self))]
    pub async fn download_object(&self, key: &str) -> Result<Option<Bytes>> {
        let folder_id = self.ensure_folder().await?;
        let Some(file_id) = self.resolve_file_id(key, &folder_id).await? else {
            warn!("Object {} not found in drive", key);
            return Ok(None);
        };

        let url = format!("{}/files/{}?alt=media", DRIVE_API_BASE, file_id);
        match self
            .execute_with_retry(HttpRequest::new(HttpMethod::Get, url))
            .await
        {
            Ok(response) => {
                debug!("Downloaded {} bytes for {}", response.body.len(), key);
                Ok(Some(response.body))
            }
            Err(e) if e.is_not_found() => {
                warn!("Object {} disappeared from drive", key);
                self.index_remove(key);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Create or replace the body stored under `key`
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    pub async fn upload_object(&self, key: &str, body: Bytes) -> Result<()> {
        let folder_id = self.ensure_folder().await?;

        if let Some(file_id) = self.resolve_file_id(key, &folder_id).await? {
            let url = format!("{}/files/{}?uploadType=media", DRIVE_UPLOAD_BASE, file_id);
            let request = HttpRequest::new(HttpMethod::Patch, url).body_with_type(body, OBJECT_MIME_TYPE);
            self.execute_with_retry(request).await?;
            debug!("Updated {} in drive", key);
            return Ok(());
        }

        let metadata = CreateFileRequest::object(Self::file_name(key), &folder_id);
        let request = HttpRequest::new(
            HttpMethod::Post,
            format!("{}/files?uploadType=multipart", DRIVE_UPLOAD_BASE),
        )
        .body_with_type(
            Self::multipart_body(&metadata, &body)?,
            format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
        );

        let response = self.execute_with_retry(request).await?;
        let created: DriveFile = response.json().map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse created file: {}", e))
        })?;
        self.index_insert(key, &created.id);

        debug!(file_id = %created.id, "Uploaded {} to drive", key);
        Ok(())
    }

    /// Delete the file stored under `key`; absent keys are a no-op
    #[instrument(skip(self))]
    pub async fn remove_object(&self, key: &str) -> Result<()> {
        let folder_id = self.ensure_folder().await?;
        let Some(file_id) = self.resolve_file_id(key, &folder_id).await? else {
            debug!("Object {} not found in drive, nothing to delete", key);
            return Ok(());
        };

        let url = format!("{}/files/{}", DRIVE_API_BASE, file_id);
        match self
            .execute_with_retry(HttpRequest::new(HttpMethod::Delete, url))
            .await
        {
            Ok(_) => debug!("Deleted {} from drive", key),
            Err(e) if e.is_not_found() => debug!("Object {} already gone", key),
            Err(e) => return Err(e),
        }

        self.index_remove(key);
        Ok(())
    }
}

#[async_trait]
impl RemoteObjectStore for GoogleDriveConnector {
    async fn ensure_namespace(&self) -> bridge_traits::error::Result<String> {
        Ok(self.ensure_folder().await?)
    }

    async fn list(&self) -> bridge_traits::error::Result<HashMap<String, String>> {
        if let Some(index) = self.index_snapshot() {
            return Ok(index);
        }
        Ok(self.list_objects().await?)
    }

    async fn get_raw(&self, key: &str) -> bridge_traits::error::Result<Option<Bytes>> {
        Ok(self.download_object(key).await?)
    }

    async fn put_raw(&self, key: &str, body: Bytes) -> bridge_traits::error::Result<()> {
        Ok(self.upload_object(key, body).await?)
    }

    async fn delete(&self, key: &str) -> bridge_traits::error::Result<()> {
        Ok(self.remove_object(key).await?)
    }

    #[instrument(skip(self))]
    async fn preload_index(&self) -> bridge_traits::error::Result<()> {
        let index = self.list_objects().await?;
        info!("Preloaded index with {} entries", index.len());
        self.set_index(Some(index));
        Ok(())
    }

    fn clear_index(&self) {
        self.set_index(None);
    }

    fn clear_cache(&self) {
        self.set_index(None);
        self.set_folder_id(None);
    }
}
