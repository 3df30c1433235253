//! # Core Configuration Module
//!
//! Provides configuration management for the inlay sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host bridges and tuning values the sync engine is
//! assembled from. It fails fast: a missing bridge is reported with the name
//! of the capability and what it is needed for.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - Google Drive requests (desktop default: reqwest)
//! - `SettingsStore` - Tombstones, creation times and flags (desktop default: SQLite)
//! - `AssetStore` - The local replica (desktop default: SQLite)
//!
//! When the `desktop-shims` feature is enabled and a database path is set,
//! missing bridges are filled with the desktop implementations. Both SQLite
//! stores share a single pool.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/inlays.db")
//!     .concurrency(3)
//!     .auto_sync_interval(Duration::from_secs(600))
//!     .build()
//!     .await?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{AssetStore, Clock, HttpClient, SettingsStore, SystemClock};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Tuning values for sync sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Maximum in-flight transfers per phase
    pub concurrency: usize,
    /// Name of the Drive folder inside `appDataFolder`
    pub folder_name: String,
    /// Attempts per Drive request, including the first
    pub request_retries: u32,
    /// Quiet interval before deferred settings writes hit the store
    pub persist_delay: Duration,
    /// Period of the auto-sync loop
    pub auto_sync_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            folder_name: "inlays".to_string(),
            request_retries: 3,
            persist_delay: Duration::from_secs(1),
            auto_sync_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl SyncSettings {
    /// Validates the values.
    ///
    /// The folder name is interpolated into a Drive search query, so quotes
    /// and backslashes are rejected outright.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config(
                "Sync concurrency must be greater than 0".to_string(),
            ));
        }

        if self.folder_name.trim().is_empty() {
            return Err(Error::Config("Folder name must not be empty".to_string()));
        }

        if self.folder_name.contains(['\'', '"', '\\']) {
            return Err(Error::Config(format!(
                "Folder name {:?} must not contain quotes or backslashes",
                self.folder_name
            )));
        }

        if self.request_retries == 0 {
            return Err(Error::Config(
                "Request retries must be at least 1 (the first attempt counts)".to_string(),
            ));
        }

        if self.persist_delay.is_zero() {
            return Err(Error::Config(
                "Persist delay must be greater than 0".to_string(),
            ));
        }

        if self.auto_sync_interval.is_zero() {
            return Err(Error::Config(
                "Auto-sync interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Core configuration for the inlay sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite file backing the desktop stores, when they are used
    pub database_path: Option<PathBuf>,

    /// HTTP client used by the Drive connector
    pub http_client: Arc<dyn HttpClient>,

    /// Settings storage (tombstones, creation times, flags)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Local asset replica
    pub asset_store: Arc<dyn AssetStore>,

    /// Time source for creation timestamps and token expiry
    pub clock: Arc<dyn Clock>,

    /// Sync tuning values
    pub sync: SyncSettings,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("http_client", &"<HttpClient>")
            .field("settings_store", &"<SettingsStore>")
            .field("asset_store", &"<AssetStore>")
            .field("clock", &"<Clock>")
            .field("sync", &self.sync)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path must not be empty".to_string()));
            }
        }

        self.sync.validate()
    }
}

fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

/// Builder for constructing a [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    asset_store: Option<Arc<dyn AssetStore>>,
    clock: Option<Arc<dyn Clock>>,
    sync: SyncSettings,
}

impl CoreConfigBuilder {
    /// Sets the SQLite database path used by the desktop stores.
    pub fn database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, `ReqwestHttpClient` is used when the `desktop-shims`
    /// feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the settings store implementation.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets the local asset store implementation.
    pub fn asset_store(mut self, store: Arc<dyn AssetStore>) -> Self {
        self.asset_store = Some(store);
        self
    }

    /// Sets the time source. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Maximum in-flight transfers per phase. Default: 5
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.sync.concurrency = concurrency;
        self
    }

    /// Drive folder name. Default: `inlays`
    pub fn folder_name(mut self, name: impl Into<String>) -> Self {
        self.sync.folder_name = name.into();
        self
    }

    /// Attempts per Drive request. Default: 3
    pub fn request_retries(mut self, retries: u32) -> Self {
        self.sync.request_retries = retries;
        self
    }

    /// Quiet interval for deferred settings writes. Default: 1 second
    pub fn persist_delay(mut self, delay: Duration) -> Self {
        self.sync.persist_delay = delay;
        self
    }

    /// Auto-sync period. Default: 5 minutes
    pub fn auto_sync_interval(mut self, interval: Duration) -> Self {
        self.sync.auto_sync_interval = interval;
        self
    }

    /// Replaces all sync settings at once.
    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Async because the desktop defaults open the SQLite pool on the
    /// caller's runtime.
    ///
    /// # Errors
    ///
    /// - `CapabilityMissing` when a bridge is absent and no default applies
    /// - `Config` when a value is out of range
    /// - `Bridge` when a desktop default fails to initialize
    pub async fn build(self) -> Result<CoreConfig> {
        // Cheap checks before any file is touched
        self.sync.validate()?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let (settings_store, asset_store) = match (self.settings_store, self.asset_store) {
            (Some(settings), Some(assets)) => (settings, assets),
            (settings, assets) => {
                let defaults =
                    provide_default_stores(self.database_path.as_deref(), settings.is_none())
                        .await?;
                (
                    settings.or(defaults.settings).ok_or_else(|| {
                        capability_missing(
                            "SettingsStore",
                            "A settings store is required for tombstones and sync flags.",
                        )
                    })?,
                    assets.or(defaults.assets).ok_or_else(|| {
                        capability_missing(
                            "AssetStore",
                            "An asset store is required to hold the local replica.",
                        )
                    })?,
                )
            }
        };

        let config = CoreConfig {
            database_path: self.database_path,
            http_client,
            settings_store,
            asset_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            sync: self.sync,
        };

        config.validate()?;

        Ok(config)
    }
}

#[derive(Default)]
struct DefaultStores {
    settings: Option<Arc<dyn SettingsStore>>,
    assets: Option<Arc<dyn AssetStore>>,
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing(
        "HttpClient",
        "No HTTP client provided. Inject one with .http_client() or enable the \
         `desktop-shims` feature.",
    ))
}

#[cfg(feature = "desktop-shims")]
async fn provide_default_stores(
    database_path: Option<&Path>,
    with_settings: bool,
) -> Result<DefaultStores> {
    use bridge_desktop::{open_database, SqliteAssetStore, SqliteSettingsStore};

    let Some(path) = database_path else {
        return Ok(DefaultStores::default());
    };

    let bridge = |component: &'static str| {
        move |source: bridge_traits::BridgeError| Error::Bridge { component, source }
    };

    let pool = open_database(path.to_path_buf())
        .await
        .map_err(bridge("database"))?;

    let settings: Option<Arc<dyn SettingsStore>> = if with_settings {
        Some(Arc::new(
            SqliteSettingsStore::from_pool(pool.clone())
                .await
                .map_err(bridge("settings store"))?,
        ))
    } else {
        None
    };

    let assets = SqliteAssetStore::from_pool(pool)
        .await
        .map_err(bridge("asset store"))?;

    tracing::debug!(path = ?path, "Using SQLite desktop stores");

    Ok(DefaultStores {
        settings,
        assets: Some(Arc::new(assets)),
    })
}

#[cfg(not(feature = "desktop-shims"))]
async fn provide_default_stores(
    _database_path: Option<&Path>,
    _with_settings: bool,
) -> Result<DefaultStores> {
    Ok(DefaultStores::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{AssetRecord, BridgeError, HttpRequest, HttpResponse};

    type BridgeResult<T> = std::result::Result<T, BridgeError>;

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }
    }

    struct MockSettingsStore;

    #[async_trait]
    impl SettingsStore for MockSettingsStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(vec![])
        }
    }

    struct MockAssetStore;

    #[async_trait]
    impl AssetStore for MockAssetStore {
        async fn keys(&self) -> BridgeResult<Vec<String>> {
            Ok(vec![])
        }

        async fn get(&self, _id: &str) -> BridgeResult<Option<AssetRecord>> {
            Ok(None)
        }

        async fn put(&self, _id: &str, _record: &AssetRecord) -> BridgeResult<()> {
            Ok(())
        }

        async fn delete(&self, _id: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .http_client(Arc::new(MockHttpClient))
            .settings_store(Arc::new(MockSettingsStore))
            .asset_store(Arc::new(MockAssetStore))
    }

    #[test]
    fn test_sync_settings_defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.concurrency, 5);
        assert_eq!(settings.folder_name, "inlays");
        assert_eq!(settings.request_retries, 3);
        assert_eq!(settings.persist_delay, Duration::from_secs(1));
        assert_eq!(settings.auto_sync_interval, Duration::from_secs(300));
        assert!(settings.validate().is_ok());
    }

    #[tokio::test]
    async fn test_builder_with_all_bridges() {
        let config = complete_builder().concurrency(3).build().await.unwrap();

        assert_eq!(config.sync.concurrency, 3);
        assert_eq!(config.sync.folder_name, "inlays");
        assert!(config.database_path.is_none());
    }

    #[tokio::test]
    async fn test_validate_rejects_zero_concurrency() {
        let err = complete_builder().concurrency(0).build().await.unwrap_err();
        assert!(err.to_string().contains("concurrency must be greater than 0"));
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_folder_names() {
        let err = complete_builder().folder_name("  ").build().await.unwrap_err();
        assert!(err.to_string().contains("must not be empty"));

        let err = complete_builder()
            .folder_name("it's")
            .build()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quotes"));
    }

    #[tokio::test]
    async fn test_validate_rejects_zero_retries_and_intervals() {
        assert!(complete_builder().request_retries(0).build().await.is_err());
        assert!(complete_builder()
            .persist_delay(Duration::ZERO)
            .build()
            .await
            .is_err());
        assert!(complete_builder()
            .auto_sync_interval(Duration::ZERO)
            .build()
            .await
            .is_err());
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[tokio::test]
    async fn test_missing_http_client_is_reported() {
        let err = CoreConfig::builder()
            .settings_store(Arc::new(MockSettingsStore))
            .asset_store(Arc::new(MockAssetStore))
            .build()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::CapabilityMissing { ref capability, .. } if capability == "HttpClient"
        ));
    }

    #[tokio::test]
    async fn test_missing_asset_store_without_database_path() {
        let err = CoreConfig::builder()
            .http_client(Arc::new(MockHttpClient))
            .settings_store(Arc::new(MockSettingsStore))
            .build()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::CapabilityMissing { ref capability, .. } if capability == "AssetStore"
        ));
    }

    #[test]
    fn test_debug_hides_bridges() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let config = runtime.block_on(complete_builder().build()).unwrap();

        let debug = format!("{:?}", config);
        assert!(debug.contains("<HttpClient>"));
        assert!(debug.contains("folder_name: \"inlays\""));
    }

    #[cfg(feature = "desktop-shims")]
    #[tokio::test]
    async fn test_desktop_defaults_share_database() {
        use uuid::Uuid;

        let path = std::env::temp_dir().join(format!("inlay-config-{}.db", Uuid::new_v4()));

        let config = CoreConfig::builder()
            .database_path(&path)
            .build()
            .await
            .unwrap();

        config
            .settings_store
            .set_string("deleted_inlays", "[]")
            .await
            .unwrap();
        assert!(config.asset_store.keys().await.unwrap().is_empty());
        assert_eq!(config.database_path.as_deref(), Some(path.as_path()));

        drop(config);
        let _ = std::fs::remove_file(&path);
    }
}
