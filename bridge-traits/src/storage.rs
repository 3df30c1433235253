//! Storage Abstractions
//!
//! Traits for the three stores the sync core talks to: the local asset store,
//! the remote object namespace and the generic settings store used for
//! tombstones and cached indices.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::asset::AssetRecord;
use crate::error::{BridgeError, Result};

/// Local keyed store for asset records
///
/// Keys are opaque asset ids. Implementations decide how the payload is kept
/// at rest; callers always pass and receive records with a native binary
/// payload.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::AssetStore;
///
/// async fn copy_asset(from: &dyn AssetStore, to: &dyn AssetStore, id: &str) -> Result<()> {
///     if let Some(record) = from.get(id).await? {
///         to.put(id, &record).await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// All asset ids currently stored
    async fn keys(&self) -> Result<Vec<String>>;

    /// Retrieve a record, `Ok(None)` when absent
    async fn get(&self, id: &str) -> Result<Option<AssetRecord>>;

    /// Create or overwrite a record
    async fn put(&self, id: &str, record: &AssetRecord) -> Result<()>;

    /// Remove a record; removing an absent id is not an error
    async fn delete(&self, id: &str) -> Result<()>;

    /// Check if a record exists
    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }
}

/// Key-value settings storage trait
///
/// Named string values. The sync core keeps JSON-encoded state here
/// (tombstones, creation times) plus a few flags.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn enable_sync(store: &dyn SettingsStore) -> Result<()> {
///     store.set_bool("sync_enabled", true).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_string(key, if value { "true" } else { "false" })
            .await
    }

    /// Retrieve a boolean value
    ///
    /// Anything other than `"true"`/`"false"` is reported as invalid.
    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get_string(key).await?.as_deref() {
            None => Ok(None),
            Some("true") => Ok(Some(true)),
            Some("false") => Ok(Some(false)),
            Some(other) => Err(BridgeError::InvalidPayload {
                key: key.to_string(),
                reason: format!("expected boolean, found {:?}", other),
            }),
        }
    }
}

/// Remote namespace of JSON objects, one per key
///
/// The namespace is a single flat folder. Each key is stored as `<key>.json`;
/// the remote identifier of every object is resolved either through a
/// session index (see [`preload_index`](Self::preload_index)) or by a
/// per-item lookup.
///
/// The index must not outlive one sync session: callers pair every
/// `preload_index` with a `clear_index`.
#[async_trait]
pub trait RemoteObjectStore: Send + Sync {
    /// Create the namespace if absent and return its remote identifier
    async fn ensure_namespace(&self) -> Result<String>;

    /// Every key in the namespace mapped to its remote identifier
    async fn list(&self) -> Result<HashMap<String, String>>;

    /// Raw JSON body stored under `key`, `Ok(None)` when absent
    async fn get_raw(&self, key: &str) -> Result<Option<Bytes>>;

    /// Create or replace the JSON body stored under `key`
    async fn put_raw(&self, key: &str, body: Bytes) -> Result<()>;

    /// Remove `key`; an absent key is a no-op
    async fn delete(&self, key: &str) -> Result<()>;

    /// Populate the session index from one full listing
    async fn preload_index(&self) -> Result<()>;

    /// Forget the session index
    fn clear_index(&self);

    /// Forget the session index and the cached namespace identifier
    fn clear_cache(&self);

    /// Fetch and parse an asset record; the payload stays in transport form
    async fn get(&self, id: &str) -> Result<Option<AssetRecord>> {
        match self.get_raw(id).await? {
            None => Ok(None),
            Some(body) => serde_json::from_slice(&body).map(Some).map_err(|e| {
                BridgeError::InvalidPayload {
                    key: id.to_string(),
                    reason: e.to_string(),
                }
            }),
        }
    }

    /// Serialize and store an asset record
    async fn put(&self, id: &str, record: &AssetRecord) -> Result<()> {
        let body = serde_json::to_vec(&record.to_transport()).map_err(|e| {
            BridgeError::InvalidPayload {
                key: id.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.put_raw(id, Bytes::from(body)).await
    }
}
