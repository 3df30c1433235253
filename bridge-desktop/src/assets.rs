//! Asset Storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    asset::{AssetPayload, AssetRecord, MediaType},
    error::{BridgeError, Result},
    storage::AssetStore,
};
use bytes::Bytes;
use sqlx::{sqlite::SqlitePool, Row};
use std::path::PathBuf;
use tracing::debug;

use crate::db::{db_error, open_database, open_in_memory};

/// SQLite-backed asset store
///
/// Payloads are kept as BLOBs; records handed in with a base64 payload are
/// decoded before they are written.
pub struct SqliteAssetStore {
    pool: SqlitePool,
}

impl SqliteAssetStore {
    /// Create a new asset store with the given database path
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        Self::from_pool(open_database(db_path).await?).await
    }

    /// Create an in-memory asset store (for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::from_pool(open_in_memory().await?).await
    }

    /// Use an existing pool, creating the assets table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                ext TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                media_type TEXT NOT NULL,
                data BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(db_error("Failed to create assets table"))?;

        debug!("Initialized asset store");
        Ok(Self { pool })
    }

    fn media_type_str(media_type: MediaType) -> &'static str {
        match media_type {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }

    fn parse_media_type(id: &str, value: &str) -> Result<MediaType> {
        match value {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            "audio" => Ok(MediaType::Audio),
            other => Err(BridgeError::InvalidPayload {
                key: id.to_string(),
                reason: format!("unknown media type {:?}", other),
            }),
        }
    }
}

#[async_trait]
impl AssetStore for SqliteAssetStore {
    async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM assets ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list assets"))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<AssetRecord>> {
        let row = sqlx::query(
            "SELECT name, ext, width, height, media_type, data FROM assets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get asset"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let width: i64 = row.get(2);
        let height: i64 = row.get(3);
        let media_type: String = row.get(4);
        let data: Vec<u8> = row.get(5);

        Ok(Some(AssetRecord {
            name: row.get(0),
            ext: row.get(1),
            width: u32::try_from(width).unwrap_or_default(),
            height: u32::try_from(height).unwrap_or_default(),
            media_type: Self::parse_media_type(id, &media_type)?,
            data: AssetPayload::Binary(Bytes::from(data)),
        }))
    }

    async fn put(&self, id: &str, record: &AssetRecord) -> Result<()> {
        let data = record.data.decode().map_err(|e| match e {
            BridgeError::InvalidPayload { reason, .. } => BridgeError::InvalidPayload {
                key: id.to_string(),
                reason,
            },
            other => other,
        })?;

        sqlx::query(
            r#"
            INSERT INTO assets (id, name, ext, width, height, media_type, data, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                ext = excluded.ext,
                width = excluded.width,
                height = excluded.height,
                media_type = excluded.media_type,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(&record.name)
        .bind(&record.ext)
        .bind(i64::from(record.width))
        .bind(i64::from(record.height))
        .bind(Self::media_type_str(record.media_type))
        .bind(data.as_ref())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to store asset"))?;

        debug!(id = id, bytes = data.len(), "Stored asset");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete asset"))?;

        debug!(id = id, "Deleted asset");
        Ok(())
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM assets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to check asset"))?;

        Ok(row.is_some())
    }
}
