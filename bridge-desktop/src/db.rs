//! SQLite pool helpers shared by the desktop stores

use bridge_traits::error::{BridgeError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

pub(crate) fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> BridgeError {
    move |e| BridgeError::Storage(format!("{}: {}", context, e))
}

/// Open (creating if needed) the database file at `db_path`
pub async fn open_database(db_path: PathBuf) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }
    }

    // SQLite URLs want forward slashes
    let path_str = db_path.to_string_lossy().replace('\\', "/");
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path_str))
        .map_err(db_error("Invalid database path"))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(db_error("Failed to connect to DB"))?;

    debug!(path = ?db_path, "Opened database");
    Ok(pool)
}

/// Open a private in-memory database (for testing)
///
/// Every SQLite connection to `:memory:` sees its own database, so the pool
/// is pinned to a single connection that never expires.
pub async fn open_in_memory() -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .map_err(db_error("Failed to connect to DB"))
}
