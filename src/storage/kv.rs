use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a [`KeyValueStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the database lock
    #[error("Another sitewatch process appears to be using the database. Please wait for it to finish.")]
    InstanceLocked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be encoded or decoded as JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend refused the operation (used by in-memory stores and tests)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Map a sqlx error, recognising SQLite lock conditions.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::InstanceLocked;
        }

        StoreError::Database(err)
    }
}

/// String key-value storage consumed by the feed manager.
///
/// Every operation may fail; callers decide whether a failure degrades to
/// "no data" (reads) or aborts the current feed check (writes).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace the value stored under `key`.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
