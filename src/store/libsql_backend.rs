//! libSQL backend — async `KvStore` implementation.
//!
//! One `kv_entries` table holds both sessions (`session:{phone}`) and
//! seen-message markers (`seen:{id}`). Expiry lives in an `expires_at`
//! column checked on read; stale rows are deleted lazily.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::conversation::session::Session;
use crate::error::StoreError;
use crate::store::traits::KvStore;

/// libSQL key-value store backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("Failed to create store directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Key-value store opened");
        Ok(store)
    }

    /// Create an in-memory store (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory store: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS kv_entries (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| StoreError::Open(format!("init_schema: {e}")))?;
        Ok(())
    }

    /// Read a live value; deletes and ignores the row if it has expired.
    async fn get_live(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value, expires_at FROM kv_entries WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_live: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(StoreError::Query(format!("get_live: {e}"))),
        };

        let value: String = row
            .get(0)
            .map_err(|e| StoreError::Query(format!("get_live value: {e}")))?;
        let expires_at: String = row
            .get(1)
            .map_err(|e| StoreError::Query(format!("get_live expires_at: {e}")))?;

        if parse_expiry(&expires_at) <= Utc::now() {
            debug!(key, "Store entry expired, dropping");
            self.delete(key).await?;
            return Ok(None);
        }

        Ok(Some(value))
    }

    /// Write a value with a fresh expiry, replacing any existing row.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = expiry_after(ttl);
        self.conn
            .execute(
                "INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
                params![key, value, expires_at],
            )
            .await
            .map_err(|e| StoreError::Query(format!("put: {e}")))?;
        Ok(())
    }

    /// Push a key's expiry forward without touching its value.
    async fn touch(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE kv_entries SET expires_at = ?1 WHERE key = ?2",
                params![expiry_after(ttl), key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("touch: {e}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .await
            .map_err(|e| StoreError::Query(format!("delete: {e}")))?;
        Ok(())
    }
}

fn session_key(phone: &str) -> String {
    format!("session:{phone}")
}

fn seen_key(message_id: &str) -> String {
    format!("seen:{message_id}")
}

fn expiry_after(ttl: Duration) -> String {
    (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()))
        .to_rfc3339()
}

/// Parse a stored expiry; an unparseable value counts as already expired.
fn parse_expiry(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl KvStore for LibSqlStore {
    async fn load_session(&self, phone: &str) -> Result<Session, StoreError> {
        let key = session_key(phone);
        match self.get_live(&key).await? {
            Some(json) => {
                let session: Session = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Serialization(format!("load_session: {e}")))?;
                // Every read refreshes the sliding expiry.
                self.touch(&key, crate::config::SESSION_TTL).await?;
                Ok(session)
            }
            None => Ok(Session::new(phone)),
        }
    }

    async fn save_session(&self, session: &Session, ttl: Duration) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)
            .map_err(|e| StoreError::Serialization(format!("save_session: {e}")))?;
        self.put(&session_key(&session.phone), &json, ttl).await
    }

    async fn seen(&self, message_id: &str) -> Result<bool, StoreError> {
        Ok(self.get_live(&seen_key(message_id)).await?.is_some())
    }

    async fn mark_seen(&self, message_id: &str, ttl: Duration) -> Result<(), StoreError> {
        self.put(&seen_key(message_id), "1", ttl).await
    }
}
