//! Storage layer for timecapsule.
//!
//! [`Storage`] is a `SQLite`-backed local implementation of the document
//! store ([`CapsuleStore`](crate::backend::CapsuleStore)), the user directory
//! and auth provider, and the notification scheduler.

mod accounts;
mod capsules;
pub mod migrations;
mod notifications;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// `SQLite` storage engine.
///
/// One connection guarded by a mutex; every trait call takes the lock for
/// the duration of its statements.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::internal(format!("database lock poisoned: {e}")))?;
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| Error::internal(format!("database lock poisoned: {e}")))?;
        f(&mut conn)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (users, capsules, sealed_capsules, clips, pending_notifications) =
            self.with_conn(|conn| {
                let count = |sql: &str| -> Result<i64> {
                    Ok(conn.query_row(sql, [], |row| row.get(0))?)
                };
                Ok((
                    count("SELECT COUNT(*) FROM users")?,
                    count("SELECT COUNT(*) FROM capsules")?,
                    count("SELECT COUNT(*) FROM capsules WHERE unsealed = 0")?,
                    count("SELECT COUNT(*) FROM clips")?,
                    count("SELECT COUNT(*) FROM notifications")?,
                ))
            })?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            users,
            capsules,
            sealed_capsules,
            clips,
            pending_notifications,
            db_size_bytes,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StorageStats {
    /// Registered users.
    pub users: i64,
    /// Total capsules.
    pub capsules: i64,
    /// Capsules whose unsealed flag is still clear.
    pub sealed_capsules: i64,
    /// Total clips.
    pub clips: i64,
    /// Notifications waiting to fire.
    pub pending_notifications: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Encode a timestamp as microseconds since the Unix epoch.
fn encode_time(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

/// Decode a stored timestamp, reporting out-of-range values as a column error.
fn decode_time(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}
