//! SQLite backup store implementation

use crate::records::{Employee, LeaveRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

const KEY_RECORDS: &str = "records";
const KEY_EMPLOYEES: &str = "employees";
const KEY_LAST_BACKUP: &str = "last_backup";

/// Backup store configuration
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        // Always use ~/.config for consistency across platforms
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("permisync");
        path.push("backup.db");

        Self { path }
    }
}

/// Durable cache of the last-known-good dataset
///
/// Two independently keyed JSON blobs (records, employees) plus a
/// last-backup timestamp, each overwritten wholesale per persist - the
/// store is never partially patched.
pub struct BackupStore {
    conn: Mutex<Connection>,
}

impl BackupStore {
    /// Open or create the backup database
    pub fn open(config: &BackupConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %config.path.display(), "Opening backup database");

        let conn = Connection::open(&config.path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Open an in-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backup_metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn save_blob(&self, key: &str, payload: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO snapshots (key, payload, updated_at) VALUES (?, ?, ?)",
            params![key, payload, now],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO backup_metadata (key, value, updated_at) VALUES (?, ?, ?)",
            params![KEY_LAST_BACKUP, now.to_string(), now],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn load_blob(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let payload = conn
            .query_row(
                "SELECT payload FROM snapshots WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(payload)
    }

    /// Overwrite the records blob
    pub fn save_records(&self, records: &[LeaveRecord]) -> Result<()> {
        tracing::debug!(count = records.len(), "Persisting records backup");
        let payload = serde_json::to_string(records)?;
        self.save_blob(KEY_RECORDS, &payload)
    }

    /// Load the records blob, `None` when never persisted
    pub fn load_records(&self) -> Result<Option<Vec<LeaveRecord>>> {
        match self.load_blob(KEY_RECORDS)? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the employees blob
    pub fn save_employees(&self, employees: &[Employee]) -> Result<()> {
        tracing::debug!(count = employees.len(), "Persisting employees backup");
        let payload = serde_json::to_string(employees)?;
        self.save_blob(KEY_EMPLOYEES, &payload)
    }

    /// Load the employees blob, `None` when never persisted
    pub fn load_employees(&self) -> Result<Option<Vec<Employee>>> {
        match self.load_blob(KEY_EMPLOYEES)? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Timestamp of the most recent persist, if any
    pub fn last_backup(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let millis = conn
            .query_row(
                "SELECT value FROM backup_metadata WHERE key = ?",
                params![KEY_LAST_BACKUP],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(millis
            .and_then(|m| m.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis))
    }
}
