//! SQLite-based persistent checkpoint storage.
//!
//! Each plate owns one row. The checkpoint body is stored as JSON so the log
//! and rate table survive schema-free; the plate and start time are also kept
//! as columns for listing.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::store::{Checkpoint, CheckpointStore, StoreError};
use crate::types::Plate;

// ============================================================================
// Schema Version
// ============================================================================

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

// ============================================================================
// SQLite Store Implementation
// ============================================================================

/// SQLite-backed checkpoint store.
///
/// Writes are single-statement upserts, so a crash mid-write leaves either the
/// previous checkpoint or the new one.
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| {
            StoreError::OperationFailed(format!("failed to open database: {}", e))
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .map_err(|e| StoreError::OperationFailed(format!("failed to set pragmas: {}", e)))?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, for tests.
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::OperationFailed(format!("failed to open in-memory database: {}", e))
        })?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to create schema_version: {}", e)))?;

        let current_version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get(0)
            })
            .map_err(|e| StoreError::OperationFailed(format!("failed to read schema_version: {}", e)))?;

        if current_version > SCHEMA_VERSION {
            return Err(StoreError::DataCorruption(format!(
                "database schema version {} is newer than supported {}",
                current_version, SCHEMA_VERSION
            )));
        }

        if current_version < 1 {
            Self::migrate_v1(conn)?;
        }

        Ok(())
    }

    /// Initial schema.
    fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                plate TEXT PRIMARY KEY,
                start_time TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            "#,
        )
        .map_err(|e| StoreError::OperationFailed(format!("migration v1 failed: {}", e)))?;

        Ok(())
    }

    fn unix_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

// ============================================================================
// Store Trait Implementation
// ============================================================================

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, plate: &Plate) -> Result<Option<Checkpoint>, StoreError> {
        let conn = self.conn.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM checkpoints WHERE plate = ?1",
                params![plate.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::OperationFailed(format!("failed to load checkpoint: {}", e)))?;

        let Some(body) = body else {
            return Ok(None);
        };

        let checkpoint: Checkpoint = serde_json::from_str(&body)
            .map_err(|e| StoreError::Serialization(format!("checkpoint for {}: {}", plate, e)))?;

        if &checkpoint.plate != plate {
            return Err(StoreError::DataCorruption(format!(
                "checkpoint stored under {} belongs to {}",
                plate, checkpoint.plate
            )));
        }

        Ok(Some(checkpoint))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let body = serde_json::to_string(checkpoint)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO checkpoints (plate, start_time, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                checkpoint.plate.as_str(),
                checkpoint.start_time.to_string(),
                body,
                Self::unix_now(),
            ],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to save checkpoint: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, plate: &Plate) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM checkpoints WHERE plate = ?1", params![plate.as_str()])
            .map_err(|e| StoreError::OperationFailed(format!("failed to delete checkpoint: {}", e)))?;
        Ok(())
    }

    async fn list_plates(&self) -> Result<Vec<Plate>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT plate FROM checkpoints ORDER BY plate")
            .map_err(|e| StoreError::OperationFailed(format!("failed to list checkpoints: {}", e)))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::OperationFailed(format!("failed to list checkpoints: {}", e)))?;

        let mut plates = Vec::new();
        for row in rows {
            let plate = row
                .map_err(|e| StoreError::OperationFailed(format!("failed to read row: {}", e)))?;
            plates.push(Plate::new(plate));
        }
        Ok(plates)
    }
}
