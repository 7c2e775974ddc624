//! SQLite-backed storage for diligence records.
//!
//! The database lives at `~/.dealscore/dealscore.db` unless the config
//! points elsewhere. Each record is stored whole as a JSON payload keyed by
//! id; partial updates read, patch, and write the payload back. Writes are
//! last-write-wins: concurrent re-scores of one record are not serialized.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::config::DiligenceConfig;
use crate::error::DiligenceError;
use crate::provider::{DiligenceStore, RecordPatch};
use crate::types::DiligenceRecord;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Corrupt record payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),
}

impl From<DbError> for DiligenceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(id) => DiligenceError::RecordNotFound(id),
            other => DiligenceError::Storage(other.to_string()),
        }
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS diligence_records (
    id TEXT PRIMARY KEY,
    company_name TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_diligence_records_company
    ON diligence_records(company_name);
";

/// SQLite connection wrapper for diligence records.
///
/// The connection sits behind a mutex so the async store trait can be
/// shared across tasks; every call holds the lock only for one statement
/// pair.
pub struct DiligenceDb {
    conn: Mutex<Connection>,
}

impl DiligenceDb {
    /// Open the database named by the config, or the default location.
    pub fn open(config: &DiligenceConfig) -> Result<Self, DbError> {
        let path = match config.database_path.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => Self::db_path()?,
        };
        Self::open_at(path)
    }

    /// Resolve the default database path: `~/.dealscore/dealscore.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".dealscore").join("dealscore.db"))
    }

    /// Open a database at an explicit path and apply the schema.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;
        // WAL lets readers proceed while a re-score writes.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn get_record(&self, id: &str) -> Result<Option<DiligenceRecord>, DbError> {
        let conn = self.conn.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM diligence_records WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace a whole record, stamping timestamps.
    pub fn upsert_record(&self, record: &DiligenceRecord) -> Result<DiligenceRecord, DbError> {
        let now = Utc::now().to_rfc3339();
        let mut stored = record.clone();
        if stored.created_at.is_none() {
            stored.created_at = Some(now.clone());
        }
        stored.updated_at = Some(now.clone());
        self.write_payload(&stored)?;
        Ok(stored)
    }

    /// Apply a partial update to an existing record.
    pub fn patch_record(&self, id: &str, patch: RecordPatch) -> Result<DiligenceRecord, DbError> {
        let mut record = self
            .get_record(id)?
            .ok_or_else(|| DbError::NotFound(id.to_string()))?;
        if patch.is_empty() {
            return Ok(record);
        }
        patch.apply(&mut record);
        record.updated_at = Some(Utc::now().to_rfc3339());
        self.write_payload(&record)?;
        Ok(record)
    }

    pub fn delete_record(&self, id: &str) -> Result<bool, DbError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM diligence_records WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Record ids ordered by most recent update.
    pub fn list_record_ids(&self) -> Result<Vec<String>, DbError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id FROM diligence_records ORDER BY updated_at DESC, id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn write_payload(&self, record: &DiligenceRecord) -> Result<(), DbError> {
        let payload = serde_json::to_string(record)?;
        let created_at = record.created_at.clone().unwrap_or_default();
        let updated_at = record.updated_at.clone().unwrap_or_default();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO diligence_records (id, company_name, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                company_name = excluded.company_name,
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![record.id, record.company_name, payload, created_at, updated_at],
        )?;
        Ok(())
    }
}

#[async_trait]
impl DiligenceStore for DiligenceDb {
    async fn load_record(&self, id: &str) -> Result<Option<DiligenceRecord>, DiligenceError> {
        Ok(self.get_record(id)?)
    }

    async fn update_record(
        &self,
        id: &str,
        patch: RecordPatch,
    ) -> Result<DiligenceRecord, DiligenceError> {
        Ok(self.patch_record(id, patch)?)
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use super::DiligenceDb;

    /// Create a temporary database for testing.
    ///
    /// The `TempDir` is leaked so the directory outlives the test body.
    pub fn test_db() -> DiligenceDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        DiligenceDb::open_at(path).expect("Failed to open test database")
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;
    use crate::types::{DiligenceScore, MetricEntry, MetricSource};

    fn sample_record(id: &str) -> DiligenceRecord {
        DiligenceRecord {
            id: id.to_string(),
            company_name: "Acme".to_string(),
            company_url: Some("https://acme.io".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("records.db");
        let db = DiligenceDb::open_at(&path).expect("open");
        assert!(path.exists());
        assert!(db.list_record_ids().expect("list").is_empty());
    }

    #[test]
    fn test_upsert_and_get_roundtrip() {
        let db = test_db();
        let stored = db.upsert_record(&sample_record("r1")).expect("insert");
        assert!(stored.created_at.is_some());

        let loaded = db.get_record("r1").expect("get").expect("present");
        assert_eq!(loaded.company_name, "Acme");
        assert_eq!(loaded.created_at, stored.created_at);
        assert!(db.get_record("missing").expect("get").is_none());
    }

    #[test]
    fn test_patch_keeps_untouched_fields() {
        let db = test_db();
        let mut record = sample_record("r1");
        record.notes = Some("met at demo day".to_string());
        db.upsert_record(&record).expect("insert");

        let mut metrics = record.metrics.clone();
        metrics.insert("arr".to_string(), MetricEntry::new("$2M", MetricSource::Manual));
        let patched = db
            .patch_record(
                "r1",
                RecordPatch {
                    metrics: Some(metrics),
                    score: Some(DiligenceScore {
                        overall: 64,
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .expect("patch");

        assert_eq!(patched.notes.as_deref(), Some("met at demo day"));
        assert_eq!(patched.metric("arr"), Some("$2M"));

        let reloaded = db.get_record("r1").expect("get").expect("present");
        assert_eq!(reloaded.score.map(|s| s.overall), Some(64));
    }

    #[test]
    fn test_patch_missing_record_is_not_found() {
        let db = test_db();
        let err = db
            .patch_record("nope", RecordPatch::default())
            .expect_err("missing");
        assert!(matches!(err, DbError::NotFound(_)));
        assert!(matches!(
            DiligenceError::from(err),
            DiligenceError::RecordNotFound(id) if id == "nope"
        ));
    }

    #[test]
    fn test_delete_record() {
        let db = test_db();
        db.upsert_record(&sample_record("r1")).expect("insert");
        assert!(db.delete_record("r1").expect("delete"));
        assert!(!db.delete_record("r1").expect("delete again"));
    }

    #[tokio::test]
    async fn test_store_trait() {
        let db = test_db();
        db.upsert_record(&sample_record("r1")).expect("insert");

        let updated = db
            .update_record(
                "r1",
                RecordPatch {
                    team_research: Some("Ex-Stripe founders".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.team_research.as_deref(), Some("Ex-Stripe founders"));

        let loaded = db.load_record("r1").await.expect("load").expect("present");
        assert_eq!(loaded.team_research.as_deref(), Some("Ex-Stripe founders"));
    }
}
