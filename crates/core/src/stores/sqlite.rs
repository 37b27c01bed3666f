use crate::error::StoreError;
use crate::models::{IngestStatus, NewRecord, Record, RecordId, SourceType};
use crate::traits::RecordStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    content TEXT,
    source_type TEXT NOT NULL,
    source_locator TEXT NOT NULL UNIQUE,
    vector_id TEXT,
    status TEXT NOT NULL DEFAULT 'ok',
    status_message TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_source_type ON records(source_type);
CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at);
";

const COLUMNS: &str = "id, title, content, source_type, source_locator, vector_id, \
                       status, status_message, metadata, created_at, updated_at";

/// Record store on a single SQLite file. `AUTOINCREMENT` keeps ids
/// monotonic even after deletes, so a vector key never silently points
/// at a reused id.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, draft: NewRecord) -> Result<Record, StoreError> {
        let now = Utc::now();
        let metadata = serde_json::to_string(&draft.metadata)?;
        let (status, status_message) = draft.status.as_parts();

        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO records (title, content, source_type, source_locator, vector_id, \
             status, status_message, metadata, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?8, ?8)",
            params![
                draft.title,
                draft.content,
                draft.source_type.as_str(),
                draft.source_locator,
                status,
                status_message,
                metadata,
                now.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(error) if is_unique_violation(&error) => {
                return Err(StoreError::DuplicateLocator(draft.source_locator));
            }
            Err(error) => return Err(error.into()),
        }

        let id = conn.last_insert_rowid();
        Ok(Record {
            id,
            title: draft.title,
            content: draft.content,
            source_type: draft.source_type,
            source_locator: draft.source_locator,
            vector_id: None,
            status: draft.status,
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, record: &Record) -> Result<Record, StoreError> {
        let metadata = serde_json::to_string(&record.metadata)?;
        let (status, status_message) = record.status.as_parts();
        let updated_at = Utc::now();

        let changed = self.conn()?.execute(
            "UPDATE records SET title = ?1, content = ?2, vector_id = ?3, status = ?4, \
             status_message = ?5, metadata = ?6, updated_at = ?7 WHERE id = ?8",
            params![
                record.title,
                record.content,
                record.vector_id,
                status,
                status_message,
                metadata,
                updated_at.to_rfc3339(),
                record.id,
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::RecordNotFound(record.id));
        }

        let mut stored = record.clone();
        stored.updated_at = updated_at;
        Ok(stored)
    }

    async fn get(&self, id: RecordId) -> Result<Record, StoreError> {
        self.conn()?
            .query_row(
                &format!("SELECT {COLUMNS} FROM records WHERE id = ?1"),
                params![id],
                record_from_row,
            )
            .optional()?
            .ok_or(StoreError::RecordNotFound(id))
    }

    async fn find_by_locator(&self, locator: &str) -> Result<Option<Record>, StoreError> {
        Ok(self
            .conn()?
            .query_row(
                &format!("SELECT {COLUMNS} FROM records WHERE source_locator = ?1"),
                params![locator],
                record_from_row,
            )
            .optional()?)
    }

    async fn by_vector_keys(&self, keys: &[String]) -> Result<Vec<Record>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=keys.len())
            .map(|position| format!("?{position}"))
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM records WHERE vector_id IN ({placeholders})"
        ))?;
        let rows = statement.query_map(params_from_iter(keys.iter()), record_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM records ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))?;
        let rows = statement.query_map(params![limit as i64], record_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let source_type_raw: String = row.get(3)?;
    let source_type = SourceType::parse(&source_type_raw).ok_or_else(|| {
        invalid_column(3, format!("unknown source type: {source_type_raw}"))
    })?;

    let status_raw: String = row.get(6)?;
    let status_message: Option<String> = row.get(7)?;
    let status = IngestStatus::from_parts(&status_raw, status_message)
        .ok_or_else(|| invalid_column(6, format!("unknown status: {status_raw}")))?;

    let metadata_raw: String = row.get(8)?;
    let metadata = serde_json::from_str(&metadata_raw)
        .map_err(|error| invalid_column(8, format!("bad metadata json: {error}")))?;

    Ok(Record {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        source_type,
        source_locator: row.get(4)?,
        vector_id: row.get(5)?,
        status,
        metadata,
        created_at: parse_timestamp(9, row.get(9)?)?,
        updated_at: parse_timestamp(10, row.get(10)?)?,
    })
}

fn parse_timestamp(index: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| invalid_column(index, format!("bad timestamp {raw}: {error}")))
}

fn invalid_column(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, message.into())
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
