use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::CallLogStore;
use crate::call_log::{CallLogDraft, CallLogRecord, CallStatus};
use crate::{CallboardError, Result};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const COLUMNS: &str =
    "id, to_number, from_number, started_at, ended_at, duration_seconds, status, hidden, notes";

/// Call log backed by a single SQLite connection
///
/// Queries run on tokio's blocking pool; the connection mutex serializes them.
#[derive(Debug)]
pub struct SqliteCallLogStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl SqliteCallLogStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn, Some(path.to_path_buf()))?;
        info!(target: "store", path = %path.display(), "Call log store initialized");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| CallboardError::Storage("database mutex poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| CallboardError::Storage(format!("store task failed: {e}")))?
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CallLogRecord> {
    let status: String = row.get(6)?;
    let status = status
        .parse::<CallStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    let duration: i64 = row.get(5)?;

    Ok(CallLogRecord {
        id: row.get(0)?,
        to_number: row.get(1)?,
        from_number: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        duration_seconds: duration.max(0) as u64,
        status,
        hidden: row.get(7)?,
        notes: row.get(8)?,
    })
}

#[async_trait]
impl CallLogStore for SqliteCallLogStore {
    async fn insert(&self, draft: &CallLogDraft) -> Result<CallLogRecord> {
        let draft = draft.clone();
        let record = self
            .run(move |conn| {
                Ok(conn.query_row(
                    &format!(
                        "INSERT INTO call_logs (
                           to_number, from_number, started_at, ended_at, duration_seconds, status, hidden, notes
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, '')
                         RETURNING {COLUMNS}"
                    ),
                    params![
                        draft.to_number,
                        draft.from_number,
                        draft.started_at,
                        draft.ended_at,
                        i64::try_from(draft.duration_seconds).unwrap_or(i64::MAX),
                        draft.status.as_str(),
                    ],
                    map_row,
                )?)
            })
            .await?;
        debug!(target: "store", id = record.id, "Inserted call log");
        Ok(record)
    }

    async fn list(&self, include_hidden: bool) -> Result<Vec<CallLogRecord>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM call_logs WHERE (?1 OR hidden = 0) ORDER BY id DESC"
            ))?;
            let rows = stmt.query_map(params![include_hidden], map_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn get(&self, id: i64) -> Result<Option<CallLogRecord>> {
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM call_logs WHERE id = ?1"),
                    params![id],
                    map_row,
                )
                .optional()?)
        })
        .await
    }

    async fn hide(&self, id: i64) -> Result<Option<CallLogRecord>> {
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!("UPDATE call_logs SET hidden = 1 WHERE id = ?1 RETURNING {COLUMNS}"),
                    params![id],
                    map_row,
                )
                .optional()?)
        })
        .await
    }

    async fn set_notes(&self, id: i64, notes: &str) -> Result<Option<CallLogRecord>> {
        let notes = notes.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!("UPDATE call_logs SET notes = ?1 WHERE id = ?2 RETURNING {COLUMNS}"),
                    params![notes, id],
                    map_row,
                )
                .optional()?)
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.run(move |conn| {
            let removed = conn.execute("DELETE FROM call_logs WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CallLogRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM call_logs ORDER BY started_at DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], map_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn health_check(&self) -> Result<DateTime<Utc>> {
        let now: String = self
            .run(|conn| {
                Ok(conn.query_row(
                    "SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await?;
        DateTime::parse_from_rfc3339(&now)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CallboardError::Storage(e.to_string()))
    }
}
