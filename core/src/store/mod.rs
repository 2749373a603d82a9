//! Call log storage
//!
//! The rest of the crate only sees [`CallLogStore`]; every method is a single
//! atomic write or read against the backing database.

mod sqlite;

pub use sqlite::SqliteCallLogStore;

use crate::call_log::{CallLogDraft, CallLogRecord};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait CallLogStore: Send + Sync {
    /// Insert a fully formed record and return it with its assigned id
    async fn insert(&self, draft: &CallLogDraft) -> Result<CallLogRecord>;

    /// All records, newest id first
    async fn list(&self, include_hidden: bool) -> Result<Vec<CallLogRecord>>;

    async fn get(&self, id: i64) -> Result<Option<CallLogRecord>>;

    /// Set `hidden = true`; `None` when no record has this id
    async fn hide(&self, id: i64) -> Result<Option<CallLogRecord>>;

    /// Replace `notes`; `None` when no record has this id
    async fn set_notes(&self, id: i64, notes: &str) -> Result<Option<CallLogRecord>>;

    /// Remove the row; `false` when no record has this id
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Most recently started calls
    async fn recent(&self, limit: usize) -> Result<Vec<CallLogRecord>>;

    /// Round-trip to the database, returning its clock
    async fn health_check(&self) -> Result<DateTime<Utc>>;
}
