// Callboard Core Library
// Softphone call logging with live dashboard updates

pub mod call_log;
pub mod config;
pub mod dashboard;
pub mod reconcile;
pub mod service;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod voice;

// Export core types
pub use call_log::{CallDirection, CallLogDraft, CallLogRecord, CallStatus, NewCallLog};
pub use config::CallboardConfig;
pub use dashboard::{BroadcastEvent, CallUpdate, DashboardServer, EventBroadcaster, LiveChannel};
pub use reconcile::{EditableField, LogCache};
pub use service::CallLogService;
pub use store::{CallLogStore, SqliteCallLogStore};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallboardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Call log {0} not found")]
    NotFound(i64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<rusqlite::Error> for CallboardError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CallboardError>;
