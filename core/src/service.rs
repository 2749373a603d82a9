//! Call log mutations and reads
//!
//! Every mutation commits to the store first and only then publishes a
//! `call_update`; a failed write never reaches the broadcaster.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::info;

use crate::call_log::{CallLogRecord, NewCallLog};
use crate::config::CallboardConfig;
use crate::dashboard::{BroadcastEvent, EventBroadcaster};
use crate::stats::{self, DailyStats, LogQuery, LogSummary};
use crate::store::CallLogStore;
use crate::{CallboardError, Result};

#[derive(Clone)]
pub struct CallLogService {
    store: Arc<dyn CallLogStore>,
    broadcaster: EventBroadcaster,
    office_number: String,
    utc_offset: FixedOffset,
    recent_limit: usize,
}

impl CallLogService {
    pub fn new(store: Arc<dyn CallLogStore>, broadcaster: EventBroadcaster) -> Self {
        Self {
            store,
            broadcaster,
            office_number: String::new(),
            utc_offset: stats::fixed_offset(0),
            recent_limit: 3,
        }
    }

    pub fn from_config(
        store: Arc<dyn CallLogStore>,
        broadcaster: EventBroadcaster,
        config: &CallboardConfig,
    ) -> Self {
        Self::new(store, broadcaster)
            .with_office_number(config.office_number.clone())
            .with_utc_offset_minutes(config.utc_offset_minutes)
            .with_recent_limit(config.recent_limit)
    }

    pub fn with_office_number(mut self, office_number: impl Into<String>) -> Self {
        self.office_number = office_number.into();
        self
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset = stats::fixed_offset(minutes);
        self
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    pub fn office_number(&self) -> &str {
        &self.office_number
    }

    pub async fn create(&self, request: NewCallLog) -> Result<CallLogRecord> {
        let draft = request.validate()?;
        let record = self.store.insert(&draft).await?;
        info!(target: "calls", id = record.id, status = %record.status, "Call log created");
        self.broadcaster.publish(BroadcastEvent::record(record.clone()));
        Ok(record)
    }

    pub async fn hide(&self, id: i64) -> Result<CallLogRecord> {
        let record = self
            .store
            .hide(id)
            .await?
            .ok_or(CallboardError::NotFound(id))?;
        info!(target: "calls", id, "Call log hidden");
        self.broadcaster.publish(BroadcastEvent::record(record.clone()));
        Ok(record)
    }

    pub async fn annotate(&self, id: i64, text: &str) -> Result<CallLogRecord> {
        let record = self
            .store
            .set_notes(id, text)
            .await?
            .ok_or(CallboardError::NotFound(id))?;
        info!(target: "calls", id, len = text.len(), "Call log annotated");
        self.broadcaster.publish(BroadcastEvent::record(record.clone()));
        Ok(record)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self.store.delete(id).await? {
            return Err(CallboardError::NotFound(id));
        }
        info!(target: "calls", id, "Call log deleted");
        self.broadcaster.publish(BroadcastEvent::deleted(id));
        Ok(())
    }

    pub async fn list(&self, query: &LogQuery) -> Result<Vec<CallLogRecord>> {
        let records = self.store.list(query.hidden).await?;
        Ok(query.apply(records, &self.office_number))
    }

    pub async fn get(&self, id: i64) -> Result<CallLogRecord> {
        self.store.get(id).await?.ok_or(CallboardError::NotFound(id))
    }

    pub async fn recent(&self) -> Result<Vec<CallLogRecord>> {
        self.store.recent(self.recent_limit).await
    }

    pub async fn summary(&self) -> Result<LogSummary> {
        let records = self.store.list(true).await?;
        Ok(LogSummary::from_records(
            &records,
            &self.office_number,
            self.utc_offset,
        ))
    }

    pub async fn daily(&self) -> Result<Vec<DailyStats>> {
        let records = self.store.list(true).await?;
        Ok(stats::daily_stats(&records, self.utc_offset))
    }

    /// CSV of the records matching `query`
    pub async fn export_csv(&self, query: &LogQuery) -> Result<Vec<u8>> {
        let records = self.list(query).await?;
        let mut out = Vec::new();
        stats::write_csv(&records, &mut out)?;
        Ok(out)
    }

    pub async fn health_check(&self) -> Result<DateTime<Utc>> {
        self.store.health_check().await
    }
}
