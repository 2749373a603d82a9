//! Client-side call log cache
//!
//! Every `call_update` triggers a full refetch; the fresh list replaces the
//! cache except for fields the user is editing. Those keep the local value
//! until a save for exactly that value is acknowledged.

use std::collections::HashMap;

use crate::call_log::CallLogRecord;
use crate::dashboard::BroadcastEvent;
use crate::stats::LogQuery;

/// A server value plus an optional unsaved local edit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditableField<T> {
    server: T,
    local: Option<T>,
}

impl<T: Clone + PartialEq> EditableField<T> {
    pub fn new(server: T) -> Self {
        Self {
            server,
            local: None,
        }
    }

    /// The value to display: the local edit if there is one
    pub fn value(&self) -> &T {
        self.local.as_ref().unwrap_or(&self.server)
    }

    pub fn server_value(&self) -> &T {
        &self.server
    }

    pub fn is_dirty(&self) -> bool {
        self.local.is_some()
    }

    pub fn edit(&mut self, value: T) {
        self.local = Some(value);
    }

    pub fn discard(&mut self) {
        self.local = None;
    }

    /// Take a fresh server value without touching a pending edit
    pub fn sync(&mut self, server: T) {
        self.server = server;
    }

    /// The server stored `saved`. The edit stays dirty if the user typed on after it.
    pub fn acknowledge_save(&mut self, saved: T) {
        if self.local.as_ref() == Some(&saved) {
            self.local = None;
        }
        self.server = saved;
    }
}

#[derive(Clone, Debug)]
struct CachedCallLog {
    record: CallLogRecord,
    notes: EditableField<String>,
}

impl CachedCallLog {
    fn new(record: CallLogRecord) -> Self {
        let notes = EditableField::new(record.notes.clone());
        Self { record, notes }
    }

    fn view(&self) -> CallLogRecord {
        CallLogRecord {
            notes: self.notes.value().clone(),
            ..self.record.clone()
        }
    }
}

/// Call logs as the dashboard shows them, in server order
#[derive(Clone, Debug, Default)]
pub struct LogCache {
    entries: Vec<CachedCallLog>,
}

impl LogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only `call_update` changes data; `connected` and `ping` never trigger a refetch
    pub fn needs_refetch(event: &BroadcastEvent) -> bool {
        matches!(event, BroadcastEvent::CallUpdate(_))
    }

    /// Replace the cache with a full server snapshot, keeping unsaved note edits
    pub fn reconcile(&mut self, snapshot: Vec<CallLogRecord>) {
        let mut previous: HashMap<i64, CachedCallLog> = self
            .entries
            .drain(..)
            .map(|entry| (entry.record.id, entry))
            .collect();

        self.entries = snapshot
            .into_iter()
            .map(|record| match previous.remove(&record.id) {
                Some(mut entry) => {
                    entry.notes.sync(record.notes.clone());
                    entry.record = record;
                    entry
                }
                None => CachedCallLog::new(record),
            })
            .collect();
    }

    /// Record a keystroke-level edit; `false` if the id is not cached
    pub fn begin_note_edit(&mut self, id: i64, text: impl Into<String>) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.notes.edit(text.into());
                true
            }
            None => false,
        }
    }

    pub fn discard_note_edit(&mut self, id: i64) {
        if let Some(entry) = self.entry_mut(id) {
            entry.notes.discard();
        }
    }

    /// Unsaved note text, if any
    pub fn pending_note(&self, id: i64) -> Option<&str> {
        self.entry(id)
            .filter(|entry| entry.notes.is_dirty())
            .map(|entry| entry.notes.value().as_str())
    }

    pub fn is_note_dirty(&self, id: i64) -> bool {
        self.pending_note(id).is_some()
    }

    /// The server acknowledged storing `saved` as the note of `id`
    pub fn note_saved(&mut self, id: i64, saved: impl Into<String>) {
        if let Some(entry) = self.entry_mut(id) {
            let saved = saved.into();
            entry.notes.acknowledge_save(saved.clone());
            entry.record.notes = saved;
        }
    }

    pub fn records(&self) -> Vec<CallLogRecord> {
        self.entries.iter().map(CachedCallLog::view).collect()
    }

    pub fn get(&self, id: i64) -> Option<CallLogRecord> {
        self.entry(id).map(CachedCallLog::view)
    }

    pub fn visible(&self, query: &LogQuery, office_number: &str) -> Vec<CallLogRecord> {
        query.apply(self.records(), office_number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: i64) -> Option<&CachedCallLog> {
        self.entries.iter().find(|entry| entry.record.id == id)
    }

    fn entry_mut(&mut self, id: i64) -> Option<&mut CachedCallLog> {
        self.entries.iter_mut().find(|entry| entry.record.id == id)
    }
}
