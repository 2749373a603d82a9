// Event streaming for Dashboard
//
// Fans call-log changes out to every open live channel. Each channel has its
// own bounded queue, so a stalled client only loses its own events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::channel::{ChannelSink, Delivery, LiveChannel};
use crate::call_log::CallLogRecord;

pub type ChannelId = u64;

/// Event sent to Dashboard clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum BroadcastEvent {
    /// First event on every channel
    Connected,
    /// Periodic liveness signal
    Ping,
    /// A call log changed; clients refetch the full list
    CallUpdate(CallUpdate),
}

impl BroadcastEvent {
    pub fn record(record: CallLogRecord) -> Self {
        BroadcastEvent::CallUpdate(CallUpdate::Record(record))
    }

    pub fn deleted(id: i64) -> Self {
        BroadcastEvent::CallUpdate(CallUpdate::Deleted { deleted_id: id })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastEvent::Connected => "connected",
            BroadcastEvent::Ping => "ping",
            BroadcastEvent::CallUpdate(_) => "call_update",
        }
    }
}

/// Payload of a `call_update` event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallUpdate {
    Deleted {
        #[serde(rename = "deletedId")]
        deleted_id: i64,
    },
    Record(CallLogRecord),
}

struct BroadcasterInner {
    channels: DashMap<ChannelId, Arc<ChannelSink>>,
    next_id: AtomicU64,
    capacity: usize,
}

/// Event broadcaster for Dashboard
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<BroadcasterInner>,
}

impl EventBroadcaster {
    /// Create a new broadcaster; `capacity` is the queue depth of each channel
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                channels: DashMap::new(),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Broadcast an event to all open channels, returning how many accepted it
    pub fn publish(&self, event: BroadcastEvent) -> usize {
        // Snapshot so no registry lock is held while delivering
        let sinks: Vec<Arc<ChannelSink>> = self
            .inner
            .channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut delivered = 0;
        for sink in sinks {
            match sink.emit(event.clone()) {
                Delivery::Delivered => delivered += 1,
                Delivery::Dropped => {
                    warn!(target: "dashboard", channel_id = sink.id(), kind = event.kind(), "Channel queue full; event dropped");
                }
                Delivery::Closed => {
                    debug!(target: "dashboard", channel_id = sink.id(), "Pruning closed channel");
                    self.inner.channels.remove(&sink.id());
                }
            }
        }
        delivered
    }

    /// Open a live channel that pings every `ping_interval` (a zero interval is raised to 1 ms)
    pub fn subscribe(&self, ping_interval: Duration) -> LiveChannel {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sink, receiver) = ChannelSink::open(id, self.inner.capacity);

        // Connected goes first; publishes can only reach the channel once it is registered
        sink.emit(BroadcastEvent::Connected);
        self.inner.channels.insert(id, Arc::clone(&sink));
        sink.start_ticker(ping_interval);

        info!(target: "dashboard", channel_id = id, channels = self.inner.channels.len(), "Live channel opened");
        LiveChannel::new(sink, receiver, self.clone())
    }

    /// Close and forget a channel. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ChannelId) {
        if let Some((_, sink)) = self.inner.channels.remove(&id) {
            if sink.close() {
                info!(target: "dashboard", channel_id = id, "Live channel closed");
            }
        }
    }

    /// Get number of open channels
    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }

    /// Close every channel, ending their streams
    pub fn close_all(&self) {
        let ids: Vec<ChannelId> = self.inner.channels.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.unsubscribe(id);
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_log::CallStatus;

    #[test]
    fn event_wire_format() {
        let connected = serde_json::to_string(&BroadcastEvent::Connected).unwrap();
        assert_eq!(connected, r#"{"type":"connected"}"#);

        let deleted = serde_json::to_value(BroadcastEvent::deleted(9)).unwrap();
        assert_eq!(deleted["type"], "call_update");
        assert_eq!(deleted["payload"]["deletedId"], 9);

        let parsed: BroadcastEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(parsed, BroadcastEvent::Ping);
    }

    #[test]
    fn call_update_payloads_parse_back() {
        let record = CallLogRecord {
            id: 3,
            to_number: "+1555".into(),
            from_number: "+1777".into(),
            started_at: None,
            ended_at: None,
            duration_seconds: 1,
            status: CallStatus::Error,
            hidden: true,
            notes: "x".into(),
        };
        let json = serde_json::to_string(&BroadcastEvent::record(record.clone())).unwrap();
        let parsed: BroadcastEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, BroadcastEvent::record(record));

        let parsed: BroadcastEvent =
            serde_json::from_str(r#"{"type":"call_update","payload":{"deletedId":4}}"#).unwrap();
        assert_eq!(parsed, BroadcastEvent::deleted(4));
    }

    #[test]
    fn publish_without_channels_is_noop() {
        let broadcaster = EventBroadcaster::new(4);
        assert_eq!(broadcaster.publish(BroadcastEvent::deleted(1)), 0);
        assert_eq!(broadcaster.channel_count(), 0);
    }
}
