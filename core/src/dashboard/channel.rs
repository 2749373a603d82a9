// Live update channel
//
// One per dashboard session. Opening -> Open -> Closing -> Closed, where the
// close transition is a single compare-and-set and the sender is dropped under
// the same lock that emission takes, so a racing emit is a quiet no-op.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::Stream;

use super::event_stream::{BroadcastEvent, ChannelId, EventBroadcaster};

/// Outcome of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Queue full; this event is lost for this channel only
    Dropped,
    Closed,
}

/// Floor for the ping period; `tokio::time::interval` rejects zero
pub(crate) const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sending half of a channel, shared between the registry and the ping ticker
pub(crate) struct ChannelSink {
    id: ChannelId,
    closed: AtomicBool,
    sender: Mutex<Option<mpsc::Sender<BroadcastEvent>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSink {
    pub(crate) fn open(
        id: ChannelId,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<BroadcastEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Arc::new(Self {
            id,
            closed: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
            ticker: Mutex::new(None),
        });
        (sink, rx)
    }

    pub(crate) fn id(&self) -> ChannelId {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Never blocks and never fails loudly
    pub(crate) fn emit(&self, event: BroadcastEvent) -> Delivery {
        if self.is_closed() {
            return Delivery::Closed;
        }
        let sender = lock(&self.sender);
        let Some(tx) = sender.as_ref() else {
            return Delivery::Closed;
        };
        match tx.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Spawn the liveness ticker; the first ping fires one period after opening
    pub(crate) fn start_ticker(self: &Arc<Self>, period: Duration) {
        let period = period.max(MIN_PING_INTERVAL);
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(sink) = weak.upgrade() else { break };
                if sink.emit(BroadcastEvent::Ping) == Delivery::Closed {
                    break;
                }
            }
        });

        let mut ticker = lock(&self.ticker);
        if self.is_closed() {
            handle.abort();
        } else {
            *ticker = Some(handle);
        }
    }

    /// Returns `true` only for the call that performed the transition
    pub(crate) fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        lock(&self.sender).take();
        if let Some(handle) = lock(&self.ticker).take() {
            handle.abort();
        }
        true
    }
}

/// Receiving half of a live channel, owned by the connection serving one client
///
/// Dropping it closes the channel.
pub struct LiveChannel {
    sink: Arc<ChannelSink>,
    receiver: mpsc::Receiver<BroadcastEvent>,
    broadcaster: EventBroadcaster,
}

impl LiveChannel {
    pub(crate) fn new(
        sink: Arc<ChannelSink>,
        receiver: mpsc::Receiver<BroadcastEvent>,
        broadcaster: EventBroadcaster,
    ) -> Self {
        Self {
            sink,
            receiver,
            broadcaster,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.sink.id()
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    /// Next event, or `None` once the channel is closed
    pub async fn recv(&mut self) -> Option<BroadcastEvent> {
        std::future::poll_fn(|cx| self.poll_event(cx)).await
    }

    /// Idempotent
    pub fn close(&mut self) {
        self.broadcaster.unsubscribe(self.sink.id());
        self.sink.close();
        self.receiver.close();
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<BroadcastEvent>> {
        if self.sink.is_closed() {
            return Poll::Ready(None);
        }
        self.receiver.poll_recv(cx)
    }
}

impl Stream for LiveChannel {
    type Item = BroadcastEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_event(cx)
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.close();
    }
}
