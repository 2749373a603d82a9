// Dashboard module - Live call log updates
//
// HTTP API for the call log plus an SSE channel that tells every open
// dashboard when to refetch.

mod api;
mod channel;
mod client;
mod event_stream;

pub use api::DashboardServer;
pub use channel::LiveChannel;
pub use client::{DashboardClient, DashboardSession, SseDecoder};
pub use event_stream::{BroadcastEvent, CallUpdate, ChannelId, EventBroadcaster};
