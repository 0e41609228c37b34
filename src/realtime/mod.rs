//! Real-time store notifications via WebSocket
//!
//! Relays object-store "new file" events to every connected live client.

mod broadcaster;
mod events;
mod server;

pub use broadcaster::{
    BroadcastOutcome, Broadcaster, ConnectionId, Subscription, DEFAULT_SEND_TIMEOUT,
    DEFAULT_SUBSCRIBER_CAPACITY,
};
pub use events::{Notification, StoreEventPayload};
pub use server::{RealtimeServer, ServerState};
