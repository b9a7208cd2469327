//! Client events — the observer contract for UI and logging layers.
//!
//! Rather than a single listener trait, observers subscribe independently;
//! each [`subscribe`](crate::DeviceClient::subscribe) call gets its own
//! broadcast receiver.  Delivery is best-effort: a lagging subscriber loses
//! the oldest events, and no subscriber can block the connection task.

use devlink_protocol::Envelope;
use tokio::sync::broadcast;

/// Notifications emitted by the connection task on relevant transitions.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Transport opened and the register envelope was sent.
    Connected,
    /// Transport lost or client shut down; pending requests were failed.
    Disconnected { reason: String },
    /// An inbound command is about to be dispatched.
    Command { action: String, message_id: String },
    /// Any decoded inbound envelope (fires for every kind).
    Message(Envelope),
    /// Human-readable failure report.
    Error(String),
}

#[derive(Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Send to all current subscribers.  No subscribers is fine.
    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }
}
