//! Explicit broadcast channels replacing the source's event-emitter
//! singleton (§9 "From event-emitter globals to explicit channels").
//!
//! Each event kind gets its own `tokio::sync::broadcast` channel rather than
//! a single `.emit("name", payload)` bus; consumers subscribe to exactly the
//! channel they need, and `wait_sync`-style primitives compose a channel
//! subscription with a `cancel_running_ops` subscription.

use crate::message::MessageDispatcher;
use crate::state::StatusSnapshot;
use tokio::sync::broadcast;

/// Reason a set of running operations was cancelled.
#[derive(Debug, Clone)]
pub struct CancelReason(pub String);

/// The fixed set of channels a protocol driver exposes, named after the
/// events listed in the design notes: `status_update`, `sent`, `received`,
/// `ack`, `cancel_running_ops`, `_send_queue_drain`, `_sending_disabled`.
pub struct EngineChannels {
    pub status_update: broadcast::Sender<StatusSnapshot>,
    pub sent: broadcast::Sender<f64>,
    pub received: broadcast::Sender<String>,
    pub ack: broadcast::Sender<f64>,
    pub cancel_running_ops: broadcast::Sender<CancelReason>,
    pub send_queue_drain: broadcast::Sender<()>,
    pub sending_disabled: broadcast::Sender<bool>,
    /// Human-facing leveled feed (connection lifecycle, `[MSG:…]`/TinyG
    /// `msg` feedback, alarms) for UI/log consumers.
    pub messages: MessageDispatcher,
}

impl EngineChannels {
    /// Buffer depth used for every channel. Deliberately generous: a slow
    /// subscriber should see lag errors long before these matter, since the
    /// engine itself never blocks on a full channel.
    const CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self {
            status_update: broadcast::channel(Self::CAPACITY).0,
            sent: broadcast::channel(Self::CAPACITY).0,
            received: broadcast::channel(Self::CAPACITY).0,
            ack: broadcast::channel(Self::CAPACITY).0,
            cancel_running_ops: broadcast::channel(Self::CAPACITY).0,
            send_queue_drain: broadcast::channel(Self::CAPACITY).0,
            sending_disabled: broadcast::channel(Self::CAPACITY).0,
            messages: MessageDispatcher::default(),
        }
    }

    /// Publish a status snapshot; dropped if there are no subscribers.
    pub fn publish_status(&self, snapshot: StatusSnapshot) {
        let _ = self.status_update.send(snapshot);
    }

    /// Fan out a cancellation to every waiter subscribed to
    /// `cancel_running_ops`.
    pub fn cancel_running_ops(&self, reason: impl Into<String>) {
        let _ = self.cancel_running_ops.send(CancelReason(reason.into()));
    }
}

impl Default for EngineChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineChannels")
            .field("status_update_subscribers", &self.status_update.receiver_count())
            .field("cancel_subscribers", &self.cancel_running_ops.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CommsSnapshot, Controller};

    #[tokio::test]
    async fn cancel_running_ops_reaches_subscriber() {
        let channels = EngineChannels::new();
        let mut rx = channels.cancel_running_ops.subscribe();
        channels.cancel_running_ops("Machine reset");
        let reason = rx.recv().await.unwrap();
        assert_eq!(reason.0, "Machine reset");
    }

    #[tokio::test]
    async fn status_update_delivers_snapshot() {
        let channels = EngineChannels::new();
        let mut rx = channels.status_update.subscribe();
        let snapshot = StatusSnapshot {
            controller: Controller::default_xyz(),
            comms: CommsSnapshot {
                send_queue_length: 0,
                idx_to_send: 0,
                idx_to_ack: 0,
                last_qr_num_free: None,
            },
        };
        channels.publish_status(snapshot);
        let got = rx.recv().await.unwrap();
        assert_eq!(got.comms.send_queue_length, 0);
    }
}
