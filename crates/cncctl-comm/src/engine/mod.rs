//! Protocol state machines / engine (§4.4.9, §5, §6): the connection
//! lifecycle, the single reactor task each dialect driver runs, and the
//! public `ControllerEngine` operations surface every consumer talks to.
//!
//! Builds on the polling-task-plus-`Notify`-shutdown shape
//! (`firmware::tinyg::controller::TinyGController::{start_polling,
//! stop_polling}`), generalized from a fire-and-forget background poller
//! into a single cooperative reactor task: one task owns the admission
//! loop, ack handler, queue-report handler, and executed-loop, and every
//! public operation talks to it over a command channel instead of
//! touching shared state directly.

pub mod grbl;
pub mod tinyg;

use async_trait::async_trait;
use cncctl_core::state::{LifecycleHooks, StatusSnapshot};
use cncctl_core::{Error, Result};
use std::sync::Mutex as StdMutex;
use tokio::sync::oneshot;

/// Connection lifecycle (§4.4.9): `disconnected → opening → waiting-welcome
/// → initializing → ready → (error|closed) → retrying → opening`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLifecycle {
    Disconnected,
    Opening,
    WaitingWelcome,
    Initializing,
    Ready,
    Closed,
    Retrying,
}

/// The public, dialect-independent operations surface (§6).
#[async_trait]
pub trait ControllerEngine: Send + Sync {
    async fn send(&self, line: String) -> Result<()>;
    async fn send_gcode(&self, line: String) -> Result<()>;
    async fn request(&self, line: String) -> Result<String>;
    async fn move_to(&self, pos: Vec<Option<f64>>, feed: Option<f64>) -> Result<()>;
    async fn home(&self, axes: Option<Vec<char>>) -> Result<()>;
    async fn probe(&self, target: Vec<Option<f64>>, feed: Option<f64>) -> Result<Vec<f64>>;
    async fn wait_sync(&self) -> Result<()>;
    async fn hold(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    async fn cancel(&self) -> Result<()>;
    async fn reset(&self) -> Result<()>;
    async fn send_stream(&self, lines: Vec<String>) -> Result<()>;
    async fn real_time_move(&self, axis: char, inc: f64) -> Result<bool>;
    async fn get_status(&self) -> StatusSnapshot;
    async fn close(&self);
}

/// A lifecycle hook that resolves a one-shot waiter on `ack`/`error`. Used
/// by `request()` to await the response to a specific queued entry without
/// a separate waiter registry (§9 "structured waiters").
pub struct AckWaiter {
    sender: StdMutex<Option<oneshot::Sender<Result<()>>>>,
}

impl AckWaiter {
    pub fn new(sender: oneshot::Sender<Result<()>>) -> Self {
        Self {
            sender: StdMutex::new(Some(sender)),
        }
    }
}

impl LifecycleHooks for AckWaiter {
    fn on_ack(&self) {
        if let Some(tx) = self.sender.lock().unwrap().take() {
            let _ = tx.send(Ok(()));
        }
    }

    fn on_error(&self, err: &Error) {
        if let Some(tx) = self.sender.lock().unwrap().take() {
            let _ = tx.send(Err(err.clone()));
        }
    }
}

/// Commands sent from operation handles into the single reactor task.
/// Every variant carries its own response channel; the reactor never
/// blocks processing one command on another.
pub enum Command {
    Send { line: String, immediate: bool },
    Request { line: String, respond: oneshot::Sender<Result<()>> },
    Move { pos: Vec<Option<f64>>, feed: Option<f64>, respond: oneshot::Sender<Result<()>> },
    Home { axes: Option<Vec<char>>, respond: oneshot::Sender<Result<()>> },
    Probe { target: Vec<Option<f64>>, feed: Option<f64>, respond: oneshot::Sender<Result<Vec<f64>>> },
    WaitSync { respond: oneshot::Sender<Result<()>> },
    Hold { respond: oneshot::Sender<Result<()>> },
    Resume { respond: oneshot::Sender<Result<()>> },
    Cancel { respond: oneshot::Sender<Result<()>> },
    Reset { respond: oneshot::Sender<Result<()>> },
    SendStream { lines: Vec<String>, respond: oneshot::Sender<Result<()>> },
    RealTimeMove { axis: char, inc: f64, respond: oneshot::Sender<Result<bool>> },
    GetStatus { respond: oneshot::Sender<StatusSnapshot> },
    Close,
}

/// Is the machine synced per §4.4.7: idle, nothing in flight, and a status
/// report arrived more recently than the most recent ack.
pub fn is_synced(
    ready: bool,
    held: bool,
    moving: bool,
    queue_drained: bool,
    disable_sending: bool,
    status_after_last_ack: bool,
) -> bool {
    let idle = ready && !held && !moving;
    idle && (queue_drained || disable_sending) && status_after_last_ack
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synced_requires_idle_drained_and_fresh_status() {
        assert!(is_synced(true, false, false, true, false, true));
        assert!(!is_synced(false, false, false, true, false, true));
        assert!(!is_synced(true, false, false, false, false, true));
        assert!(!is_synced(true, false, false, true, false, false));
        assert!(is_synced(true, false, false, false, true, true));
    }
}
