//! End-to-end scenarios against `SendQueue` + `GrblFlowState` directly,
//! bypassing the transport/reactor layer (no mock injection point exists
//! below `SerialTransport::connect`). Covers the GRBL-side literal
//! scenarios from the testable-properties list: the happy path, buffer
//! saturation, and cancel during motion.

use cncctl_comm::queue::grbl::GrblFlowState;
use cncctl_comm::queue::SendQueue;
use cncctl_core::state::{LifecycleHooks, SendQueueEntry};
use cncctl_core::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingHooks {
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl LifecycleHooks for RecordingHooks {
    fn on_queued(&self) {
        self.events.lock().unwrap().push("queued");
    }
    fn on_sent(&self) {
        self.events.lock().unwrap().push("sent");
    }
    fn on_ack(&self) {
        self.events.lock().unwrap().push("ack");
    }
    fn on_executing(&self) {
        self.events.lock().unwrap().push("executing");
    }
    fn on_executed(&self) {
        self.events.lock().unwrap().push("executed");
    }
    fn on_error(&self, _err: &Error) {
        self.events.lock().unwrap().push("error");
    }
}

/// Scenario 1: GRBL happy path. A short job is admitted, acked in order,
/// and non-planner entries complete synchronously with their ack while
/// planner entries wait for the executed-loop to shift them off.
#[test]
fn grbl_happy_path_fires_hooks_in_order() {
    let mut queue = SendQueue::new();
    let mut flow = GrblFlowState::new(128);
    let events = Arc::new(Mutex::new(Vec::new()));

    // A status-only request never reaches the planner.
    queue.enqueue(
        SendQueueEntry::new("?", 0.0)
            .with_goes_to_planner(0)
            .with_hooks(Box::new(RecordingHooks { events: events.clone() })),
    );
    // A motion line goes to the planner and only completes once the
    // executed-loop later shifts it off.
    queue.enqueue(
        SendQueueEntry::new("G1 X10 F100", 0.0)
            .with_hooks(Box::new(RecordingHooks { events: events.clone() })),
    );

    let written = flow.admit(&mut queue);
    assert_eq!(written.len(), 2);

    flow.on_ack(&mut queue, None);
    flow.on_ack(&mut queue, None);

    // Status request fully resolved (queued/sent/ack/executing/executed);
    // the motion line stays queued awaiting the executed-loop.
    assert_eq!(queue.len(), 1);

    let got = events.lock().unwrap().clone();
    assert_eq!(got.iter().filter(|e| **e == "queued").count(), 2);
    assert_eq!(got.iter().filter(|e| **e == "sent").count(), 2);
    assert_eq!(got.iter().filter(|e| **e == "ack").count(), 2);
    assert!(got.contains(&"executing"));
    assert!(got.contains(&"executed"));
    // queued and sent always precede any ack for both entries.
    let last_sent = got.iter().rposition(|e| *e == "sent").unwrap();
    let first_ack = got.iter().position(|e| *e == "ack").unwrap();
    assert!(last_sent < first_ack);
}

/// Scenario 2: GRBL buffer saturation. Twenty lines exceed the receive
/// buffer; admission stops at the soft cap, and freeing space after an
/// ack admits exactly one more line (mirrors the unit-level
/// `admits_until_buffer_would_overflow`/`ack_frees_buffer_and_admits_more`
/// tests, composed here into a single saturate-then-drain sequence).
#[test]
fn grbl_buffer_saturation_then_drain_admits_incrementally() {
    let mut queue = SendQueue::new();
    let mut flow = GrblFlowState::new(128);
    for _ in 0..20 {
        queue.enqueue(SendQueueEntry::new("G1 X1 Y1 F100", 0.0)); // 13 bytes + \n = 14
    }

    let first_pass = flow.admit(&mut queue);
    assert_eq!(first_pass.len(), 8);
    assert!(flow.unacked_char_count <= 115);

    for _ in 0..8 {
        flow.on_ack(&mut queue, None);
    }
    assert_eq!(flow.unacked_char_count, 0);

    let second_pass = flow.admit(&mut queue);
    assert_eq!(second_pass.len(), 8);
    assert_eq!(queue.idx_to_send(), 16);
}

/// Scenario 4: cancel during motion. A job partway through execution is
/// cancelled; every entry still tracked by the queue, whether in flight or
/// merely queued, must see `on_error` exactly once, and the queue must
/// come back empty and reset to index zero so a fresh job can start
/// clean.
#[test]
fn grbl_cancel_during_motion_errors_every_remaining_entry() {
    let mut queue = SendQueue::new();
    let mut flow = GrblFlowState::new(128);
    let events = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..4 {
        queue.enqueue(
            SendQueueEntry::new("G1 X1 F100", 0.0)
                .with_hooks(Box::new(RecordingHooks { events: events.clone() })),
        );
    }
    flow.admit(&mut queue);
    flow.on_ack(&mut queue, None); // first line acked, now "executing"

    queue.cancel_all(&Error::cancelled("user abort"));

    assert_eq!(queue.len(), 0);
    assert_eq!(queue.idx_to_send(), 0);
    assert_eq!(queue.idx_to_ack(), 0);

    let got = events.lock().unwrap().clone();
    let error_count = got.iter().filter(|e| **e == "error").count();
    assert_eq!(error_count, 4);
}
