//! End-to-end scenario against `SendQueue` + `TinyGFlowState` directly,
//! bypassing the transport/reactor layer. Covers the TinyG queue-report
//! literal scenario from the testable-properties list: a burst of motion
//! lines acked up front, then drained off the planner mirror as queue
//! reports arrive.

use cncctl_comm::queue::tinyg::TinyGFlowState;
use cncctl_comm::queue::SendQueue;
use cncctl_core::state::{LifecycleHooks, SendQueueEntry};
use cncctl_core::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingHooks {
    executed: Arc<Mutex<u32>>,
}

impl LifecycleHooks for RecordingHooks {
    fn on_executed(&self) {
        *self.executed.lock().unwrap() += 1;
    }
    fn on_error(&self, _err: &Error) {}
}

/// Scenario 3: TinyG queue-report flow. Five motion lines are admitted and
/// acked (response arrives well before execution), then two queue reports,
/// one that inserts planner slots via `qi` and one that drains them via
/// `qo`, resolve every line's `on_executed` hook in order.
#[test]
fn tinyg_queue_report_flow_resolves_executed_via_planner_mirror() {
    let mut queue = SendQueue::new();
    let mut flow = TinyGFlowState::new(28, 32);
    let executed = Arc::new(Mutex::new(0));

    for _ in 0..5 {
        queue.enqueue(
            SendQueueEntry::new("G1 X1 F100", 0.0)
                .with_hooks(Box::new(RecordingHooks { executed: executed.clone() })),
        );
    }

    let written = flow.admit(&mut queue);
    assert_eq!(written.len(), 5);

    for _ in 0..5 {
        flow.on_ack(&mut queue, None);
    }
    // Responses resolved, but nothing is `executed` yet: the planner
    // mirror has not heard from a queue report.
    assert_eq!(*executed.lock().unwrap(), 0);
    assert_eq!(queue.len(), 5);

    flow.on_queue_report(&mut queue, 23, 5, 0);
    assert_eq!(flow.planner_mirror.len(), 5);
    assert_eq!(*executed.lock().unwrap(), 0);

    flow.on_queue_report(&mut queue, 25, 0, 3);
    assert_eq!(flow.planner_mirror.len(), 2);
    assert_eq!(queue.len(), 2);
    assert_eq!(*executed.lock().unwrap(), 3);

    flow.on_queue_report(&mut queue, 28, 0, 2);
    assert_eq!(queue.len(), 0);
    assert_eq!(*executed.lock().unwrap(), 5);
}

/// An acked request that arrives between queue reports with `qi=0` still
/// resolves its entry rather than getting lost: it is folded into a fresh
/// mirror slot with an extra shift debt, which the same report then
/// immediately consumes (§4.4.6 step 1 debt path).
#[test]
fn tinyg_ack_with_no_insert_report_still_drains() {
    let mut queue = SendQueue::new();
    let mut flow = TinyGFlowState::new(28, 32);
    queue.enqueue(SendQueueEntry::new("G1 X1", 0.0));
    flow.admit(&mut queue);
    flow.on_ack(&mut queue, None);
    assert_eq!(queue.len(), 1);

    flow.on_queue_report(&mut queue, 27, 0, 0);
    assert_eq!(flow.planner_mirror.len(), 0);
    assert_eq!(queue.len(), 0);
}
