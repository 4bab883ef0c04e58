//! The two literal scenarios whose real home is deep inside the async
//! reactor select loop (`engine::grbl`/`engine::tinyg`), which has no
//! transport mock-injection point to drive from a test. Each is exercised
//! here at the level of the pure primitive the reactor actually calls,
//! which is the part responsible for the scenario's observable outcome.

use cncctl_comm::operations::probe::tinyg_probe_tripped;
use cncctl_comm::queue::SendQueue;
use cncctl_core::state::{LifecycleHooks, SendQueueEntry};
use cncctl_core::Error;
use std::sync::{Arc, Mutex};

/// Scenario 5: probe not tripped (TinyG). A probe move that reaches its
/// commanded target with no firmware flag set never tripped; the engine's
/// probe-settle path reports this case as `Error::probe_not_tripped`
/// rather than a coordinate result (the reactor-level settle timer and
/// coordinate-restore sequencing around it are engine-internal and not
/// independently testable without a transport).
#[test]
fn tinyg_probe_reaching_target_reports_untripped() {
    let stop_pos = [0.0, 0.0, -10.0];
    let target = [None, None, Some(-10.0)];
    assert!(!tinyg_probe_tripped(&stop_pos, &target, None));
}

/// The firmware-reported flag can only ever confirm a trip, never veto one
/// the stop position already showed: a probe that stopped short is
/// tripped even if the (optional) flag says otherwise.
#[test]
fn tinyg_probe_flag_never_overrides_a_short_stop() {
    let stop_pos = [0.0, 0.0, -7.5];
    let target = [None, None, Some(-10.0)];
    assert!(tinyg_probe_tripped(&stop_pos, &target, Some(false)));
}

#[derive(Default)]
struct RecordingHooks {
    errors: Arc<Mutex<Vec<String>>>,
}

impl LifecycleHooks for RecordingHooks {
    fn on_error(&self, err: &Error) {
        self.errors.lock().unwrap().push(err.to_string());
    }
}

/// Scenario 6: unexpected welcome. Both engines respond to a welcome
/// banner arriving outside `WaitingWelcome`/`Opening`/`Retrying` the same
/// way: treat whatever was in flight as lost and reject it with
/// `Error::comm("unexpected welcome")` via `SendQueue::cancel_all`, the
/// exact call each reactor's `Welcome` arm makes. Exercised directly since
/// the lifecycle state machine around it lives in the reactor.
#[test]
fn unexpected_welcome_cancels_in_flight_work() {
    let mut queue = SendQueue::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    queue.enqueue(
        SendQueueEntry::new("G1 X10 F200", 0.0)
            .with_hooks(Box::new(RecordingHooks { errors: errors.clone() })),
    );
    queue.enqueue(
        SendQueueEntry::new("G1 Y10 F200", 0.0)
            .with_hooks(Box::new(RecordingHooks { errors: errors.clone() })),
    );
    queue.mark_sent();

    queue.cancel_all(&Error::comm("unexpected welcome"));

    assert_eq!(queue.len(), 0);
    assert_eq!(queue.idx_to_send(), 0);
    assert_eq!(queue.idx_to_ack(), 0);
    let got = errors.lock().unwrap();
    assert_eq!(got.len(), 2);
    assert!(got.iter().all(|e| e.contains("unexpected welcome")));
}
