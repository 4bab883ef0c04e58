//! GRBL flow control (§4.4.2 GRBL branch, §4.4.5): character-counting
//! admission against the firmware receive buffer, plus the executed-loop
//! time model GRBL needs since it never reports per-line completion.
//!
//! Builds on the `GrblCommunicator` character-counting state
//! (`pending_chars`/`acked_chars` against a fixed `rx_buffer_size`),
//! generalized from a single running counter guarding raw byte writes into
//! per-entry admission against a queue of typed, hook-bearing entries.

use super::SendQueue;
use cncctl_core::Error;

/// Bytes of headroom GRBL's receive buffer needs below its nominal size
/// before a regular (non-immediate) write is considered safe (§4.4.2).
const SOFT_CAP_HEADROOM: usize = 13;

/// GRBL-side flow-control bookkeeping, owned by the engine driver.
#[derive(Debug, Clone)]
pub struct GrblFlowState {
    pub rx_buffer_size: usize,
    /// Sum of `char_count` for every entry written but not yet acked.
    pub unacked_char_count: usize,
    /// Known planner buffer depth, if reported via `$I`/`OPT` probing.
    /// When set, the executed-loop defers to ack-driven completion instead
    /// of time-based shifting (§4.4.5).
    pub planner_known_full: bool,
}

impl GrblFlowState {
    pub fn new(rx_buffer_size: usize) -> Self {
        Self {
            rx_buffer_size,
            unacked_char_count: 0,
            planner_known_full: false,
        }
    }

    fn buffer_max_fill(&self) -> usize {
        self.rx_buffer_size.saturating_sub(SOFT_CAP_HEADROOM)
    }

    fn absolute_buffer_max_fill(&self) -> usize {
        self.rx_buffer_size
    }

    /// One admission pass: write every entry at the head of the unsent
    /// portion that currently fits, returning the wire lines to write in
    /// order. Mutates `unacked_char_count` and the queue's send pointer as
    /// entries are admitted.
    pub fn admit(&mut self, queue: &mut SendQueue) -> Vec<String> {
        let mut to_write = Vec::new();
        loop {
            if queue.full_sync_blocks_send() {
                break;
            }
            let Some(entry) = queue.head_unsent() else {
                break;
            };
            if entry.full_sync && queue.idx_to_send() != queue.idx_to_ack() {
                // Earlier entries still in flight; full_sync must be alone.
                break;
            }

            let fits = if queue.is_first_write() {
                true
            } else {
                self.unacked_char_count + entry.char_count <= self.buffer_max_fill()
            };
            let entry_full_sync = entry.full_sync;

            if fits {
                let line = entry.str.clone();
                let char_count = queue.mark_sent().unwrap_or(0);
                self.unacked_char_count += char_count;
                to_write.push(line);
                if entry_full_sync {
                    break;
                }
                continue;
            }

            if queue.take_immediate_credit()
                && self.unacked_char_count + entry.char_count <= self.absolute_buffer_max_fill()
            {
                let line = entry.str.clone();
                let char_count = queue.mark_sent().unwrap_or(0);
                self.unacked_char_count += char_count;
                to_write.push(line);
                continue;
            }

            break;
        }
        to_write
    }

    /// Ack handling (§4.4.3) for a GRBL `ok` (or `ok:<payload>`). `error`
    /// carries the decoded taxonomy when the ack is actually an
    /// `error:<code>` response.
    pub fn on_ack(&mut self, queue: &mut SendQueue, error: Option<Error>) {
        let Some(entry) = queue.entry_at_ack() else {
            return;
        };
        let char_count = entry.char_count;
        let goes_to_planner = entry.goes_to_planner > 0;

        if let Some(err) = error {
            self.unacked_char_count = self.unacked_char_count.saturating_sub(char_count);
            queue.splice_error_at_ack(&err);
            // GRBL policy: one entry's error fails the whole in-flight job.
            queue.cancel_all(&err);
            return;
        }

        queue.advance_ack();
        self.unacked_char_count = self.unacked_char_count.saturating_sub(char_count);

        if !goes_to_planner {
            queue.complete_non_planner_entry();
        }
        // Entries that do go to the planner stay queued; the executed-loop
        // (below) shifts them off once their estimated time has passed.
    }

    /// Background timer tick (§4.4.5): pop head entries whose estimated
    /// `time_executed` has passed, unless the planner is known full (defer
    /// to acks in that case).
    pub fn executed_loop_tick(&mut self, queue: &mut SendQueue, machine_time: f64) {
        if self.planner_known_full {
            return;
        }
        while let Some(head) = queue.front() {
            if queue.idx_to_ack() == 0 {
                // Head hasn't even been acked yet; nothing to shift.
                break;
            }
            match head.time_executed {
                Some(t) if t <= machine_time => {
                    queue.shift_executed_head();
                }
                _ => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cncctl_core::state::SendQueueEntry;

    #[test]
    fn admits_until_buffer_would_overflow() {
        let mut queue = SendQueue::new();
        let mut flow = GrblFlowState::new(128);
        for _ in 0..20 {
            queue.enqueue(SendQueueEntry::new("G1 X1 Y1 F100", 0.0)); // 13 bytes + \n = 14
        }
        let written = flow.admit(&mut queue);
        // floor(115/14) = 8
        assert_eq!(written.len(), 8);
        assert_eq!(flow.unacked_char_count, 112);
    }

    #[test]
    fn ack_frees_buffer_and_admits_more() {
        let mut queue = SendQueue::new();
        let mut flow = GrblFlowState::new(128);
        for _ in 0..20 {
            queue.enqueue(SendQueueEntry::new("G1 X1 Y1 F100", 0.0));
        }
        flow.admit(&mut queue);
        flow.on_ack(&mut queue, None);
        let more = flow.admit(&mut queue);
        assert_eq!(more.len(), 1);
        assert!(flow.unacked_char_count <= 115);
    }

    #[test]
    fn error_ack_cancels_remaining_queue() {
        let mut queue = SendQueue::new();
        let mut flow = GrblFlowState::new(128);
        queue.enqueue(SendQueueEntry::new("G1 X1", 0.0));
        queue.enqueue(SendQueueEntry::new("G1 X2", 0.0));
        flow.admit(&mut queue);
        flow.on_ack(&mut queue, Some(Error::limit_hit("hard limit")));
        assert_eq!(queue.len(), 0);
    }
}
