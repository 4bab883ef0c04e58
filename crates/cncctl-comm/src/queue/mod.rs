//! Send queue and flow controller (§4.4) — the hardest part. This module
//! holds the dialect-agnostic queue mechanics (enqueue/dequeue, fractional
//! immediate line IDs, lifecycle hook firing); [`grbl`] and [`tinyg`] hold
//! each dialect's admission-control and ack-handling algorithm.
//!
//! Builds on the character-counting shape of
//! `firmware::grbl::communicator::GrblCommunicator`,
//! generalized from a byte counter guarding raw writes into a queue of typed
//! entries with lifecycle hooks; the planner mirror and lifecycle-hook
//! trait have no direct precedent to build on and are built fresh from
//! §4.4.6.

pub mod grbl;
pub mod tinyg;

use cncctl_core::state::SendQueueEntry;
use cncctl_core::Error;
use std::collections::VecDeque;

/// The shared send queue: entries waiting to go out, or already out and
/// awaiting completion. Indices are relative to the front of `entries` and
/// shift down whenever the head entry is spliced out.
pub struct SendQueue {
    entries: VecDeque<SendQueueEntry>,
    /// Index of the next entry to write.
    idx_to_send: usize,
    /// Index of the oldest entry that has been written but not yet acked.
    idx_to_ack: usize,
    next_line_id: f64,
    /// Forced-write credits from `send_immediate` (§4.4.1): one per call,
    /// consumed by admission control irrespective of backpressure.
    immediate_pending: u32,
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SendQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            idx_to_send: 0,
            idx_to_ack: 0,
            next_line_id: 1.0,
            immediate_pending: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn idx_to_send(&self) -> usize {
        self.idx_to_send
    }

    pub fn idx_to_ack(&self) -> usize {
        self.idx_to_ack
    }

    /// `send(entry)` (§4.4.1): append to the tail with the next
    /// strictly-monotonic integer line ID.
    pub fn enqueue(&mut self, mut entry: SendQueueEntry) -> f64 {
        entry.line_id = self.next_line_id;
        self.next_line_id += 1.0;
        let id = entry.line_id;
        if let Some(hooks) = &entry.hooks {
            hooks.on_queued();
        }
        self.entries.push_back(entry);
        id
    }

    /// `send_immediate(entry)` (§4.4.1): insert at `idx_to_send` with a
    /// fractional line ID that sorts strictly between its neighbors, and
    /// credit one forced write to admission control.
    pub fn enqueue_immediate(&mut self, mut entry: SendQueueEntry) -> f64 {
        let before = if self.idx_to_send > 0 {
            self.entries.get(self.idx_to_send - 1).map(|e| e.line_id)
        } else {
            None
        };
        let after = self.entries.get(self.idx_to_send).map(|e| e.line_id);
        let id = match (before, after) {
            (Some(b), Some(a)) => (b + a) / 2.0,
            (Some(b), None) => b + 0.5,
            (None, Some(a)) => a - 0.5,
            (None, None) => self.next_line_id,
        };
        entry.line_id = id;
        if let Some(hooks) = &entry.hooks {
            hooks.on_queued();
        }
        self.entries.insert(self.idx_to_send, entry);
        self.immediate_pending += 1;
        id
    }

    /// True if an admission pass may force one write past normal
    /// backpressure, consuming the credit.
    pub fn take_immediate_credit(&mut self) -> bool {
        if self.immediate_pending > 0 {
            self.immediate_pending -= 1;
            true
        } else {
            false
        }
    }

    pub fn has_immediate_credit(&self) -> bool {
        self.immediate_pending > 0
    }

    /// The next not-yet-written entry, if any.
    pub fn head_unsent(&self) -> Option<&SendQueueEntry> {
        self.entries.get(self.idx_to_send)
    }

    /// True if `entry` at `idx_to_send` is the first entry ever written
    /// (queue previously fully acked and empty of in-flight work).
    pub fn is_first_write(&self) -> bool {
        self.idx_to_send == 0 && self.idx_to_ack == 0
    }

    /// Whether the entry at `idx_to_send` is gated by an earlier or its own
    /// `full_sync` flag (§4.4.2).
    pub fn full_sync_blocks_send(&self) -> bool {
        if self.idx_to_send > self.idx_to_ack {
            // An earlier full_sync entry hasn't finished (not yet spliced).
            return self
                .entries
                .iter()
                .take(self.idx_to_send)
                .skip(self.idx_to_ack)
                .any(|e| e.full_sync);
        }
        false
    }

    /// Mark the entry at `idx_to_send` as written: fire `on_sent`, advance
    /// the pointer, and return its char count for buffer accounting.
    pub fn mark_sent(&mut self) -> Option<usize> {
        let entry = self.entries.get(self.idx_to_send)?;
        if let Some(hooks) = &entry.hooks {
            hooks.on_sent();
        }
        let char_count = entry.char_count;
        self.idx_to_send += 1;
        Some(char_count)
    }

    pub fn entry_at_ack(&self) -> Option<&SendQueueEntry> {
        self.entries.get(self.idx_to_ack)
    }

    pub fn entry_at_ack_mut(&mut self) -> Option<&mut SendQueueEntry> {
        self.entries.get_mut(self.idx_to_ack)
    }

    /// Fire `on_ack` on the oldest in-flight entry and advance `idx_to_ack`
    /// without removing it from the queue (§4.4.3: entries that go to the
    /// planner stay queued until the executed-loop or planner mirror
    /// resolves them).
    pub fn advance_ack(&mut self) -> Option<&SendQueueEntry> {
        let entry = self.entries.get(self.idx_to_ack)?;
        if let Some(hooks) = &entry.hooks {
            hooks.on_ack();
        }
        self.idx_to_ack += 1;
        if self.idx_to_ack == 1 {
            if let Some(new_head) = self.entries.front() {
                if let Some(hooks) = &new_head.hooks {
                    hooks.on_executing();
                }
            }
        }
        self.entries.get(self.idx_to_ack - 1)
    }

    /// Fire `on_error`, remove the acked entry from the queue without
    /// advancing past it (it is spliced, not shifted), and leave the
    /// indices consistent.
    pub fn splice_error_at_ack(&mut self, err: &Error) {
        if let Some(entry) = self.entries.get(self.idx_to_ack) {
            if let Some(hooks) = &entry.hooks {
                hooks.on_error(err);
            }
        }
        if self.idx_to_ack < self.entries.len() {
            self.entries.remove(self.idx_to_ack);
            if self.idx_to_send > self.idx_to_ack {
                self.idx_to_send -= 1;
            }
        }
    }

    /// Fire `on_executing`/`on_executed` immediately and splice the entry
    /// at `idx_to_ack` out (§4.4.3: entries that don't go to the planner
    /// complete synchronously with their ack).
    pub fn complete_non_planner_entry(&mut self) {
        if let Some(entry) = self.entries.get(self.idx_to_ack.saturating_sub(1)) {
            if let Some(hooks) = &entry.hooks {
                hooks.on_executing();
                hooks.on_executed();
            }
        }
        let idx = self.idx_to_ack.saturating_sub(1);
        if idx < self.entries.len() {
            self.entries.remove(idx);
            self.idx_to_ack = self.idx_to_ack.saturating_sub(1);
            if self.idx_to_send > idx {
                self.idx_to_send -= 1;
            }
        }
    }

    /// Shift the head entry off as executed (GRBL executed-loop, TinyG
    /// planner mirror). Fires `on_executing` (if not already executing) and
    /// `on_executed`.
    pub fn shift_executed_head(&mut self) -> Option<SendQueueEntry> {
        let entry = self.entries.pop_front()?;
        if let Some(hooks) = &entry.hooks {
            hooks.on_executed();
        }
        self.idx_to_send = self.idx_to_send.saturating_sub(1);
        self.idx_to_ack = self.idx_to_ack.saturating_sub(1);
        Some(entry)
    }

    /// The next entry awaiting a response, used for synthetic-ack checks
    /// (§4.4.4).
    pub fn next_awaiting_response(&self) -> Option<&SendQueueEntry> {
        self.entries.get(self.idx_to_ack)
    }

    pub fn iter_in_flight(&self) -> impl Iterator<Item = &SendQueueEntry> {
        self.entries.iter().skip(self.idx_to_ack).take(self.idx_to_send - self.idx_to_ack.min(self.idx_to_send))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SendQueueEntry> {
        self.entries.iter()
    }

    pub fn front(&self) -> Option<&SendQueueEntry> {
        self.entries.front()
    }

    /// Reject every pending entry with `err` and clear the queue
    /// (`cancel_running_ops`, §5).
    pub fn cancel_all(&mut self, err: &Error) {
        for entry in self.entries.drain(..) {
            if let Some(hooks) = &entry.hooks {
                hooks.on_error(err);
            }
        }
        self.idx_to_send = 0;
        self.idx_to_ack = 0;
        self.immediate_pending = 0;
    }

    /// Synced per §4.4.7 condition (ii): no entries in flight.
    pub fn drained(&self) -> bool {
        self.idx_to_ack >= self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cncctl_core::state::SendQueueEntry;

    #[test]
    fn enqueue_assigns_strictly_monotonic_ids() {
        let mut q = SendQueue::new();
        let a = q.enqueue(SendQueueEntry::new("G0 X1", 0.0));
        let b = q.enqueue(SendQueueEntry::new("G0 X2", 0.0));
        assert!(b > a);
    }

    #[test]
    fn immediate_insert_sorts_between_neighbors() {
        let mut q = SendQueue::new();
        q.enqueue(SendQueueEntry::new("A", 0.0));
        q.enqueue(SendQueueEntry::new("B", 0.0));
        q.mark_sent(); // idx_to_send now 1, between A and B.
        let id = q.enqueue_immediate(SendQueueEntry::new("!", 0.0));
        let ids: Vec<f64> = q.iter().map(|e| e.line_id).collect();
        assert_eq!(ids[1], id);
        assert!(ids[0] < id && id < ids[2]);
    }

    #[test]
    fn cancel_all_clears_queue_and_indices() {
        let mut q = SendQueue::new();
        q.enqueue(SendQueueEntry::new("A", 0.0));
        q.mark_sent();
        q.cancel_all(&Error::cancelled("stop"));
        assert_eq!(q.len(), 0);
        assert_eq!(q.idx_to_send(), 0);
        assert_eq!(q.idx_to_ack(), 0);
    }
}
