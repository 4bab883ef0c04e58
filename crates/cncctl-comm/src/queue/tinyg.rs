//! TinyG flow control (§4.4.2 TinyG branch, §4.4.6): admission against a
//! triple queue report (`qr`/`qi`/`qo`) plus response counting, and the
//! planner mirror that is the only reliable source of ordered `executed`
//! hooks since TinyG decouples acks from execution.
//!
//! No precedent exists for this elsewhere in the codebase (the reference
//! TinyG driver never tracks queue reports); built fresh from §4.4.2/§4.4.6,
//! reusing the same `SendQueue` mechanics the GRBL flow controller uses.

use super::SendQueue;
use cncctl_core::state::PlannerMirrorSlot;
use cncctl_core::Error;
use std::collections::VecDeque;

/// TinyG-side flow-control bookkeeping, owned by the engine driver.
#[derive(Debug, Clone)]
pub struct TinyGFlowState {
    pub planner_queue_size: u32,
    pub max_unacked_requests: usize,
    pub last_qr_num_free: Option<u32>,
    /// Line IDs of entries acked since the last queue report, consumed by
    /// `on_queue_report` to build the planner mirror (§4.4.6 step 1).
    acked_since_last_qr: Vec<f64>,
    /// Count of requests written but not yet acked.
    unacked_requests: usize,
    /// The planner mirror itself: one slot per firmware planner buffer
    /// entry, oldest first.
    pub planner_mirror: VecDeque<PlannerMirrorSlot>,
    /// Debt accumulated when acks arrive with `qi=0` and must be folded
    /// into the next queue report's shift instead (§4.4.6 step 1).
    extra_shift_debt: u32,
}

impl TinyGFlowState {
    pub fn new(planner_queue_size: u32, max_unacked_requests: usize) -> Self {
        Self {
            planner_queue_size,
            max_unacked_requests,
            last_qr_num_free: None,
            acked_since_last_qr: Vec::new(),
            unacked_requests: 0,
            planner_mirror: VecDeque::new(),
            extra_shift_debt: 0,
        }
    }

    fn effective_free_planner(&self, queue: &SendQueue) -> i64 {
        let Some(qr) = self.last_qr_num_free else {
            return i64::MAX;
        };
        let sent_unacked_planner: u32 = queue
            .iter_in_flight()
            .map(|e| e.goes_to_planner as u32)
            .sum();
        qr as i64 - crate::firmware::tinyg::QUEUE_REPORT_RESERVE - sent_unacked_planner as i64
    }

    fn nearly_full(&self) -> bool {
        self.unacked_requests >= crate::firmware::tinyg::NEARLY_FULL_UNACKED_RESPONSES
    }

    /// One admission pass (§4.4.2 TinyG branch).
    pub fn admit(&mut self, queue: &mut SendQueue) -> Vec<String> {
        let mut to_write = Vec::new();
        loop {
            if queue.full_sync_blocks_send() {
                break;
            }
            let Some(entry) = queue.head_unsent() else {
                break;
            };

            let under_unacked_cap = self.unacked_requests < self.max_unacked_requests;
            let has_room = !self.nearly_full() || self.effective_free_planner(queue) >= entry.goes_to_planner as i64;

            if under_unacked_cap && has_room {
                let line = entry.str.clone();
                queue.mark_sent();
                self.unacked_requests += 1;
                to_write.push(line);
                continue;
            }

            if queue.take_immediate_credit() {
                let line = entry.str.clone();
                queue.mark_sent();
                self.unacked_requests += 1;
                to_write.push(line);
                continue;
            }

            break;
        }
        to_write
    }

    /// Ack handling (§4.4.3) for a TinyG `{r:...}` response.
    pub fn on_ack(&mut self, queue: &mut SendQueue, error: Option<Error>) {
        let Some(entry) = queue.entry_at_ack() else {
            return;
        };
        let line_id = entry.line_id;
        let goes_to_planner = entry.goes_to_planner > 0;

        self.unacked_requests = self.unacked_requests.saturating_sub(1);

        if let Some(err) = error {
            queue.splice_error_at_ack(&err);
            return;
        }

        queue.advance_ack();
        self.acked_since_last_qr.push(line_id);

        if !goes_to_planner {
            queue.complete_non_planner_entry();
        }
    }

    /// Planner mirror update on a queue report (§4.4.6).
    pub fn on_queue_report(&mut self, queue: &mut SendQueue, qr: u32, qi: u32, qo: u32) {
        // Step 1: distribute qi inserted slots among acks since last report.
        if !self.acked_since_last_qr.is_empty() {
            if qi > 0 {
                let chunk = self.acked_since_last_qr.len() as u32 / qi.max(1);
                let mut iter = self.acked_since_last_qr.drain(..).peekable();
                for _ in 0..qi {
                    let mut low = None;
                    let mut high = None;
                    for _ in 0..chunk.max(1) {
                        if let Some(id) = iter.next() {
                            low.get_or_insert(id);
                            high = Some(id);
                        }
                    }
                    if let (Some(low), Some(high)) = (low, high) {
                        self.planner_mirror.push_back(PlannerMirrorSlot::Range {
                            low_line_id: low,
                            high_line_id: high,
                        });
                    } else {
                        self.planner_mirror.push_back(PlannerMirrorSlot::Null);
                    }
                }
                // Any leftover acks (uneven division) fold into the last slot.
                let leftover: Vec<f64> = iter.collect();
                if !leftover.is_empty() {
                    if let Some(PlannerMirrorSlot::Range { high_line_id, .. }) =
                        self.planner_mirror.back_mut()
                    {
                        *high_line_id = leftover.last().copied().unwrap_or(*high_line_id);
                    }
                }
            } else {
                // Acks arrived but qi=0: fold into the most recent slot, or
                // create one and record an extra shift debt.
                let ids = std::mem::take(&mut self.acked_since_last_qr);
                let low = ids.first().copied();
                let high = ids.last().copied();
                match self.planner_mirror.back_mut() {
                    Some(PlannerMirrorSlot::Range { high_line_id, .. }) => {
                        *high_line_id = high.unwrap_or(*high_line_id);
                    }
                    _ => {
                        if let (Some(low), Some(high)) = (low, high) {
                            self.planner_mirror
                                .push_back(PlannerMirrorSlot::Range { low_line_id: low, high_line_id: high });
                            self.extra_shift_debt += 1;
                        }
                    }
                }
            }
        } else if qi > 0 {
            for _ in 0..qi {
                self.planner_mirror.push_back(PlannerMirrorSlot::Null);
            }
        }

        // Step 2: shift qo + debt slots off the head, firing executed hooks
        // for every line ID in each shifted range.
        let shift_count = qo + std::mem::take(&mut self.extra_shift_debt);
        for _ in 0..shift_count {
            let Some(slot) = self.planner_mirror.pop_front() else {
                break;
            };
            if let PlannerMirrorSlot::Range { high_line_id, .. } = slot {
                while let Some(front) = queue.front() {
                    if front.line_id <= high_line_id {
                        queue.shift_executed_head();
                    } else {
                        break;
                    }
                }
            }
        }

        // Step 3: truncate overshoot.
        let max_len = self.planner_queue_size.saturating_sub(qr) as usize;
        while self.planner_mirror.len() > max_len {
            self.planner_mirror.pop_front();
        }

        // Step 4: update free-slot bookkeeping and re-enter admission.
        self.last_qr_num_free = Some(qr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cncctl_core::state::SendQueueEntry;

    #[test]
    fn empty_queue_report_leaves_mirror_empty() {
        let mut queue = SendQueue::new();
        let mut flow = TinyGFlowState::new(28, 32);
        flow.on_queue_report(&mut queue, 28, 0, 0);
        assert_eq!(flow.planner_mirror.len(), 0);
        assert_eq!(flow.last_qr_num_free, Some(28));
    }

    #[test]
    fn acks_then_qi_populates_mirror_ranges() {
        let mut queue = SendQueue::new();
        let mut flow = TinyGFlowState::new(28, 32);
        for _ in 0..3 {
            queue.enqueue(SendQueueEntry::new("G1 X1", 0.0));
        }
        flow.admit(&mut queue);
        flow.on_ack(&mut queue, None);
        flow.on_ack(&mut queue, None);
        flow.on_ack(&mut queue, None);
        flow.on_queue_report(&mut queue, 25, 3, 0);
        assert_eq!(flow.planner_mirror.len(), 3);
    }

    #[test]
    fn qo_shifts_slots_and_fires_executed() {
        let mut queue = SendQueue::new();
        let mut flow = TinyGFlowState::new(28, 32);
        for _ in 0..3 {
            queue.enqueue(SendQueueEntry::new("G1 X1", 0.0));
        }
        flow.admit(&mut queue);
        flow.on_ack(&mut queue, None);
        flow.on_ack(&mut queue, None);
        flow.on_ack(&mut queue, None);
        flow.on_queue_report(&mut queue, 25, 3, 0);
        flow.on_queue_report(&mut queue, 27, 0, 2);
        assert_eq!(flow.planner_mirror.len(), 1);
        assert_eq!(queue.len(), 1);
    }
}
