//! The data model shared by every dialect driver: the [`Controller`] record
//! (machine state), [`SendQueueEntry`] (one queued line and its lifecycle),
//! and [`PlannerMirrorSlot`] (TinyG's planner-queue mirror).
//!
//! These are plain records, not actors: the engine in `cncctl-comm` owns the
//! logic that mutates them. Keeping them here lets both the GRBL and TinyG
//! drivers, and anything reading a status snapshot, share one vocabulary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coolant state, mirroring GRBL/TinyG's M7/M8/M9 semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Coolant {
    #[default]
    Off,
    Mist,
    Flood,
    Both,
}

/// Linear measurement system for the `units` field (G20/G21).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Units {
    #[default]
    Mm,
    In,
}

/// A structured, stable description of the controller's last error or alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Stable subcode, e.g. `"position_unknown"`, used by operations such as
    /// `cancel` to decide on follow-up behavior.
    pub subcode: Option<String>,
    /// Human-readable description as reported by the firmware.
    pub message: String,
}

/// Axis-aligned vector, sized to however many axes the controller is
/// configured with (default 3: X, Y, Z; up to 6).
pub type AxisVec = Vec<f64>;

/// Entity: Controller (singleton per physical device).
///
/// Mirrors §3 of the engine specification: a mutable record of axes,
/// positions, modal groups, offsets, homing, alarm, and current-status-report
/// values. Owned by the protocol driver; external readers get a consistent
/// snapshot via `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Controller {
    /// Ordered axis letters, e.g. `['X', 'Y', 'Z']`. Up to 6.
    pub axis_labels: Vec<char>,
    /// Which axes are actually wired on this machine.
    pub used_axes: Vec<bool>,
    /// Which axes support homing.
    pub homable_axes: Vec<bool>,

    pub ready: bool,
    pub held: bool,
    pub moving: bool,
    pub error: bool,
    pub program_running: bool,

    pub error_data: Option<ErrorData>,

    /// Machine position, absolute to the machine frame.
    pub mpos: AxisVec,
    /// Work position, relative to the active coordinate system and G92
    /// offset. Present only once derived or reported.
    pub wpos: Option<AxisVec>,

    /// Active work coordinate system: 0-5 for G54-G59(.3), or `None` for
    /// machine coordinates.
    pub active_coord_sys: Option<u8>,
    /// One offset vector per coordinate system (G54..G59.3).
    pub coord_sys_offsets: Vec<AxisVec>,

    /// G92 offset and whether it is currently applied.
    pub offset: AxisVec,
    pub offset_enabled: bool,

    /// G28 and G30 stored positions.
    pub stored_positions: [AxisVec; 2],

    /// Which axes have completed homing.
    pub homed: Vec<bool>,

    pub units: Units,

    pub feed: f64,
    pub spindle_speed: f64,
    pub spindle: bool,
    /// +1 (M3) or -1 (M4).
    pub spindle_direction: i8,
    pub coolant: Coolant,

    /// Most recently executed line number, as reported by the firmware.
    pub line: u32,

    pub inverse_feed: bool,
    pub incremental: bool,

    /// Keys that have ever been reported by a status report and therefore
    /// must never be overwritten again from G-code-derived modal parsing
    /// (§4.3 "don't overwrite" rule). Keyed by a stable field name.
    #[serde(default)]
    pub status_owned_keys: std::collections::HashSet<String>,
}

impl Controller {
    /// Build a fresh controller for the given axis labels (default XYZ).
    pub fn new(axis_labels: Vec<char>) -> Self {
        let n = axis_labels.len();
        Self {
            used_axes: vec![true; n],
            homable_axes: vec![true; n],
            ready: false,
            held: false,
            moving: false,
            error: false,
            program_running: false,
            error_data: None,
            mpos: vec![0.0; n],
            wpos: None,
            active_coord_sys: Some(0),
            coord_sys_offsets: vec![vec![0.0; n]; 9],
            offset: vec![0.0; n],
            offset_enabled: false,
            stored_positions: [vec![0.0; n], vec![0.0; n]],
            homed: vec![false; n],
            units: Units::Mm,
            feed: 0.0,
            spindle_speed: 0.0,
            spindle: false,
            spindle_direction: 1,
            coolant: Coolant::Off,
            line: 0,
            inverse_feed: false,
            incremental: false,
            status_owned_keys: Default::default(),
            axis_labels,
        }
    }

    pub fn default_xyz() -> Self {
        Self::new(vec!['X', 'Y', 'Z'])
    }

    /// Has this status-report field ever been reported? Once true, G-code
    /// parsing must never write to the corresponding state again.
    pub fn owns_key(&self, key: &str) -> bool {
        self.status_owned_keys.contains(key)
    }

    /// Record that a status report just reported this key, granting it
    /// permanent ownership per §4.3.
    pub fn mark_status_owned(&mut self, key: &str) {
        self.status_owned_keys.insert(key.to_string());
    }

    /// Derive the work position from machine position, the active
    /// coordinate-system offset, and the G92 offset (§4.3, §8 invariant 5).
    pub fn derive_wpos(&self) -> AxisVec {
        let coord_offset = self
            .active_coord_sys
            .and_then(|i| self.coord_sys_offsets.get(i as usize))
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.mpos.len()]);

        self.mpos
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                let c = coord_offset.get(i).copied().unwrap_or(0.0);
                let g92 = if self.offset_enabled {
                    self.offset.get(i).copied().unwrap_or(0.0)
                } else {
                    0.0
                };
                m - c - g92
            })
            .collect()
    }
}

/// Optional per-entry lifecycle callbacks (§9: "typed lifecycle trait"
/// design note). Each method fires synchronously and at most once per
/// phase; the engine never awaits inside a hook.
pub trait LifecycleHooks: Send + Sync {
    fn on_queued(&self) {}
    fn on_sent(&self) {}
    fn on_ack(&self) {}
    fn on_executing(&self) {}
    fn on_executed(&self) {}
    fn on_error(&self, _err: &crate::error::Error) {}
}

/// Entity: SendQueueEntry — one line waiting to go to, or already on, the
/// wire, tracked through its lifecycle.
pub struct SendQueueEntry {
    /// Exact bytes to send, without trailing newline.
    pub str: String,
    /// Monotonically assigned; fractional values are used for immediate
    /// insertions so ordering is preserved without renumbering neighbors.
    pub line_id: f64,
    /// Parsed G-code line, if this entry originated from G-code.
    pub gcode: Option<String>,
    /// Per-entry lifecycle hooks.
    pub hooks: Option<Box<dyn LifecycleHooks>>,
    /// Whether the firmware is expected to emit a response for this entry.
    pub response_expected: bool,
    /// Estimated number of planner slots this entry will consume (0-4).
    pub goes_to_planner: u8,
    /// If set, this entry may only start when the queue ahead of it is
    /// empty, and nothing after it may be sent until it completes.
    pub full_sync: bool,
    /// Bytes charged to the firmware receive buffer once sent (GRBL).
    pub char_count: usize,
    /// Estimated execution duration, machine time (GRBL executed-loop).
    pub duration: Option<f64>,
    /// Estimated or actual execution timestamp (machine time).
    pub time_executed: Option<f64>,
}

impl SendQueueEntry {
    /// Build an entry for a line of G-code (or raw request) with the given
    /// byte payload, charging `payload.len() + 1` bytes for the trailing
    /// newline GRBL will see on the wire.
    pub fn new(str: impl Into<String>, line_id: f64) -> Self {
        let str = str.into();
        let char_count = str.len() + 1;
        Self {
            str,
            line_id,
            gcode: None,
            hooks: None,
            response_expected: true,
            goes_to_planner: 1,
            full_sync: false,
            char_count,
            duration: None,
            time_executed: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn LifecycleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_full_sync(mut self, full_sync: bool) -> Self {
        self.full_sync = full_sync;
        self
    }

    pub fn with_goes_to_planner(mut self, n: u8) -> Self {
        self.goes_to_planner = n;
        self
    }

    pub fn with_response_expected(mut self, expected: bool) -> Self {
        self.response_expected = expected;
        self
    }
}

impl std::fmt::Debug for SendQueueEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendQueueEntry")
            .field("str", &self.str)
            .field("line_id", &self.line_id)
            .field("response_expected", &self.response_expected)
            .field("goes_to_planner", &self.goes_to_planner)
            .field("full_sync", &self.full_sync)
            .field("char_count", &self.char_count)
            .finish()
    }
}

/// Entity: PlannerMirrorSlot (TinyG only).
///
/// A range `[low_line_id, high_line_id]` inclusive, or a null marker,
/// representing one firmware planner buffer slot and the set of outgoing
/// line IDs attributed to it (§4.4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlannerMirrorSlot {
    Range { low_line_id: f64, high_line_id: f64 },
    Null,
}

/// A consistent, read-only snapshot of the controller plus engine
/// bookkeeping, as returned by `get_status` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub controller: ControllerSnapshot,
    pub comms: CommsSnapshot,
}

/// Serializable view of [`Controller`] (the live struct holds a
/// non-`Serialize`-friendly hook map elsewhere in the queue, so the
/// controller itself is fully serializable and is embedded directly).
pub type ControllerSnapshot = Controller;

/// The small `comms` sub-object accompanying every status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommsSnapshot {
    pub send_queue_length: usize,
    pub idx_to_send: usize,
    pub idx_to_ack: usize,
    pub last_qr_num_free: Option<u32>,
}

/// Per-axis maximum feed rates, keyed by axis label, used by `real_time_move`
/// throttling (§4.5) and by the time-estimation used for the executed-loop.
pub type AxisMaxFeeds = HashMap<char, f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_wpos_subtracts_coord_offset_and_g92() {
        let mut c = Controller::default_xyz();
        c.mpos = vec![10.0, 20.0, 0.0];
        c.active_coord_sys = Some(0);
        c.coord_sys_offsets[0] = vec![1.0, 2.0, 0.0];
        c.offset = vec![0.5, 0.5, 0.0];
        c.offset_enabled = true;
        let wpos = c.derive_wpos();
        assert_eq!(wpos, vec![8.5, 17.5, 0.0]);
    }

    #[test]
    fn derive_wpos_ignores_disabled_g92() {
        let mut c = Controller::default_xyz();
        c.mpos = vec![10.0, 20.0, 0.0];
        c.offset = vec![5.0, 5.0, 5.0];
        c.offset_enabled = false;
        let wpos = c.derive_wpos();
        assert_eq!(wpos, vec![10.0, 20.0, 0.0]);
    }

    #[test]
    fn status_owned_key_sticks() {
        let mut c = Controller::default_xyz();
        assert!(!c.owns_key("MPos"));
        c.mark_status_owned("MPos");
        assert!(c.owns_key("MPos"));
    }

    #[test]
    fn send_queue_entry_char_count_includes_newline() {
        let entry = SendQueueEntry::new("G1 X1 Y1 F100", 1.0);
        assert_eq!(entry.char_count, 14);
    }
}
