//! The operations layer (§4.5, §4.6): builds the wire-level G-code for
//! every high-level motion/control call, throttles `real_time_move`, and
//! drives the `send_stream` backpressure pump. Dialect reactors call these
//! free functions instead of formatting G-code inline.
//!
//! No direct precedent to build on here (`ControllerTrait`'s own methods
//! are stubs that format nothing); built from GRBL/TinyG G-code
//! conventions and the jog-throttling shape implied by
//! `firmware::grbl::constants`' real-time command bytes.

pub mod probe;

use cncctl_core::state::SendQueueEntry;
use cncctl_core::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::oneshot;

use crate::queue::SendQueue;

/// Build a `G90 G1 <axis><value>... F<feed>` line for `move_to` (§4.5).
/// `None` entries leave that axis untouched.
pub fn move_gcode_line(axis_labels: &[char], pos: &[Option<f64>], feed: Option<f64>) -> Result<String> {
    if pos.len() != axis_labels.len() {
        return Err(Error::invalid_argument(
            "position vector length must match the configured axis count",
        ));
    }
    let mut line = String::from("G90 G1");
    let mut wrote_axis = false;
    for (label, value) in axis_labels.iter().zip(pos) {
        if let Some(v) = value {
            let _ = write!(line, " {label}{v}");
            wrote_axis = true;
        }
    }
    if !wrote_axis {
        return Err(Error::invalid_argument("move_to requires at least one axis"));
    }
    if let Some(f) = feed {
        let _ = write!(line, " F{f}");
    }
    Ok(line)
}

/// Build a `G38.2 <axis><value>... F<feed>` probe line (§4.6). Probing
/// requires an explicit feed rate; firmware rejects `G38.2` without one.
pub fn probe_gcode_line(axis_labels: &[char], target: &[Option<f64>], feed: Option<f64>) -> Result<String> {
    let feed = feed.ok_or_else(|| Error::invalid_argument("probe requires a feed rate"))?;
    if target.len() != axis_labels.len() {
        return Err(Error::invalid_argument(
            "probe target length must match the configured axis count",
        ));
    }
    let mut line = String::from("G38.2");
    let mut wrote_axis = false;
    for (label, value) in axis_labels.iter().zip(target) {
        if let Some(v) = value {
            let _ = write!(line, " {label}{v}");
            wrote_axis = true;
        }
    }
    if !wrote_axis {
        return Err(Error::invalid_argument("probe requires at least one axis"));
    }
    let _ = write!(line, " F{feed}");
    Ok(line)
}

/// GRBL's `home` (§4.5): stock firmware homes every configured axis
/// together and ignores a subset request.
pub fn home_gcode_grbl(_axes: Option<&[char]>) -> String {
    "$H".to_string()
}

/// TinyG's `home` (§4.5): `G28.2` accepts a per-axis word list; with no
/// explicit subset, home every axis the controller is configured to use.
pub fn home_gcode_tinyg(axis_labels: &[char], used_axes: &[bool], axes: Option<&[char]>) -> String {
    let mut line = String::from("G28.2");
    for (i, label) in axis_labels.iter().enumerate() {
        let wanted = match axes {
            Some(subset) => subset.contains(label),
            None => used_axes.get(i).copied().unwrap_or(true),
        };
        if wanted {
            let _ = write!(line, " {label}0");
        }
    }
    line
}

/// The axis indices a `home` call actually completes (§9 Open Question 1,
/// the `axisNUm` resolution): exactly the homable axes named in the
/// request, or every homable axis when none is named. Used to zero
/// `Controller::mpos`/set `Controller::homed` once the firmware acks the
/// homing cycle, independent of which axes the dialect's wire line lists.
pub fn resolved_home_axes(axis_labels: &[char], homable_axes: &[bool], axes: Option<&[char]>) -> Vec<usize> {
    axis_labels
        .iter()
        .enumerate()
        .filter(|(i, label)| {
            let homable = homable_axes.get(*i).copied().unwrap_or(true);
            let wanted = match axes {
                Some(subset) => subset.contains(label),
                None => true,
            };
            homable && wanted
        })
        .map(|(i, _)| i)
        .collect()
}

/// Per-axis jog throttle (§4.5 "real_time_move"): an accumulator drains at
/// a fraction of the axis's max feed rate and blocks a new increment once
/// it would overshoot `overshoot_factor` times the increment magnitude.
#[derive(Debug, Default)]
pub struct JogThrottle {
    state: HashMap<char, (f64, Instant)>,
}

impl JogThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to admit one jog increment for `axis`. Returns `true` if the
    /// increment was accepted (the caller should send it); `false` if the
    /// accumulator is still too full and the increment must be dropped.
    pub fn try_consume(&mut self, axis: char, inc: f64, max_feed_per_min: f64, overshoot_factor: f64) -> bool {
        let now = Instant::now();
        let max_feed_per_sec = (max_feed_per_min / 60.0).max(0.0);
        let entry = self.state.entry(axis).or_insert((0.0, now));
        let elapsed = now.duration_since(entry.1).as_secs_f64();
        entry.1 = now;

        let drain = elapsed * (0.9_f64.min(0.98) * max_feed_per_sec).max(0.0);
        entry.0 = (entry.0 - drain).max(0.0);

        let magnitude = inc.abs();
        let projected = entry.0 + magnitude;
        if projected > overshoot_factor * magnitude {
            false
        } else {
            entry.0 = projected;
            true
        }
    }
}

/// A `real_time_move` increment as three wire lines: switch to relative
/// distance mode, move, switch back (§4.5).
pub fn real_time_move_lines(axis: char, inc: f64) -> [String; 3] {
    [
        "G91".to_string(),
        format!("G0 {axis}{inc}"),
        "G90".to_string(),
    ]
}

/// Shared completion tracking for a `send_stream` batch: the last entry to
/// finish (executed or errored) resolves the caller's `respond` oneshot.
pub struct StreamHooks {
    remaining: Arc<AtomicUsize>,
    respond: Arc<StdMutex<Option<oneshot::Sender<Result<()>>>>>,
}

impl StreamHooks {
    fn resolve(&self, result: Result<()>) {
        if let Some(tx) = self.respond.lock().unwrap().take() {
            let _ = tx.send(result);
        }
    }
}

impl cncctl_core::state::LifecycleHooks for StreamHooks {
    fn on_executed(&self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.resolve(Ok(()));
        }
    }

    fn on_error(&self, err: &Error) {
        self.resolve(Err(err.clone()));
    }
}

/// A `send_stream` call in progress: lines not yet admitted into the
/// [`SendQueue`], plus the shared completion state every admitted entry's
/// hooks reference (§4.5 backpressure pump).
pub struct PendingStream {
    lines: VecDeque<String>,
    remaining: Arc<AtomicUsize>,
    respond: Arc<StdMutex<Option<oneshot::Sender<Result<()>>>>>,
}

impl PendingStream {
    pub fn new(lines: Vec<String>, respond: oneshot::Sender<Result<()>>) -> Self {
        Self {
            lines: lines.into(),
            remaining: Arc::new(AtomicUsize::new(0)),
            respond: Arc::new(StdMutex::new(Some(respond))),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.lines.is_empty()
    }

    /// Top up `queue` toward `high_water_mark`, only when its current depth
    /// has fallen to or below `low_water_mark` (§4.5). Returns the wire
    /// lines newly enqueued are NOT returned here: admission control (the
    /// dialect flow state) picks them up on its next pass.
    pub fn top_up(&mut self, queue: &mut SendQueue, high_water_mark: usize, low_water_mark: usize) {
        if self.lines.is_empty() {
            return;
        }
        if queue.len() > low_water_mark {
            return;
        }
        while queue.len() < high_water_mark {
            let Some(line) = self.lines.pop_front() else {
                break;
            };
            self.remaining.fetch_add(1, Ordering::SeqCst);
            let hooks = StreamHooks {
                remaining: Arc::clone(&self.remaining),
                respond: Arc::clone(&self.respond),
            };
            queue.enqueue(SendQueueEntry::new(line, 0.0).with_hooks(Box::new(hooks)));
        }
    }

    /// True once every line has been handed to the queue and every entry
    /// handed out has finished (executed or errored) — i.e. the respond
    /// oneshot has already fired, or will never have anything left to wait
    /// on.
    pub fn fully_drained(&self) -> bool {
        self.lines.is_empty() && self.remaining.load(Ordering::SeqCst) == 0
    }

    /// Resolve immediately, used when the stream was empty to begin with.
    pub fn resolve_empty(&self) {
        if self.lines.is_empty() && self.remaining.load(Ordering::SeqCst) == 0 {
            if let Some(tx) = self.respond.lock().unwrap().take() {
                let _ = tx.send(Ok(()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_gcode_line_skips_unset_axes() {
        let line = move_gcode_line(&['X', 'Y', 'Z'], &[Some(1.0), None, Some(2.0)], Some(500.0)).unwrap();
        assert_eq!(line, "G90 G1 X1 Z2 F500");
    }

    #[test]
    fn move_gcode_line_rejects_all_axes_unset() {
        assert!(move_gcode_line(&['X', 'Y'], &[None, None], None).is_err());
    }

    #[test]
    fn probe_gcode_line_requires_feed() {
        assert!(probe_gcode_line(&['Z'], &[Some(-10.0)], None).is_err());
        let line = probe_gcode_line(&['Z'], &[Some(-10.0)], Some(50.0)).unwrap();
        assert_eq!(line, "G38.2 Z-10 F50");
    }

    #[test]
    fn home_gcode_tinyg_restricts_to_requested_axes() {
        let line = home_gcode_tinyg(&['X', 'Y', 'Z'], &[true, true, true], Some(&['Z']));
        assert_eq!(line, "G28.2 Z0");
    }

    #[test]
    fn resolved_home_axes_defaults_to_every_homable_axis() {
        let axes = resolved_home_axes(&['X', 'Y', 'Z'], &[true, true, false], None);
        assert_eq!(axes, vec![0, 1]);
    }

    #[test]
    fn resolved_home_axes_restricts_to_requested_and_homable() {
        let axes = resolved_home_axes(&['X', 'Y', 'Z'], &[true, false, true], Some(&['Y', 'Z']));
        assert_eq!(axes, vec![2]);
    }

    #[test]
    fn jog_throttle_rejects_overshoot() {
        let mut throttle = JogThrottle::new();
        assert!(throttle.try_consume('X', 1.0, 600.0, 2.0));
        // Immediately repeating with no elapsed time should overshoot a
        // tight 2x factor.
        assert!(!throttle.try_consume('X', 1.0, 600.0, 2.0));
    }

    #[test]
    fn real_time_move_lines_wraps_in_relative_mode() {
        let lines = real_time_move_lines('Y', -0.5);
        assert_eq!(lines, ["G91".to_string(), "G0 Y-0.5".to_string(), "G90".to_string()]);
    }
}
