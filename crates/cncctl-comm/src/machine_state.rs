//! Machine state model (§4.3): folds status reports, parameter feedback,
//! and outgoing G-code into the shared [`Controller`] record, honoring the
//! "status report owns this key forever" rule.
//!
//! Generalizes the usual modal-state tracking shape
//! (`firmware::grbl::status_parser`/`firmware::tinyg::utils`) into
//! dialect-agnostic folding functions that operate on the shared
//! `cncctl_core::state::Controller` instead of dialect-specific structs.

use crate::codec::grbl::GrblStatusReport;
use crate::codec::tinyg::TinyGValue;
use cncctl_core::state::{Coolant, Controller, Units};

/// Status-report field names as tracked in `status_owned_keys` (§4.3).
mod keys {
    pub const MPOS: &str = "mpos";
    pub const WPOS: &str = "wpos";
    pub const STATE: &str = "state";
    pub const FEED: &str = "feed";
    pub const SPINDLE_SPEED: &str = "spindle_speed";
    pub const LINE: &str = "line";
    pub const ACTIVE_COORD_SYS: &str = "active_coord_sys";
    pub const UNITS: &str = "units";
    pub const INCREMENTAL: &str = "incremental";
}

/// Fold one GRBL status report into the controller. Returns `true` if any
/// observable field actually changed, so the caller can decide whether to
/// emit a `statusUpdate` batch.
pub fn apply_grbl_status(controller: &mut Controller, report: &GrblStatusReport) -> bool {
    let mut changed = false;

    let (ready, held, moving, error) = grbl_state_flags(&report.state);
    changed |= set_if_ne(&mut controller.ready, ready);
    changed |= set_if_ne(&mut controller.held, held);
    changed |= set_if_ne(&mut controller.moving, moving);
    if error {
        changed |= set_if_ne(&mut controller.error, true);
    }
    controller.mark_status_owned(keys::STATE);

    if let Some(mpos) = &report.mpos {
        changed |= set_if_ne(&mut controller.mpos, mpos.clone());
        controller.mark_status_owned(keys::MPOS);
    }

    // "when MPos and WCO both reported, derive wpos = MPos - WCO; when WPos
    // and WCO but no MPos, derive MPos = WPos + WCO" (§4.3).
    match (&report.mpos, &report.wco, &report.wpos) {
        (Some(mpos), Some(wco), _) => {
            let wpos: Vec<f64> = mpos.iter().zip(wco).map(|(m, w)| m - w).collect();
            changed |= set_if_ne(&mut controller.wpos, Some(wpos));
            controller.mark_status_owned(keys::WPOS);
        }
        (None, Some(wco), Some(wpos)) => {
            let mpos: Vec<f64> = wpos.iter().zip(wco).map(|(w, o)| w + o).collect();
            changed |= set_if_ne(&mut controller.mpos, mpos);
            controller.mark_status_owned(keys::MPOS);
            changed |= set_if_ne(&mut controller.wpos, Some(wpos.clone()));
            controller.mark_status_owned(keys::WPOS);
        }
        _ => {
            if controller.owns_key(keys::MPOS) {
                let derived = controller.derive_wpos();
                changed |= set_if_ne(&mut controller.wpos, Some(derived));
            }
        }
    }

    if let Some(feed) = report.feed {
        changed |= set_if_ne(&mut controller.feed, feed);
        controller.mark_status_owned(keys::FEED);
    }
    if let Some(speed) = report.spindle_speed {
        changed |= set_if_ne(&mut controller.spindle_speed, speed);
        controller.mark_status_owned(keys::SPINDLE_SPEED);
    }
    if let Some(line) = report.line_number {
        changed |= set_if_ne(&mut controller.line, line);
        controller.mark_status_owned(keys::LINE);
    }

    changed
}

/// Recognized GRBL status states (§4.3, `STATUS_*` naming). Returns
/// `(ready, held, moving, error)`.
fn grbl_state_flags(state: &str) -> (bool, bool, bool, bool) {
    match state {
        "Idle" => (true, false, false, false),
        "Run" | "Jog" => (false, false, true, false),
        "Hold" => (false, true, false, false),
        "Alarm" => (false, false, false, true),
        "Check" | "Home" | "Sleep" | "Door" => (false, false, false, false),
        _ => (false, false, false, false),
    }
}

/// Fold a TinyG `{sr:...}` status report's fields into the controller.
pub fn apply_tinyg_status(controller: &mut Controller, fields: &[(String, TinyGValue)]) -> bool {
    let mut changed = false;
    let n = controller.axis_labels.len();

    for (key, value) in fields {
        match key.as_str() {
            "stat" => {
                if let Some(code) = value.as_f64() {
                    let (ready, held, moving, error) = tinyg_state_flags(code as u8);
                    changed |= set_if_ne(&mut controller.ready, ready);
                    changed |= set_if_ne(&mut controller.held, held);
                    changed |= set_if_ne(&mut controller.moving, moving);
                    if error {
                        changed |= set_if_ne(&mut controller.error, true);
                    }
                    controller.mark_status_owned(keys::STATE);
                }
            }
            "feed" | "vel" => {
                if let Some(f) = value.as_f64() {
                    changed |= set_if_ne(&mut controller.feed, f);
                    controller.mark_status_owned(keys::FEED);
                }
            }
            "line" | "n" => {
                if let Some(l) = value.as_f64() {
                    changed |= set_if_ne(&mut controller.line, l as u32);
                    controller.mark_status_owned(keys::LINE);
                }
            }
            "coor" => {
                if let Some(c) = value.as_f64() {
                    changed |= set_if_ne(&mut controller.active_coord_sys, Some((c as u8).saturating_sub(1)));
                    controller.mark_status_owned(keys::ACTIVE_COORD_SYS);
                }
            }
            "unit" => {
                if let Some(u) = value.as_f64() {
                    let units = if u as u8 == 0 { Units::Mm } else { Units::In };
                    changed |= set_if_ne(&mut controller.units, units);
                    controller.mark_status_owned(keys::UNITS);
                }
            }
            _ if key.starts_with("pos") && key.len() == 4 => {
                apply_axis_field(controller, &mut changed, &key[3..4], value, AxisField::Pos, n);
            }
            _ if key.starts_with("mpo") && key.len() == 4 => {
                apply_axis_field(controller, &mut changed, &key[3..4], value, AxisField::Mpos, n);
            }
            _ => {}
        }
    }

    if controller.owns_key(keys::MPOS) && !fields.iter().any(|(k, _)| k.starts_with("pos")) {
        let derived = controller.derive_wpos();
        changed |= set_if_ne(&mut controller.wpos, Some(derived));
    }

    changed
}

enum AxisField {
    Pos,
    Mpos,
}

fn apply_axis_field(
    controller: &mut Controller,
    changed: &mut bool,
    axis_letter: &str,
    value: &TinyGValue,
    field: AxisField,
    n: usize,
) {
    let Some(idx) = controller
        .axis_labels
        .iter()
        .position(|c| c.to_ascii_lowercase().to_string() == axis_letter.to_lowercase())
    else {
        return;
    };
    let Some(v) = value.as_f64() else { return };

    match field {
        AxisField::Mpos => {
            if controller.mpos.len() != n {
                controller.mpos = vec![0.0; n];
            }
            if controller.mpos[idx] != v {
                controller.mpos[idx] = v;
                *changed = true;
            }
            controller.mark_status_owned(keys::MPOS);
            let derived = controller.derive_wpos();
            *changed |= set_if_ne(&mut controller.wpos, Some(derived));
            controller.mark_status_owned(keys::WPOS);
        }
        AxisField::Pos => {
            let mut wpos = controller.wpos.clone().unwrap_or_else(|| vec![0.0; n]);
            if wpos.len() != n {
                wpos = vec![0.0; n];
            }
            if wpos[idx] != v {
                wpos[idx] = v;
                *changed = true;
            }
            controller.wpos = Some(wpos);
            controller.mark_status_owned(keys::WPOS);
        }
    }
}

/// TinyG `stat` codes (§4.3; mirrors `firmware::tinyg::constants::STATUS_*`
/// ordinal assignment). Returns `(ready, held, moving, error)`.
fn tinyg_state_flags(code: u8) -> (bool, bool, bool, bool) {
    match code {
        3 => (true, false, false, false),  // Idle
        5 => (false, false, true, false),  // Run
        6 => (false, true, false, false),  // Hold
        2 => (false, false, false, true),  // Alarm
        _ => (false, false, false, false),
    }
}

/// Fold one outgoing G-code line into the controller's modal state,
/// skipping any key already owned by a status report (§4.3 "don't
/// overwrite" rule).
pub fn apply_modal_gcode(controller: &mut Controller, line: &str) {
    for word in tokenize(line) {
        apply_word(controller, &word, line);
    }
}

struct Word {
    letter: char,
    number: f64,
}

fn tokenize(line: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut chars = line.trim().chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_alphabetic() {
            let mut digits = String::new();
            while matches!(chars.peek(), Some(d) if d.is_ascii_digit() || *d == '.' || *d == '-') {
                digits.push(chars.next().unwrap());
            }
            if let Ok(number) = digits.parse::<f64>() {
                words.push(Word {
                    letter: c.to_ascii_uppercase(),
                    number,
                });
            }
        }
    }
    words
}

fn apply_word(controller: &mut Controller, word: &Word, full_line: &str) {
    let n = controller.axis_labels.len();
    match word.letter {
        'G' => apply_g_word(controller, word.number, full_line, n),
        'M' => apply_m_word(controller, word.number as u32),
        _ => {}
    }
}

fn apply_g_word(controller: &mut Controller, code: f64, full_line: &str, n: usize) {
    if (54.0..=59.0).contains(&code) && !controller.owns_key(keys::ACTIVE_COORD_SYS) {
        controller.active_coord_sys = Some((code - 54.0) as u8);
        return;
    }
    match code {
        20.0 if !controller.owns_key(keys::UNITS) => controller.units = Units::In,
        21.0 if !controller.owns_key(keys::UNITS) => controller.units = Units::Mm,
        90.0 if !controller.owns_key(keys::INCREMENTAL) => controller.incremental = false,
        91.0 if !controller.owns_key(keys::INCREMENTAL) => controller.incremental = true,
        93.0 => controller.inverse_feed = true,
        94.0 => controller.inverse_feed = false,
        10.0 => apply_g10(controller, full_line, n),
        28.1 => controller.stored_positions[0] = controller.mpos.clone(),
        30.1 => controller.stored_positions[1] = controller.mpos.clone(),
        92.0 => {
            controller.offset = apply_axis_overrides(&controller.mpos, full_line, n)
                .into_iter()
                .zip(&controller.mpos)
                .map(|(target, mpos)| mpos - target)
                .collect();
            controller.offset_enabled = true;
        }
        92.1 => {
            controller.offset = vec![0.0; n];
            controller.offset_enabled = false;
        }
        92.2 => controller.offset_enabled = false,
        92.3 => controller.offset_enabled = true,
        4.0 => {}
        _ => {}
    }
}

/// Parse `G10 L2 P<n> <axis words>` (and TinyG's `G10 L20 P<n>`) to set a
/// coordinate-system offset (§4.3).
fn apply_g10(controller: &mut Controller, full_line: &str, n: usize) {
    let words = tokenize(full_line);
    let has_l2 = words.iter().any(|w| w.letter == 'L' && (w.number == 2.0 || w.number == 20.0));
    if !has_l2 {
        return;
    }
    let Some(p_word) = words.iter().find(|w| w.letter == 'P') else {
        return;
    };
    let sys_idx = (p_word.number as usize).saturating_sub(1);
    if sys_idx >= controller.coord_sys_offsets.len() {
        return;
    }
    let mut offsets = controller
        .coord_sys_offsets
        .get(sys_idx)
        .cloned()
        .unwrap_or_else(|| vec![0.0; n]);
    for word in &words {
        if let Some(idx) = axis_index(controller, word.letter) {
            if idx < offsets.len() {
                offsets[idx] = word.number;
            }
        }
    }
    controller.coord_sys_offsets[sys_idx] = offsets;
}

fn apply_axis_overrides(base: &[f64], full_line: &str, n: usize) -> Vec<f64> {
    let mut result = base.to_vec();
    if result.len() != n {
        result = vec![0.0; n];
    }
    for word in tokenize(full_line) {
        if let Some(idx) = axis_letter_index(word.letter) {
            if idx < result.len() {
                result[idx] = word.number;
            }
        }
    }
    result
}

fn axis_index(controller: &Controller, letter: char) -> Option<usize> {
    controller.axis_labels.iter().position(|&l| l == letter)
}

fn axis_letter_index(letter: char) -> Option<usize> {
    match letter {
        'X' => Some(0),
        'Y' => Some(1),
        'Z' => Some(2),
        'A' => Some(3),
        'B' => Some(4),
        'C' => Some(5),
        _ => None,
    }
}

fn apply_m_word(controller: &mut Controller, code: u32) {
    match code {
        3 => {
            controller.spindle = true;
            controller.spindle_direction = 1;
        }
        4 => {
            controller.spindle = true;
            controller.spindle_direction = -1;
        }
        5 => controller.spindle = false,
        7 => {
            controller.coolant = match controller.coolant {
                Coolant::Flood | Coolant::Both => Coolant::Both,
                _ => Coolant::Mist,
            };
        }
        8 => {
            controller.coolant = match controller.coolant {
                Coolant::Mist | Coolant::Both => Coolant::Both,
                _ => Coolant::Flood,
            };
        }
        9 => controller.coolant = Coolant::Off,
        2 | 30 => {
            let n = controller.axis_labels.len();
            controller.offset = vec![0.0; n];
            controller.offset_enabled = false;
            if !controller.owns_key(keys::ACTIVE_COORD_SYS) {
                controller.active_coord_sys = Some(0);
            }
            if !controller.owns_key(keys::INCREMENTAL) {
                controller.incremental = false;
            }
            controller.spindle = false;
            controller.coolant = Coolant::Off;
        }
        _ => {}
    }
}

fn set_if_ne<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field != value {
        *field = value;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::grbl;

    #[test]
    fn grbl_status_derives_wpos_from_mpos_and_wco() {
        let mut c = Controller::default_xyz();
        let report = match grbl::parse_line("<Idle|MPos:10.0,5.0,0.0|WCO:1.0,2.0,0.0>") {
            crate::codec::grbl::GrblEvent::StatusReport(r) => r,
            _ => panic!("expected status report"),
        };
        assert!(apply_grbl_status(&mut c, &report));
        assert_eq!(c.mpos, vec![10.0, 5.0, 0.0]);
        assert_eq!(c.wpos, Some(vec![9.0, 3.0, 0.0]));
        assert!(c.ready);
    }

    #[test]
    fn status_owned_mpos_blocks_gcode_overwrite_of_coord_sys() {
        let mut c = Controller::default_xyz();
        c.mark_status_owned("active_coord_sys");
        c.active_coord_sys = Some(3);
        apply_modal_gcode(&mut c, "G54");
        assert_eq!(c.active_coord_sys, Some(3));
    }

    #[test]
    fn gcode_sets_coord_sys_when_not_status_owned() {
        let mut c = Controller::default_xyz();
        apply_modal_gcode(&mut c, "G55");
        assert_eq!(c.active_coord_sys, Some(1));
    }

    #[test]
    fn m2_resets_offsets_and_spindle() {
        let mut c = Controller::default_xyz();
        c.offset = vec![1.0, 1.0, 1.0];
        c.offset_enabled = true;
        c.spindle = true;
        apply_modal_gcode(&mut c, "M2");
        assert!(!c.offset_enabled);
        assert!(!c.spindle);
        assert_eq!(c.offset, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn g28_1_captures_current_mpos() {
        let mut c = Controller::default_xyz();
        c.mpos = vec![3.0, 4.0, 5.0];
        apply_modal_gcode(&mut c, "G28.1");
        assert_eq!(c.stored_positions[0], vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn tinyg_status_applies_axis_and_stat() {
        let mut c = Controller::default_xyz();
        let fields = vec![
            ("mpox".to_string(), TinyGValue::Number(1.0)),
            ("mpoy".to_string(), TinyGValue::Number(2.0)),
            ("stat".to_string(), TinyGValue::Number(3.0)),
        ];
        assert!(apply_tinyg_status(&mut c, &fields));
        assert_eq!(c.mpos[0], 1.0);
        assert_eq!(c.mpos[1], 2.0);
        assert!(c.ready);
    }
}
