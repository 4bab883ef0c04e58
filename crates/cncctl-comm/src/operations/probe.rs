//! Probe-tripped detection (§4.6, §9 Open Question 2): GRBL reports the
//! outcome inline in its `PRB:` parameter feedback; TinyG reports it as a
//! stop position that fell short of the requested target, optionally
//! confirmed by a firmware flag. Resolved as: trust the reported stop
//! position first, and treat the firmware's own flag as a secondary signal
//! that can only ever agree or add a trip the position alone missed.

use crate::config::ProbeCoordFrame;
use cncctl_core::Error;

/// Reject a probe request unless exactly one axis actually moves from the
/// current position (§4.6, §8 boundary behaviors): a probe to the current
/// position, and a probe naming more than one changed axis, are both
/// `invalid_argument`.
pub fn validate_single_axis_probe(current: &[f64], target: &[Option<f64>]) -> Result<usize, Error> {
    let mut changed = None;
    for (i, (cur, want)) in current.iter().zip(target.iter()).enumerate() {
        if let Some(w) = want {
            if (w - cur).abs() > 1e-9 {
                if changed.is_some() {
                    return Err(Error::invalid_argument("probe may only move a single axis"));
                }
                changed = Some(i);
            }
        }
    }
    changed.ok_or_else(|| Error::invalid_argument("probe target equals current position"))
}

/// Parse GRBL's `[PRB:x,y,z:1]`/`[PRB:x,y,z:0]` parameter feedback value
/// (the part after `PRB:`) into the reported stop position and whether the
/// probe tripped.
pub fn grbl_probe_tripped(prb_value: &str) -> Result<(Vec<f64>, bool), Error> {
    let (coords_str, flag_str) = prb_value
        .rsplit_once(':')
        .ok_or_else(|| Error::parse_error(format!("malformed PRB value '{prb_value}'")))?;
    let tripped = flag_str.trim() == "1";
    let coords = coords_str
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| Error::parse_error(format!("malformed PRB coordinate in '{prb_value}'")))
        })
        .collect::<Result<Vec<f64>, Error>>()?;
    Ok((coords, tripped))
}

/// Decide which frame TinyG actually used for a coordinate-frame detection
/// probe (§4.6): the probe target was chosen numerically equal to the
/// pre-probe machine position, so any observed motion before the cancel
/// took effect means the firmware added the active offset on top of the
/// commanded value (work-frame semantics); no motion means it took the
/// commanded value as a machine coordinate directly.
pub fn resolved_coord_frame(pre_probe_mpos: f64, post_probe_mpos: f64) -> ProbeCoordFrame {
    if (post_probe_mpos - pre_probe_mpos).abs() > 1e-6 {
        ProbeCoordFrame::Work
    } else {
        ProbeCoordFrame::Machine
    }
}

/// Adjust a probe target before it is sent as a `G38.2` parameter, for
/// firmware known (or detected) to apply the active coord-system offset to
/// probe targets as if they were machine coordinates (§4.6): pre-add the
/// offset so the commanded value still lands at the work-coordinate target
/// the caller asked for. A no-op under `Work`/`AutoDetect`.
pub fn adjust_probe_target_for_frame(target: f64, coord_sys_offset: f64, frame: ProbeCoordFrame) -> f64 {
    match frame {
        ProbeCoordFrame::Machine => target + coord_sys_offset,
        ProbeCoordFrame::Work | ProbeCoordFrame::AutoDetect => target,
    }
}

/// TinyG has no single tripped flag as reliable as GRBL's; a probe that
/// stopped short of its commanded target tripped, and a firmware-reported
/// flag (when present) can only confirm a trip the position check missed.
pub fn tinyg_probe_tripped(stop_pos: &[f64], target: &[Option<f64>], firmware_flag: Option<bool>) -> bool {
    let stopped_short = stop_pos.iter().zip(target.iter()).any(|(stop, want)| match want {
        Some(w) => (stop - w).abs() > 1e-6,
        None => false,
    });
    stopped_short || firmware_flag.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grbl_tripped_probe() {
        let (coords, tripped) = grbl_probe_tripped("0.000,0.000,-5.000:1").unwrap();
        assert_eq!(coords, vec![0.0, 0.0, -5.0]);
        assert!(tripped);
    }

    #[test]
    fn parses_grbl_untripped_probe() {
        let (_, tripped) = grbl_probe_tripped("0.000,0.000,-25.000:0").unwrap();
        assert!(!tripped);
    }

    #[test]
    fn tinyg_tripped_when_stopped_short_of_target() {
        assert!(tinyg_probe_tripped(&[0.0, 0.0, -4.8], &[None, None, Some(-5.0)], None));
    }

    #[test]
    fn tinyg_untripped_when_target_reached_and_no_flag() {
        assert!(!tinyg_probe_tripped(&[0.0, 0.0, -5.0], &[None, None, Some(-5.0)], Some(false)));
    }

    #[test]
    fn tinyg_flag_can_confirm_trip_position_check_missed() {
        assert!(tinyg_probe_tripped(&[0.0, 0.0, -5.0], &[None, None, Some(-5.0)], Some(true)));
    }

    #[test]
    fn rejects_probe_to_current_position() {
        let err = validate_single_axis_probe(&[0.0, 0.0, 0.0], &[None, None, Some(0.0)]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rejects_multi_axis_probe() {
        let err = validate_single_axis_probe(&[0.0, 0.0, 0.0], &[Some(5.0), None, Some(-5.0)]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn accepts_single_changed_axis() {
        let axis = validate_single_axis_probe(&[0.0, 0.0, 0.0], &[None, None, Some(-5.0)]).unwrap();
        assert_eq!(axis, 2);
    }

    #[test]
    fn detection_probe_motion_implies_work_frame() {
        assert_eq!(resolved_coord_frame(10.0, 10.4), ProbeCoordFrame::Work);
    }

    #[test]
    fn detection_probe_no_motion_implies_machine_frame() {
        assert_eq!(resolved_coord_frame(10.0, 10.0), ProbeCoordFrame::Machine);
    }

    #[test]
    fn machine_frame_adjustment_adds_offset() {
        assert_eq!(adjust_probe_target_for_frame(-5.0, 2.0, ProbeCoordFrame::Machine), -3.0);
    }

    #[test]
    fn work_frame_adjustment_is_a_no_op() {
        assert_eq!(adjust_probe_target_for_frame(-5.0, 2.0, ProbeCoordFrame::Work), -5.0);
        assert_eq!(adjust_probe_target_for_frame(-5.0, 2.0, ProbeCoordFrame::AutoDetect), -5.0);
    }
}
