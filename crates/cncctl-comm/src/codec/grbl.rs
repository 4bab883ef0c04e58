//! GRBL line codec (§4.2): regex-driven recognition of the 0.9/1.1 ASCII
//! wire protocol, in a fixed priority order. Builds on
//! `firmware::grbl::status_parser`/`error_decoder`, generalized from ad-hoc
//! `Option<T>` extraction into one tagged [`GrblEvent`] per line.

use cncctl_core::Error;
use lazy_static::lazy_static;
use regex::Regex;

/// One parsed GRBL status report (`<...>`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrblStatusReport {
    pub state: String,
    pub substate: Option<String>,
    pub mpos: Option<Vec<f64>>,
    pub wpos: Option<Vec<f64>>,
    pub wco: Option<Vec<f64>>,
    pub feed: Option<f64>,
    pub spindle_speed: Option<f64>,
    pub line_number: Option<u32>,
    pub pin_state: Option<String>,
    /// `(planner_blocks_available, rx_buffer_available)` from `Bf:`.
    pub buffer: Option<(u32, u32)>,
    /// `(feed_pct, rapid_pct, spindle_pct)` from `Ov:`.
    pub overrides: Option<(u8, u8, u8)>,
    /// Spindle/coolant accessory flags from `A:`, e.g. `"SFM"`.
    pub accessory: Option<String>,
}

/// A single recognized GRBL line, tagged by kind (§9 design note).
#[derive(Debug, Clone, PartialEq)]
pub enum GrblEvent {
    Ack {
        payload: Option<String>,
    },
    AckError {
        code: u8,
        error: Error,
    },
    Alarm {
        code: u8,
        error: Error,
    },
    StatusReport(GrblStatusReport),
    Welcome {
        version: String,
    },
    SettingFeedback {
        number: String,
        value: String,
    },
    Message(String),
    /// `[GC:...]` (1.1) or `[<G-words>]` (0.9): raw modal-state feedback line.
    ParserState(String),
    ParameterFeedback {
        name: String,
        value: String,
    },
    Ignored,
    Unrecognized(String),
}

lazy_static! {
    static ref RE_STATUS: Regex = Regex::new(r"^<(.*)>$").unwrap();
    static ref RE_ERROR: Regex = Regex::new(r"(?i)^error:\s*(.+)$").unwrap();
    static ref RE_ALARM: Regex = Regex::new(r"(?i)^ALARM:\s*(\d+)$").unwrap();
    static ref RE_WELCOME: Regex = Regex::new(r"(?i)^Grbl\s*v?(\d+\.\d+\S*)").unwrap();
    static ref RE_SETTING: Regex = Regex::new(r"^\$(N?\d+)=(.*)$").unwrap();
    static ref RE_BRACKET: Regex = Regex::new(r"^\[(.*)\]$").unwrap();
}

/// Parse one already-framed wire line (no trailing CR/LF) into a tagged
/// event. Recognition runs in the priority order of spec §4.2.
pub fn parse_line(line: &str) -> GrblEvent {
    let line = line.trim();

    if line.eq_ignore_ascii_case("ok") {
        return GrblEvent::Ack { payload: None };
    }
    if let Some(rest) = line.strip_prefix("ok:").or_else(|| line.strip_prefix("Ok:")) {
        return GrblEvent::Ack {
            payload: Some(rest.to_string()),
        };
    }

    if let Some(caps) = RE_STATUS.captures(line) {
        return GrblEvent::StatusReport(parse_status_report(&caps[1]));
    }

    if let Some(caps) = RE_ERROR.captures(line) {
        let token = &caps[1];
        // Numeric `error:<n>` (0.9 and 1.1) or the canonical 1.1 textual
        // variant (`error:Bad number format`) — both map to the same code.
        let code = token
            .parse::<u8>()
            .ok()
            .or_else(|| crate::firmware::grbl::error_decoder::decode_error_text(token));
        return GrblEvent::AckError {
            code: code.unwrap_or(0),
            error: decode_error_to_taxonomy(code, token),
        };
    }

    if let Some(caps) = RE_ALARM.captures(line) {
        let code: u8 = caps[1].parse().unwrap_or(0);
        return GrblEvent::Alarm {
            code,
            error: decode_alarm_to_taxonomy(code),
        };
    }

    if let Some(caps) = RE_WELCOME.captures(line) {
        return GrblEvent::Welcome {
            version: caps[1].to_string(),
        };
    }

    if let Some(caps) = RE_SETTING.captures(line) {
        return GrblEvent::SettingFeedback {
            number: caps[1].to_string(),
            value: caps[2].to_string(),
        };
    }

    if let Some(caps) = RE_BRACKET.captures(line) {
        let body = &caps[1];
        return classify_bracket(body);
    }

    GrblEvent::Unrecognized(line.to_string())
}

fn classify_bracket(body: &str) -> GrblEvent {
    if let Some(msg) = body.strip_prefix("MSG:") {
        return GrblEvent::Message(msg.trim().to_string());
    }
    if let Some(rest) = body.strip_prefix("GC:") {
        return GrblEvent::ParserState(rest.to_string());
    }
    if body.starts_with("HLP:") || body.starts_with("echo:") {
        return GrblEvent::Ignored;
    }
    for prefix in ["G54:", "G55:", "G56:", "G57:", "G58:", "G59:", "G28:", "G30:", "G92:", "TLO:", "PRB:", "VER:", "OPT:"] {
        if let Some(value) = body.strip_prefix(prefix) {
            let name = &prefix[..prefix.len() - 1];
            return GrblEvent::ParameterFeedback {
                name: name.to_string(),
                value: value.to_string(),
            };
        }
    }
    // 0.9-style `[<G-words>]` parser-state feedback: starts with a G or M word.
    if body.starts_with('G') || body.starts_with('M') {
        return GrblEvent::ParserState(body.to_string());
    }
    GrblEvent::Unrecognized(format!("[{body}]"))
}

fn parse_status_report(body: &str) -> GrblStatusReport {
    let mut report = GrblStatusReport::default();
    // First field is state, optionally `:substate`; remaining fields are
    // `|`-separated (1.1) or `,`-separated with implicit continuation (0.9).
    let sep = if body.contains('|') { '|' } else { ',' };
    let mut fields = body.split(sep);

    if let Some(first) = fields.next() {
        let mut state_parts = first.splitn(2, ':');
        report.state = state_parts.next().unwrap_or_default().to_string();
        report.substate = state_parts.next().map(|s| s.to_string());
    }

    // 0.9's comma separator doesn't distinguish "next field" from "next
    // value of the same field" — `MPos:0.000,1.000,2.000` arrives as three
    // comma-split tokens, only the first of which carries the `MPos:`
    // label. An unlabeled token continues the most recently labeled field.
    // 1.1's `|` separator always labels every field, so this never fires.
    let mut current: Option<(&str, String)> = None;
    for field in fields {
        if let Some((key, value)) = field.split_once(':') {
            if let Some((prev_key, prev_value)) = current.take() {
                apply_status_field(&mut report, prev_key, &prev_value);
            }
            current = Some((key, value.to_string()));
        } else if sep == ',' {
            if let Some((_, value)) = current.as_mut() {
                value.push(',');
                value.push_str(field);
            }
        }
    }
    if let Some((key, value)) = current.take() {
        apply_status_field(&mut report, key, &value);
    }

    report
}

fn apply_status_field(report: &mut GrblStatusReport, key: &str, value: &str) {
    match key {
        "MPos" => report.mpos = Some(parse_floats(value)),
        "WPos" => report.wpos = Some(parse_floats(value)),
        "WCO" => report.wco = Some(parse_floats(value)),
        "F" => report.feed = value.parse().ok(),
        "FS" => {
            let parts = parse_floats(value);
            report.feed = parts.first().copied();
            report.spindle_speed = parts.get(1).copied();
        }
        "Ln" => report.line_number = value.parse().ok(),
        "Pn" => report.pin_state = Some(value.to_string()),
        "Bf" => {
            let parts = parse_floats(value);
            if parts.len() == 2 {
                report.buffer = Some((parts[0] as u32, parts[1] as u32));
            }
        }
        "Ov" => {
            let parts = parse_floats(value);
            if parts.len() == 3 {
                report.overrides = Some((parts[0] as u8, parts[1] as u8, parts[2] as u8));
            }
        }
        "A" => report.accessory = Some(value.to_string()),
        _ => {}
    }
}

fn parse_floats(value: &str) -> Vec<f64> {
    value
        .split(',')
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .collect()
}

/// Map a GRBL `error:<code>` or its canonical 1.1 textual variant to the
/// stable taxonomy (§7, §4.2). `code` is `None` when neither a numeric
/// code nor a recognized textual token could be resolved.
fn decode_error_to_taxonomy(code: Option<u8>, raw_token: &str) -> Error {
    let Some(code) = code else {
        return Error::parse_error(format!("unrecognized GRBL error token '{raw_token}'"));
    };
    let message = crate::firmware::grbl::error_decoder::decode_error(code);
    match code {
        9 | 13 => Error::safety_interlock(message),
        15 => Error::limit_hit(message),
        33 => Error::invalid_argument(message),
        _ => Error::parse_error(message),
    }
}

/// Map a GRBL `ALARM:<code>` to the stable taxonomy (§7, §4.4.9).
fn decode_alarm_to_taxonomy(code: u8) -> Error {
    let message = crate::firmware::grbl::error_decoder::decode_alarm(code);
    match code {
        1 | 2 => Error::limit_hit(message),
        4 => Error::probe_initial_state(message),
        5 => Error::probe_not_tripped(),
        _ => Error::machine_error(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_ack() {
        assert_eq!(parse_line("ok"), GrblEvent::Ack { payload: None });
    }

    #[test]
    fn parses_1_1_status_report() {
        match parse_line("<Idle|MPos:1.000,2.000,0.000|FS:0,0|Ov:100,100,100>") {
            GrblEvent::StatusReport(r) => {
                assert_eq!(r.state, "Idle");
                assert_eq!(r.mpos, Some(vec![1.0, 2.0, 0.0]));
                assert_eq!(r.overrides, Some((100, 100, 100)));
            }
            other => panic!("expected StatusReport, got {other:?}"),
        }
    }

    #[test]
    fn parses_0_9_status_report_with_substate() {
        match parse_line("<Run:0,MPos:0.000,0.000,0.000,WPos:0.000,0.000,0.000>") {
            GrblEvent::StatusReport(r) => {
                assert_eq!(r.state, "Run");
                assert_eq!(r.substate.as_deref(), Some("0"));
                assert_eq!(r.wpos, Some(vec![0.0, 0.0, 0.0]));
            }
            other => panic!("expected StatusReport, got {other:?}"),
        }
    }

    #[test]
    fn parses_0_9_multi_axis_mpos_and_wpos_continuation() {
        // 0.9's comma separator has no per-field boundary marker: the
        // bare `1.000`/`2.000` tokens continue the preceding `MPos:`/
        // `WPos:` field rather than starting new unlabeled fields.
        match parse_line("<Idle,MPos:0.000,1.000,2.000,WPos:3.000,4.000,5.000>") {
            GrblEvent::StatusReport(r) => {
                assert_eq!(r.state, "Idle");
                assert_eq!(r.mpos, Some(vec![0.0, 1.0, 2.0]));
                assert_eq!(r.wpos, Some(vec![3.0, 4.0, 5.0]));
            }
            other => panic!("expected StatusReport, got {other:?}"),
        }
    }

    #[test]
    fn maps_jog_error_to_limit_hit() {
        match parse_line("error:15") {
            GrblEvent::AckError { code, error } => {
                assert_eq!(code, 15);
                assert!(error.to_string().to_lowercase().contains("travel"));
            }
            other => panic!("expected AckError, got {other:?}"),
        }
    }

    #[test]
    fn maps_canonical_1_1_textual_error_variant() {
        match parse_line("error:Bad number format") {
            GrblEvent::AckError { code, error } => {
                assert_eq!(code, 2);
                assert!(error.to_string().to_lowercase().contains("numeric value"));
            }
            other => panic!("expected AckError, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_textual_error_token_falls_back_to_parse_error() {
        match parse_line("error:Some unknown future token") {
            GrblEvent::AckError { code, error } => {
                assert_eq!(code, 0);
                assert!(error.to_string().contains("unrecognized GRBL error token"));
            }
            other => panic!("expected AckError, got {other:?}"),
        }
    }

    #[test]
    fn maps_probe_fail_alarm_to_probe_not_tripped() {
        match parse_line("ALARM:5") {
            GrblEvent::Alarm { code, error } => {
                assert_eq!(code, 5);
                assert!(error.is_probe_not_tripped());
            }
            other => panic!("expected Alarm, got {other:?}"),
        }
    }

    #[test]
    fn parses_welcome_line() {
        match parse_line("Grbl 1.1f ['$' for help]") {
            GrblEvent::Welcome { version } => assert!(version.starts_with("1.1")),
            other => panic!("expected Welcome, got {other:?}"),
        }
    }

    #[test]
    fn parses_setting_feedback() {
        match parse_line("$110=500.000") {
            GrblEvent::SettingFeedback { number, value } => {
                assert_eq!(number, "110");
                assert_eq!(value, "500.000");
            }
            other => panic!("expected SettingFeedback, got {other:?}"),
        }
    }

    #[test]
    fn parses_prb_parameter_feedback() {
        match parse_line("[PRB:0.000,0.000,-5.000:1]") {
            GrblEvent::ParameterFeedback { name, value } => {
                assert_eq!(name, "PRB");
                assert_eq!(value, "0.000,0.000,-5.000:1");
            }
            other => panic!("expected ParameterFeedback, got {other:?}"),
        }
    }

    #[test]
    fn ignores_help_and_echo_lines() {
        assert_eq!(parse_line("[HLP:$$ $# $G $I $N ...]"), GrblEvent::Ignored);
    }
}
