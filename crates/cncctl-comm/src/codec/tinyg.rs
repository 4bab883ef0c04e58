//! TinyG line codec (§4.2): a tolerant JSON-with-extensions parser plus a
//! compact encoder. TinyG firmware emits strict-ish JSON but accepts, and
//! sometimes emits, bare identifiers as object keys and the single-letter
//! tokens `n`/`t`/`f` in place of `null`/`true`/`false`; `serde_json` rejects
//! both, so this module hand-rolls a small recursive-descent parser over
//! [`TinyGValue`] instead. Builds on the `firmware::tinyg::utils`
//! field-extraction helpers, generalized from ad-hoc `Value::get` chains
//! into one tagged [`TinyGEvent`] per line ("from dynamic JSON to tagged
//! sum types").

use cncctl_core::Error;
use std::fmt::Write as _;

/// A JSON-like value as TinyG's protocol extensions allow it to appear on
/// the wire. Objects preserve field order so a round trip through the
/// encoder reproduces the order the firmware used.
#[derive(Debug, Clone, PartialEq)]
pub enum TinyGValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<TinyGValue>),
    Object(Vec<(String, TinyGValue)>),
}

impl TinyGValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TinyGValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TinyGValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, TinyGValue)]> {
        match self {
            TinyGValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&TinyGValue> {
        self.as_object()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// One recognized TinyG event, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TinyGEvent {
    /// `{r:...}` — a response/ack. `footer` carries the `f:[...]` status
    /// array when present (code, status, row count).
    Ack { payload: TinyGValue, footer: Option<Vec<f64>> },
    /// `{r:{msg:"SYSTEM READY"}}` — an unprompted reset.
    Welcome,
    /// `{sr:...}` — a status report, raw fields for the caller to fold
    /// into [`cncctl_core::state::Controller`].
    StatusReport(Vec<(String, TinyGValue)>),
    /// `{qr:.., qi:.., qo:..}` — the triple queue report (§4.4.2, §4.4.6).
    QueueReport { qr: u32, qi: u32, qo: u32 },
    /// `{er:...}` — an error, mapped to the stable taxonomy.
    Error { code: u16, message: String, error: Error },
    /// A recognized device parameter (`prb`, `g54`..`g59`, `g28`, `g30`,
    /// `g92`, `tlo`, `ver`, `opt`, `mpo<axis>`, `hom<axis>`, ...).
    Parameter { name: String, value: TinyGValue },
    /// Free-text feedback not otherwise classified.
    Message(String),
    Unrecognized(String),
}

/// Parse one already-framed wire line into a [`TinyGValue`], tolerating the
/// protocol's bare-identifier keys and `n`/`t`/`f` literals.
pub fn parse_value(line: &str) -> Result<TinyGValue, Error> {
    let mut p = Parser::new(line);
    p.skip_ws();
    let v = p.parse_value()?;
    p.skip_ws();
    if !p.at_end() {
        return Err(Error::parse_error(format!(
            "trailing data after TinyG value: {:?}",
            &line[p.pos..]
        )));
    }
    Ok(v)
}

/// Parse one already-framed wire line into a tagged [`TinyGEvent`].
pub fn parse_line(line: &str) -> TinyGEvent {
    let line = line.trim();
    let value = match parse_value(line) {
        Ok(v) => v,
        Err(_) => return TinyGEvent::Unrecognized(line.to_string()),
    };
    classify(&value, line)
}

fn classify(value: &TinyGValue, raw: &str) -> TinyGEvent {
    let fields = match value.as_object() {
        Some(f) => f,
        None => return TinyGEvent::Unrecognized(raw.to_string()),
    };

    if let Some(r) = value.get("r") {
        if r.get("msg").and_then(TinyGValue::as_str) == Some("SYSTEM READY") {
            return TinyGEvent::Welcome;
        }
        let footer = value.get("f").and_then(extract_footer);
        return TinyGEvent::Ack {
            payload: r.clone(),
            footer,
        };
    }

    if let Some(sr) = value.get("sr") {
        if let Some(obj) = sr.as_object() {
            return TinyGEvent::StatusReport(obj.to_vec());
        }
    }

    if let (Some(qr), Some(qi), Some(qo)) = (value.get("qr"), value.get("qi"), value.get("qo")) {
        if let (Some(qr), Some(qi), Some(qo)) = (qr.as_f64(), qi.as_f64(), qo.as_f64()) {
            return TinyGEvent::QueueReport {
                qr: qr as u32,
                qi: qi as u32,
                qo: qo as u32,
            };
        }
    }

    if let Some(er) = value.get("er") {
        let code = er
            .get("st")
            .or_else(|| er.get("code"))
            .and_then(TinyGValue::as_f64)
            .unwrap_or(0.0) as u16;
        let message = er
            .get("msg")
            .and_then(TinyGValue::as_str)
            .unwrap_or("unknown TinyG error")
            .to_string();
        return TinyGEvent::Error {
            code,
            message: message.clone(),
            error: decode_error_to_taxonomy(code, &message),
        };
    }

    // Single-field object naming a known parameter or an axis-suffixed key.
    if fields.len() == 1 {
        let (name, val) = &fields[0];
        if is_known_parameter(name) {
            return TinyGEvent::Parameter {
                name: name.clone(),
                value: val.clone(),
            };
        }
        if let TinyGValue::String(s) = val {
            if name == "msg" {
                return TinyGEvent::Message(s.clone());
            }
        }
    }

    TinyGEvent::Unrecognized(raw.to_string())
}

fn extract_footer(f: &TinyGValue) -> Option<Vec<f64>> {
    match f {
        TinyGValue::Array(items) => Some(items.iter().filter_map(TinyGValue::as_f64).collect()),
        _ => None,
    }
}

fn is_known_parameter(name: &str) -> bool {
    const FIXED: &[&str] = &[
        "prb", "g54", "g55", "g56", "g57", "g58", "g59", "g28", "g30", "g92", "tlo", "ver", "opt",
    ];
    if FIXED.contains(&name) {
        return true;
    }
    (name.starts_with("mpo") || name.starts_with("hom")) && name.len() == 4
}

/// Map a TinyG `{er:...}` to the stable taxonomy (§7, §4.2).
fn decode_error_to_taxonomy(code: u16, message: &str) -> Error {
    match code {
        2 => Error::limit_hit(message.to_string()),
        3 | 4 => Error::probe_initial_state(message.to_string()),
        other if other >= 100 => Error::machine_error(message.to_string()),
        _ => Error::parse_error(message.to_string()),
    }
}

/// Encode a [`TinyGValue`] in TinyG's compact wire form: bare identifier
/// keys where `[A-Za-z][A-Za-z0-9_]*` matches, quoted otherwise; numbers at
/// `precision` decimals with trailing zeros trimmed.
pub fn encode(value: &TinyGValue, precision: usize) -> String {
    let mut out = String::new();
    write_value(&mut out, value, precision);
    out
}

/// Encode a single top-level command, e.g. `encode_command("sr", Null)` ->
/// `{sr:null}`.
pub fn encode_command(key: &str, value: TinyGValue) -> String {
    encode(&TinyGValue::Object(vec![(key.to_string(), value)]), 5)
}

fn write_value(out: &mut String, value: &TinyGValue, precision: usize) {
    match value {
        TinyGValue::Null => out.push_str("null"),
        TinyGValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        TinyGValue::Number(n) => write_number(out, *n, precision),
        TinyGValue::String(s) => write_quoted(out, s),
        TinyGValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, precision);
            }
            out.push(']');
        }
        TinyGValue::Object(fields) => {
            out.push('{');
            for (i, (k, v)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_key(out, k);
                out.push(':');
                write_value(out, v, precision);
            }
            out.push('}');
        }
    }
}

fn write_key(out: &mut String, key: &str) {
    if is_bare_identifier(key) {
        out.push_str(key);
    } else {
        write_quoted(out, key);
    }
}

fn is_bare_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_number(out: &mut String, n: f64, precision: usize) {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        let _ = write!(out, "{}", n as i64);
        return;
    }
    let formatted = format!("{:.*}", precision, n);
    let trimmed = formatted.trim_end_matches('0');
    let trimmed = trimmed.trim_end_matches('.');
    out.push_str(trimmed);
}

/// Recursive-descent parser for TinyG's tolerant JSON extension.
struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
            self.pos += 1;
        }
    }

    fn parse_value(&mut self) -> Result<TinyGValue, Error> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b'"') => self.parse_string().map(TinyGValue::String),
            Some(b'-') | Some(b'0'..=b'9') => self.parse_number(),
            Some(_) => self.parse_bare_token(),
            None => Err(Error::parse_error("unexpected end of TinyG value")),
        }
    }

    fn parse_object(&mut self) -> Result<TinyGValue, Error> {
        self.expect(b'{')?;
        let mut fields = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(TinyGValue::Object(fields));
        }
        loop {
            self.skip_ws();
            let key = self.parse_key()?;
            self.skip_ws();
            self.expect(b':')?;
            let value = self.parse_value()?;
            fields.push((key, value));
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => break,
                _ => return Err(Error::parse_error("expected ',' or '}' in TinyG object")),
            }
        }
        Ok(TinyGValue::Object(fields))
    }

    fn parse_key(&mut self) -> Result<String, Error> {
        if self.peek() == Some(b'"') {
            return self.parse_string();
        }
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(Error::parse_error("expected object key in TinyG value"));
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn parse_array(&mut self) -> Result<TinyGValue, Error> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(TinyGValue::Array(items));
        }
        loop {
            let value = self.parse_value()?;
            items.push(value);
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b']') => break,
                _ => return Err(Error::parse_error("expected ',' or ']' in TinyG array")),
            }
        }
        Ok(TinyGValue::Array(items))
    }

    fn parse_string(&mut self) -> Result<String, Error> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    Some(b'/') => out.push('/'),
                    Some(b'n') => out.push('\n'),
                    Some(b'r') => out.push('\r'),
                    Some(b't') => out.push('\t'),
                    Some(b'u') => {
                        let hex = self.take_hex4()?;
                        if let Some(c) = char::from_u32(hex) {
                            out.push(c);
                        }
                    }
                    _ => return Err(Error::parse_error("invalid escape in TinyG string")),
                },
                Some(b) => out.push(b as char),
                None => return Err(Error::parse_error("unterminated TinyG string")),
            }
        }
        Ok(out)
    }

    fn take_hex4(&mut self) -> Result<u32, Error> {
        if self.pos + 4 > self.bytes.len() {
            return Err(Error::parse_error("truncated unicode escape"));
        }
        let hex = std::str::from_utf8(&self.bytes[self.pos..self.pos + 4])
            .map_err(|_| Error::parse_error("invalid unicode escape"))?;
        let value =
            u32::from_str_radix(hex, 16).map_err(|_| Error::parse_error("invalid unicode escape"))?;
        self.pos += 4;
        Ok(value)
    }

    fn parse_number(&mut self) -> Result<TinyGValue, Error> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        text.parse::<f64>()
            .map(TinyGValue::Number)
            .map_err(|_| Error::parse_error(format!("invalid TinyG number '{text}'")))
    }

    /// Parse `null`/`true`/`false` or their single-letter shorthands
    /// `n`/`t`/`f` (the protocol extension this codec exists for).
    fn parse_bare_token(&mut self) -> Result<TinyGValue, Error> {
        if self.try_literal("null") {
            return Ok(TinyGValue::Null);
        }
        if self.try_literal("true") {
            return Ok(TinyGValue::Bool(true));
        }
        if self.try_literal("false") {
            return Ok(TinyGValue::Bool(false));
        }
        match self.peek() {
            Some(b'n') if self.is_token_boundary(1) => {
                self.pos += 1;
                Ok(TinyGValue::Null)
            }
            Some(b't') if self.is_token_boundary(1) => {
                self.pos += 1;
                Ok(TinyGValue::Bool(true))
            }
            Some(b'f') if self.is_token_boundary(1) => {
                self.pos += 1;
                Ok(TinyGValue::Bool(false))
            }
            Some(c) => Err(Error::parse_error(format!(
                "unexpected character '{}' in TinyG value",
                c as char
            ))),
            None => Err(Error::parse_error("unexpected end of TinyG value")),
        }
    }

    fn try_literal(&mut self, literal: &str) -> bool {
        let bytes = literal.as_bytes();
        if self.bytes[self.pos..].starts_with(bytes) {
            let after = self.pos + bytes.len();
            let boundary = self
                .bytes
                .get(after)
                .map(|b| !b.is_ascii_alphanumeric())
                .unwrap_or(true);
            if boundary {
                self.pos = after;
                return true;
            }
        }
        false
    }

    /// True if the byte `offset` positions ahead is a delimiter (or EOF),
    /// i.e. the single-letter token at the current position isn't actually
    /// the start of a longer identifier.
    fn is_token_boundary(&self, offset: usize) -> bool {
        match self.bytes.get(self.pos + offset) {
            None => true,
            Some(b) => matches!(b, b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r'),
        }
    }

    fn expect(&mut self, expected: u8) -> Result<(), Error> {
        match self.bump() {
            Some(b) if b == expected => Ok(()),
            Some(b) => Err(Error::parse_error(format!(
                "expected '{}', found '{}'",
                expected as char, b as char
            ))),
            None => Err(Error::parse_error(format!(
                "expected '{}', found end of input",
                expected as char
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_json_object() {
        let v = parse_value(r#"{"r":{"fv":0.97}}"#).unwrap();
        assert_eq!(v.get("r").unwrap().get("fv").unwrap().as_f64(), Some(0.97));
    }

    #[test]
    fn parses_bare_identifier_keys() {
        let v = parse_value("{sr:{posx:1.5,stat:3}}").unwrap();
        let sr = v.get("sr").unwrap();
        assert_eq!(sr.get("posx").unwrap().as_f64(), Some(1.5));
    }

    #[test]
    fn parses_single_letter_literals() {
        let v = parse_value("{clear:n}").unwrap();
        assert_eq!(v.get("clear"), Some(&TinyGValue::Null));
        let v = parse_value("{qv:t}").unwrap();
        assert_eq!(v.get("qv"), Some(&TinyGValue::Bool(true)));
        let v = parse_value("{qv:f}").unwrap();
        assert_eq!(v.get("qv"), Some(&TinyGValue::Bool(false)));
    }

    #[test]
    fn classifies_queue_report() {
        match parse_line("{qr:28,qi:0,qo:0}") {
            TinyGEvent::QueueReport { qr, qi, qo } => {
                assert_eq!((qr, qi, qo), (28, 0, 0));
            }
            other => panic!("expected QueueReport, got {other:?}"),
        }
    }

    #[test]
    fn classifies_system_ready_as_welcome() {
        match parse_line(r#"{"r":{"msg":"SYSTEM READY"}}"#) {
            TinyGEvent::Welcome => {}
            other => panic!("expected Welcome, got {other:?}"),
        }
    }

    #[test]
    fn classifies_status_report() {
        match parse_line("{sr:{posx:1,posy:2,stat:3}}") {
            TinyGEvent::StatusReport(fields) => {
                assert!(fields.iter().any(|(k, _)| k == "posx"));
            }
            other => panic!("expected StatusReport, got {other:?}"),
        }
    }

    #[test]
    fn classifies_error() {
        match parse_line(r#"{"er":{"st":3,"msg":"probe fail"}}"#) {
            TinyGEvent::Error { code, error, .. } => {
                assert_eq!(code, 3);
                assert!(matches!(error, Error::ProbeInitialState(_)));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn classifies_known_parameter() {
        match parse_line("{prb:{e:1,x:0,y:0,z:-5}}") {
            TinyGEvent::Parameter { name, .. } => assert_eq!(name, "prb"),
            other => panic!("expected Parameter, got {other:?}"),
        }
        match parse_line("{mpox:12.5}") {
            TinyGEvent::Parameter { name, value } => {
                assert_eq!(name, "mpox");
                assert_eq!(value.as_f64(), Some(12.5));
            }
            other => panic!("expected Parameter, got {other:?}"),
        }
    }

    #[test]
    fn encodes_with_bare_keys_and_trimmed_precision() {
        let v = TinyGValue::Object(vec![(
            "gc".to_string(),
            TinyGValue::String("G0 X10".to_string()),
        )]);
        assert_eq!(encode(&v, 5), r#"{gc:"G0 X10"}"#);

        let v = TinyGValue::Object(vec![("mpox".to_string(), TinyGValue::Number(1.230000))]);
        assert_eq!(encode(&v, 5), "{mpox:1.23}");
    }

    #[test]
    fn encode_command_wraps_single_key() {
        assert_eq!(encode_command("sr", TinyGValue::Null), "{sr:null}");
    }

    #[test]
    fn round_trips_values_up_to_precision() {
        let original = TinyGValue::Object(vec![
            ("a".to_string(), TinyGValue::Number(1.0 / 3.0)),
            ("b".to_string(), TinyGValue::Bool(true)),
            ("c".to_string(), TinyGValue::Null),
            ("d".to_string(), TinyGValue::String("hi".to_string())),
        ]);
        let encoded = encode(&original, 5);
        let decoded = parse_value(&encoded).unwrap();
        let a = decoded.get("a").unwrap().as_f64().unwrap();
        assert!((a - 1.0 / 3.0).abs() < 1e-5);
        assert_eq!(decoded.get("b"), Some(&TinyGValue::Bool(true)));
        assert_eq!(decoded.get("c"), Some(&TinyGValue::Null));
        assert_eq!(decoded.get("d").unwrap().as_str(), Some("hi"));
    }
}
