//! Stable error taxonomy for the controller communications engine.
//!
//! The engine exposes one abstract, stable set of error kinds to its callers
//! regardless of which dialect (GRBL or TinyG) produced them, so operations
//! layered on top of the engine never have to match on firmware-specific
//! codes. Each dialect driver is responsible for mapping its own wire-level
//! errors onto this taxonomy.

use thiserror::Error;

/// The stable, dialect-independent error kind.
///
/// This is the type returned by every public engine operation. It
/// deliberately does not carry the firmware's raw numeric codes in its
/// variant shape (those live in `detail`), so callers can match on `kind()`
/// without caring whether the device speaks GRBL or TinyG.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Serial I/O or transport-level failure (open, write, unexpected close).
    #[error("communication error: {0}")]
    CommError(String),

    /// A line or message from the firmware could not be parsed.
    #[error("parse error: {0}")]
    ParseError(String),

    /// The firmware reported an error or alarm tied to machine operation.
    #[error("machine error: {0}")]
    MachineError(String),

    /// A soft or hard limit was hit.
    #[error("limit hit: {0}")]
    LimitHit(String),

    /// A probe cycle completed without the firmware tripping.
    #[error("probe not tripped")]
    ProbeNotTripped,

    /// A probe was requested from a position that makes the request invalid
    /// (e.g. the probe axis is already at the target).
    #[error("probe initial state invalid: {0}")]
    ProbeInitialState(String),

    /// A safety interlock (door, hold) prevented the requested action.
    #[error("safety interlock: {0}")]
    SafetyInterlock(String),

    /// The operation was cancelled, typically by `cancel_running_ops`.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Caller passed an argument the engine will not act on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An invariant the engine relies on did not hold; this indicates a bug.
    #[error("internal error: {0}")]
    InternalError(String),

    /// A requested parameter, setting, or entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not supported by the connected dialect/firmware.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Underlying I/O failure, preserved for `?`-propagation from transport code.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    pub fn comm(msg: impl Into<String>) -> Self {
        Error::CommError(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Error::ParseError(msg.into())
    }

    /// Alias of [`Error::parse`], used where the caller is naming a wire
    /// parse failure explicitly (dialect codecs).
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Error::ParseError(msg.into())
    }

    pub fn machine(msg: impl Into<String>) -> Self {
        Error::MachineError(msg.into())
    }

    /// Alias of [`Error::machine`].
    pub fn machine_error(msg: impl Into<String>) -> Self {
        Error::MachineError(msg.into())
    }

    pub fn probe_not_tripped() -> Self {
        Error::ProbeNotTripped
    }

    pub fn limit_hit(msg: impl Into<String>) -> Self {
        Error::LimitHit(msg.into())
    }

    pub fn probe_initial_state(msg: impl Into<String>) -> Self {
        Error::ProbeInitialState(msg.into())
    }

    pub fn safety_interlock(msg: impl Into<String>) -> Self {
        Error::SafetyInterlock(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Error::Cancelled(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::InternalError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedOperation(msg.into())
    }

    /// True for errors that the reactor should treat as terminal for the
    /// connection (parse failures, comm failures) versus errors local to one
    /// entry or operation.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Error::CommError(_) | Error::ParseError(_))
    }

    pub fn is_probe_not_tripped(&self) -> bool {
        matches!(self, Error::ProbeNotTripped)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// Result type using the engine's stable [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_not_tripped_is_not_connection_fatal() {
        let err = Error::ProbeNotTripped;
        assert!(!err.is_connection_fatal());
        assert!(err.is_probe_not_tripped());
    }

    #[test]
    fn comm_and_parse_errors_are_connection_fatal() {
        assert!(Error::comm("closed").is_connection_fatal());
        assert!(Error::parse("bad line").is_connection_fatal());
        assert!(!Error::machine("alarm:1").is_connection_fatal());
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
