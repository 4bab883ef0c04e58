//! GRBL firmware support: protocol constants and the error/alarm code
//! decoder. The wire-level parsing itself lives in [`crate::codec::grbl`];
//! this module holds everything the codec and the GRBL engine driver
//! (`crate::engine::grbl`) need that isn't line parsing.
//!
//! A `$N=value` settings-table manager with file-backed import/export was
//! dropped: `$N=…` feedback is parsed into `GrblEvent::SettingFeedback`
//! (§4.2) but no operation in this engine queries or edits the firmware
//! settings table, so a settings manager has no caller (see `DESIGN.md`).

pub mod constants;
pub mod error_decoder;

pub use constants::*;
pub use error_decoder::{decode_alarm, decode_error, format_alarm, format_error};
