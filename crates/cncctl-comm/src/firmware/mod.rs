//! Per-dialect firmware support: protocol constants, settings, and
//! error/alarm decoding. Wire-level line parsing lives in [`crate::codec`];
//! this module holds everything else the engine drivers
//! (`crate::engine::{grbl,tinyg}`) need that isn't line parsing.
//!
//! Standalone `firmware_version`/`connection_watch` modules
//! (g2core/Smoothieware/FluidNC version detection, a separate heartbeat
//! watchdog) are dropped here: welcome-line parsing already yields the
//! firmware version (`codec::grbl::GrblEvent::Welcome`), and connection
//! timeout detection is the reactor's own welcome-deadline/reconnect timer
//! (`engine::grbl`/`engine::tinyg`, §4.4.9), so a second, unwired watchdog
//! has no caller (see `DESIGN.md`).

pub mod grbl;
pub mod tinyg;
