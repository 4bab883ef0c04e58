//! TinyG firmware support: protocol constants and defaults. The
//! wire-level JSON-with-extensions parsing lives in [`crate::codec::tinyg`];
//! this module holds the dialect constants the codec, queue, and engine
//! driver (`crate::engine::tinyg`) share.

pub mod constants;

pub use constants::*;
