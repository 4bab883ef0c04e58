//! Line codecs (§4.2): turn raw wire lines into tagged events, and typed
//! commands into wire lines. One dialect per submodule; neither leaks its
//! event type past [`crate::machine_state`] and [`crate::queue`] — both
//! dialects' events are folded into the same [`cncctl_core::state::Controller`]
//! updates and the same `cncctl_core::Error` taxonomy (§9 "From dynamic JSON
//! to tagged sum types").

pub mod grbl;
pub mod tinyg;
