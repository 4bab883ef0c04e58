//! # cncctl-core
//!
//! Shared data model, stable error taxonomy, and event primitives for the
//! GRBL/TinyG controller communications engine. This crate holds no
//! protocol logic; `cncctl-comm` builds the engine on top of these types.

pub mod error;
pub mod event;
pub mod message;
pub mod state;

pub use error::{Error, Result};
pub use event::{CancelReason, EngineChannels};
pub use message::{Message, MessageDispatcher, MessageLevel};
pub use state::{
    AxisMaxFeeds, AxisVec, Coolant, Controller, ControllerSnapshot, CommsSnapshot, ErrorData,
    LifecycleHooks, PlannerMirrorSlot, SendQueueEntry, StatusSnapshot, Units,
};
