#![warn(missing_docs)]

//! leflux - Session Event Fan-Out
//!
//! *Le Flux* (The Stream) - ordered progress/log events for one session,
//! broadcast to any number of live observers with a bounded replay window
//! for late arrivals and no publisher stalls on slow consumers.

/// Per-session broadcast channels and lifecycle.
pub mod bus;
/// Event model.
pub mod event;

pub use bus::{EventBus, EventSink, EventStream};
pub use event::{EventKind, SessionEvent};
