//! Per-instance timer bookkeeping.
//!
//! [`TimerRegistry`] tracks every timeout/interval created through an
//! instance so they can be mass-cancelled when the instance is destroyed.

mod registry;

pub use registry::{TimerId, TimerRegistry};
