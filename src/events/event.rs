//! # Events flowing through instance emitters.
//!
//! An [`Event`] is the payload every listener receives. Events are named by
//! **topic** (an arbitrary string); the lifecycle topics the runtime itself
//! emits live in [`topic`].
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically across all instances. Use `seq` to restore ordering when
//! events from several instances are collected in one place.
//!
//! ## Example
//! ```rust
//! use lifevisor::{Event, topic};
//!
//! let ev = Event::new(topic::DESTROY)
//!     .with_source("3f2a9c41")
//!     .with_reason("parent collection torn down");
//!
//! assert_eq!(&*ev.name, "destroy");
//! assert_eq!(ev.source.as_deref(), Some("3f2a9c41"));
//! assert_eq!(ev.reason.as_deref(), Some("parent collection torn down"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Topics emitted by the lifecycle runtime itself.
///
/// User code may emit and listen on any string topic; these names are
/// reserved in the sense that the runtime emits them at well-defined
/// points, and emitting [`DESTROY`](topic::DESTROY) directly is treated as
/// misuse (it is a completion signal, not a command).
pub mod topic {
    /// Destruction is about to begin; the pre-handler has not yet run.
    /// Emitted exactly once, ever.
    pub const BEFORE_DESTROY: &str = "before_destroy";

    /// Destruction completed; emitted exactly once, ever, **before**
    /// listeners are removed so subscribers observe the transition.
    pub const DESTROY: &str = "destroy";

    /// The destroy pre-handler outlived the configured grace period.
    /// Purely observational: nothing is cancelled.
    pub const DESTROY_STACK_TIMED_OUT: &str = "destroy_stack_timed_out";

    /// The instance became ready (sync tick or explicit `init()`).
    pub const READY: &str = "ready";

    /// An async-mode instance went too long without `init()`.
    pub const INIT_OVERDUE: &str = "init_overdue";
}

/// Event payload with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - `name`: the topic this event was emitted on
/// - optional fields are set depending on the emitting site
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Topic name.
    pub name: Arc<str>,
    /// Short id of the emitting instance, if applicable.
    pub source: Option<Arc<str>>,
    /// Human-readable reason (misuse details, timeout info, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event on the given topic with the current timestamp
    /// and next sequence number.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            name: name.into(),
            source: None,
            reason: None,
        }
    }

    /// Attaches the short id of the emitting instance.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// True if this event is on the given topic.
    #[inline]
    pub fn is(&self, name: &str) -> bool {
        &*self.name == name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new("tick");
        let b = Event::new("tick");
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builders_attach_metadata() {
        let ev = Event::new(topic::BEFORE_DESTROY).with_source("cafebabe");
        assert!(ev.is(topic::BEFORE_DESTROY));
        assert_eq!(ev.source.as_deref(), Some("cafebabe"));
        assert_eq!(ev.reason, None);
    }
}
