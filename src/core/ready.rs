//! # Ready state machine.
//!
//! Two modes, chosen at construction:
//! - [`ReadyMode::Sync`] (default): the instance becomes ready on the next
//!   turn of the event loop, no explicit signal needed.
//! - [`ReadyMode::Async`]: the owner must call `init()` exactly once; a
//!   watchdog scheduled through the instance's own timer registry warns if
//!   `init()` does not arrive within the configured grace.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::timers::TimerId;

/// How an instance reaches its ready state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyMode {
    /// Ready on the next event-loop turn after construction. The default.
    #[default]
    Sync,
    /// Ready only after an explicit `init()` call.
    Async,
}

pub(crate) struct ReadyState {
    mode: ReadyMode,
    ready: AtomicBool,
    init_called: AtomicBool,
    init_watchdog: Mutex<Option<TimerId>>,
}

impl ReadyState {
    pub fn new(mode: ReadyMode) -> Self {
        Self {
            mode,
            ready: AtomicBool::new(false),
            init_called: AtomicBool::new(false),
            init_watchdog: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> ReadyMode {
        self.mode
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Flips to ready. Returns `false` when already ready.
    pub fn mark_ready(&self) -> bool {
        !self.ready.swap(true, Ordering::SeqCst)
    }

    /// Records the `init()` call. Returns `false` on a repeat call.
    pub fn mark_init_called(&self) -> bool {
        !self.init_called.swap(true, Ordering::SeqCst)
    }

    pub fn set_watchdog(&self, id: TimerId) {
        *self.init_watchdog.lock() = Some(id);
    }

    pub fn take_watchdog(&self) -> Option<TimerId> {
        self.init_watchdog.lock().take()
    }
}
