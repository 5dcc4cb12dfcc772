//! # Instance-scoped timer registry.
//!
//! Wraps `tokio::time` so every scheduled callback is associated with the
//! owning instance and can be mass-cancelled at destruction.
//!
//! ## Rules
//! - A timeout **removes its own handle first**, then invokes the
//!   callback — a callback that destroys the owning instance never finds
//!   a stale handle for itself.
//! - Intervals keep their handle until explicitly cleared (or mass-
//!   cleared).
//! - Cancellation is per-timer via a [`CancellationToken`]; a cancelled
//!   timer's callback never runs.
//! - [`TimerRegistry::destroy`] clears everything and then verifies both
//!   handle tables are empty; anything left means a timer was scheduled
//!   while teardown was clearing, which is surfaced as a hard error.
//! - Callbacks run only while the registry is alive; a registry dropped
//!   without `destroy()` (a leak) lets its pending tasks fall through
//!   without firing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::LifecycleError;
use crate::log::LogContext;

/// Opaque handle to a scheduled timeout or interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Registry of pending timeouts and intervals for one instance.
pub struct TimerRegistry {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    next_id: AtomicU64,
    timeouts: Mutex<HashMap<TimerId, CancellationToken>>,
    intervals: Mutex<HashMap<TimerId, CancellationToken>>,
    log: LogContext,
}

impl TimerRegistry {
    pub(crate) fn new(log: LogContext) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                next_id: AtomicU64::new(0),
                timeouts: Mutex::new(HashMap::new()),
                intervals: Mutex::new(HashMap::new()),
                log,
            }),
        }
    }

    fn next_id(&self) -> TimerId {
        TimerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Schedules `f` to run once after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_timeout(&self, delay: Duration, f: impl FnOnce() + Send + 'static) -> TimerId {
        let id = self.next_id();
        let token = CancellationToken::new();
        self.inner.timeouts.lock().insert(id, token.clone());

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = time::sleep(delay) => {
                    // Handle out first, then the callback.
                    let Some(inner) = weak.upgrade() else { return };
                    inner.timeouts.lock().remove(&id);
                    drop(inner);
                    f();
                }
            }
        });
        id
    }

    /// Schedules `f` to run every `period`, first run one period from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_interval(&self, period: Duration, mut f: impl FnMut() + Send + 'static) -> TimerId {
        let id = self.next_id();
        let token = CancellationToken::new();
        self.inner.intervals.lock().insert(id, token.clone());

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if weak.upgrade().is_none() {
                            break;
                        }
                        f();
                    }
                }
            }
        });
        id
    }

    /// Cancels a pending timeout. Returns whether it was still pending.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        match self.inner.timeouts.lock().remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels a running interval. Returns whether it existed.
    pub fn clear_interval(&self, id: TimerId) -> bool {
        match self.inner.intervals.lock().remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Force-clears every pending timeout and interval.
    pub fn clear_all(&self) {
        let timeouts: Vec<_> = self.inner.timeouts.lock().drain().collect();
        let intervals: Vec<_> = self.inner.intervals.lock().drain().collect();
        if !timeouts.is_empty() || !intervals.is_empty() {
            self.inner.log.debug(&format!(
                "cleared {} timeout(s), {} interval(s)",
                timeouts.len(),
                intervals.len()
            ));
        }
        for (_, token) in timeouts.into_iter().chain(intervals) {
            token.cancel();
        }
    }

    /// Number of timeouts that have neither fired nor been cleared.
    pub fn pending_timeouts(&self) -> usize {
        self.inner.timeouts.lock().len()
    }

    /// Number of live intervals.
    pub fn pending_intervals(&self) -> usize {
        self.inner.intervals.lock().len()
    }

    /// Final teardown: clears everything, then verifies both tables
    /// actually drained.
    pub(crate) fn destroy(&self) -> Result<(), LifecycleError> {
        self.clear_all();
        let timeouts = self.pending_timeouts();
        let intervals = self.pending_intervals();
        if timeouts != 0 || intervals != 0 {
            return Err(LifecycleError::TimersNotDrained {
                timeouts,
                intervals,
            });
        }
        Ok(())
    }
}
