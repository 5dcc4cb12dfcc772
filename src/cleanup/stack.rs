//! # Cleanup handler stack.
//!
//! [`CleanupStack`] holds the teardown callbacks an instance will drain
//! during its destruction. Handlers are stored in insertion order and
//! drained **LIFO by default**: a handler for a dependency acquired later
//! runs before the handler for a dependency acquired earlier.
//!
//! ## Rules
//! - `push` is idempotent against the exact same handler reference
//!   (`Arc` identity); pushing a duplicate is a no-op.
//! - `exec` drains **strictly sequentially**, awaiting each handler before
//!   popping the next — never in parallel.
//! - Re-entrant `exec` calls coalesce: while a drain is in flight, a
//!   second call returns immediately without starting a concurrent drain.
//! - A handler error **aborts** the drain; handlers not yet popped stay
//!   queued, and the error propagates to the caller.
//! - A handler pushed while a drain is in flight is not guaranteed to run
//!   in that pass.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;

use crate::error::TeardownError;
use crate::log::LogContext;
use crate::cleanup::teardown::TeardownRef;

/// Execution order for a cleanup drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainOrder {
    /// Reverse registration order (a true stack). The default.
    #[default]
    Lifo,
    /// Registration order, for stacks whose handlers form a pipeline.
    Fifo,
}

/// Ordered stack of async teardown callbacks.
pub struct CleanupStack {
    order: DrainOrder,
    queue: Mutex<VecDeque<TeardownRef>>,
    draining: AtomicBool,
    log: LogContext,
}

impl CleanupStack {
    /// Creates an empty stack draining in the given order.
    pub(crate) fn new(order: DrainOrder, log: LogContext) -> Self {
        Self {
            order,
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            log,
        }
    }

    /// Registers a handler. Returns `false` (and does nothing) when the
    /// exact same handler reference is already registered.
    pub fn push(&self, handler: TeardownRef) -> bool {
        let mut queue = self.queue.lock();
        if queue.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            self.log.debug("cleanup push ignored: handler already registered");
            return false;
        }
        queue.push_back(handler);
        true
    }

    /// Removes a not-yet-executed handler. Returns whether it was present.
    pub fn remove(&self, handler: &TeardownRef) -> bool {
        let mut queue = self.queue.lock();
        match queue.iter().position(|h| Arc::ptr_eq(h, handler)) {
            Some(idx) => {
                queue.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Drops every queued handler without running it.
    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    /// Number of handlers currently queued.
    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drains the stack, awaiting one handler at a time in the configured
    /// order. Coalesces into an already-running drain, if any.
    pub async fn exec(&self) -> Result<(), TeardownError> {
        if self.draining.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = loop {
            let next = {
                let mut queue = self.queue.lock();
                match self.order {
                    DrainOrder::Lifo => queue.pop_back(),
                    DrainOrder::Fifo => queue.pop_front(),
                }
            };
            let Some(handler) = next else {
                break Ok(());
            };
            // Panics are contained like failures: the drain aborts with an
            // error instead of unwinding through the destroy protocol.
            let run = std::panic::AssertUnwindSafe(handler.run()).catch_unwind();
            match run.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.log.warn(&format!(
                        "cleanup handler '{}' failed, aborting drain: {e}",
                        handler.name()
                    ));
                    break Err(e);
                }
                Err(_panic) => {
                    self.log.warn(&format!(
                        "cleanup handler '{}' panicked, aborting drain",
                        handler.name()
                    ));
                    break Err(TeardownError::failed(format!(
                        "handler '{}' panicked",
                        handler.name()
                    )));
                }
            }
        };

        self.draining.store(false, Ordering::SeqCst);
        result
    }
}
