//! Error types used by the lifevisor runtime and teardown handlers.
//!
//! This module defines two main error enums:
//!
//! - [`LifecycleError`] — errors raised by the lifecycle machinery itself
//!   (programmer misuse and invariant violations).
//! - [`TeardownError`] — errors raised by individual teardown handlers
//!   during a cleanup drain or a destroy pre/post phase.
//!
//! Both types provide `as_label` helpers for logging/metrics. Note what is
//! deliberately *not* here: calling `destroy()` while destruction is
//! already in flight is a logged no-op, not an error — that re-entrancy is
//! the gridlock breaker for circular destroy-awaits.

use thiserror::Error;

/// # Errors produced by the lifecycle machinery.
///
/// These are raised synchronously at the call site and never swallowed;
/// they indicate misuse of the lifecycle contract rather than a failure of
/// the caller's own teardown logic (see [`TeardownError`] for that).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// `destroy()` was called again after destruction fully completed.
    ///
    /// A second call *during* destruction is a no-op by design; a second
    /// call after completion is a bug in the caller.
    #[error("destroy() called again after destruction completed")]
    AlreadyDestroyed,

    /// Something emitted the destroy-completion topic directly instead of
    /// calling `destroy()`. The instance force-starts its own destruction
    /// and raises this to the emitter.
    #[error("\"{topic}\" is a completion signal, not a command; destroy() has been invoked")]
    DestroyEmittedDirectly {
        /// The topic that was emitted.
        topic: String,
    },

    /// A listener was registered during the post-destroy phase. The
    /// teardown that did this is leaking work past its own completion.
    #[error("{count} listener(s) registered during the post-destroy phase")]
    ListenersAfterTeardown {
        /// Listeners still present after teardown finished.
        count: usize,
    },

    /// An instance attempted to proxy-bind to itself, which would create
    /// an unobservable cycle.
    #[error("cannot proxy to self (instance {id})")]
    ProxyToSelf {
        /// Short id of the offending instance.
        id: String,
    },

    /// `init()` was misused: called on a sync-mode instance, or called
    /// more than once.
    #[error("init() misuse: {reason}")]
    InitMisuse {
        /// What went wrong.
        reason: &'static str,
    },

    /// The instance began destruction before it ever became ready;
    /// `once_ready()` rejects instead of waiting forever.
    #[error("instance destroyed before becoming ready")]
    DestroyedBeforeReady,

    /// A second orchestrator was constructed in the same process.
    #[error("an orchestrator already exists in this process")]
    OrchestratorExists,

    /// The timer registry still held handles after its final clear. A
    /// timer was scheduled while teardown was already clearing.
    #[error("timer registry not drained: {timeouts} timeout(s), {intervals} interval(s) left after clear")]
    TimersNotDrained {
        /// Pending timeouts left behind.
        timeouts: usize,
        /// Pending intervals left behind.
        intervals: usize,
    },

    /// A teardown handler failed during `destroy()`; the instance is left
    /// destroying-but-not-destroyed and must be treated as unusable.
    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

impl LifecycleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use lifevisor::LifecycleError;
    ///
    /// let err = LifecycleError::AlreadyDestroyed;
    /// assert_eq!(err.as_label(), "already_destroyed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::AlreadyDestroyed => "already_destroyed",
            LifecycleError::DestroyEmittedDirectly { .. } => "destroy_emitted_directly",
            LifecycleError::ListenersAfterTeardown { .. } => "listeners_after_teardown",
            LifecycleError::ProxyToSelf { .. } => "proxy_to_self",
            LifecycleError::InitMisuse { .. } => "init_misuse",
            LifecycleError::DestroyedBeforeReady => "destroyed_before_ready",
            LifecycleError::OrchestratorExists => "orchestrator_exists",
            LifecycleError::TimersNotDrained { .. } => "timers_not_drained",
            LifecycleError::Teardown(_) => "teardown_failed",
        }
    }
}

/// # Errors produced by teardown handlers.
///
/// Raised from a [`Teardown`](crate::Teardown) implementation; a failing
/// handler aborts the cleanup drain it is part of and propagates to the
/// caller of `destroy()` / `exec()`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TeardownError {
    /// The handler itself reported a failure.
    #[error("teardown failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },
}

impl TeardownError {
    /// Creates a [`TeardownError::Failed`] from any displayable error.
    ///
    /// # Example
    /// ```
    /// use lifevisor::TeardownError;
    ///
    /// let err = TeardownError::failed("socket already closed");
    /// assert_eq!(err.as_label(), "teardown_failed");
    /// ```
    pub fn failed(error: impl std::fmt::Display) -> Self {
        TeardownError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TeardownError::Failed { .. } => "teardown_failed",
        }
    }
}
