//! # Per-instance lifecycle configuration.
//!
//! Provides [`InstanceConfig`] — the knobs an instance is built with.
//!
//! Config is used in two ways:
//! 1. **Builder defaults**: `Instance::builder(&orch)` starts from
//!    `InstanceConfig::default()`.
//! 2. **Explicit override**: `builder.config(cfg)` replaces the whole set.
//!
//! ## Sentinel values
//! - `destroy_grace = 0s` → destroy watchdog disabled (no timeout event)
//! - `init_grace = 0s` → async-init watchdog disabled
//!
//! Both watchdogs are purely observational: they emit a warning event and
//! never cancel or force anything.

use std::time::Duration;

use crate::cleanup::DrainOrder;

/// Configuration for a single instance's lifecycle machinery.
///
/// ## Field semantics
/// - `destroy_grace`: how long a destroy pre-handler may run before the
///   instance emits [`topic::DESTROY_STACK_TIMED_OUT`](crate::topic) (`0s`
///   = never)
/// - `init_grace`: how long an async-mode instance may go without `init()`
///   before it emits [`topic::INIT_OVERDUE`](crate::topic) (`0s` = never)
/// - `drain_order`: execution order of the cleanup-handler stack
#[derive(Clone, Debug)]
pub struct InstanceConfig {
    /// Grace period for the destroy watchdog.
    ///
    /// When `destroy()` starts, a watchdog is armed; if the pre-handler has
    /// not resolved within this window, the instance emits a timed-out
    /// warning event. The destroy itself keeps running.
    pub destroy_grace: Duration,

    /// Grace period for the async-init watchdog.
    ///
    /// Only consulted for [`ReadyMode::Async`](crate::ReadyMode)
    /// instances. Measured from construction to the `init()` call.
    pub init_grace: Duration,

    /// Order in which cleanup handlers drain at destruction.
    ///
    /// Defaults to LIFO so that handlers for dependencies registered later
    /// run before handlers for dependencies registered earlier.
    pub drain_order: DrainOrder,
}

impl InstanceConfig {
    /// Returns the destroy watchdog grace as an `Option`.
    ///
    /// - `None` → watchdog disabled
    /// - `Some(d)` → timed-out event after `d`
    #[inline]
    pub fn destroy_grace_opt(&self) -> Option<Duration> {
        if self.destroy_grace == Duration::ZERO {
            None
        } else {
            Some(self.destroy_grace)
        }
    }

    /// Returns the init watchdog grace as an `Option`.
    #[inline]
    pub fn init_grace_opt(&self) -> Option<Duration> {
        if self.init_grace == Duration::ZERO {
            None
        } else {
            Some(self.init_grace)
        }
    }
}

impl Default for InstanceConfig {
    /// Default configuration:
    ///
    /// - `destroy_grace = 5s`
    /// - `init_grace = 5s`
    /// - `drain_order = DrainOrder::Lifo`
    fn default() -> Self {
        Self {
            destroy_grace: Duration::from_secs(5),
            init_grace: Duration::from_secs(5),
            drain_order: DrainOrder::Lifo,
        }
    }
}
