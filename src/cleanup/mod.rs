//! Teardown callbacks and the cleanup-handler stack.
//!
//! This module defines the [`Teardown`] trait (async, named), the
//! function-backed [`TeardownFn`] adapter, and the per-instance
//! [`CleanupStack`] drained during destruction.

mod stack;
mod teardown;
mod teardown_fn;

pub use stack::{CleanupStack, DrainOrder};
pub use teardown::{Teardown, TeardownRef};
pub use teardown_fn::TeardownFn;
