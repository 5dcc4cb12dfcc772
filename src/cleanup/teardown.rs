//! # Teardown abstraction.
//!
//! This module defines the [`Teardown`] trait — an async, named teardown
//! callback — and its shared handle type [`TeardownRef`]
//! (`Arc<dyn Teardown>`). Handler identity (for idempotent registration
//! and removal) is the `Arc` pointer, so clone the same `TeardownRef` to
//! refer to the same handler.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TeardownError;

/// # Asynchronous teardown callback.
///
/// A `Teardown` has a [`name`](Teardown::name) used in diagnostics and an
/// async [`run`](Teardown::run) invoked at most once per drain. A failing
/// handler aborts the drain it is part of and propagates out of
/// `destroy()`.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use lifevisor::{Teardown, TeardownError};
///
/// struct CloseSocket;
///
/// #[async_trait]
/// impl Teardown for CloseSocket {
///     fn name(&self) -> &str { "close-socket" }
///
///     async fn run(&self) -> Result<(), TeardownError> {
///         // flush and close...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Teardown: Send + Sync + 'static {
    /// Returns a stable, human-readable handler name for diagnostics.
    fn name(&self) -> &str {
        "<teardown>"
    }

    /// Runs the teardown to completion.
    async fn run(&self) -> Result<(), TeardownError>;
}

/// Shared handle to a teardown handler.
pub type TeardownRef = Arc<dyn Teardown>;
