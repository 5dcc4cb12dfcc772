//! # Function-backed teardown (`TeardownFn`)
//!
//! [`TeardownFn`] wraps a closure `F: Fn() -> Fut`, producing a fresh
//! future per run. A cleanup handler may in principle run more than once
//! (an aborted drain leaves unexecuted handlers queued), so the closure is
//! `Fn`, not `FnOnce`; shared state goes behind an explicit `Arc`.
//!
//! ## Example
//! ```rust
//! use lifevisor::{Teardown, TeardownFn, TeardownRef, TeardownError};
//!
//! let t: TeardownRef = TeardownFn::arc("flush-cache", || async {
//!     // flush...
//!     Ok::<_, TeardownError>(())
//! });
//!
//! assert_eq!(t.name(), "flush-cache");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TeardownError;
use crate::cleanup::teardown::Teardown;

/// Function-backed teardown implementation.
///
/// Wraps a closure that *creates* a new future per run.
pub struct TeardownFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TeardownFn<F> {
    /// Creates a new function-backed teardown handler.
    ///
    /// Prefer [`TeardownFn::arc`] when you immediately need a
    /// [`TeardownRef`](crate::TeardownRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle
    /// (`Arc<dyn Teardown>`).
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Teardown for TeardownFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TeardownError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), TeardownError> {
        (self.f)().await
    }
}
