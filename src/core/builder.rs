//! Builder for constructing instances with optional overrides.

use std::sync::Arc;
use std::time::Duration;

use crate::cleanup::DrainOrder;
use crate::config::InstanceConfig;
use crate::core::instance::Instance;
use crate::core::ready::ReadyMode;
use crate::orchestrator::Orchestrator;

/// Builder for an [`Instance`].
///
/// ## Example
/// ```no_run
/// use std::time::Duration;
/// use lifevisor::{Instance, Orchestrator, ReadyMode};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orch = Orchestrator::new()?;
///     let conn = Instance::builder(&orch)
///         .class_name("Connection")
///         .ready_mode(ReadyMode::Async)
///         .init_grace(Duration::from_secs(10))
///         .build();
///
///     // ...asynchronous setup, then:
///     conn.init()?;
///     conn.once_ready().await?;
///     Ok(())
/// }
/// ```
pub struct InstanceBuilder {
    orchestrator: Orchestrator,
    class_name: Arc<str>,
    ready_mode: ReadyMode,
    config: InstanceConfig,
}

impl InstanceBuilder {
    pub(crate) fn new(orchestrator: &Orchestrator) -> Self {
        Self {
            orchestrator: orchestrator.clone(),
            class_name: "Instance".into(),
            ready_mode: ReadyMode::default(),
            config: InstanceConfig::default(),
        }
    }

    /// Sets the class name the instance registers under.
    pub fn class_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.class_name = name.into();
        self
    }

    /// Selects how the instance reaches its ready state.
    pub fn ready_mode(mut self, mode: ReadyMode) -> Self {
        self.ready_mode = mode;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: InstanceConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the destroy-watchdog grace (`0s` disables it).
    pub fn destroy_grace(mut self, grace: Duration) -> Self {
        self.config.destroy_grace = grace;
        self
    }

    /// Overrides the async-init watchdog grace (`0s` disables it).
    pub fn init_grace(mut self, grace: Duration) -> Self {
        self.config.init_grace = grace;
        self
    }

    /// Overrides the cleanup drain order.
    pub fn drain_order(mut self, order: DrainOrder) -> Self {
        self.config.drain_order = order;
        self
    }

    /// Builds the instance and registers it with the orchestrator.
    ///
    /// Must be called from within a tokio runtime (the ready machine and
    /// timers spawn onto it).
    pub fn build(self) -> Instance {
        Instance::assemble(
            self.orchestrator,
            self.class_name,
            self.ready_mode,
            self.config,
        )
    }
}
