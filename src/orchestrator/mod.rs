//! Process-wide orchestration: the live-instance registry and log-level
//! policy.

mod registry;

pub use registry::Orchestrator;
