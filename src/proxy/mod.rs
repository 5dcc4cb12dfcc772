//! Cross-instance event proxying with automatic cleanup.
//!
//! A proxy binding attaches one instance's handler to another instance's
//! emitter and guarantees removal when either side is destroyed.

mod registry;

pub use registry::BindMode;
pub(crate) use registry::{ProxyRegistry, ProxyTarget};
