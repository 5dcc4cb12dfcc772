//! # lifevisor
//!
//! **Lifevisor** is an instance lifecycle runtime for Rust.
//!
//! It gives every instance a disciplined construction → ready →
//! destruction lifecycle, plus a safe mechanism for one instance to
//! subscribe to another instance's events without leaking listeners or
//! references when either side is torn down. It is the substrate
//! underneath application components (services, collections, controllers)
//! that are created and destroyed frequently and unpredictably, and whose
//! dependency graphs make destruction order non-obvious.
//!
//! ## Architecture
//! ### Overview
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │  Orchestrator (process-wide, constructed once)                     │
//! │  - live-instance set and per-class counts                          │
//! │  - log-level policy: global default + per-class overrides          │
//! └───────┬─────────────────────┬─────────────────────┬────────────────┘
//!         ▼                     ▼                     ▼
//!   ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//!   │   Instance   │     │   Instance   │     │   Instance   │
//!   │ ┌──────────┐ │     │              │     │              │
//!   │ │ Emitter  │◄┼─────┼─ proxy_on ───┼─────┼─ proxy_on    │
//!   │ ├──────────┤ │     │              │     │              │
//!   │ │ Destroy  │ │     │  (bindings auto-swept when the    │
//!   │ │ machine  │ │     │   target instance is destroyed)   │
//!   │ ├──────────┤ │     └──────────────┘     └──────────────┘
//!   │ │ Cleanup  │ │
//!   │ │ stack    │ │  ◄── LIFO drain of async teardown handlers
//!   │ ├──────────┤ │
//!   │ │ Timers   │ │  ◄── mass-cancelled at destruction
//!   │ └──────────┘ │
//!   └──────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Instance::builder(&orch) ──► construct ──► register with Orchestrator
//!
//! ready:
//!   ReadyMode::Sync  ─► ready on the next event-loop turn
//!   ReadyMode::Async ─► ready when init() is called
//!                        (watchdog warns if init() is overdue)
//!
//! destroy(pre):
//!   ├─► already destroying? ─► warn + no-op   (gridlock breaker)
//!   ├─► already destroyed?  ─► error
//!   ├─► emit BEFORE_DESTROY
//!   ├─► arm watchdog, await pre()             (observational timeout)
//!   ├─► destroyed = true, emit DESTROY        (proxy sweeps fire here)
//!   ├─► remove all listeners
//!   ├─► detach proxies → drain cleanup stack (LIFO) → clear timers
//!   │     └─ orchestrator deregistration drains last
//!   ├─► scan adopted children, warn per leak
//!   └─► neutralize non-diagnostic API          (warn-and-return stubs)
//! ```
//!
//! ## Features
//! | Area               | Description                                                      | Key types / traits                         |
//! |--------------------|------------------------------------------------------------------|--------------------------------------------|
//! | **Events**         | Synchronous, identity-aware per-instance emitter.                | [`Emitter`], [`Event`], [`Handler`]        |
//! | **Destruction**    | Two-phase destroy with gridlock breaking and watchdogs.          | [`Instance::destroy`], [`topic`]           |
//! | **Cleanup**        | Ordered async teardown handlers, LIFO by default.                | [`Teardown`], [`TeardownFn`], [`DrainOrder`] |
//! | **Timers**         | Instance-scoped timeouts/intervals, mass-cancelled at destroy.   | [`Instance::set_timeout`]                  |
//! | **Proxying**       | Cross-instance bindings with automatic sweep on target destroy.  | [`Instance::proxy_on`]                     |
//! | **Orchestration**  | Live counts and log-level policy across the process.             | [`Orchestrator`], [`LogLevel`]             |
//! | **Errors**         | Typed misuse and teardown failures.                              | [`LifecycleError`], [`TeardownError`]      |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use lifevisor::{handler, Event, Instance, Orchestrator, TeardownFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orch = Orchestrator::new()?;
//!
//!     let mixer = Instance::new(&orch, "Mixer");
//!     let player = Instance::new(&orch, "AudioPlayer");
//!     player.once_ready().await?;
//!
//!     // Mixer listens to the player without leaking: the binding is
//!     // swept automatically when the player is destroyed.
//!     mixer.proxy_on(&player, "track_changed", handler(|ev: &Event| {
//!         println!("track changed (seq {})", ev.seq);
//!     }))?;
//!
//!     player.register_cleanup_handler(TeardownFn::arc("flush", || async {
//!         // flush buffers...
//!         Ok(())
//!     }));
//!     let _pending = player.set_timeout(Duration::from_millis(100), || {
//!         // cancelled automatically if the player is destroyed first
//!     });
//!
//!     player.emit(&Event::new("track_changed"))?;
//!     player.destroy(None).await?;
//!     assert_eq!(mixer.proxy_queue_depth(&player), 0);
//!
//!     mixer.destroy(None).await?;
//!     assert_eq!(orch.instance_count(), 0);
//!     Ok(())
//! }
//! ```

mod cleanup;
mod config;
mod core;
mod error;
mod events;
mod log;
mod orchestrator;
mod proxy;
mod timers;

// ---- Public re-exports ----

pub use cleanup::{CleanupStack, DrainOrder, Teardown, TeardownFn, TeardownRef};
pub use config::InstanceConfig;
pub use self::core::{Instance, InstanceBuilder, ReadyMode};
pub use error::{LifecycleError, TeardownError};
pub use events::{Emitter, Event, Handler, handler, topic};
pub use log::LogLevel;
pub use orchestrator::Orchestrator;
pub use timers::TimerId;
