//! # Instance: the composed lifecycle unit.
//!
//! [`Instance`] composes the destroy machine, cleanup stack, timer
//! registry, and proxy registry into the base object the rest of an
//! application builds on.
//!
//! ## Architecture
//! ```text
//! Instance (cheap Clone handle)
//!   └─► InstanceShared
//!         ├─ Destructible ── Emitter           (destroy machine + events)
//!         ├─ CleanupStack                      (LIFO teardown callbacks)
//!         ├─ TimerRegistry                     (mass-cancelled on destroy)
//!         ├─ ProxyRegistry                     (outgoing cross-instance binds)
//!         ├─ ReadyState                        (Sync tick / Async init())
//!         ├─ OwnedSet                          (adopted children, leak scan)
//!         └─ Orchestrator handle               (registered at construction)
//! ```
//!
//! ## Destruction path
//! `destroy(pre)` delegates to the destroy machine with an internal post
//! phase that runs after `DESTROY` and listener removal:
//! ```text
//! detach proxies → drain cleanup stack → destroy timers → leak scan
//!               → neutralize remaining API
//! ```
//! Orchestrator deregistration is a cleanup handler pushed at
//! construction, so it participates in the same LIFO drain as
//! user-registered handlers (and therefore runs last).
//!
//! ## Rules
//! - After full destruction every method outside a fixed allow-list
//!   (state getters, listener/queue introspection, `destroy`,
//!   `once_ready`) degrades to a warn-and-return stub instead of
//!   panicking or erroring — stale references must not crash the process.
//! - Emitting [`topic::DESTROY`] directly is misuse: the instance
//!   force-starts its own destruction and the emit call errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::cleanup::{CleanupStack, TeardownFn, TeardownRef};
use crate::config::InstanceConfig;
use crate::core::destructible::Destructible;
use crate::core::owned::OwnedSet;
use crate::core::ready::{ReadyMode, ReadyState};
use crate::error::{LifecycleError, TeardownError};
use crate::events::{Emitter, Event, Handler, handler, topic};
use crate::log::LogContext;
use crate::orchestrator::Orchestrator;
use crate::proxy::{BindMode, ProxyRegistry, ProxyTarget};
use crate::timers::{TimerId, TimerRegistry};

use super::builder::InstanceBuilder;

/// A lifecycle-managed object: identity, ready/destroy state machines,
/// scoped timers, cleanup handlers, and cross-instance event proxying.
///
/// Cheap to clone; clones share the same underlying instance.
///
/// ## Example
/// ```no_run
/// use lifevisor::{Orchestrator, Instance};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orch = Orchestrator::new()?;
///     let player = Instance::new(&orch, "AudioPlayer");
///     player.once_ready().await?;
///     // ...use it...
///     player.destroy(None).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceShared>,
}

pub(crate) struct InstanceShared {
    id: Uuid,
    short_id: Arc<str>,
    class_name: Arc<str>,
    base: Destructible,
    cleanup: CleanupStack,
    timers: TimerRegistry,
    proxies: ProxyRegistry,
    ready: ReadyState,
    owned: OwnedSet,
    neutralized: AtomicBool,
    log: LogContext,
}

impl Instance {
    /// Creates an instance with default configuration and sync ready mode.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(orchestrator: &Orchestrator, class_name: impl Into<Arc<str>>) -> Self {
        Self::builder(orchestrator).class_name(class_name).build()
    }

    /// Starts building an instance registered with `orchestrator`.
    pub fn builder(orchestrator: &Orchestrator) -> InstanceBuilder {
        InstanceBuilder::new(orchestrator)
    }

    pub(crate) fn assemble(
        orchestrator: Orchestrator,
        class_name: Arc<str>,
        ready_mode: ReadyMode,
        cfg: InstanceConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        let short_id: Arc<str> = id.as_simple().to_string()[..8].to_string().into();
        let level = orchestrator.register(id, class_name.clone());
        let log = LogContext::new(class_name.clone(), short_id.clone(), level);

        let inner = Arc::new(InstanceShared {
            id,
            short_id: short_id.clone(),
            class_name,
            base: Destructible::new(Emitter::new(), cfg.destroy_grace_opt(), log.clone()),
            cleanup: CleanupStack::new(cfg.drain_order, log.clone()),
            timers: TimerRegistry::new(log.clone()),
            proxies: ProxyRegistry::new(id, log.clone()),
            ready: ReadyState::new(ready_mode),
            owned: OwnedSet::new(),
            neutralized: AtomicBool::new(false),
            log,
        });

        // Deregistration joins the LIFO drain; pushed first, it runs last.
        {
            let orch = orchestrator;
            inner
                .cleanup
                .push(TeardownFn::arc("orchestrator-deregister", move || {
                    let orch = orch.clone();
                    async move {
                        orch.deregister(id);
                        Ok(())
                    }
                }));
        }

        match ready_mode {
            ReadyMode::Sync => {
                let weak = Arc::downgrade(&inner);
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    if let Some(shared) = weak.upgrade() {
                        shared.mark_ready();
                    }
                });
            }
            ReadyMode::Async => {
                if let Some(grace) = cfg.init_grace_opt() {
                    let weak = Arc::downgrade(&inner);
                    let watchdog = inner.timers.set_timeout(grace, move || {
                        let Some(shared) = weak.upgrade() else { return };
                        if shared.ready.is_ready()
                            || shared.base.is_destroying()
                            || shared.base.is_destroyed()
                        {
                            return;
                        }
                        shared
                            .log
                            .warn(&format!("init() not called within {grace:?}"));
                        shared.base.emitter().emit(
                            &Event::new(topic::INIT_OVERDUE)
                                .with_source(shared.short_id.clone())
                                .with_reason(format!("init() not called within {grace:?}")),
                        );
                    });
                    inner.ready.set_watchdog(watchdog);
                }
            }
        }

        inner.log.info("constructed");
        Self { inner }
    }

    // ---------------------------
    // Identity & state (keep-alive: usable after destruction)
    // ---------------------------

    /// Process-unique identity.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// First 8 hex chars of [`Instance::id`], used in diagnostics.
    pub fn short_id(&self) -> &str {
        &self.inner.short_id
    }

    /// The class name this instance was registered under.
    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.is_ready()
    }

    pub fn is_destroying(&self) -> bool {
        self.inner.base.is_destroying()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.base.is_destroyed()
    }

    /// Listeners currently registered on `topic_name`.
    pub fn listener_count(&self, topic_name: &str) -> usize {
        self.inner.base.emitter().listener_count(topic_name)
    }

    /// Listeners across all topics.
    pub fn total_listeners(&self) -> usize {
        self.inner.base.emitter().total_listeners()
    }

    // ---------------------------
    // Event surface
    // ---------------------------

    /// Registers a listener on this instance's emitter.
    pub fn on(&self, topic_name: impl Into<Arc<str>>, h: Handler) {
        if self.stubbed("on") {
            return;
        }
        self.inner.base.emitter().on(topic_name, h);
    }

    /// Registers a one-shot listener.
    pub fn once(&self, topic_name: impl Into<Arc<str>>, h: Handler) {
        if self.stubbed("once") {
            return;
        }
        self.inner.base.emitter().once(topic_name, h);
    }

    /// Removes at most one registration of `h` on `topic_name`.
    pub fn off(&self, topic_name: &str, h: &Handler) -> bool {
        if self.stubbed("off") {
            return false;
        }
        self.inner.base.emitter().off(topic_name, h)
    }

    /// Emits `event` to this instance's listeners.
    ///
    /// Emitting [`topic::DESTROY`] directly is misuse: the completion
    /// signal is not a command. The instance force-starts its own
    /// `destroy()` and this call errors.
    pub fn emit(&self, event: &Event) -> Result<usize, LifecycleError> {
        if self.stubbed("emit") {
            return Ok(0);
        }
        if event.is(topic::DESTROY) && !self.is_destroyed() {
            self.inner
                .log
                .error("destroy event emitted directly; forcing destroy()");
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.destroy(None).await {
                    this.inner
                        .log
                        .warn(&format!("forced destroy failed: {e}"));
                }
            });
            return Err(LifecycleError::DestroyEmittedDirectly {
                topic: topic::DESTROY.to_string(),
            });
        }
        Ok(self.inner.base.emitter().emit(event))
    }

    // ---------------------------
    // Destruction
    // ---------------------------

    /// Runs the two-phase destroy protocol.
    ///
    /// `pre` (if any) runs between `BEFORE_DESTROY` and the destroyed
    /// transition; the internal post phase then detaches proxies, drains
    /// the cleanup stack, clears timers, scans for leaked children, and
    /// neutralizes the remaining API.
    ///
    /// Calling again *while destroying* is a logged no-op (the gridlock
    /// breaker); calling again *after completion* is an error.
    pub async fn destroy(&self, pre: Option<TeardownRef>) -> Result<(), LifecycleError> {
        let shared = self.inner.clone();
        let post: TeardownRef = TeardownFn::arc("instance-teardown", move || {
            let shared = shared.clone();
            async move { shared.teardown().await }
        });
        self.inner.base.destroy(pre, Some(post)).await
    }

    // ---------------------------
    // Cleanup handlers
    // ---------------------------

    /// Registers a teardown callback for the destruction drain.
    /// Pushing the exact same handler reference twice is a no-op.
    pub fn register_cleanup_handler(&self, h: TeardownRef) {
        if self.stubbed("register_cleanup_handler") {
            return;
        }
        self.inner.cleanup.push(h);
    }

    /// Removes a not-yet-executed cleanup handler.
    pub fn unregister_cleanup_handler(&self, h: &TeardownRef) -> bool {
        if self.stubbed("unregister_cleanup_handler") {
            return false;
        }
        self.inner.cleanup.remove(h)
    }

    /// Number of queued cleanup handlers (includes the internal
    /// deregistration handler).
    pub fn cleanup_queue_depth(&self) -> usize {
        self.inner.cleanup.queue_depth()
    }

    // ---------------------------
    // Timers
    // ---------------------------

    /// Schedules a one-shot callback; cancelled automatically at destroy.
    pub fn set_timeout(
        &self,
        delay: Duration,
        f: impl FnOnce() + Send + 'static,
    ) -> Option<TimerId> {
        if self.stubbed("set_timeout") {
            return None;
        }
        Some(self.inner.timers.set_timeout(delay, f))
    }

    /// Schedules a repeating callback; cancelled automatically at destroy.
    pub fn set_interval(
        &self,
        period: Duration,
        f: impl FnMut() + Send + 'static,
    ) -> Option<TimerId> {
        if self.stubbed("set_interval") {
            return None;
        }
        Some(self.inner.timers.set_interval(period, f))
    }

    pub fn clear_timeout(&self, id: TimerId) -> bool {
        if self.stubbed("clear_timeout") {
            return false;
        }
        self.inner.timers.clear_timeout(id)
    }

    pub fn clear_interval(&self, id: TimerId) -> bool {
        if self.stubbed("clear_interval") {
            return false;
        }
        self.inner.timers.clear_interval(id)
    }

    /// Force-clears every pending timeout and interval.
    pub fn clear_all_timers(&self) {
        if self.stubbed("clear_all_timers") {
            return;
        }
        self.inner.timers.clear_all();
    }

    pub fn pending_timeouts(&self) -> usize {
        self.inner.timers.pending_timeouts()
    }

    pub fn pending_intervals(&self) -> usize {
        self.inner.timers.pending_intervals()
    }

    // ---------------------------
    // Proxy bindings
    // ---------------------------

    /// Binds `h` to `target`'s `topic_name`; the binding is removed
    /// automatically when `target` is destroyed.
    pub fn proxy_on(
        &self,
        target: &Instance,
        topic_name: impl Into<Arc<str>>,
        h: Handler,
    ) -> Result<(), LifecycleError> {
        if self.stubbed("proxy_on") {
            return Ok(());
        }
        self.inner
            .proxies
            .add(BindMode::On, &target.proxy_target(), topic_name, h)
    }

    /// Like [`Instance::proxy_on`], but the handler fires at most once.
    pub fn proxy_once(
        &self,
        target: &Instance,
        topic_name: impl Into<Arc<str>>,
        h: Handler,
    ) -> Result<(), LifecycleError> {
        if self.stubbed("proxy_once") {
            return Ok(());
        }
        self.inner
            .proxies
            .add(BindMode::Once, &target.proxy_target(), topic_name, h)
    }

    /// Removes at most one matching proxy binding. Removing a binding
    /// that was never registered is a silent no-op.
    pub fn proxy_off(
        &self,
        target: &Instance,
        topic_name: &str,
        h: &Handler,
    ) -> Result<(), LifecycleError> {
        if self.stubbed("proxy_off") {
            return Ok(());
        }
        self.inner
            .proxies
            .remove(&target.proxy_target(), topic_name, h)
    }

    /// Number of live proxy bindings this instance holds to `target`.
    pub fn proxy_queue_depth(&self, target: &Instance) -> usize {
        self.inner.proxies.target_depth(target.id())
    }

    fn proxy_target(&self) -> ProxyTarget {
        ProxyTarget {
            id: self.inner.id,
            short_id: self.inner.short_id.clone(),
            emitter: self.inner.base.emitter().clone(),
            destroyed: self.is_destroyed(),
        }
    }

    // ---------------------------
    // Ready machine
    // ---------------------------

    /// Resolves once the instance is ready; rejects if destruction begins
    /// first, so callers never wait forever on a doomed instance.
    pub async fn once_ready(&self) -> Result<(), LifecycleError> {
        if self.inner.ready.is_ready() {
            return Ok(());
        }
        if self.is_destroying() || self.is_destroyed() {
            return Err(LifecycleError::DestroyedBeforeReady);
        }

        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let (doom_tx, doom_rx) = oneshot::channel::<()>();
        let ready_tx = parking_lot::Mutex::new(Some(ready_tx));
        let doom_tx = parking_lot::Mutex::new(Some(doom_tx));
        let on_ready = handler(move |_ev| {
            if let Some(tx) = ready_tx.lock().take() {
                let _ = tx.send(());
            }
        });
        let on_doom = handler(move |_ev| {
            if let Some(tx) = doom_tx.lock().take() {
                let _ = tx.send(());
            }
        });

        let emitter = self.inner.base.emitter().clone();
        emitter.once(topic::READY, on_ready.clone());
        emitter.once(topic::BEFORE_DESTROY, on_doom.clone());

        // Both transitions are synchronous emits; re-check for a flip that
        // happened between the state check and listener registration.
        let raced = if self.inner.ready.is_ready() {
            Some(Ok(()))
        } else if self.is_destroying() || self.is_destroyed() {
            Some(Err(LifecycleError::DestroyedBeforeReady))
        } else {
            None
        };
        let result = match raced {
            Some(result) => result,
            None => {
                tokio::select! {
                    biased;
                    res = ready_rx => match res {
                        Ok(()) => Ok(()),
                        Err(_) => Err(LifecycleError::DestroyedBeforeReady),
                    },
                    _ = doom_rx => Err(LifecycleError::DestroyedBeforeReady),
                }
            }
        };

        emitter.off(topic::READY, &on_ready);
        emitter.off(topic::BEFORE_DESTROY, &on_doom);
        result
    }

    /// Marks an async-mode instance ready. Must be called exactly once;
    /// calling it on a sync-mode instance, or twice, is an error.
    pub fn init(&self) -> Result<(), LifecycleError> {
        if self.stubbed("init") {
            return Ok(());
        }
        match self.inner.ready.mode() {
            ReadyMode::Sync => Err(LifecycleError::InitMisuse {
                reason: "instance is in synchronous ready mode",
            }),
            ReadyMode::Async => {
                if self.is_destroying() {
                    self.inner.log.warn("init() ignored: instance is destroying");
                    return Ok(());
                }
                if !self.inner.ready.mark_init_called() {
                    return Err(LifecycleError::InitMisuse {
                        reason: "init() already called",
                    });
                }
                if let Some(watchdog) = self.inner.ready.take_watchdog() {
                    self.inner.timers.clear_timeout(watchdog);
                }
                self.inner.mark_ready();
                Ok(())
            }
        }
    }

    // ---------------------------
    // Ownership / leak detection
    // ---------------------------

    /// Records `child` as owned by this instance. A child still alive and
    /// undestroyed when this instance tears down is reported as a
    /// probable leak. Children deregister themselves through their own
    /// cleanup drain.
    pub fn adopt(&self, child: &Instance) {
        if self.stubbed("adopt") {
            return;
        }
        if child.id() == self.id() {
            self.inner.log.warn("adopt() ignored: cannot adopt self");
            return;
        }
        self.inner.owned.insert(
            child.id(),
            child.inner.class_name.clone(),
            child.inner.short_id.clone(),
            Arc::downgrade(&child.inner),
        );
        let owner = Arc::downgrade(&self.inner);
        let child_id = child.id();
        child.register_cleanup_handler(TeardownFn::arc("release-from-owner", move || {
            let owner = owner.clone();
            async move {
                if let Some(owner) = owner.upgrade() {
                    owner.owned.remove(child_id);
                }
                Ok(())
            }
        }));
    }

    /// Forgets an adopted child without waiting for its destruction.
    pub fn release(&self, child: &Instance) -> bool {
        if self.stubbed("release") {
            return false;
        }
        self.inner.owned.remove(child.id())
    }

    /// Number of currently adopted children.
    pub fn adopted_count(&self) -> usize {
        self.inner.owned.len()
    }

    // ---------------------------

    /// Post-destruct guard: warn and tell the caller to return a neutral
    /// value. Guarded dispatch instead of method-table surgery.
    fn stubbed(&self, method: &'static str) -> bool {
        if self.inner.neutralized.load(Ordering::SeqCst) {
            self.inner
                .log
                .warn(&format!("{method}() ignored: instance destroyed"));
            true
        } else {
            false
        }
    }
}

impl InstanceShared {
    pub(crate) fn is_destroyed(&self) -> bool {
        self.base.is_destroyed()
    }

    fn mark_ready(&self) {
        if self.base.is_destroying() || self.base.is_destroyed() {
            return;
        }
        if !self.ready.mark_ready() {
            return;
        }
        self.log.info("ready");
        self.base
            .emitter()
            .emit(&Event::new(topic::READY).with_source(self.short_id.clone()));
    }

    /// The internal post phase of `destroy()`.
    async fn teardown(&self) -> Result<(), TeardownError> {
        self.proxies.detach_all();
        self.cleanup.exec().await?;
        self.timers
            .destroy()
            .map_err(|e| TeardownError::failed(&e))?;
        for leak in self.owned.sweep() {
            self.log.warn(&format!(
                "leaked reference to undestroyed {} ({})",
                leak.class, leak.short_id
            ));
        }
        self.neutralized.store(true, Ordering::SeqCst);
        self.log.info("destroyed");
        Ok(())
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.inner.class_name)
            .field("id", &self.inner.short_id)
            .field("ready", &self.is_ready())
            .field("destroying", &self.is_destroying())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
