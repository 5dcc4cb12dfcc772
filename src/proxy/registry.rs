//! # Cross-instance event-proxy registry.
//!
//! Lets instance A bind a handler to instance B's emitter while
//! guaranteeing the binding (and all bookkeeping) disappears when either
//! side is torn down first.
//!
//! ## Architecture
//! ```text
//! A.proxy_on(B, "tick", h)
//!     ├─► bindings.push((B, "tick", h, On))         (A's registry)
//!     ├─► B.emitter.on("tick", h)                   (direct bind, no wrapper)
//!     └─► first binding to B?
//!           └─► B.emitter.once(DESTROY, sweep_B)    (one hook per target)
//!
//! B destroyed ──► DESTROY ──► sweep_B ──► remove every (B, *, *) binding
//! ```
//!
//! ## Rules
//! - The caller's handler is bound **directly** to the target emitter
//!   (native `on`/`once` semantics); the registry never wraps it, so
//!   identity-based removal keeps working.
//! - At most **one sweep hook** per (source registry, target) pair,
//!   installed lazily on the first binding and removed with the last —
//!   the hooks a target carries always equals the number of distinct
//!   source registries that still hold a binding to it.
//! - `remove` drops **at most one** matching binding; duplicate bindings
//!   are cumulative and individually removable.
//! - Removing a binding that was never registered is a silent no-op
//!   (logged at debug), matching the observed reference behavior.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::events::{Emitter, Event, Handler, topic};
use crate::log::LogContext;

/// How a proxy handler is bound to the target emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Fires on every emission until removed.
    On,
    /// Fires at most once.
    Once,
}

/// Crate-internal view of a binding target, captured at call time.
pub(crate) struct ProxyTarget {
    pub id: Uuid,
    pub short_id: Arc<str>,
    pub emitter: Emitter,
    pub destroyed: bool,
}

struct Binding {
    target_id: Uuid,
    target: Emitter,
    topic: Arc<str>,
    handler: Handler,
    #[allow(dead_code)]
    mode: BindMode,
}

struct SweepHook {
    target: Emitter,
    handler: Handler,
}

/// Per-instance registry of outgoing proxy bindings.
pub(crate) struct ProxyRegistry {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    owner_id: Uuid,
    bindings: Mutex<Vec<Binding>>,
    sweeps: Mutex<HashMap<Uuid, SweepHook>>,
    log: LogContext,
}

impl ProxyRegistry {
    pub fn new(owner_id: Uuid, log: LogContext) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                owner_id,
                bindings: Mutex::new(Vec::new()),
                sweeps: Mutex::new(HashMap::new()),
                log,
            }),
        }
    }

    /// Binds `handler` to `target`'s `topic`, installing the per-target
    /// sweep hook if this is the first binding to that target.
    pub fn add(
        &self,
        mode: BindMode,
        target: &ProxyTarget,
        topic_name: impl Into<Arc<str>>,
        handler: Handler,
    ) -> Result<(), LifecycleError> {
        if target.id == self.inner.owner_id {
            return Err(LifecycleError::ProxyToSelf {
                id: target.short_id.to_string(),
            });
        }
        if target.destroyed {
            self.inner.log.warn(&format!(
                "proxy bind to destroyed instance {} ignored",
                target.short_id
            ));
            return Ok(());
        }

        let topic_name: Arc<str> = topic_name.into();
        let first_for_target = {
            let mut bindings = self.inner.bindings.lock();
            let prior = bindings
                .iter()
                .filter(|b| b.target_id == target.id)
                .count();
            bindings.push(Binding {
                target_id: target.id,
                target: target.emitter.clone(),
                topic: topic_name.clone(),
                handler: handler.clone(),
                mode,
            });
            prior == 0
        };

        match mode {
            BindMode::On => target.emitter.on(topic_name, handler),
            BindMode::Once => target.emitter.once(topic_name, handler),
        }

        if first_for_target {
            self.install_sweep(target);
        }
        Ok(())
    }

    /// Removes at most one binding matching `(target, topic, handler)`,
    /// unbinds the handler, and drops the sweep hook when the last
    /// binding to that target goes away.
    pub fn remove(
        &self,
        target: &ProxyTarget,
        topic_name: &str,
        handler: &Handler,
    ) -> Result<(), LifecycleError> {
        if target.id == self.inner.owner_id {
            return Err(LifecycleError::ProxyToSelf {
                id: target.short_id.to_string(),
            });
        }

        let (found, last_for_target) = {
            let mut bindings = self.inner.bindings.lock();
            let idx = bindings.iter().rposition(|b| {
                b.target_id == target.id
                    && &*b.topic == topic_name
                    && Arc::ptr_eq(&b.handler, handler)
            });
            match idx {
                Some(idx) => {
                    bindings.remove(idx);
                    let left = bindings
                        .iter()
                        .filter(|b| b.target_id == target.id)
                        .count();
                    (true, left == 0)
                }
                None => (false, false),
            }
        };

        if !found {
            self.inner
                .log
                .debug("proxy off ignored: no matching binding");
            return Ok(());
        }

        target.emitter.off(topic_name, handler);
        if last_for_target {
            self.remove_sweep(target.id);
        }
        Ok(())
    }

    /// Number of live bindings to the given target.
    pub fn target_depth(&self, target_id: Uuid) -> usize {
        self.inner
            .bindings
            .lock()
            .iter()
            .filter(|b| b.target_id == target_id)
            .count()
    }

    /// Total number of live bindings across all targets.
    pub fn total_bindings(&self) -> usize {
        self.inner.bindings.lock().len()
    }

    /// Source-side teardown: unbinds every binding and drops every sweep
    /// hook this registry installed on other instances.
    pub fn detach_all(&self) {
        let bindings: Vec<Binding> = std::mem::take(&mut *self.inner.bindings.lock());
        for b in &bindings {
            b.target.off(&b.topic, &b.handler);
        }
        let sweeps: Vec<SweepHook> = {
            let mut map = self.inner.sweeps.lock();
            map.drain().map(|(_, hook)| hook).collect()
        };
        for hook in &sweeps {
            hook.target.off(topic::DESTROY, &hook.handler);
        }
        if !bindings.is_empty() {
            self.inner.log.debug(&format!(
                "detached {} binding(s), {} sweep hook(s)",
                bindings.len(),
                sweeps.len()
            ));
        }
    }

    fn install_sweep(&self, target: &ProxyTarget) {
        let weak: Weak<ProxyInner> = Arc::downgrade(&self.inner);
        let target_id = target.id;
        let sweep: Handler = Arc::new(move |_ev: &Event| {
            if let Some(inner) = weak.upgrade() {
                ProxyInner::sweep_target(&inner, target_id);
            }
        });
        target.emitter.once(topic::DESTROY, sweep.clone());
        self.inner.sweeps.lock().insert(
            target_id,
            SweepHook {
                target: target.emitter.clone(),
                handler: sweep,
            },
        );
    }

    fn remove_sweep(&self, target_id: Uuid) {
        if let Some(hook) = self.inner.sweeps.lock().remove(&target_id) {
            hook.target.off(topic::DESTROY, &hook.handler);
        }
    }
}

impl ProxyInner {
    /// Runs when a target's `DESTROY` fires: drops every binding to that
    /// target before the target's own destruction resolves.
    fn sweep_target(inner: &Arc<ProxyInner>, target_id: Uuid) {
        let swept: Vec<Binding> = {
            let mut bindings = inner.bindings.lock();
            let mut kept = Vec::with_capacity(bindings.len());
            let mut swept = Vec::new();
            for b in bindings.drain(..) {
                if b.target_id == target_id {
                    swept.push(b);
                } else {
                    kept.push(b);
                }
            }
            *bindings = kept;
            swept
        };
        for b in &swept {
            b.target.off(&b.topic, &b.handler);
        }
        // The sweep listener itself was a `once`, already gone from the
        // target; only our bookkeeping entry is left.
        inner.sweeps.lock().remove(&target_id);
        if !swept.is_empty() {
            inner.log.debug(&format!(
                "swept {} binding(s) after target {} destroyed",
                swept.len(),
                target_id.as_simple()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::handler;
    use crate::log;
    use crate::log::LogLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn log_ctx() -> LogContext {
        LogContext::new("Test".into(), "00000000".into(), log::new_cell(LogLevel::Off))
    }

    fn target() -> ProxyTarget {
        ProxyTarget {
            id: Uuid::new_v4(),
            short_id: "cafebabe".into(),
            emitter: Emitter::new(),
            destroyed: false,
        }
    }

    fn registry() -> ProxyRegistry {
        ProxyRegistry::new(Uuid::new_v4(), log_ctx())
    }

    fn counting() -> (Arc<AtomicUsize>, Handler) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = {
            let hits = hits.clone();
            handler(move |_ev| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        (hits, h)
    }

    #[test]
    fn test_binding_forwards_events() {
        let reg = registry();
        let t = target();
        let (hits, h) = counting();
        reg.add(BindMode::On, &t, "tick", h).unwrap();

        t.emitter.emit(&Event::new("tick"));
        t.emitter.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(reg.target_depth(t.id), 1);
    }

    #[test]
    fn test_once_mode_fires_once_but_binding_persists() {
        let reg = registry();
        let t = target();
        let (hits, h) = counting();
        reg.add(BindMode::Once, &t, "tick", h).unwrap();

        t.emitter.emit(&Event::new("tick"));
        t.emitter.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        // Bookkeeping stays until an explicit off or the target's destroy.
        assert_eq!(reg.target_depth(t.id), 1);
    }

    #[test]
    fn test_one_sweep_hook_per_target() {
        let reg = registry();
        let t = target();
        let (_, a) = counting();
        let (_, b) = counting();
        reg.add(BindMode::On, &t, "tick", a).unwrap();
        reg.add(BindMode::On, &t, "tock", b).unwrap();

        assert_eq!(reg.target_depth(t.id), 2);
        assert_eq!(t.emitter.listener_count(topic::DESTROY), 1);
    }

    #[test]
    fn test_two_registries_two_hooks() {
        let reg1 = registry();
        let reg2 = registry();
        let t = target();
        let (_, a) = counting();
        let (_, b) = counting();
        reg1.add(BindMode::On, &t, "tick", a).unwrap();
        reg2.add(BindMode::On, &t, "tick", b).unwrap();
        assert_eq!(t.emitter.listener_count(topic::DESTROY), 2);
    }

    #[test]
    fn test_removing_last_binding_removes_sweep_hook() {
        let reg = registry();
        let t = target();
        let (_, a) = counting();
        let (_, b) = counting();
        reg.add(BindMode::On, &t, "tick", a.clone()).unwrap();
        reg.add(BindMode::On, &t, "tick", b.clone()).unwrap();

        reg.remove(&t, "tick", &a).unwrap();
        assert_eq!(t.emitter.listener_count(topic::DESTROY), 1);

        reg.remove(&t, "tick", &b).unwrap();
        assert_eq!(reg.target_depth(t.id), 0);
        assert_eq!(t.emitter.listener_count(topic::DESTROY), 0);
        assert_eq!(t.emitter.listener_count("tick"), 0);
    }

    #[test]
    fn test_duplicate_bindings_removed_one_at_a_time() {
        let reg = registry();
        let t = target();
        let (hits, h) = counting();
        reg.add(BindMode::On, &t, "tick", h.clone()).unwrap();
        reg.add(BindMode::On, &t, "tick", h.clone()).unwrap();
        assert_eq!(reg.target_depth(t.id), 2);

        reg.remove(&t, "tick", &h).unwrap();
        assert_eq!(reg.target_depth(t.id), 1);
        t.emitter.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sweep_on_target_destroy() {
        let reg = registry();
        let t = target();
        let (hits, h) = counting();
        reg.add(BindMode::On, &t, "tick", h.clone()).unwrap();

        t.emitter.emit(&Event::new(topic::DESTROY));
        assert_eq!(reg.target_depth(t.id), 0);
        assert_eq!(reg.total_bindings(), 0);
        assert_eq!(t.emitter.total_listeners(), 0);

        // A fresh target reusing the topic never reaches the stale handler.
        let fresh = target();
        fresh.emitter.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sweep_spares_other_targets() {
        let reg = registry();
        let t1 = target();
        let t2 = target();
        let (_, a) = counting();
        let (_, b) = counting();
        reg.add(BindMode::On, &t1, "tick", a).unwrap();
        reg.add(BindMode::On, &t2, "tick", b).unwrap();

        t1.emitter.emit(&Event::new(topic::DESTROY));
        assert_eq!(reg.target_depth(t1.id), 0);
        assert_eq!(reg.target_depth(t2.id), 1);
        assert_eq!(t2.emitter.listener_count(topic::DESTROY), 1);
    }

    #[test]
    fn test_proxy_to_self_is_an_error() {
        let owner = Uuid::new_v4();
        let reg = ProxyRegistry::new(owner, log_ctx());
        let mut t = target();
        t.id = owner;
        let (_, h) = counting();
        let err = reg.add(BindMode::On, &t, "tick", h.clone()).unwrap_err();
        assert_eq!(err.as_label(), "proxy_to_self");
        let err = reg.remove(&t, "tick", &h).unwrap_err();
        assert_eq!(err.as_label(), "proxy_to_self");
    }

    #[test]
    fn test_bind_to_destroyed_target_is_ignored() {
        let reg = registry();
        let mut t = target();
        t.destroyed = true;
        let (_, h) = counting();
        reg.add(BindMode::On, &t, "tick", h).unwrap();
        assert_eq!(reg.target_depth(t.id), 0);
        assert_eq!(t.emitter.total_listeners(), 0);
    }

    #[test]
    fn test_remove_unknown_binding_is_silent() {
        let reg = registry();
        let t = target();
        let (_, h) = counting();
        assert!(reg.remove(&t, "tick", &h).is_ok());
    }

    #[test]
    fn test_detach_all_clears_bindings_and_hooks() {
        let reg = registry();
        let t1 = target();
        let t2 = target();
        let (hits, h) = counting();
        reg.add(BindMode::On, &t1, "tick", h.clone()).unwrap();
        reg.add(BindMode::On, &t2, "tick", h).unwrap();

        reg.detach_all();
        assert_eq!(reg.total_bindings(), 0);
        assert_eq!(t1.emitter.total_listeners(), 0);
        assert_eq!(t2.emitter.total_listeners(), 0);
        t1.emitter.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
