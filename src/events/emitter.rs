//! # Per-instance event emitter.
//!
//! [`Emitter`] is the synchronous listener table every instance embeds
//! (composition, not inheritance — the lifecycle state machine is a sibling
//! field, not a subclass).
//!
//! ## Rules
//! - **Synchronous emit**: `emit()` invokes every matching listener before
//!   returning; there are no suspension points.
//! - **Identity-based removal**: listeners are [`Handler`]s (`Arc`-backed);
//!   `off()` matches by pointer identity and removes **at most one** entry,
//!   the most recently added match.
//! - **Cumulative duplicates**: registering the same handler twice means it
//!   runs twice; each registration is individually removable.
//! - **Re-entrancy**: emission snapshots the listener list first, so a
//!   listener may register or remove listeners (including itself) while the
//!   emit is in flight. Listeners added during an emit do not run in that
//!   same emit.
//! - `once` listeners are removed from the table **before** they are
//!   invoked, so a once-listener never observes itself still registered.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::event::Event;

/// A listener callback. Identity (for `off`) is `Arc` pointer identity.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wraps a closure into a [`Handler`].
///
/// ## Example
/// ```rust
/// use lifevisor::{handler, Emitter, Event};
///
/// let em = Emitter::new();
/// let h = handler(|ev: &Event| println!("got {}", ev.name));
/// em.on("tick", h.clone());
/// assert_eq!(em.listener_count("tick"), 1);
/// assert!(em.off("tick", &h));
/// ```
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

struct Entry {
    handler: Handler,
    once: bool,
}

/// Synchronous, identity-aware event emitter.
///
/// Cheap to clone (internally holds an `Arc`-backed listener table); clones
/// share the same listeners. An instance hands clones of its emitter to the
/// proxy registries of *other* instances so their bindings attach directly.
#[derive(Clone, Default)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

#[derive(Default)]
struct EmitterInner {
    listeners: Mutex<HashMap<Arc<str>, Vec<Entry>>>,
}

impl Emitter {
    /// Creates an empty emitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every future emission of `topic`.
    pub fn on(&self, topic: impl Into<Arc<str>>, handler: Handler) {
        self.register(topic.into(), handler, false);
    }

    /// Registers `handler` for the next emission of `topic` only.
    pub fn once(&self, topic: impl Into<Arc<str>>, handler: Handler) {
        self.register(topic.into(), handler, true);
    }

    fn register(&self, topic: Arc<str>, handler: Handler, once: bool) {
        let mut map = self.inner.listeners.lock();
        map.entry(topic).or_default().push(Entry { handler, once });
    }

    /// Removes at most one registration of `handler` on `topic` — the most
    /// recently added match. Returns whether anything was removed.
    pub fn off(&self, topic: &str, handler: &Handler) -> bool {
        let mut map = self.inner.listeners.lock();
        let Some(entries) = map.get_mut(topic) else {
            return false;
        };
        let found = entries
            .iter()
            .rposition(|e| Arc::ptr_eq(&e.handler, handler));
        match found {
            Some(idx) => {
                entries.remove(idx);
                if entries.is_empty() {
                    map.remove(topic);
                }
                true
            }
            None => false,
        }
    }

    /// Emits `event` to every listener of its topic, in registration
    /// order. Returns the number of listeners invoked.
    ///
    /// The listener list is snapshotted under the lock and invoked outside
    /// it; `once` entries are dropped from the table before invocation.
    pub fn emit(&self, event: &Event) -> usize {
        let batch: Vec<Handler> = {
            let mut map = self.inner.listeners.lock();
            let Some(entries) = map.get_mut(&*event.name) else {
                return 0;
            };
            let batch = entries.iter().map(|e| e.handler.clone()).collect();
            entries.retain(|e| !e.once);
            if entries.is_empty() {
                map.remove(&*event.name);
            }
            batch
        };
        for h in &batch {
            h(event);
        }
        batch.len()
    }

    /// Number of listeners currently registered on `topic`.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .get(topic)
            .map_or(0, |e| e.len())
    }

    /// Total number of listeners across all topics.
    pub fn total_listeners(&self) -> usize {
        self.inner.listeners.lock().values().map(|e| e.len()).sum()
    }

    /// Removes every listener on every topic.
    pub fn remove_all(&self) {
        self.inner.listeners.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Handler) {
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
    fn test_on_receives_every_emit() {
        let em = Emitter::new();
        let (hits, h) = counter();
        em.on("tick", h);
        em.emit(&Event::new("tick"));
        em.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_once_fires_exactly_once() {
        let em = Emitter::new();
        let (hits, h) = counter();
        em.once("tick", h);
        em.emit(&Event::new("tick"));
        em.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(em.listener_count("tick"), 0);
    }

    #[test]
    fn test_duplicates_are_cumulative_and_individually_removable() {
        let em = Emitter::new();
        let (hits, h) = counter();
        em.on("tick", h.clone());
        em.on("tick", h.clone());
        em.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(em.off("tick", &h));
        assert_eq!(em.listener_count("tick"), 1);
        em.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_off_unknown_topic_is_false() {
        let em = Emitter::new();
        let (_, h) = counter();
        assert!(!em.off("nope", &h));
    }

    #[test]
    fn test_emit_wrong_topic_hits_nothing() {
        let em = Emitter::new();
        let (hits, h) = counter();
        em.on("tick", h);
        assert_eq!(em.emit(&Event::new("tock")), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_added_during_emit_skips_current_pass() {
        let em = Emitter::new();
        let (hits, late) = counter();
        let em2 = em.clone();
        em.on(
            "tick",
            handler(move |_ev| {
                em2.on("tick", late.clone());
            }),
        );
        em.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        // Now two listeners: the registrar and one late counter.
        em.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_remove_itself_mid_emit() {
        let em = Emitter::new();
        let (hits, h) = counter();
        em.on("tick", h.clone());
        let em2 = em.clone();
        let h2 = h.clone();
        // Registered after `h`, removes `h` during the first emit; the
        // snapshot still delivers that first event to `h`.
        em.on(
            "tick",
            handler(move |_ev| {
                em2.off("tick", &h2);
            }),
        );
        em.emit(&Event::new("tick"));
        em.emit(&Event::new("tick"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_all_and_totals() {
        let em = Emitter::new();
        let (_, a) = counter();
        let (_, b) = counter();
        em.on("x", a);
        em.once("y", b);
        assert_eq!(em.total_listeners(), 2);
        em.remove_all();
        assert_eq!(em.total_listeners(), 0);
    }
}
