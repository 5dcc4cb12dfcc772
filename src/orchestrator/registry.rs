//! # Process-wide instance registry and log-level policy.
//!
//! The [`Orchestrator`] tracks every live instance, keeps per-class
//! counts, and owns log-level policy: one global level plus optional
//! per-class overrides (an override always wins for matching instances).
//!
//! ## Rules
//! - **One per process**: a second construction attempt is an error. The
//!   handle is `Clone` and dependency-injected; there is no hidden module
//!   global.
//! - Registration/deregistration and level changes all mutate
//!   synchronously under one lock; level changes propagate to live
//!   matching instances before the call returns.
//! - A per-class override is **retained** after the last instance of the
//!   class is destroyed, and applies again to future instances.
//! - The orchestrator never calls `destroy()` on anything.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::log::{self, LevelCell, LogLevel};

/// Construction guard: only one orchestrator may exist per process.
static ORCHESTRATOR_EXISTS: AtomicBool = AtomicBool::new(false);

/// Process-wide registry of live instances and log-level policy.
///
/// Cheap to clone; clones share the same registry.
///
/// ## Example
/// ```rust
/// use lifevisor::{LogLevel, Orchestrator};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let orch = Orchestrator::new()?;
/// orch.set_class_level("AudioPlayer", LogLevel::Debug);
/// assert_eq!(orch.class_level("AudioPlayer"), Some(LogLevel::Debug));
/// assert_eq!(orch.instance_count(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("instance_count", &self.instance_count())
            .finish()
    }
}

struct OrchestratorInner {
    guarded: bool,
    state: Mutex<OrchestratorState>,
}

struct OrchestratorState {
    instances: HashMap<Uuid, LiveEntry>,
    classes: HashMap<Arc<str>, ClassEntry>,
    global_level: LogLevel,
}

struct LiveEntry {
    class: Arc<str>,
    level: LevelCell,
}

#[derive(Default)]
struct ClassEntry {
    live: usize,
    level_override: Option<LogLevel>,
}

impl Orchestrator {
    /// Creates the process-wide orchestrator.
    ///
    /// Fails with [`LifecycleError::OrchestratorExists`] when one is
    /// already alive in this process; the guard is released if the (only)
    /// orchestrator is dropped.
    pub fn new() -> Result<Self, LifecycleError> {
        if ORCHESTRATOR_EXISTS
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LifecycleError::OrchestratorExists);
        }
        Ok(Self::build(true))
    }

    /// Test-only escape hatch: an unguarded registry that does not count
    /// against the one-per-process invariant.
    #[cfg(test)]
    pub(crate) fn unguarded() -> Self {
        Self::build(false)
    }

    fn build(guarded: bool) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                guarded,
                state: Mutex::new(OrchestratorState {
                    instances: HashMap::new(),
                    classes: HashMap::new(),
                    global_level: LogLevel::default(),
                }),
            }),
        }
    }

    /// Registers a live instance and returns its level cell, seeded with
    /// the effective level for its class.
    pub(crate) fn register(&self, id: Uuid, class: Arc<str>) -> LevelCell {
        let mut st = self.inner.state.lock();
        let global = st.global_level;
        let entry = st.classes.entry(class.clone()).or_default();
        entry.live += 1;
        let effective = entry.level_override.unwrap_or(global);
        let cell = log::new_cell(effective);
        st.instances.insert(
            id,
            LiveEntry {
                class,
                level: cell.clone(),
            },
        );
        cell
    }

    /// Removes a destroyed instance. Class entries without an override are
    /// dropped when their live count reaches zero; overrides are retained.
    pub(crate) fn deregister(&self, id: Uuid) {
        let mut st = self.inner.state.lock();
        let Some(entry) = st.instances.remove(&id) else {
            return;
        };
        if let Some(class) = st.classes.get_mut(&entry.class) {
            class.live = class.live.saturating_sub(1);
            if class.live == 0 && class.level_override.is_none() {
                st.classes.remove(&entry.class);
            }
        }
    }

    /// Total number of live instances.
    pub fn instance_count(&self) -> usize {
        self.inner.state.lock().instances.len()
    }

    /// Number of live instances of the given class.
    pub fn count_of(&self, class: &str) -> usize {
        self.inner
            .state
            .lock()
            .classes
            .get(class)
            .map_or(0, |c| c.live)
    }

    /// Sorted names of classes with at least one live instance.
    pub fn class_names(&self) -> Vec<Arc<str>> {
        let st = self.inner.state.lock();
        let mut names: Vec<Arc<str>> = st
            .classes
            .iter()
            .filter(|(_, c)| c.live > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// The global default log level.
    pub fn global_level(&self) -> LogLevel {
        self.inner.state.lock().global_level
    }

    /// Sets the global level and propagates it to every live instance
    /// whose class has no override.
    pub fn set_global_level(&self, level: LogLevel) {
        let mut st = self.inner.state.lock();
        st.global_level = level;
        let st = &*st;
        for entry in st.instances.values() {
            let overridden = st
                .classes
                .get(&entry.class)
                .and_then(|c| c.level_override)
                .is_some();
            if !overridden {
                log::set_cell(&entry.level, level);
            }
        }
    }

    /// Restores the global level to the default.
    pub fn reset_global_level(&self) {
        self.set_global_level(LogLevel::default());
    }

    /// The explicit override for a class, if any.
    pub fn class_level(&self, class: &str) -> Option<LogLevel> {
        self.inner
            .state
            .lock()
            .classes
            .get(class)
            .and_then(|c| c.level_override)
    }

    /// Sets a per-class override and propagates it to live instances of
    /// that class. The override outlives the instances themselves.
    pub fn set_class_level(&self, class: impl Into<Arc<str>>, level: LogLevel) {
        let class = class.into();
        let mut st = self.inner.state.lock();
        st.classes.entry(class.clone()).or_default().level_override = Some(level);
        for entry in st.instances.values() {
            if entry.class == class {
                log::set_cell(&entry.level, level);
            }
        }
    }

    /// Drops a per-class override; live instances of the class fall back
    /// to the global level.
    pub fn clear_class_level(&self, class: &str) {
        let mut st = self.inner.state.lock();
        let global = st.global_level;
        let mut drop_entry = false;
        if let Some(entry) = st.classes.get_mut(class) {
            entry.level_override = None;
            drop_entry = entry.live == 0;
        }
        if drop_entry {
            st.classes.remove(class);
        }
        for entry in st.instances.values() {
            if &*entry.class == class {
                log::set_cell(&entry.level, global);
            }
        }
    }
}

impl Drop for OrchestratorInner {
    fn drop(&mut self) {
        if self.guarded {
            ORCHESTRATOR_EXISTS.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::cell_level;

    #[test]
    fn test_second_construction_fails_while_first_alive() {
        let first = Orchestrator::new().unwrap();
        let err = Orchestrator::new().unwrap_err();
        assert_eq!(err.as_label(), "orchestrator_exists");
        drop(first);
        // Guard released with the only handle.
        let again = Orchestrator::new().unwrap();
        drop(again);
    }

    #[test]
    fn test_register_deregister_counts() {
        let orch = Orchestrator::unguarded();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        orch.register(a, "Player".into());
        orch.register(b, "Player".into());
        orch.register(Uuid::new_v4(), "Mixer".into());

        assert_eq!(orch.instance_count(), 3);
        assert_eq!(orch.count_of("Player"), 2);
        assert_eq!(orch.count_of("Mixer"), 1);
        assert_eq!(
            orch.class_names(),
            vec![Arc::<str>::from("Mixer"), Arc::<str>::from("Player")]
        );

        orch.deregister(a);
        orch.deregister(b);
        assert_eq!(orch.count_of("Player"), 0);
        assert_eq!(orch.class_names(), vec![Arc::<str>::from("Mixer")]);
    }

    #[test]
    fn test_class_override_wins_and_is_retained() {
        let orch = Orchestrator::unguarded();
        orch.set_class_level("Player", LogLevel::Trace);
        // Class policy never touches the global default.
        assert_eq!(orch.global_level(), LogLevel::default());

        let id = Uuid::new_v4();
        let cell = orch.register(id, "Player".into());
        assert_eq!(cell_level(&cell), LogLevel::Trace);

        orch.deregister(id);
        assert_eq!(orch.count_of("Player"), 0);
        // Override survives class extinction and applies to newcomers.
        assert_eq!(orch.class_level("Player"), Some(LogLevel::Trace));
        let cell = orch.register(Uuid::new_v4(), "Player".into());
        assert_eq!(cell_level(&cell), LogLevel::Trace);
    }

    #[test]
    fn test_global_level_skips_overridden_classes() {
        let orch = Orchestrator::unguarded();
        orch.set_class_level("Player", LogLevel::Error);
        let player = orch.register(Uuid::new_v4(), "Player".into());
        let mixer = orch.register(Uuid::new_v4(), "Mixer".into());

        orch.set_global_level(LogLevel::Debug);
        assert_eq!(cell_level(&player), LogLevel::Error);
        assert_eq!(cell_level(&mixer), LogLevel::Debug);

        orch.clear_class_level("Player");
        assert_eq!(cell_level(&player), LogLevel::Debug);
        assert_eq!(orch.class_level("Player"), None);
    }

    #[test]
    fn test_reset_global_level_restores_default() {
        let orch = Orchestrator::unguarded();
        let cell = orch.register(Uuid::new_v4(), "Player".into());
        orch.set_global_level(LogLevel::Trace);
        assert_eq!(cell_level(&cell), LogLevel::Trace);
        orch.reset_global_level();
        assert_eq!(orch.global_level(), LogLevel::default());
        assert_eq!(cell_level(&cell), LogLevel::default());
    }

    #[test]
    fn test_class_level_set_before_any_instance_exists() {
        let orch = Orchestrator::unguarded();
        orch.set_class_level("Future", LogLevel::Info);
        assert_eq!(orch.count_of("Future"), 0);
        // Not listed as live, but the policy is there.
        assert!(orch.class_names().is_empty());
        assert_eq!(orch.class_level("Future"), Some(LogLevel::Info));
    }
}
