//! # Adoption registry for leak detection.
//!
//! Instead of reflecting over an instance's fields at teardown, owned
//! sub-instances are recorded explicitly: `adopt()` registers a child in
//! the owner's [`OwnedSet`], and the child removes itself through its own
//! cleanup drain. Whatever is still registered — and still alive and
//! undestroyed — when the owner tears down is reported as a probable leak.
//!
//! This is a heuristic safety net: a warning per leaked reference, never a
//! hard failure.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use super::instance::InstanceShared;

pub(crate) struct OwnedSet {
    children: Mutex<HashMap<Uuid, OwnedChild>>,
}

struct OwnedChild {
    class: Arc<str>,
    short_id: Arc<str>,
    shared: Weak<InstanceShared>,
}

/// A child that was still live and undestroyed at the owner's teardown.
pub(crate) struct LeakedChild {
    pub class: Arc<str>,
    pub short_id: Arc<str>,
}

impl OwnedSet {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, id: Uuid, class: Arc<str>, short_id: Arc<str>, shared: Weak<InstanceShared>) {
        self.children.lock().insert(
            id,
            OwnedChild {
                class,
                short_id,
                shared,
            },
        );
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.children.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    /// Drains the set, returning every child that still looks leaked.
    ///
    /// A child whose shared state is already gone (dropped) or already
    /// destroyed is not a leak.
    pub fn sweep(&self) -> Vec<LeakedChild> {
        let drained: Vec<OwnedChild> = {
            let mut children = self.children.lock();
            children.drain().map(|(_, c)| c).collect()
        };
        drained
            .into_iter()
            .filter_map(|c| {
                let shared = c.shared.upgrade()?;
                if shared.is_destroyed() {
                    None
                } else {
                    Some(LeakedChild {
                        class: c.class,
                        short_id: c.short_id,
                    })
                }
            })
            .collect()
    }
}
