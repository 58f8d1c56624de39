//! Session → backend factory registry.
//!
//! Factories close over live resources (shared maps, disk roots) and so
//! cannot be persisted with session state. Sessions store only their id and
//! look the factory up here when they need a backend.
//!
//! The registry is an ordinary value: construct one and hand it to whatever
//! needs it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::backend::Backend;
use crate::record::SharedFiles;

/// Builds a backend over an execution context's file map.
pub type BackendFactory = Arc<dyn Fn(SharedFiles) -> Arc<dyn Backend> + Send + Sync>;

/// Maps session ids to backend factories.
#[derive(Default)]
pub struct BackendRegistry {
    factories: Mutex<HashMap<String, BackendFactory>>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<String> = self.factories.lock().keys().cloned().collect();
        ids.sort();
        f.debug_struct("BackendRegistry")
            .field("sessions", &ids)
            .finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `session_id`.
    pub fn register(&self, session_id: impl Into<String>, factory: BackendFactory) {
        let session_id = session_id.into();
        let replaced = self
            .factories
            .lock()
            .insert(session_id.clone(), factory)
            .is_some();
        debug!(%session_id, replaced, "registered backend factory");
    }

    /// The factory for `session_id`, if registered.
    pub fn get(&self, session_id: &str) -> Option<BackendFactory> {
        self.factories.lock().get(session_id).cloned()
    }

    /// Build a backend for `session_id` over `state`.
    ///
    /// The factory runs outside the lock so it may itself use the registry.
    pub fn create(&self, session_id: &str, state: SharedFiles) -> Option<Arc<dyn Backend>> {
        let factory = self.get(session_id)?;
        Some(factory(state))
    }

    /// Forget `session_id`. Returns the factory that was registered.
    pub fn remove(&self, session_id: &str) -> Option<BackendFactory> {
        let removed = self.factories.lock().remove(session_id);
        if removed.is_some() {
            debug!(session_id, "removed backend factory");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.factories.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{StateBackend, StoreBackend};
    use crate::record::shared_files;

    fn state_factory() -> BackendFactory {
        Arc::new(|state: SharedFiles| Arc::new(StateBackend::new(state)) as Arc<dyn Backend>)
    }

    #[test]
    fn test_register_get_remove() {
        let registry = BackendRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("s1").is_none());

        registry.register("s1", state_factory());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("s1").is_some());

        assert!(registry.remove("s1").is_some());
        assert!(registry.remove("s1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_binds_state() {
        let registry = BackendRegistry::new();
        registry.register("s1", state_factory());

        let state = shared_files();
        let backend = registry.create("s1", Arc::clone(&state)).unwrap();
        assert_eq!(backend.name(), "StateBackend");
        assert!(registry.create("unknown", shared_files()).is_none());
    }

    #[test]
    fn test_factory_can_close_over_shared_store() {
        let registry = BackendRegistry::new();
        let store = shared_files();
        let captured = Arc::clone(&store);
        registry.register(
            "s2",
            Arc::new(move |_state: SharedFiles| {
                Arc::new(StoreBackend::with_namespace(Arc::clone(&captured), "s2")) as Arc<dyn Backend>
            }),
        );

        let backend = registry.create("s2", shared_files()).unwrap();
        backend.write("/note.md", "hi").unwrap();
        assert!(store.read().contains_key("/s2/note.md"));
    }

    #[test]
    fn test_concurrent_access() {
        let registry = Arc::new(BackendRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let id = format!("session-{i}");
                    registry.register(id.clone(), state_factory());
                    assert!(registry.create(&id, shared_files()).is_some());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(), 8);
    }
}
