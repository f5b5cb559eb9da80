//! In-memory storage for the service registry.
//!
//! All state lives behind one [`parking_lot::Mutex`]: the id counter, the
//! records keyed by id, and the by-name index. Inserts touch all three, so
//! they are guarded together and every operation is atomic to its caller.
//!
//! Ids come from an explicit counter that only moves forward. Deleting the
//! newest record and registering again never hands out the same id twice.
//!
//! # Rust Learning Note
//!
//! ## One guard, several fields
//!
//! ```rust,ignore
//! let mut guard = self.state.lock();
//! let state = &mut *guard;
//! ```
//!
//! Reborrowing the guard as a plain `&mut RegistryState` lets the borrow
//! checker see `state.instances` and `state.by_name` as disjoint fields, so
//! both can be mutated in the same scope while the lock is held once.

use crate::clock::{Clock, SystemClock};
use crate::registration::Registration;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use svcreg_common::{Error, Instance, InstanceId, Result};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct RegistryState {
    /// Last id handed out; 0 means none yet, so the first id is 1.
    last_id: u64,

    /// Records ordered by id, which is also insertion order.
    instances: BTreeMap<InstanceId, Instance>,

    /// Canonical name -> ids registered under it.
    by_name: HashMap<String, BTreeSet<InstanceId>>,
}

/// Thread-safe in-memory registry storage.
///
/// Construct one per process (or per test) and share it behind an `Arc`.
#[derive(Debug)]
pub struct Registry {
    state: Mutex<RegistryState>,
    clock: Arc<dyn Clock>,
}

impl Registry {
    /// Creates a new empty registry using the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a new empty registry reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            clock,
        }
    }

    /// Stores a validated registration and returns the materialized instance.
    pub fn insert(&self, registration: Registration) -> Instance {
        let heartbeat = self.clock.now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.last_id += 1;
        let id = InstanceId::new(state.last_id);

        let instance = Instance {
            id,
            name: registration.name,
            version: registration.version,
            host: registration.host,
            port: registration.port,
            meta: registration.meta,
            heartbeat,
        };

        state
            .by_name
            .entry(instance.name.clone())
            .or_default()
            .insert(id);
        state.instances.insert(id, instance.clone());

        info!(
            "Registered instance {}: {} {:?} at {}:{}",
            id, instance.name, instance.version, instance.host, instance.port
        );

        instance
    }

    /// Lists all registered instances in insertion order.
    pub fn find_all(&self) -> Vec<Instance> {
        self.state.lock().instances.values().cloned().collect()
    }

    /// Finds instances by canonical name, optionally narrowed to one version.
    ///
    /// Without a version filter every version of `name` is returned. No match
    /// is an empty vector, never an error.
    pub fn find_by_name(&self, name: &str, version: Option<&str>) -> Vec<Instance> {
        let state = self.state.lock();
        let Some(ids) = state.by_name.get(name) else {
            debug!("No instances registered under {}", name);
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| state.instances.get(id))
            .filter(|instance| version.map_or(true, |v| instance.version.as_deref() == Some(v)))
            .cloned()
            .collect()
    }

    /// Looks up a single instance.
    pub fn find_by_id(&self, id: InstanceId) -> Result<Instance> {
        self.state
            .lock()
            .instances
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::instance_not_found(id))
    }

    /// Refreshes the heartbeat of an instance and returns the updated record.
    ///
    /// Only `heartbeat` changes; every other field is left untouched.
    pub fn heartbeat(&self, id: InstanceId) -> Result<Instance> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let instance = state
            .instances
            .get_mut(&id)
            .ok_or_else(|| Error::instance_not_found(id))?;

        instance.heartbeat = now;
        debug!("Heartbeat for instance {} ({})", id, instance.name);

        Ok(instance.clone())
    }

    /// Removes an instance, reporting why removal failed.
    ///
    /// The by-name index is checked before anything is mutated, so a failure
    /// leaves the store exactly as it was.
    pub fn remove(&self, id: InstanceId) -> Result<Instance> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let name = state
            .instances
            .get(&id)
            .map(|instance| instance.name.clone())
            .ok_or_else(|| Error::instance_not_found(id))?;

        let indexed = state
            .by_name
            .get_mut(&name)
            .map_or(false, |ids| ids.remove(&id));
        if !indexed {
            return Err(Error::Internal(format!(
                "instance {} missing from name index '{}'",
                id, name
            )));
        }
        if state.by_name.get(&name).is_some_and(BTreeSet::is_empty) {
            state.by_name.remove(&name);
        }

        let instance = state
            .instances
            .remove(&id)
            .ok_or_else(|| Error::Internal(format!("instance {} vanished during removal", id)))?;

        info!("Deregistered instance {}: {}", id, instance.name);
        Ok(instance)
    }

    /// Deletes an instance under a single lock acquisition.
    ///
    /// An unknown id is `NotFound`. `Ok(false)` means the id was known but
    /// removal failed internally; the record is then left in place.
    pub fn deregister(&self, id: InstanceId) -> Result<bool> {
        match self.remove(id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Err(e),
            Err(e) => {
                warn!("Failed to deregister instance {}: {}", id, e);
                Ok(false)
            }
        }
    }

    /// Returns the number of registered instances.
    pub fn count(&self) -> usize {
        self.state.lock().instances.len()
    }

    /// Clears all entries from the registry.
    ///
    /// The id counter is kept, so ids stay unique across a clear.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.instances.clear();
        state.by_name.clear();
        info!("Cleared all registry entries");
    }

    #[cfg(test)]
    pub(crate) fn corrupt_index(&self, name: &str) {
        self.state.lock().by_name.remove(name);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn registration(name: &str, port: u16) -> Registration {
        Registration::new(name, "127.0.0.1", port).unwrap()
    }

    #[test]
    fn test_registry_insert_and_find_by_id() {
        let registry = Registry::new();
        let inserted = registry.insert(registration("web@1.2.3", 18803));

        let found = registry.find_by_id(inserted.id).unwrap();
        assert_eq!(found.name, "web");
        assert_eq!(found.host, "127.0.0.1");
        assert_eq!(found.port, 18803);
        assert_eq!(found, inserted);
    }

    #[test]
    fn test_registry_ids_are_monotonic() {
        let registry = Registry::new();
        let a = registry.insert(registration("a", 1));
        let b = registry.insert(registration("b", 2));

        assert_eq!(a.id, InstanceId::new(1));
        assert_eq!(b.id, InstanceId::new(2));
    }

    #[test]
    fn test_registry_ids_not_reused_after_delete() {
        let registry = Registry::new();
        registry.insert(registration("a", 1));
        let b = registry.insert(registration("b", 2));

        assert!(registry.deregister(b.id).unwrap());
        let c = registry.insert(registration("c", 3));

        assert_eq!(c.id, InstanceId::new(3));
    }

    #[test]
    fn test_registry_find_all_in_insertion_order() {
        let registry = Registry::new();
        for (i, name) in ["x", "a", "m"].iter().enumerate() {
            registry.insert(registration(name, 1000 + i as u16));
        }

        let names: Vec<String> = registry.find_all().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["x", "a", "m"]);
    }

    #[test]
    fn test_registry_find_by_name_and_version() {
        let registry = Registry::new();
        registry.insert(registration("svc@1.0", 1));
        registry.insert(registration("svc@2.0", 2));
        registry.insert(registration("other@1.0", 3));

        let all = registry.find_by_name("svc", None);
        assert_eq!(all.len(), 2);

        let v1 = registry.find_by_name("svc", Some("1.0"));
        assert_eq!(v1.len(), 1);
        assert_eq!(v1[0].port, 1);

        assert!(registry.find_by_name("svc", Some("3.0")).is_empty());
        assert!(registry.find_by_name("missing", None).is_empty());
    }

    #[test]
    fn test_registry_version_filter_skips_unversioned() {
        let registry = Registry::new();
        registry.insert(registration("svc", 1));
        registry.insert(registration("svc@1.0", 2));

        assert_eq!(registry.find_by_name("svc", None).len(), 2);
        assert_eq!(registry.find_by_name("svc", Some("1.0")).len(), 1);
    }

    #[test]
    fn test_registry_not_found() {
        let registry = Registry::new();
        let result = registry.find_by_id(InstanceId::new(999));

        match result {
            Err(Error::InstanceNotFound { id }) => assert_eq!(id.get(), 999),
            other => panic!("Expected InstanceNotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_heartbeat_updates_only_timestamp() {
        let clock = ManualClock::default();
        let registry = Registry::with_clock(Arc::new(clock.clone()));
        let before = registry.insert(registration("web@1.2.3", 18803).with_meta(json!({ "a": 1 })));

        clock.advance_ms(30_000);
        let after = registry.heartbeat(before.id).unwrap();

        assert_eq!(after.heartbeat - before.heartbeat, chrono::Duration::seconds(30));
        assert_eq!(
            Instance {
                heartbeat: before.heartbeat,
                ..after.clone()
            },
            before
        );
        assert_eq!(registry.find_by_id(before.id).unwrap(), after);
    }

    #[test]
    fn test_registry_heartbeat_unknown_id() {
        let registry = Registry::new();
        let err = registry.heartbeat(InstanceId::new(5)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_registry_delete() {
        let registry = Registry::new();
        let instance = registry.insert(registration("web", 1));

        assert!(registry.deregister(instance.id).unwrap());
        assert!(registry.find_by_id(instance.id).unwrap_err().is_not_found());
        assert!(registry.find_by_name("web", None).is_empty());
        assert!(registry.find_all().is_empty());

        // Second delete of the same id
        assert!(registry.deregister(instance.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_registry_delete_keeps_siblings() {
        let registry = Registry::new();
        let a = registry.insert(registration("web@1", 1));
        let b = registry.insert(registration("web@2", 2));

        assert!(registry.deregister(a.id).unwrap());
        let remaining = registry.find_by_name("web", None);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
    }

    #[test]
    fn test_registry_internal_failure_leaves_state_intact() {
        let registry = Registry::new();
        let instance = registry.insert(registration("web", 1));
        registry.corrupt_index("web");

        let err = registry.remove(instance.id).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(!registry.deregister(instance.id).unwrap());
        assert!(registry.find_by_id(instance.id).is_ok());
    }

    #[test]
    fn test_registry_concurrent_delete_of_same_id() {
        let registry = Arc::new(Registry::new());
        let instance = registry.insert(registration("web", 1));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.deregister(instance.id))
            })
            .collect();
        let results: Vec<Result<bool>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Exactly one caller removes it; every other caller sees NotFound.
        assert_eq!(results.iter().filter(|r| matches!(r, Ok(true))).count(), 1);
        assert!(results
            .iter()
            .filter(|r| !matches!(r, Ok(true)))
            .all(|r| r.as_ref().is_err_and(Error::is_not_found)));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_registry_clear_preserves_counter() {
        let registry = Registry::new();
        registry.insert(registration("a", 1));
        registry.insert(registration("b", 2));

        registry.clear();
        assert_eq!(registry.count(), 0);

        let next = registry.insert(registration("c", 3));
        assert_eq!(next.id, InstanceId::new(3));
    }

    #[tokio::test]
    async fn test_registry_concurrent_access() {
        use tokio::task;

        let registry = Arc::new(Registry::new());
        let mut handles = vec![];

        // Spawn multiple tasks that register concurrently
        for i in 0..10u16 {
            let registry = Arc::clone(&registry);
            let handle = task::spawn(async move {
                registry.insert(registration(&format!("svc@{}", i), 10000 + i))
            });
            handles.push(handle);
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id);
        }
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 10);
        assert_eq!(registry.count(), 10);
        assert_eq!(registry.find_by_name("svc", None).len(), 10);
    }
}
