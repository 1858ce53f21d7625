//! One manager namespace: its entries and dependency edges

use crate::entry::ManagedEntry;
use crate::error::{ContainerError, Result};
use crate::repository::{MemoryRepository, ServiceRepository};
use hearth_metadata::ServiceName;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

struct ManagerState {
    repository: Box<dyn ServiceRepository>,
    /// Registration order
    order: Vec<ServiceName>,
    /// Reverse edges, keyed by a service of this namespace. Dependents may
    /// live in any namespace and need not be registered yet.
    dependents: FxHashMap<ServiceName, BTreeSet<ServiceName>>,
}

/// The registry of one manager namespace
///
/// The name table and the edge sets sit behind one lock. Lifecycle
/// transitions never hold it, so lookups stay cheap while services start.
pub struct ServiceManager {
    name: String,
    state: RwLock<ManagerState>,
}

impl ServiceManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_repository(name, Box::new(MemoryRepository::new()))
    }

    pub fn with_repository(name: impl Into<String>, repository: Box<dyn ServiceRepository>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ManagerState {
                repository,
                order: Vec::new(),
                dependents: FxHashMap::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(&self, entry: Arc<ManagedEntry>) -> Result<()> {
        let name = entry.name().clone();
        let mut state = self.state.write();
        state.repository.register(entry)?;
        state.order.push(name.clone());
        debug!("Registered {}", name);
        Ok(())
    }

    pub fn unregister(&self, name: &ServiceName) -> Result<Arc<ManagedEntry>> {
        let mut state = self.state.write();
        let entry = state
            .repository
            .unregister(name)
            .ok_or_else(|| ContainerError::NotFound(name.clone()))?;
        state.order.retain(|n| n != name);
        debug!("Unregistered {}", name);
        Ok(entry)
    }

    /// Look up an entry, failing with `NotFound`
    pub fn entry(&self, name: &ServiceName) -> Result<Arc<ManagedEntry>> {
        self.get(name)
            .ok_or_else(|| ContainerError::NotFound(name.clone()))
    }

    pub fn get(&self, name: &ServiceName) -> Option<Arc<ManagedEntry>> {
        self.state.read().repository.get(name)
    }

    pub fn contains(&self, name: &ServiceName) -> bool {
        self.get(name).is_some()
    }

    /// Registered names in registration order
    pub fn service_names(&self) -> Vec<ServiceName> {
        self.state.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().repository.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// What `name` depends on
    pub fn depends_on(&self, name: &ServiceName) -> Result<BTreeSet<ServiceName>> {
        self.entry(name).map(|e| e.depends_on().clone())
    }

    /// Services that depend on `name`
    pub fn dependents_of(&self, name: &ServiceName) -> BTreeSet<ServiceName> {
        self.state
            .read()
            .dependents
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn add_dependent(&self, dependency: &ServiceName, dependent: &ServiceName) {
        self.state
            .write()
            .dependents
            .entry(dependency.clone())
            .or_default()
            .insert(dependent.clone());
    }

    pub(crate) fn remove_dependent(&self, dependency: &ServiceName, dependent: &ServiceName) {
        let mut state = self.state.write();
        let emptied = match state.dependents.get_mut(dependency) {
            Some(set) => {
                set.remove(dependent);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            state.dependents.remove(dependency);
        }
    }

    /// Move every entry into `repository` and make it the backing store
    ///
    /// Entries are re-registered in registration order. If any of them is
    /// refused, the new store is dropped and the current one stays in place.
    pub fn set_repository(&self, mut repository: Box<dyn ServiceRepository>) -> Result<()> {
        let mut state = self.state.write();
        for name in &state.order {
            let entry = state
                .repository
                .get(name)
                .ok_or_else(|| ContainerError::Repository(format!("{} vanished from the store", name)))?;
            repository.register(entry)?;
        }
        state.repository = repository;
        info!("Swapped repository of manager {} ({} entries)", self.name, state.order.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::BoundedRepository;
    use hearth_metadata::{ObjectMetaData, ServiceMetaData};

    fn entry(service: &str) -> Arc<ManagedEntry> {
        let meta = ObjectMetaData::new("pkg.Foo", "m", Arc::from("test.xml"));
        Arc::new(ManagedEntry::new(
            ServiceName::new("m", service),
            Arc::new(ServiceMetaData::new(service, meta)),
            BTreeSet::new(),
        ))
    }

    #[test]
    fn test_register_and_lookup() {
        let manager = ServiceManager::new("m");
        manager.register(entry("B")).unwrap();
        manager.register(entry("A")).unwrap();

        assert_eq!(
            manager.service_names(),
            [ServiceName::new("m", "B"), ServiceName::new("m", "A")]
        );
        let err = manager.entry(&ServiceName::new("m", "C")).unwrap_err();
        assert!(matches!(err, ContainerError::NotFound(_)));

        manager.unregister(&ServiceName::new("m", "B")).unwrap();
        assert_eq!(manager.service_names(), [ServiceName::new("m", "A")]);
    }

    #[test]
    fn test_reverse_edges() {
        let manager = ServiceManager::new("m");
        let db = ServiceName::new("m", "Db");
        manager.add_dependent(&db, &ServiceName::new("app", "Api"));
        manager.add_dependent(&db, &ServiceName::new("m", "Cache"));
        assert_eq!(manager.dependents_of(&db).len(), 2);

        manager.remove_dependent(&db, &ServiceName::new("app", "Api"));
        manager.remove_dependent(&db, &ServiceName::new("m", "Cache"));
        assert!(manager.dependents_of(&db).is_empty());
    }

    #[test]
    fn test_failed_swap_keeps_previous_store() {
        let manager = ServiceManager::new("m");
        for service in ["A", "B", "C"] {
            manager.register(entry(service)).unwrap();
        }

        let err = manager
            .set_repository(Box::new(BoundedRepository::new(2)))
            .unwrap_err();
        assert!(matches!(err, ContainerError::Repository(_)));
        assert_eq!(manager.len(), 3);
        // The old store still accepts new entries
        manager.register(entry("D")).unwrap();

        manager
            .set_repository(Box::new(BoundedRepository::new(10)))
            .unwrap();
        assert_eq!(manager.len(), 4);
        assert!(manager.contains(&ServiceName::new("m", "C")));
    }
}
