//! Pluggable storage behind a service manager

use crate::entry::ManagedEntry;
use crate::error::{ContainerError, Result};
use hearth_metadata::ServiceName;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Name-keyed store of managed entries
pub trait ServiceRepository: Send + Sync {
    /// Store `entry`; fails if its name is taken or the store is full
    fn register(&mut self, entry: Arc<ManagedEntry>) -> Result<()>;

    fn unregister(&mut self, name: &ServiceName) -> Option<Arc<ManagedEntry>>;

    fn get(&self, name: &ServiceName) -> Option<Arc<ManagedEntry>>;

    /// Stored names, sorted
    fn names(&self) -> Vec<ServiceName>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default in-memory repository
#[derive(Default)]
pub struct MemoryRepository {
    entries: FxHashMap<ServiceName, Arc<ManagedEntry>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServiceRepository for MemoryRepository {
    fn register(&mut self, entry: Arc<ManagedEntry>) -> Result<()> {
        if self.entries.contains_key(entry.name()) {
            return Err(ContainerError::AlreadyRegistered(entry.name().clone()));
        }
        self.entries.insert(entry.name().clone(), entry);
        Ok(())
    }

    fn unregister(&mut self, name: &ServiceName) -> Option<Arc<ManagedEntry>> {
        self.entries.remove(name)
    }

    fn get(&self, name: &ServiceName) -> Option<Arc<ManagedEntry>> {
        self.entries.get(name).cloned()
    }

    fn names(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// In-memory repository that refuses entries beyond a fixed capacity
pub struct BoundedRepository {
    inner: MemoryRepository,
    capacity: usize,
}

impl BoundedRepository {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: MemoryRepository::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl ServiceRepository for BoundedRepository {
    fn register(&mut self, entry: Arc<ManagedEntry>) -> Result<()> {
        if self.inner.len() >= self.capacity {
            return Err(ContainerError::Repository(format!(
                "capacity of {} reached, cannot store {}",
                self.capacity,
                entry.name()
            )));
        }
        self.inner.register(entry)
    }

    fn unregister(&mut self, name: &ServiceName) -> Option<Arc<ManagedEntry>> {
        self.inner.unregister(name)
    }

    fn get(&self, name: &ServiceName) -> Option<Arc<ManagedEntry>> {
        self.inner.get(name)
    }

    fn names(&self) -> Vec<ServiceName> {
        self.inner.names()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
