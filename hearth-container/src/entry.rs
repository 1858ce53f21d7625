//! Registry entries: one per managed service

use crate::error::ContainerError;
use hearth_metadata::{LifecycleState, ObjectMetaData, ServiceMetaData, ServiceName};
use hearth_reflect::{DeferredInvoke, ObjectHandle, Value};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Resource id recorded for objects registered directly
pub const INSTANCE_SOURCE: &str = "<instance>";

/// Mutable part of an entry
struct EntryStatus {
    state: LifecycleState,
    value: Value,
    deferred: Vec<DeferredInvoke>,
    failure: Option<Arc<ContainerError>>,
}

impl Default for EntryStatus {
    fn default() -> Self {
        Self {
            state: LifecycleState::Destroyed,
            value: Value::Null,
            deferred: Vec::new(),
            failure: None,
        }
    }
}

/// A service known to the container
///
/// The entry owns the service's definition and, once created, its live
/// object. Dependency edges are plain names; the reverse edges live in the
/// owning [`ServiceManager`](crate::ServiceManager).
pub struct ManagedEntry {
    name: ServiceName,
    definition: Arc<ServiceMetaData>,
    source: Arc<str>,
    depends_on: BTreeSet<ServiceName>,
    status: RwLock<EntryStatus>,
    transition: Mutex<()>,
}

impl ManagedEntry {
    /// A new entry in the `Destroyed` state
    pub fn new(
        name: ServiceName,
        definition: Arc<ServiceMetaData>,
        depends_on: BTreeSet<ServiceName>,
    ) -> Self {
        let source = definition.object.source.clone();
        Self {
            name,
            definition,
            source,
            depends_on,
            status: RwLock::new(EntryStatus::default()),
            transition: Mutex::new(()),
        }
    }

    /// An entry wrapping an object built outside the container
    ///
    /// Its state is `Unknown`: the container did not drive its lifecycle, so
    /// it only leaves that state through a destroy.
    pub fn instance(name: ServiceName, object: ObjectHandle) -> Self {
        let source: Arc<str> = Arc::from(INSTANCE_SOURCE);
        let meta = ObjectMetaData::new(object.code(), name.manager(), source.clone());
        let definition = Arc::new(ServiceMetaData::new(name.service(), meta));
        let entry = Self::new(name, definition, BTreeSet::new());
        {
            let mut status = entry.status.write();
            status.state = LifecycleState::Unknown;
            status.value = Value::Object(object);
        }
        entry
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn definition(&self) -> &Arc<ServiceMetaData> {
        &self.definition
    }

    /// Id of the definition source the entry came from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Services this entry needs before it can be created
    pub fn depends_on(&self) -> &BTreeSet<ServiceName> {
        &self.depends_on
    }

    pub fn state(&self) -> LifecycleState {
        self.status.read().state
    }

    /// The built value; `Null` while the entry is not created
    pub fn value(&self) -> Value {
        self.status.read().value.clone()
    }

    pub fn object(&self) -> Option<ObjectHandle> {
        self.status.read().value.as_object().cloned()
    }

    /// The error that moved the entry to `Failed`
    pub fn failure(&self) -> Option<Arc<ContainerError>> {
        self.status.read().failure.clone()
    }

    pub(crate) fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock()
    }

    /// Set the state, returning the previous one
    pub(crate) fn set_state(&self, state: LifecycleState) -> LifecycleState {
        let mut status = self.status.write();
        std::mem::replace(&mut status.state, state)
    }

    pub(crate) fn set_built(&self, value: Value, deferred: Vec<DeferredInvoke>) {
        let mut status = self.status.write();
        status.value = value;
        status.deferred = deferred;
    }

    pub(crate) fn set_failure(&self, failure: Arc<ContainerError>) {
        self.status.write().failure = Some(failure);
    }

    /// Deferred invokes registered for `state`
    pub(crate) fn deferred_for(&self, state: LifecycleState) -> Vec<DeferredInvoke> {
        self.status
            .read()
            .deferred
            .iter()
            .filter(|d| d.call_state() == state)
            .cloned()
            .collect()
    }

    /// Drop the object, its deferred invokes and any recorded failure
    pub(crate) fn release(&self) {
        let mut status = self.status.write();
        status.value = Value::Null;
        status.deferred.clear();
        status.failure = None;
    }
}

impl fmt::Debug for ManagedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedEntry")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("source", &self.source)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_reflect::TypeDescriptor;

    #[test]
    fn test_new_entry_is_destroyed() {
        let meta = ObjectMetaData::new("pkg.Foo", "m", Arc::from("a.xml"));
        let definition = Arc::new(ServiceMetaData::new("Foo", meta));
        let entry = ManagedEntry::new(ServiceName::new("m", "Foo"), definition, BTreeSet::new());

        assert_eq!(entry.state(), LifecycleState::Destroyed);
        assert_eq!(entry.source(), "a.xml");
        assert!(entry.object().is_none());
        assert!(entry.failure().is_none());
    }

    #[test]
    fn test_instance_entry_is_unknown() {
        let descriptor = TypeDescriptor::builder::<u32>("test.Number").build();
        let object = ObjectHandle::new(7u32, descriptor).unwrap();
        let entry = ManagedEntry::instance(ServiceName::new("m", "Seven"), object.clone());

        assert_eq!(entry.state(), LifecycleState::Unknown);
        assert!(entry.object().unwrap().ptr_eq(&object));
        assert_eq!(entry.definition().object.code.as_deref(), Some("test.Number"));
        assert_eq!(entry.source(), INSTANCE_SOURCE);

        entry.release();
        assert!(entry.value().is_null());
    }
}
