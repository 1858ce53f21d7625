//! The lifecycle state machine
//!
//! Forward progress runs
//! `Creating → Created → Starting → Started → Stopping → Stopped → Destroying → Destroyed`;
//! `Failed` and `Unknown` only leave through a destroy.
//!
//! `create` and `start` first bring every dependency to `Created` or
//! `Started`. `stop` and `destroy` first tear down every dependent. An
//! entry's transition lock is held only while that entry changes, never
//! across the recursion, and the state is re-checked once it is taken.
//!
//! Forward calls share the container's transition gate while teardown holds
//! it alone, so a dependency is never torn down under a dependent that is
//! still being created or started. Forward calls take it with
//! `read_recursive` because retries and references nest them.

use crate::container::Container;
use crate::entry::ManagedEntry;
use crate::error::{ContainerError, DeploymentError, Result};
use hearth_metadata::{LifecycleState, PropertySource, ServiceName};
use hearth_reflect::{
    BuildContext, LifecyclePhase, ObjectBuilder, ReflectError, ServiceResolver, Value,
};
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a successful `create` or `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The entry moved to the requested state
    Completed,
    /// The entry was already there, or past it
    Unchanged,
    /// A dependency is not registered; the entry was parked
    Waiting,
}

/// Observer of one service's state changes
pub trait StateListener: Send + Sync {
    fn state_changed(
        &self,
        name: &ServiceName,
        old: LifecycleState,
        new: LifecycleState,
    ) -> anyhow::Result<()>;
}

impl<F> StateListener for F
where
    F: Fn(&ServiceName, LifecycleState, LifecycleState) -> anyhow::Result<()> + Send + Sync,
{
    fn state_changed(
        &self,
        name: &ServiceName,
        old: LifecycleState,
        new: LifecycleState,
    ) -> anyhow::Result<()> {
        self(name, old, new)
    }
}

/// Observer of registrations across all namespaces
pub trait RegistrationListener: Send + Sync {
    fn registered(&self, _entry: &ManagedEntry) -> anyhow::Result<()> {
        Ok(())
    }

    fn unregistered(&self, _name: &ServiceName) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Why a parked entry is waiting, and how far to drive it once it can move
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WaitRecord {
    pub causes: BTreeSet<ServiceName>,
    pub target: LifecycleState,
}

/// Resolves service references met while building an object
///
/// A referenced service that is not created yet is created on the spot,
/// continuing the caller's in-progress stack so cycles are still caught.
struct Resolver<'c> {
    container: &'c Container,
    stack: RefCell<Vec<ServiceName>>,
}

impl ServiceResolver for Resolver<'_> {
    fn resolve(&self, name: &ServiceName) -> hearth_reflect::Result<Value> {
        let unresolved = |reason: String| ReflectError::Unresolved {
            service: name.to_string(),
            reason,
        };
        let entry = self
            .container
            .lookup(name)
            .ok_or_else(|| unresolved("not registered".to_string()))?;

        let state = entry.state();
        if !state.is_created() && state != LifecycleState::Unknown {
            let mut stack = self.stack.borrow_mut();
            match self.container.create_entry(&entry, &mut stack) {
                Ok(Transition::Waiting) => {
                    let causes = self
                        .container
                        .waiting_causes(name)
                        .unwrap_or_default()
                        .into_iter()
                        .collect();
                    let waiting = DeploymentError::Waiting {
                        service: name.clone(),
                        causes,
                    };
                    return Err(unresolved(waiting.to_string()));
                }
                Ok(_) => {}
                Err(e) => return Err(unresolved(e.to_string())),
            }
        }
        Ok(entry.value())
    }
}

impl Container {
    /// Bring `name` to `Created`
    pub fn create(&self, name: &ServiceName) -> Result<Transition> {
        let entry = self.entry(name)?;
        let _gate = self.gate.read_recursive();
        self.check_cycles(name)?;
        self.create_entry(&entry, &mut Vec::new())
    }

    /// Bring `name` to `Started`, creating it first if needed
    pub fn start(&self, name: &ServiceName) -> Result<Transition> {
        let entry = self.entry(name)?;
        let _gate = self.gate.read_recursive();
        self.check_cycles(name)?;
        self.start_entry(&entry, &mut Vec::new())
    }

    /// Stop `name` and everything depending on it
    ///
    /// Only fails if `name` is not registered. Errors raised by hooks are
    /// logged and the teardown carries on.
    pub fn stop(&self, name: &ServiceName) -> Result<()> {
        let entry = self.entry(name)?;
        let _gate = self.gate.write();
        self.stop_entry(&entry, &mut FxHashSet::default());
        Ok(())
    }

    /// Destroy `name` and everything depending on it
    ///
    /// Always ends in `Destroyed`. Only fails if `name` is not registered.
    pub fn destroy(&self, name: &ServiceName) -> Result<()> {
        let entry = self.entry(name)?;
        let _gate = self.gate.write();
        self.destroy_entry(&entry, &mut FxHashSet::default());
        Ok(())
    }

    pub fn create_all(&self, names: &[ServiceName]) -> Vec<(ServiceName, Result<Transition>)> {
        names.iter().map(|n| (n.clone(), self.create(n))).collect()
    }

    pub fn start_all(&self, names: &[ServiceName]) -> Vec<(ServiceName, Result<Transition>)> {
        names.iter().map(|n| (n.clone(), self.start(n))).collect()
    }

    /// Stop every name; nothing is touched if one of them is unknown
    pub fn stop_all(&self, names: &[ServiceName]) -> Result<()> {
        let entries = names
            .iter()
            .map(|n| self.entry(n))
            .collect::<Result<Vec<_>>>()?;
        let _gate = self.gate.write();
        let mut visited = FxHashSet::default();
        for entry in entries {
            self.stop_entry(&entry, &mut visited);
        }
        Ok(())
    }

    /// Destroy every name; nothing is touched if one of them is unknown
    pub fn destroy_all(&self, names: &[ServiceName]) -> Result<()> {
        let entries = names
            .iter()
            .map(|n| self.entry(n))
            .collect::<Result<Vec<_>>>()?;
        let _gate = self.gate.write();
        let mut visited = FxHashSet::default();
        for entry in entries {
            self.destroy_entry(&entry, &mut visited);
        }
        Ok(())
    }

    // ---- Waiting ----

    /// Retry every parked entry that was waiting for `name`
    ///
    /// Records are taken out before the retry; an entry that still cannot
    /// move parks itself again.
    pub(crate) fn retry_waiting_on(&self, name: &ServiceName) {
        let ready: Vec<(ServiceName, LifecycleState)> = {
            let mut waiting = self.waiting.lock();
            let names: Vec<ServiceName> = waiting
                .iter()
                .filter(|(_, record)| record.causes.contains(name))
                .map(|(waiter, _)| waiter.clone())
                .collect();
            names
                .into_iter()
                .filter_map(|waiter| waiting.remove(&waiter).map(|r| (waiter, r.target)))
                .collect()
        };

        for (waiter, target) in ready {
            debug!("Retrying {} now that {} is available", waiter, name);
            let result = match target {
                LifecycleState::Started => self.start(&waiter),
                _ => self.create(&waiter),
            };
            if let Err(e) = result {
                warn!("Retry of {} failed: {}", waiter, e);
            }
        }
    }

    fn park(&self, entry: &ManagedEntry, causes: BTreeSet<ServiceName>, target: LifecycleState) {
        let name = entry.name();
        info!("{} is waiting for {:?}", name, causes);
        let mut waiting = self.waiting.lock();
        let record = waiting.entry(name.clone()).or_insert(WaitRecord {
            causes: BTreeSet::new(),
            target,
        });
        record.causes = causes;
        if target == LifecycleState::Started {
            record.target = target;
        }
    }

    /// Record that `entry` reached `reached` and wake its own waiters
    fn settle(&self, entry: &ManagedEntry, reached: LifecycleState) {
        let name = entry.name();
        {
            let mut waiting = self.waiting.lock();
            let satisfied = waiting
                .get(name)
                .map(|r| r.target != LifecycleState::Started || reached == LifecycleState::Started)
                .unwrap_or(false);
            if satisfied {
                waiting.remove(name);
            }
        }
        self.retry_waiting_on(name);
    }

    // ---- Forward transitions ----

    pub(crate) fn create_entry(
        &self,
        entry: &Arc<ManagedEntry>,
        stack: &mut Vec<ServiceName>,
    ) -> Result<Transition> {
        // A `Creating` entry is mid-transition on another thread; going
        // through its transition lock waits for it to finish
        match entry.state() {
            LifecycleState::Failed => return Err(self.already_failed(entry)),
            LifecycleState::Destroyed | LifecycleState::Creating => {}
            _ => return Ok(Transition::Unchanged),
        }

        self.enter(entry, stack)?;
        let result = match self.prepare(entry, LifecycleState::Created, stack) {
            Ok(missing) if !missing.is_empty() => {
                self.park(entry, missing, LifecycleState::Created);
                Ok(Transition::Waiting)
            }
            Ok(_) => self.create_self(entry, stack),
            Err(e) => Err(e),
        };
        stack.pop();

        if result.as_ref().ok() == Some(&Transition::Completed) {
            self.settle(entry, LifecycleState::Created);
        }
        result
    }

    pub(crate) fn start_entry(
        &self,
        entry: &Arc<ManagedEntry>,
        stack: &mut Vec<ServiceName>,
    ) -> Result<Transition> {
        match entry.state() {
            LifecycleState::Failed => return Err(self.already_failed(entry)),
            LifecycleState::Unknown | LifecycleState::Started => return Ok(Transition::Unchanged),
            _ => {}
        }

        self.enter(entry, stack)?;
        let result = match self.prepare(entry, LifecycleState::Started, stack) {
            Ok(missing) if !missing.is_empty() => {
                self.park(entry, missing, LifecycleState::Started);
                Ok(Transition::Waiting)
            }
            Ok(_) => self
                .create_self(entry, stack)
                .and_then(|_| self.start_self(entry)),
            Err(e) => Err(e),
        };
        stack.pop();

        if result.as_ref().ok() == Some(&Transition::Completed) {
            self.settle(entry, LifecycleState::Started);
        }
        result
    }

    /// Push `entry` onto the in-progress stack, rejecting re-entry
    fn enter(&self, entry: &ManagedEntry, stack: &mut Vec<ServiceName>) -> Result<()> {
        let name = entry.name();
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut path = stack[pos..].to_vec();
            path.push(name.clone());
            return Err(DeploymentError::Cycle { path }.into());
        }
        stack.push(name.clone());
        Ok(())
    }

    /// Drive every dependency towards `target`
    ///
    /// Returns the dependencies that cannot move yet: unregistered ones and
    /// ones that are waiting themselves.
    fn prepare(
        &self,
        entry: &ManagedEntry,
        target: LifecycleState,
        stack: &mut Vec<ServiceName>,
    ) -> Result<BTreeSet<ServiceName>> {
        let mut missing = BTreeSet::new();
        for dependency in entry.depends_on() {
            let Some(dep) = self.lookup(dependency) else {
                missing.insert(dependency.clone());
                continue;
            };
            let dependency_failed = || {
                ContainerError::from(DeploymentError::DependencyFailed {
                    service: entry.name().clone(),
                    dependency: dependency.clone(),
                    source: dep.failure(),
                })
            };
            if dep.state() == LifecycleState::Failed {
                return Err(dependency_failed());
            }

            let result = match target {
                LifecycleState::Started => self.start_entry(&dep, stack),
                _ => self.create_entry(&dep, stack),
            };
            match result {
                Ok(Transition::Waiting) => {
                    missing.insert(dependency.clone());
                }
                Ok(_) => {}
                Err(_) if dep.state() == LifecycleState::Failed => return Err(dependency_failed()),
                Err(e) => return Err(e),
            }
        }
        Ok(missing)
    }

    fn create_self(&self, entry: &ManagedEntry, stack: &[ServiceName]) -> Result<Transition> {
        let _guard = entry.lock_transition();
        match entry.state() {
            LifecycleState::Destroyed => {}
            LifecycleState::Failed => return Err(self.already_failed(entry)),
            _ => return Ok(Transition::Unchanged),
        }

        self.transition(entry, LifecycleState::Creating);
        match self.construct(entry, stack) {
            Ok(()) => {
                self.transition(entry, LifecycleState::Created);
                Ok(Transition::Completed)
            }
            Err(e) => Err(self.fail(entry, e)),
        }
    }

    /// Build the object, then run its create hook
    fn construct(&self, entry: &ManagedEntry, stack: &[ServiceName]) -> Result<()> {
        let resolver = Resolver {
            container: self,
            stack: RefCell::new(stack.to_vec()),
        };
        let builder = ObjectBuilder::new(self.build_context(&resolver));
        let effective = entry
            .definition()
            .effective(&*self.properties, self.config.duplicate_policy)?;
        let built = builder.build(&effective)?;

        let object = built.handle().cloned();
        entry.set_built(built.value, built.deferred);
        if let Some(object) = object {
            object.lifecycle(LifecyclePhase::Create)?;
        }
        Ok(())
    }

    fn start_self(&self, entry: &ManagedEntry) -> Result<Transition> {
        let _guard = entry.lock_transition();
        match entry.state() {
            LifecycleState::Created | LifecycleState::Stopped => {}
            LifecycleState::Failed => return Err(self.already_failed(entry)),
            _ => return Ok(Transition::Unchanged),
        }

        self.transition(entry, LifecycleState::Starting);
        let started = self
            .run_hook(entry, LifecyclePhase::Start)
            .and_then(|_| self.run_deferred(entry, LifecycleState::Starting))
            .and_then(|_| {
                self.transition(entry, LifecycleState::Started);
                self.run_deferred(entry, LifecycleState::Started)
            });
        match started {
            Ok(()) => Ok(Transition::Completed),
            Err(e) => Err(self.fail(entry, e)),
        }
    }

    fn run_hook(&self, entry: &ManagedEntry, phase: LifecyclePhase) -> Result<()> {
        if let Some(object) = entry.object() {
            object.lifecycle(phase)?;
        }
        Ok(())
    }

    /// Run the invokes the builder deferred to `state`
    fn run_deferred(&self, entry: &ManagedEntry, state: LifecycleState) -> Result<()> {
        let deferred = entry.deferred_for(state);
        if deferred.is_empty() {
            return Ok(());
        }
        let resolver = Resolver {
            container: self,
            stack: RefCell::new(vec![entry.name().clone()]),
        };
        let builder = ObjectBuilder::new(self.build_context(&resolver));
        for invoke in &deferred {
            debug!("{}: invoking {} at {}", entry.name(), invoke.invoke.name, state);
            builder.run_deferred(invoke)?;
        }
        Ok(())
    }

    /// Move `entry` to `Failed`, keeping `error` as its failure
    fn fail(&self, entry: &ManagedEntry, error: ContainerError) -> ContainerError {
        let source = Arc::new(error);
        warn!("{} failed: {}", entry.name(), source);
        entry.set_failure(source.clone());
        self.transition(entry, LifecycleState::Failed);
        ContainerError::Failed {
            service: entry.name().clone(),
            source,
        }
    }

    fn already_failed(&self, entry: &ManagedEntry) -> ContainerError {
        let service = entry.name().clone();
        match entry.failure() {
            Some(source) => ContainerError::Failed { service, source },
            None => DeploymentError::Failed { service }.into(),
        }
    }

    // ---- Teardown ----

    fn stop_entry(&self, entry: &ManagedEntry, visited: &mut FxHashSet<ServiceName>) {
        if !visited.insert(entry.name().clone()) || entry.state() != LifecycleState::Started {
            return;
        }
        for dependent in self.dependents_of(entry.name()) {
            if let Some(dependent) = self.lookup(&dependent) {
                self.stop_entry(&dependent, visited);
            }
        }
        self.stop_self(entry);
    }

    fn stop_self(&self, entry: &ManagedEntry) {
        let _guard = entry.lock_transition();
        if entry.state() != LifecycleState::Started {
            return;
        }

        self.transition(entry, LifecycleState::Stopping);
        self.teardown_step(entry, self.run_deferred(entry, LifecycleState::Stopping));
        self.teardown_step(entry, self.run_hook(entry, LifecyclePhase::Stop));
        self.transition(entry, LifecycleState::Stopped);
        self.teardown_step(entry, self.run_deferred(entry, LifecycleState::Stopped));
    }

    fn destroy_entry(&self, entry: &ManagedEntry, visited: &mut FxHashSet<ServiceName>) {
        if !visited.insert(entry.name().clone()) {
            return;
        }
        self.waiting.lock().remove(entry.name());
        for dependent in self.dependents_of(entry.name()) {
            if let Some(dependent) = self.lookup(&dependent) {
                self.destroy_entry(&dependent, visited);
            }
        }
        self.stop_self(entry);

        let _guard = entry.lock_transition();
        match entry.state() {
            LifecycleState::Destroyed => return,
            LifecycleState::Failed | LifecycleState::Unknown => {
                entry.release();
                self.transition(entry, LifecycleState::Destroyed);
                return;
            }
            _ => {}
        }

        self.transition(entry, LifecycleState::Destroying);
        self.teardown_step(entry, self.run_deferred(entry, LifecycleState::Destroying));
        self.teardown_step(entry, self.run_hook(entry, LifecyclePhase::Destroy));
        self.transition(entry, LifecycleState::Destroyed);
        self.teardown_step(entry, self.run_deferred(entry, LifecycleState::Destroyed));
        entry.release();
    }

    fn teardown_step(&self, entry: &ManagedEntry, result: Result<()>) {
        if let Err(e) = result {
            warn!("Ignoring error while tearing down {}: {}", entry.name(), e);
        }
    }

    /// Set the state and notify the entry's listeners
    fn transition(&self, entry: &ManagedEntry, new: LifecycleState) -> LifecycleState {
        let name = entry.name();
        let old = entry.set_state(new);
        debug!("{}: {} -> {}", name, old, new);

        let listeners = self.state_listeners.read().get(name).cloned();
        for listener in listeners.into_iter().flatten() {
            if let Err(e) = listener.state_changed(name, old, new) {
                warn!("State listener for {} failed: {}", name, e);
            }
        }
        old
    }

    // ---- Cycles ----

    /// Reject a dependency cycle reachable from `root` before anything moves
    fn check_cycles(&self, root: &ServiceName) -> Result<()> {
        let mut done = FxHashSet::default();
        self.visit(root, &mut Vec::new(), &mut done)
    }

    fn visit(
        &self,
        name: &ServiceName,
        path: &mut Vec<ServiceName>,
        done: &mut FxHashSet<ServiceName>,
    ) -> Result<()> {
        if let Some(pos) = path.iter().position(|n| n == name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(name.clone());
            return Err(DeploymentError::Cycle { path: cycle }.into());
        }
        if done.contains(name) {
            return Ok(());
        }
        let Some(entry) = self.lookup(name) else {
            return Ok(());
        };

        path.push(name.clone());
        for dependency in entry.depends_on() {
            self.visit(dependency, path, done)?;
        }
        path.pop();
        done.insert(name.clone());
        Ok(())
    }

    fn build_context<'a>(&'a self, resolver: &'a dyn ServiceResolver) -> BuildContext<'a> {
        let properties: &dyn PropertySource = &*self.properties;
        BuildContext {
            introspector: &*self.types,
            editors: &self.editors,
            resolver,
            properties,
            policy: self.config.duplicate_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_metadata::{ObjectMetaData, ServiceMetaData};
    use hearth_reflect::TypeRegistry;

    fn entry(name: &str, deps: &[&str]) -> Arc<ManagedEntry> {
        let meta = ObjectMetaData::new("test.Missing", "m", Arc::from("test.xml"));
        Arc::new(ManagedEntry::new(
            ServiceName::new("m", name),
            Arc::new(ServiceMetaData::new(name, meta)),
            deps.iter().map(|d| ServiceName::new("m", *d)).collect(),
        ))
    }

    fn container() -> Container {
        Container::new(Arc::new(TypeRegistry::new()))
    }

    #[test]
    fn test_static_cycle_check_reports_path() {
        let container = container();
        container.insert_entry(entry("X", &["Y"])).unwrap();
        container.insert_entry(entry("Y", &["X"])).unwrap();

        let err = container.check_cycles(&ServiceName::new("m", "X")).unwrap_err();
        match err {
            ContainerError::Deployment(DeploymentError::Cycle { path }) => {
                assert_eq!(path.len(), 3);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_stack_rejects_reentry() {
        let container = container();
        let a = entry("A", &[]);
        let mut stack = vec![ServiceName::new("m", "A"), ServiceName::new("m", "B")];
        let err = container.enter(&a, &mut stack).unwrap_err();
        assert!(err.to_string().contains("m#A -> m#B -> m#A"));
    }

    #[test]
    fn test_unknown_type_fails_the_entry() {
        let container = container();
        let a = entry("A", &[]);
        container.insert_entry(a.clone()).unwrap();

        let err = container.create(a.name()).unwrap_err();
        assert!(matches!(err, ContainerError::Failed { .. }));
        assert_eq!(a.state(), LifecycleState::Failed);
        assert!(a.failure().is_some());

        // A second attempt reports the stored failure without rebuilding
        let again = container.start(a.name()).unwrap_err();
        assert!(again.to_string().contains("test.Missing"));

        container.destroy(a.name()).unwrap();
        assert_eq!(a.state(), LifecycleState::Destroyed);
        assert!(a.failure().is_none());
    }

    #[test]
    fn test_park_keeps_strongest_target() {
        let container = container();
        let a = entry("A", &["Gone"]);
        let causes: BTreeSet<_> = [ServiceName::new("m", "Gone")].into_iter().collect();
        container.park(&a, causes.clone(), LifecycleState::Started);
        container.park(&a, causes, LifecycleState::Created);

        let waiting = container.waiting.lock();
        assert_eq!(waiting[a.name()].target, LifecycleState::Started);
    }
}
