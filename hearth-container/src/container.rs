//! The top-level registry across manager namespaces

use crate::builder::ContainerBuilder;
use crate::config::ContainerConfig;
use crate::entry::ManagedEntry;
use crate::error::{ContainerError, DeploymentError, Result};
use crate::lifecycle::{RegistrationListener, StateListener, Transition, WaitRecord};
use crate::manager::ServiceManager;
use crate::repository::ServiceRepository;
use crate::transform::TransformRegistry;
use hearth_metadata::{
    parse_server, DefinitionError, LifecycleState, PropertySource,
    ServerMetaData, ServiceMetaData, ServiceName,
};
use hearth_reflect::{
    ManagementDescriptor, ObjectHandle, PropertyEditorRegistry, ReflectError, TypeIntrospector,
    Value,
};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a deployment did with each of its services
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentReport {
    pub resource: String,
    pub started: Vec<ServiceName>,
    pub created: Vec<ServiceName>,
    pub waiting: Vec<ServiceName>,
    pub failed: Vec<ServiceName>,
}

impl DeploymentReport {
    /// No service is left waiting or failed
    pub fn is_complete(&self) -> bool {
        self.waiting.is_empty() && self.failed.is_empty()
    }
}

struct Deployment {
    resource: String,
    services: Vec<ServiceName>,
}

/// A service container
///
/// Definitions are deployed per resource. Each service lands in the
/// [`ServiceManager`] of its namespace and is driven through its lifecycle
/// in dependency order. All methods take `&self`; share the container
/// behind an `Arc` to drive it from several threads.
pub struct Container {
    pub(crate) config: ContainerConfig,
    pub(crate) types: Arc<dyn TypeIntrospector>,
    pub(crate) properties: Arc<dyn PropertySource + Send + Sync>,
    pub(crate) editors: PropertyEditorRegistry,
    managers: RwLock<BTreeMap<String, Arc<ServiceManager>>>,
    deployments: Mutex<Vec<Deployment>>,
    /// Every registered name, in registration order
    registrations: Mutex<Vec<ServiceName>>,
    pub(crate) waiting: Mutex<FxHashMap<ServiceName, WaitRecord>>,
    /// Shared by create and start, exclusive for stop and destroy
    pub(crate) gate: RwLock<()>,
    registration_listeners: RwLock<Vec<Arc<dyn RegistrationListener>>>,
    pub(crate) state_listeners: RwLock<FxHashMap<ServiceName, Vec<Arc<dyn StateListener>>>>,
    transforms: TransformRegistry,
}

impl Container {
    /// A container with default configuration over `types`
    pub fn new(types: Arc<dyn TypeIntrospector>) -> Self {
        ContainerBuilder::new().types(types).build()
    }

    pub(crate) fn assemble(
        config: ContainerConfig,
        types: Arc<dyn TypeIntrospector>,
        properties: Arc<dyn PropertySource + Send + Sync>,
        editors: PropertyEditorRegistry,
    ) -> Self {
        Self {
            config,
            types,
            properties,
            editors,
            managers: RwLock::new(BTreeMap::new()),
            deployments: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
            waiting: Mutex::new(FxHashMap::default()),
            gate: RwLock::new(()),
            registration_listeners: RwLock::new(Vec::new()),
            state_listeners: RwLock::new(FxHashMap::default()),
            transforms: TransformRegistry::new(),
        }
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn types(&self) -> &Arc<dyn TypeIntrospector> {
        &self.types
    }

    pub fn editors(&self) -> &PropertyEditorRegistry {
        &self.editors
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    // ---- Deployment ----

    /// Parse a definition document and deploy it
    pub fn deploy(&self, xml: &str, resource: &str) -> Result<DeploymentReport> {
        let server = parse_server(xml, resource, &self.config.parse_options())?;
        self.deploy_metadata(server)
    }

    /// Read, transform and deploy a definition file
    pub fn deploy_file(&self, path: impl AsRef<Path>) -> Result<DeploymentReport> {
        let path = path.as_ref();
        let resource = path.display().to_string();
        let io_error = |source| ContainerError::Io {
            path: path.to_path_buf(),
            source,
        };

        let bytes = std::fs::read(path).map_err(io_error)?;
        let bytes = self.transforms.transform(&resource, bytes)?;
        let xml = String::from_utf8(bytes)
            .map_err(|e| io_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        self.deploy(&xml, &resource)
    }

    /// Register every service of `server`, then drive each to its `initState`
    ///
    /// Definition problems abort the whole deployment and nothing stays
    /// registered. Lifecycle problems are reported per service.
    pub fn deploy_metadata(&self, server: ServerMetaData) -> Result<DeploymentReport> {
        let resource = server.resource.clone();
        if self.deployments.lock().iter().any(|d| d.resource == resource) {
            return Err(ContainerError::AlreadyDeployed(resource));
        }

        let policy = self.config.duplicate_policy;
        let mut entries = Vec::new();
        for manager in &server.managers {
            for service in manager.effective_services(&*self.properties, policy)? {
                entries.push((self.new_entry(service)?, service.init_state));
            }
        }

        let mut registered: Vec<ServiceName> = Vec::new();
        for (entry, _) in &entries {
            if let Err(e) = self.insert_entry(entry.clone()) {
                warn!("Rolling back {}: {}", resource, e);
                for name in registered.iter().rev() {
                    if let Err(e) = self.unregister(name) {
                        warn!("Rollback of {} failed: {}", name, e);
                    }
                }
                return Err(e);
            }
            registered.push(entry.name().clone());
        }

        for editor in &server.property_editors {
            self.editors
                .bind_source(&resource, &editor.type_name, &editor.editor);
        }
        self.deployments.lock().push(Deployment {
            resource: resource.clone(),
            services: registered.clone(),
        });

        // Older deployments may have been waiting for these names
        for name in &registered {
            self.retry_waiting_on(name);
        }

        let mut report = DeploymentReport {
            resource: resource.clone(),
            ..DeploymentReport::default()
        };
        for (entry, init_state) in &entries {
            let name = entry.name();
            let result = match init_state {
                LifecycleState::Created => self.create(name),
                _ => self.start(name),
            };
            match result {
                Ok(Transition::Waiting) => report.waiting.push(name.clone()),
                Ok(_) if entry.state() == LifecycleState::Started => report.started.push(name.clone()),
                Ok(_) => report.created.push(name.clone()),
                Err(e) => {
                    warn!("{} did not reach {}: {}", name, init_state, e);
                    report.failed.push(name.clone());
                }
            }
        }

        info!(
            "Deployed {}: {} started, {} created, {} waiting, {} failed",
            resource,
            report.started.len(),
            report.created.len(),
            report.waiting.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Destroy and unregister the services of `resource`, newest first
    pub fn undeploy(&self, resource: &str) -> Result<()> {
        let deployment = {
            let mut deployments = self.deployments.lock();
            let index = deployments
                .iter()
                .position(|d| d.resource == resource)
                .ok_or_else(|| ContainerError::NotDeployed(resource.to_string()))?;
            deployments.remove(index)
        };

        for name in deployment.services.iter().rev() {
            if let Err(e) = self.unregister(name) {
                warn!("Undeploy of {} could not remove {}: {}", resource, name, e);
            }
        }
        self.editors.unbind_source(resource);
        info!("Undeployed {} ({} services)", resource, deployment.services.len());
        Ok(())
    }

    /// Resources currently deployed, oldest first
    pub fn deployments(&self) -> Vec<String> {
        self.deployments
            .lock()
            .iter()
            .map(|d| d.resource.clone())
            .collect()
    }

    /// Fail if any service is still waiting or has failed
    pub fn check_loaded(&self) -> Result<()> {
        let mut services: BTreeSet<ServiceName> = self.waiting.lock().keys().cloned().collect();
        for name in self.service_names() {
            if self.lookup(&name).map(|e| e.state()) == Some(LifecycleState::Failed) {
                services.insert(name);
            }
        }
        if services.is_empty() {
            Ok(())
        } else {
            Err(DeploymentError::Unresolved {
                services: services.into_iter().collect(),
            }
            .into())
        }
    }

    /// Destroy every service, newest first, and drop all transformers
    pub fn shutdown(&self) {
        let names = self.registrations.lock().clone();
        for name in names.iter().rev() {
            if let Err(e) = self.destroy(name) {
                warn!("Shutdown could not destroy {}: {}", name, e);
            }
        }
        self.transforms.clear();
        info!("Container shut down ({} services)", names.len());
    }

    // ---- Registration ----

    /// Register an object built outside the container
    ///
    /// The entry starts out `Unknown`: the container will hand the object to
    /// dependents but never runs its lifecycle hooks.
    pub fn register_instance(&self, name: ServiceName, object: ObjectHandle) -> Result<()> {
        let entry = Arc::new(ManagedEntry::instance(name.clone(), object));
        self.insert_entry(entry)?;
        info!("Registered instance {}", name);
        self.retry_waiting_on(&name);
        Ok(())
    }

    /// Destroy `name` and remove it from its manager
    pub fn unregister(&self, name: &ServiceName) -> Result<Arc<ManagedEntry>> {
        self.destroy(name)?;
        let manager = self
            .manager(name.manager())
            .ok_or_else(|| ContainerError::NotFound(name.clone()))?;
        let entry = manager.unregister(name)?;
        for dependency in entry.depends_on() {
            if let Some(manager) = self.manager(dependency.manager()) {
                manager.remove_dependent(dependency, name);
            }
        }
        self.waiting.lock().remove(name);
        self.registrations.lock().retain(|n| n != name);

        let listeners = self.registration_listeners.read().clone();
        for listener in listeners {
            if let Err(e) = listener.unregistered(name) {
                warn!("Registration listener failed for {}: {}", name, e);
            }
        }
        Ok(entry)
    }

    fn new_entry(&self, service: &ServiceMetaData) -> Result<Arc<ManagedEntry>> {
        let props: &dyn PropertySource = &*self.properties;
        let policy = self.config.duplicate_policy;
        let name = ServiceName::new(service.manager(), &service.name);

        let effective = service.effective(props, policy)?;
        let mut depends_on = BTreeSet::new();
        for reference in effective.service_refs(props, policy)? {
            let dependency = reference
                .resolve(props)
                .map_err(|_| DefinitionError::InvalidServiceName {
                    resource: service.object.source.to_string(),
                    name: reference.raw.clone(),
                })?;
            depends_on.insert(dependency);
        }
        debug!("{} depends on {:?}", name, depends_on);
        Ok(Arc::new(ManagedEntry::new(
            name,
            Arc::new(service.clone()),
            depends_on,
        )))
    }

    /// Add an entry to its manager and record its edges
    pub(crate) fn insert_entry(&self, entry: Arc<ManagedEntry>) -> Result<()> {
        let name = entry.name().clone();
        self.manager_or_insert(name.manager())
            .register(entry.clone())?;
        for dependency in entry.depends_on() {
            self.manager_or_insert(dependency.manager())
                .add_dependent(dependency, &name);
        }
        self.registrations.lock().push(name.clone());

        let listeners = self.registration_listeners.read().clone();
        for listener in listeners {
            if let Err(e) = listener.registered(&entry) {
                warn!("Registration listener failed for {}: {}", name, e);
            }
        }
        Ok(())
    }

    // ---- Lookup ----

    pub fn manager(&self, name: &str) -> Option<Arc<ServiceManager>> {
        self.managers.read().get(name).cloned()
    }

    fn manager_or_insert(&self, name: &str) -> Arc<ServiceManager> {
        if let Some(manager) = self.manager(name) {
            return manager;
        }
        self.managers
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ServiceManager::new(name)))
            .clone()
    }

    /// Namespaces holding at least one service
    ///
    /// A namespace that is only referenced by dependencies is left out.
    pub fn manager_names(&self) -> Vec<String> {
        self.managers
            .read()
            .iter()
            .filter(|(_, manager)| !manager.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Swap the store behind one manager namespace
    pub fn set_repository(&self, manager: &str, repository: Box<dyn ServiceRepository>) -> Result<()> {
        self.manager_or_insert(manager).set_repository(repository)
    }

    pub(crate) fn lookup(&self, name: &ServiceName) -> Option<Arc<ManagedEntry>> {
        self.manager(name.manager()).and_then(|m| m.get(name))
    }

    /// Look up an entry, failing with `NotFound`
    pub fn entry(&self, name: &ServiceName) -> Result<Arc<ManagedEntry>> {
        self.lookup(name)
            .ok_or_else(|| ContainerError::NotFound(name.clone()))
    }

    /// Every registered name, in registration order
    pub fn service_names(&self) -> Vec<ServiceName> {
        self.registrations.lock().clone()
    }

    pub fn state(&self, name: &ServiceName) -> Result<LifecycleState> {
        self.entry(name).map(|e| e.state())
    }

    /// The error that left `name` in the `Failed` state
    pub fn failure(&self, name: &ServiceName) -> Result<Option<Arc<ContainerError>>> {
        self.entry(name).map(|e| e.failure())
    }

    pub fn object(&self, name: &ServiceName) -> Result<Option<ObjectHandle>> {
        self.entry(name).map(|e| e.object())
    }

    /// The built value, which need not be an object
    pub fn value(&self, name: &ServiceName) -> Result<Value> {
        self.entry(name).map(|e| e.value())
    }

    pub fn depends_on(&self, name: &ServiceName) -> Result<BTreeSet<ServiceName>> {
        self.entry(name).map(|e| e.depends_on().clone())
    }

    /// Services that depend on `name`, registered or not
    pub fn dependents_of(&self, name: &ServiceName) -> BTreeSet<ServiceName> {
        self.manager(name.manager())
            .map(|m| m.dependents_of(name))
            .unwrap_or_default()
    }

    /// Services parked until a dependency is registered
    pub fn waiting(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self.waiting.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Unregistered names `name` is waiting for
    pub fn waiting_causes(&self, name: &ServiceName) -> Option<BTreeSet<ServiceName>> {
        self.waiting.lock().get(name).map(|r| r.causes.clone())
    }

    // ---- Listeners ----

    pub fn add_registration_listener(&self, listener: impl RegistrationListener + 'static) {
        self.registration_listeners.write().push(Arc::new(listener));
    }

    /// Observe the state changes of one service
    pub fn add_state_listener(&self, name: &ServiceName, listener: impl StateListener + 'static) {
        self.state_listeners
            .write()
            .entry(name.clone())
            .or_default()
            .push(Arc::new(listener));
    }

    // ---- Management ----

    fn live_object(&self, name: &ServiceName) -> Result<ObjectHandle> {
        self.object(name)?
            .ok_or_else(|| ContainerError::NotInstantiated(name.clone()))
    }

    pub fn get_attribute(&self, name: &ServiceName, attribute: &str) -> Result<Value> {
        Ok(self.live_object(name)?.get_attribute(attribute)?)
    }

    pub fn set_attribute(&self, name: &ServiceName, attribute: &str, value: Value) -> Result<()> {
        Ok(self.live_object(name)?.set_attribute(attribute, value)?)
    }

    /// Call an operation of a live service
    pub fn invoke(&self, name: &ServiceName, operation: &str, args: &[Value]) -> Result<Value> {
        let declared = vec![None; args.len()];
        let produced = self.live_object(name)?.invoke(operation, args, &declared)?;
        Ok(produced.into_value(&*self.types)?)
    }

    /// Attributes and operations of a service's type
    ///
    /// Works before the service is created by looking its type up by code.
    pub fn management_descriptor(&self, name: &ServiceName) -> Result<ManagementDescriptor> {
        let entry = self.entry(name)?;
        if let Some(object) = entry.object() {
            return Ok(ManagementDescriptor::from_descriptor(object.descriptor()));
        }
        let code = entry.definition().object.code.clone().unwrap_or_default();
        let descriptor = self
            .types
            .descriptor(&code)
            .ok_or(ReflectError::UnknownType { code })?;
        Ok(ManagementDescriptor::from_descriptor(&descriptor))
    }
}
