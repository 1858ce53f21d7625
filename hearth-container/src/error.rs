//! Error types for the container

use hearth_metadata::{DefinitionError, ServiceName};
use hearth_reflect::ReflectError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, ContainerError>;

fn join(names: &[ServiceName]) -> String {
    names
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Problems with the dependency graph of a deployment
#[derive(Error, Debug)]
pub enum DeploymentError {
    /// The dependency graph loops back on itself
    #[error("Circular dependency detected: {}", path.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "))]
    Cycle { path: Vec<ServiceName> },

    /// A dependency is in the `Failed` state and is not retried
    #[error("Service {service} depends on failed service {dependency}")]
    DependencyFailed {
        service: ServiceName,
        dependency: ServiceName,
        /// What left the dependency `Failed`
        #[source]
        source: Option<Arc<ContainerError>>,
    },

    /// The service itself is `Failed`; only a destroy clears it
    #[error("Service {service} has failed and must be destroyed before it can be used again")]
    Failed { service: ServiceName },

    /// Services still waiting or failed after loading completed
    #[error("Incomplete deployment, unresolved services: {}", join(services))]
    Unresolved { services: Vec<ServiceName> },

    /// A dependency has not been registered yet
    #[error("Service {service} is waiting for {}", join(causes))]
    Waiting {
        service: ServiceName,
        causes: Vec<ServiceName>,
    },
}

/// Errors that can occur while deploying or driving services
#[derive(Error, Debug)]
pub enum ContainerError {
    /// The definition source is malformed
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Building or calling into an object failed
    #[error("Object error: {0}")]
    Construction(#[from] ReflectError),

    #[error(transparent)]
    Deployment(#[from] DeploymentError),

    /// A create or start failed and left the service `Failed`
    #[error("Service {service} failed: {source}")]
    Failed {
        service: ServiceName,
        source: Arc<ContainerError>,
    },

    #[error("Service not found: {0}")]
    NotFound(ServiceName),

    #[error("Service already registered: {0}")]
    AlreadyRegistered(ServiceName),

    /// The service has no live object to manage
    #[error("Service {0} has no instance")]
    NotInstantiated(ServiceName),

    #[error("Resource already deployed: {0}")]
    AlreadyDeployed(String),

    #[error("Resource not deployed: {0}")]
    NotDeployed(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A byte transformer rejected a resource
    #[error("Transform of {name} failed: {source}")]
    Transform {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContainerError {
    /// Whether this error came from a dependency problem
    pub fn is_deployment(&self) -> bool {
        match self {
            ContainerError::Deployment(_) => true,
            ContainerError::Failed { source, .. } => source.is_deployment(),
            _ => false,
        }
    }
}
