//! Service container for Hearth
//!
//! Definition sources are deployed into a [`Container`], which registers each
//! service with the [`ServiceManager`] of its namespace and drives it through
//! its lifecycle in dependency order. Services whose dependencies are not
//! registered yet are parked and retried as soon as those names appear.
//!
//! The object model lives in `hearth-reflect` and the definition model in
//! `hearth-metadata`; both are re-exported here for convenience.

pub mod builder;
pub mod config;
pub mod container;
pub mod entry;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod logging;
pub mod manager;
pub mod repository;
pub mod transform;

pub use builder::ContainerBuilder;
pub use config::{ContainerConfig, DirectoryConfig, LoggingConfig};
pub use container::{Container, DeploymentReport};
pub use entry::{ManagedEntry, INSTANCE_SOURCE};
pub use error::{ContainerError, DeploymentError, Result};
pub use lifecycle::{RegistrationListener, StateListener, Transition};
pub use loader::DirectoryLoader;
pub use logging::init_logging;
pub use manager::ServiceManager;
pub use repository::{BoundedRepository, MemoryRepository, ServiceRepository};
pub use transform::{ByteTransformer, TransformRegistry};

pub use hearth_metadata as metadata;
pub use hearth_reflect as reflect;
pub use hearth_metadata::{LifecycleState, ServiceName};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        Container, ContainerBuilder, ContainerConfig, ContainerError, LifecycleState, Result,
        ServiceName, Transition,
    };
    pub use hearth_reflect::prelude::*;
}
