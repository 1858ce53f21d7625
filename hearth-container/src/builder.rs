//! Container builder for fluent configuration

use crate::config::ContainerConfig;
use crate::container::Container;
use hearth_metadata::{EnvPropertySource, PropertySource};
use hearth_reflect::{PropertyEditorRegistry, TypeIntrospector, TypeRegistry};
use std::sync::Arc;

/// Builder for constructing a container
pub struct ContainerBuilder {
    config: ContainerConfig,
    types: Option<Arc<dyn TypeIntrospector>>,
    properties: Option<Arc<dyn PropertySource + Send + Sync>>,
    editors: Option<PropertyEditorRegistry>,
}

impl ContainerBuilder {
    /// Create a new container builder
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
            types: None,
            properties: None,
            editors: None,
        }
    }

    pub fn config(&mut self, config: ContainerConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// Types the container may construct; empty by default
    pub fn types(&mut self, types: Arc<dyn TypeIntrospector>) -> &mut Self {
        self.types = Some(types);
        self
    }

    /// Source for `ifdef` predicates and `${...}` placeholders; the process
    /// environment by default
    pub fn properties(&mut self, properties: impl PropertySource + Send + Sync + 'static) -> &mut Self {
        self.properties = Some(Arc::new(properties));
        self
    }

    /// Property editors; the built-in set by default
    pub fn editors(&mut self, editors: PropertyEditorRegistry) -> &mut Self {
        self.editors = Some(editors);
        self
    }

    /// Build the container
    ///
    /// Collaborators that were set are moved into the container, so a second
    /// build falls back to the defaults for them.
    pub fn build(&mut self) -> Container {
        Container::assemble(
            self.config.clone(),
            self.types
                .take()
                .unwrap_or_else(|| Arc::new(TypeRegistry::new())),
            self.properties
                .take()
                .unwrap_or_else(|| Arc::new(EnvPropertySource)),
            self.editors.take().unwrap_or_default(),
        )
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_metadata::{LifecycleState, MapPropertySource};

    #[test]
    fn test_defaults() {
        let container = ContainerBuilder::new().build();
        assert_eq!(container.config(), &ContainerConfig::default());
        assert!(container.transforms().is_empty());
        assert!(container.manager_names().is_empty());
    }

    #[test]
    fn test_fluent_configuration() {
        let config = ContainerConfig {
            default_init_state: LifecycleState::Created,
            ..ContainerConfig::default()
        };
        let mut builder = ContainerBuilder::new();
        builder
            .config(config.clone())
            .types(Arc::new(TypeRegistry::new()))
            .properties(MapPropertySource::from_pairs([("env", "dev")]))
            .editors(PropertyEditorRegistry::empty());

        let container = builder.build();
        assert_eq!(container.config(), &config);
        assert!(container.editors().editor_for(None, "int").is_none());
    }
}
