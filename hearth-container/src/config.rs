//! Container configuration loaded from TOML

use crate::error::{ContainerError, Result};
use hearth_metadata::{DuplicatePolicy, LifecycleState, ParseOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Directory scanning settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Glob matched against file names
    pub pattern: String,
    /// Fail the scan when services are left waiting or failed
    pub check_loaded: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            pattern: "*-service.xml".to_string(),
            check_loaded: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` overrides them
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Container configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Reject unknown definition elements
    pub validate: bool,
    /// How two matched `ifdef` blocks declaring the same name are merged
    pub duplicate_policy: DuplicatePolicy,
    /// `initState` of services that do not declare one
    pub default_init_state: LifecycleState,
    pub directory: DirectoryConfig,
    pub logging: LoggingConfig,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            validate: false,
            duplicate_policy: DuplicatePolicy::default(),
            default_init_state: LifecycleState::Started,
            directory: DirectoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ContainerConfig {
    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| ContainerError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ContainerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            validate: self.validate,
            default_init_state: self.default_init_state,
        }
    }

    fn check(&self) -> Result<()> {
        if !matches!(
            self.default_init_state,
            LifecycleState::Created | LifecycleState::Started
        ) {
            return Err(ContainerError::Config(format!(
                "default_init_state must be Created or Started, not {}",
                self.default_init_state
            )));
        }
        glob::Pattern::new(&self.directory.pattern).map_err(|e| {
            ContainerError::Config(format!("Invalid pattern '{}': {}", self.directory.pattern, e))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = ContainerConfig::from_toml("").unwrap();
        assert_eq!(config, ContainerConfig::default());
        assert_eq!(config.directory.pattern, "*-service.xml");
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_full_document() {
        let config = ContainerConfig::from_toml(
            r#"
            validate = true
            duplicate_policy = "reject"
            default_init_state = "Created"

            [directory]
            pattern = "*.xml"
            check_loaded = false

            [logging]
            filter = "hearth_container=debug"
            "#,
        )
        .unwrap();

        assert!(config.validate);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(config.parse_options().default_init_state, LifecycleState::Created);
        assert!(!config.directory.check_loaded);
        assert_eq!(config.logging.filter, "hearth_container=debug");
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = ContainerConfig::from_toml(r#"default_init_state = "Stopped""#).unwrap_err();
        assert!(err.to_string().contains("default_init_state"));

        assert!(ContainerConfig::from_toml("validate = 3").is_err());
        assert!(ContainerConfig::from_toml("[directory]\npattern = \"[\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hearth.toml");
        std::fs::write(&path, "validate = true\n").unwrap();
        assert!(ContainerConfig::from_file(&path).unwrap().validate);

        let err = ContainerConfig::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ContainerError::Io { .. }));
    }
}
