//! Manager-qualified service names

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator between the manager and service parts of a name
pub const SEPARATOR: char = '#';

/// A service name could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid service name '{0}': expected 'manager#service'")]
pub struct NameError(pub String);

/// A `(manager, service)` pair identifying one managed object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceName {
    manager: String,
    service: String,
}

impl ServiceName {
    /// Create a name from its two parts
    pub fn new(manager: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
            service: service.into(),
        }
    }

    /// Parse `manager#service`, or a bare `service` relative to `default_manager`
    pub fn resolve(text: &str, default_manager: &str) -> Result<Self, NameError> {
        let text = text.trim();
        let (manager, service) = match text.split_once(SEPARATOR) {
            Some((manager, service)) => (manager.trim(), service.trim()),
            None => (default_manager, text),
        };

        if manager.is_empty() || service.is_empty() || service.contains(SEPARATOR) {
            return Err(NameError(text.to_string()));
        }

        Ok(Self::new(manager, service))
    }

    /// The manager namespace
    pub fn manager(&self) -> &str {
        &self.manager
    }

    /// The service name within its manager
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.manager, SEPARATOR, self.service)
    }
}

impl FromStr for ServiceName {
    type Err = NameError;

    /// Parse a fully qualified `manager#service`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains(SEPARATOR) {
            return Err(NameError(s.to_string()));
        }
        Self::resolve(s, "")
    }
}
