//! Definition error types

use thiserror::Error;

/// Type alias for metadata results
pub type Result<T> = std::result::Result<T, DefinitionError>;

/// Errors raised while importing a definition source
///
/// Every variant names the resource the definition came from so a failure in
/// a directory of definition files can be traced back to its file.
#[derive(Error, Debug)]
pub enum DefinitionError {
    /// The element tag did not match what the parser expected at this position
    #[error("{resource}: expected <{expected}> but found <{found}>")]
    UnexpectedElement {
        /// Resource identifier of the definition source
        resource: String,
        /// Element name(s) accepted at this position
        expected: String,
        /// Element name actually found
        found: String,
    },

    /// A required attribute is absent
    #[error("{resource}: <{element}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        /// Resource identifier of the definition source
        resource: String,
        /// Element carrying the attribute
        element: String,
        /// Name of the missing attribute
        attribute: String,
    },

    /// A child element that must be unique occurs more than once
    #[error("{resource}: <{element}> may contain at most one <{child}>")]
    DuplicateElement {
        /// Resource identifier of the definition source
        resource: String,
        /// Enclosing element
        element: String,
        /// The repeated child element
        child: String,
    },

    /// A named child (field, attribute, service) is declared twice
    #[error("{resource}: <{element}> declares '{name}' more than once")]
    DuplicateName {
        /// Resource identifier of the definition source
        resource: String,
        /// Element kind of the duplicated declaration
        element: String,
        /// The duplicated name
        name: String,
    },

    /// An attribute has a value outside its vocabulary
    #[error("{resource}: invalid value '{value}' for attribute '{attribute}' of <{element}>")]
    InvalidAttribute {
        /// Resource identifier of the definition source
        resource: String,
        /// Element carrying the attribute
        element: String,
        /// Attribute name
        attribute: String,
        /// Offending value
        value: String,
    },

    /// A service reference could not be read as `manager#service`
    #[error("{resource}: invalid service name '{name}'")]
    InvalidServiceName {
        /// Resource identifier of the definition source
        resource: String,
        /// The text that failed to parse
        name: String,
    },

    /// Matched conditional blocks disagree about a unique child
    #[error("{resource}: conditional blocks of <{element}> both declare {what}")]
    ConflictingConditional {
        /// Resource identifier of the definition source
        resource: String,
        /// Element owning the conditional blocks
        element: String,
        /// Description of the conflicting declaration
        what: String,
    },

    /// The source is not well-formed XML
    #[error("{resource}: malformed definition document")]
    Xml {
        /// Resource identifier of the definition source
        resource: String,
        /// The underlying XML error
        #[source]
        source: roxmltree::Error,
    },

    /// The source could not be read
    #[error("{resource}: failed to read definition")]
    Io {
        /// Resource identifier of the definition source
        resource: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl DefinitionError {
    /// Resource identifier of the definition that failed
    pub fn resource(&self) -> &str {
        match self {
            DefinitionError::UnexpectedElement { resource, .. }
            | DefinitionError::MissingAttribute { resource, .. }
            | DefinitionError::DuplicateElement { resource, .. }
            | DefinitionError::DuplicateName { resource, .. }
            | DefinitionError::InvalidAttribute { resource, .. }
            | DefinitionError::InvalidServiceName { resource, .. }
            | DefinitionError::ConflictingConditional { resource, .. }
            | DefinitionError::Xml { resource, .. }
            | DefinitionError::Io { resource, .. } => resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_missing_attribute_message() {
        let err = DefinitionError::MissingAttribute {
            resource: "app-service.xml".to_string(),
            element: "service".to_string(),
            attribute: "name".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "app-service.xml: <service> is missing required attribute 'name'"
        );
        assert_eq!(err.resource(), "app-service.xml");
    }

    #[test]
    fn test_io_error_is_chained() {
        let err = DefinitionError::Io {
            resource: "missing.xml".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
    }
}
