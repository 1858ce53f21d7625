//! Errors raised while introspecting types and building objects

use thiserror::Error;

/// Type alias for reflection results
pub type Result<T> = std::result::Result<T, ReflectError>;

/// Boxed error raised by user code behind a descriptor
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while constructing or manipulating an object
#[derive(Error, Debug)]
pub enum ReflectError {
    /// No descriptor is registered for the type name
    #[error("Unknown type: {code}")]
    UnknownType { code: String },

    /// No constructor, factory or target method accepts the given arguments
    #[error("No constructor of {code} takes {arity} argument(s)")]
    NoSuchConstructor { code: String, arity: usize },

    /// The type has no field or attribute with this name
    #[error("{code} has no settable property '{name}'")]
    NoSuchAttribute { code: String, name: String },

    /// The type has no operation with this name and arity
    #[error("{code} has no operation '{name}' taking {arity} argument(s)")]
    NoSuchOperation {
        code: String,
        name: String,
        arity: usize,
    },

    /// The type has no static method or static field with this name
    #[error("{code} has no static member '{name}'")]
    NoSuchStaticMember { code: String, name: String },

    /// Text could not be converted by the property editor for its type
    #[error("Cannot convert '{text}' to {type_name}: {reason}")]
    Conversion {
        type_name: String,
        text: String,
        reason: String,
    },

    /// A value was not of the kind the receiver expected
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Constructing or configuring an object failed
    #[error("Failed to construct {code}: {message}")]
    Construction {
        code: String,
        message: String,
        #[source]
        source: Option<Box<ReflectError>>,
    },

    /// A constructor, setter, operation or hook returned an error
    #[error("Invocation of '{name}' failed: {source}")]
    Invocation {
        name: String,
        #[source]
        source: BoxError,
    },

    /// A service reference could not be resolved to a live object
    #[error("Unresolved service reference {service}: {reason}")]
    Unresolved { service: String, reason: String },
}

impl ReflectError {
    /// Whether the error aborts construction of the enclosing object
    ///
    /// Only an unknown property name is tolerated; the builder logs it and
    /// moves on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReflectError::NoSuchAttribute { .. })
    }

    pub(crate) fn invocation(name: &str, source: anyhow::Error) -> Self {
        ReflectError::Invocation {
            name: name.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn construction(code: &str, message: impl Into<String>, source: ReflectError) -> Self {
        ReflectError::Construction {
            code: code.to_string(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_attributes_are_tolerated() {
        let missing = ReflectError::NoSuchAttribute {
            code: "pkg.Foo".to_string(),
            name: "Bar".to_string(),
        };
        assert!(!missing.is_fatal());

        let unknown = ReflectError::UnknownType {
            code: "pkg.Foo".to_string(),
        };
        assert!(unknown.is_fatal());
    }

    #[test]
    fn test_construction_chains_its_cause() {
        use std::error::Error;

        let cause = ReflectError::invocation("setPort", anyhow::anyhow!("port in use"));
        let err = ReflectError::construction("pkg.Server", "cannot set attribute 'Port'", cause);
        let source = err.source().unwrap();
        assert!(source.to_string().contains("port in use"));
    }
}
