//! Lookup of type descriptors by definition type name

use crate::descriptor::TypeDescriptor;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Capability lookup for the types the builder may construct
///
/// Only [`TypeIntrospector::descriptor`] is required; the listing methods
/// derive from it.
pub trait TypeIntrospector: Send + Sync {
    /// Descriptor registered for `code`
    fn descriptor(&self, code: &str) -> Option<Arc<TypeDescriptor>>;

    /// Parameter type lists of every constructor of `code`
    fn constructors(&self, code: &str) -> Vec<Vec<String>> {
        self.descriptor(code)
            .map(|d| d.constructors().iter().map(|c| c.params.clone()).collect())
            .unwrap_or_default()
    }

    /// Names that can be assigned: fields and attributes with a setter
    fn settable_properties(&self, code: &str) -> Vec<String> {
        self.descriptor(code)
            .map(|d| {
                d.fields()
                    .iter()
                    .map(|f| f.name.clone())
                    .chain(
                        d.attributes()
                            .iter()
                            .filter(|a| a.is_writable())
                            .map(|a| a.name.clone()),
                    )
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Attributes with a getter
    fn readable_properties(&self, code: &str) -> Vec<String> {
        self.descriptor(code)
            .map(|d| {
                d.attributes()
                    .iter()
                    .filter(|a| a.is_readable())
                    .map(|a| a.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of the instance operations, overloads listed once
    fn operations(&self, code: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .descriptor(code)
            .map(|d| d.operations().iter().map(|o| o.name.clone()).collect())
            .unwrap_or_default();
        names.dedup();
        names
    }
}

/// Default in-memory introspector filled by explicit registration
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<FxHashMap<String, Arc<TypeDescriptor>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing any previous one with the same code
    pub fn register(&self, descriptor: Arc<TypeDescriptor>) {
        debug!("Registered type {} ({})", descriptor.code(), descriptor.rust_type());
        self.types
            .write()
            .insert(descriptor.code().to_string(), descriptor);
    }

    /// Builder-style registration
    pub fn with(self, descriptor: Arc<TypeDescriptor>) -> Self {
        self.register(descriptor);
        self
    }

    pub fn unregister(&self, code: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.write().remove(code)
    }

    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.types.read().keys().cloned().collect();
        codes.sort();
        codes
    }
}

impl TypeIntrospector for TypeRegistry {
    fn descriptor(&self, code: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.read().get(code).cloned()
    }
}

impl<T: TypeIntrospector + ?Sized> TypeIntrospector for Arc<T> {
    fn descriptor(&self, code: &str) -> Option<Arc<TypeDescriptor>> {
        (**self).descriptor(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    struct Sensor {
        level: i64,
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::new().with(
            TypeDescriptor::builder::<Sensor>("test.Sensor")
                .default_constructor(|| Sensor { level: 0 })
                .constructor(&["long"], |args| Ok(Sensor { level: args.get(0)? }))
                .field("level", "long", |p: &mut Sensor, v: i64| p.level = v)
                .getter("Level", "long", |p: &Sensor| p.level)
                .setter("Threshold", "long", |_: &mut Sensor, _: i64| Ok(()))
                .operation("reset", &[], "void", |p: &mut Sensor, _| {
                    p.level = 0;
                    Ok(Value::Null)
                })
                .operation("reset", &["long"], "void", |p: &mut Sensor, args| {
                    p.level = args.get(0)?;
                    Ok(Value::Null)
                })
                .build(),
        )
    }

    #[test]
    fn test_capability_listing() {
        let registry = registry();
        assert_eq!(registry.constructors("test.Sensor"), vec![vec![], vec!["long".to_string()]]);
        assert_eq!(registry.settable_properties("test.Sensor"), ["level", "Threshold"]);
        assert_eq!(registry.readable_properties("test.Sensor"), ["Level"]);
        assert_eq!(registry.operations("test.Sensor"), ["reset"]);
    }

    #[test]
    fn test_unknown_code() {
        let registry = registry();
        assert!(registry.descriptor("test.Missing").is_none());
        assert!(registry.operations("test.Missing").is_empty());
        assert_eq!(registry.codes(), ["test.Sensor"]);
    }
}
