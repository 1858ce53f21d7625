//! Serializable management view of a type

use crate::descriptor::TypeDescriptor;
use crate::lifecycle::LifecyclePhase;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub readable: bool,
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationInfo {
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
}

/// The attributes and operations a management console may call
///
/// Types with lifecycle hooks expose `create`, `start`, `stop` and `destroy`
/// as extra no-argument operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagementDescriptor {
    pub code: String,
    pub attributes: Vec<AttributeInfo>,
    pub operations: Vec<OperationInfo>,
}

impl ManagementDescriptor {
    pub fn from_descriptor(descriptor: &TypeDescriptor) -> Self {
        let attributes = descriptor
            .attributes()
            .iter()
            .map(|a| AttributeInfo {
                name: a.name.clone(),
                type_name: a.type_name.clone(),
                readable: a.is_readable(),
                writable: a.is_writable(),
            })
            .collect();

        let mut operations: Vec<OperationInfo> = descriptor
            .operations()
            .iter()
            .map(|o| OperationInfo {
                name: o.name.clone(),
                params: o.params.clone(),
                return_type: o.return_type.clone(),
            })
            .collect();
        if descriptor.has_lifecycle() {
            operations.extend(LifecyclePhase::ALL.iter().map(|phase| OperationInfo {
                name: phase.as_str().to_string(),
                params: Vec::new(),
                return_type: "void".to_string(),
            }));
        }

        Self {
            code: descriptor.code().to_string(),
            attributes,
            operations,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;
    use crate::value::Value;

    #[derive(Default)]
    struct Pool {
        size: i64,
    }

    impl Lifecycle for Pool {}

    #[test]
    fn test_lifecycle_operations_are_listed() {
        let descriptor = TypeDescriptor::builder::<Pool>("test.Pool")
            .default_constructor(Pool::default)
            .property("Size", "int", |p: &Pool| p.size, |p: &mut Pool, v: i64| {
                p.size = v;
                Ok(())
            })
            .operation("drain", &[], "void", |_: &mut Pool, _| Ok(Value::Null))
            .lifecycle()
            .build();

        let view = ManagementDescriptor::from_descriptor(&descriptor);
        assert_eq!(view.attributes.len(), 1);
        assert!(view.attributes[0].readable && view.attributes[0].writable);
        let names: Vec<&str> = view.operations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["drain", "create", "start", "stop", "destroy"]);

        let json: serde_json::Value = serde_json::from_str(&view.to_json().unwrap()).unwrap();
        assert_eq!(json["attributes"][0]["type"], "int");
        assert_eq!(json["code"], "test.Pool");
    }

    #[test]
    fn test_plain_types_have_no_lifecycle_operations() {
        let descriptor = TypeDescriptor::builder::<Pool>("test.Pool").build();
        let view = ManagementDescriptor::from_descriptor(&descriptor);
        assert!(view.operations.is_empty());
    }
}
