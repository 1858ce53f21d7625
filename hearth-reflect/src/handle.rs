//! Shared handles to live objects

use crate::descriptor::{select, Produced, TypeDescriptor};
use crate::error::{ReflectError, Result};
use crate::lifecycle::LifecyclePhase;
use crate::value::Value;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A live object together with the descriptor that knows how to drive it
///
/// Cloning a handle shares the object. Every access goes through the
/// object's mutex, so a handle can be passed between threads freely.
#[derive(Clone)]
pub struct ObjectHandle {
    object: Arc<Mutex<Box<dyn Any + Send>>>,
    descriptor: Arc<TypeDescriptor>,
}

impl ObjectHandle {
    /// Wrap `value`, checking that `descriptor` describes `T`
    pub fn new<T: Any + Send>(value: T, descriptor: Arc<TypeDescriptor>) -> Result<Self> {
        Self::from_boxed(Box::new(value), descriptor)
    }

    pub(crate) fn from_boxed(object: Box<dyn Any + Send>, descriptor: Arc<TypeDescriptor>) -> Result<Self> {
        // `Any::type_id` on the box itself would report the box type
        let actual = (*object).type_id();
        if actual != descriptor.rust_type_id() {
            return Err(ReflectError::TypeMismatch {
                expected: descriptor.rust_type().to_string(),
                found: format!("{:?}", actual),
            });
        }
        Ok(Self {
            object: Arc::new(Mutex::new(object)),
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Definition type name of the object
    pub fn code(&self) -> &str {
        self.descriptor.code()
    }

    /// Whether both handles share the same object
    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }

    pub fn is<T: Any>(&self) -> bool {
        self.descriptor.rust_type_id() == TypeId::of::<T>()
    }

    /// Borrow the object as `T`; `None` if it is some other type
    pub fn with<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.object.lock();
        guard.downcast_ref::<T>().map(f)
    }

    /// Mutably borrow the object as `T`; `None` if it is some other type
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.object.lock();
        guard.downcast_mut::<T>().map(f)
    }

    /// Assign a field directly
    pub fn set_field(&self, name: &str, value: Value) -> Result<()> {
        let field = self.descriptor.field(name).ok_or_else(|| self.no_such_attribute(name))?;
        let mut guard = self.object.lock();
        field.set(guard.as_mut(), value)
    }

    /// Call the setter of an attribute
    pub fn set_attribute(&self, name: &str, value: Value) -> Result<()> {
        let attribute = self
            .descriptor
            .attribute(name)
            .ok_or_else(|| self.no_such_attribute(name))?;
        let mut guard = self.object.lock();
        attribute
            .set(guard.as_mut(), value)
            .unwrap_or_else(|| Err(self.no_such_attribute(name)))
    }

    /// Call the getter of an attribute
    pub fn get_attribute(&self, name: &str) -> Result<Value> {
        let attribute = self
            .descriptor
            .attribute(name)
            .ok_or_else(|| self.no_such_attribute(name))?;
        let guard = self.object.lock();
        attribute
            .get(guard.as_ref())
            .unwrap_or_else(|| Err(self.no_such_attribute(name)))
    }

    /// Call an operation, choosing the overload by arity and argument types
    ///
    /// The object stays locked for the duration of the call, so an operation
    /// must not call back into its own handle.
    pub fn invoke(&self, name: &str, args: &[Value], declared: &[Option<&str>]) -> Result<Produced> {
        let operation = select(self.descriptor.operations_named(name), declared).ok_or_else(|| {
            ReflectError::NoSuchOperation {
                code: self.code().to_string(),
                name: name.to_string(),
                arity: args.len(),
            }
        })?;
        let mut guard = self.object.lock();
        operation.call(guard.as_mut(), args)
    }

    /// Run a lifecycle hook; types without hooks accept every phase
    pub fn lifecycle(&self, phase: LifecyclePhase) -> Result<()> {
        if !self.descriptor.has_lifecycle() {
            return Ok(());
        }
        let mut guard = self.object.lock();
        self.descriptor.run_lifecycle(guard.as_mut(), phase)
    }

    fn no_such_attribute(&self, name: &str) -> ReflectError {
        ReflectError::NoSuchAttribute {
            code: self.code().to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("code", &self.code())
            .field("rust_type", &self.descriptor.rust_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;

    #[derive(Default)]
    struct Gauge {
        value: i64,
        starts: usize,
    }

    impl Lifecycle for Gauge {
        fn start(&mut self) -> anyhow::Result<()> {
            self.starts += 1;
            Ok(())
        }

        fn stop(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("gauge is stuck")
        }
    }

    fn handle() -> ObjectHandle {
        let descriptor = TypeDescriptor::builder::<Gauge>("test.Gauge")
            .default_constructor(Gauge::default)
            .property("Value", "long", |g: &Gauge| g.value, |g: &mut Gauge, v: i64| {
                g.value = v;
                Ok(())
            })
            .operation("add", &["long"], "long", |g: &mut Gauge, args| {
                g.value += args.get::<i64>(0)?;
                Ok(Value::Int(g.value))
            })
            .lifecycle()
            .build();
        ObjectHandle::new(Gauge::default(), descriptor).unwrap()
    }

    #[test]
    fn test_attribute_access() {
        let gauge = handle();
        gauge.set_attribute("Value", Value::Int(4)).unwrap();
        assert_eq!(gauge.get_attribute("Value").unwrap(), Value::Int(4));

        let err = gauge.set_attribute("Missing", Value::Null).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_invoke_operation() {
        let gauge = handle();
        let result = gauge.invoke("add", &[Value::Int(5)], &[None]).unwrap();
        assert!(matches!(result, Produced::Value(Value::Int(5))));

        let err = gauge.invoke("add", &[], &[]).unwrap_err();
        assert!(matches!(err, ReflectError::NoSuchOperation { arity: 0, .. }));
    }

    #[test]
    fn test_lifecycle_hooks() {
        let gauge = handle();
        gauge.lifecycle(LifecyclePhase::Create).unwrap();
        gauge.lifecycle(LifecyclePhase::Start).unwrap();
        assert_eq!(gauge.with(|g: &Gauge| g.starts), Some(1));

        let err = gauge.lifecycle(LifecyclePhase::Stop).unwrap_err();
        assert!(err.to_string().contains("gauge is stuck"));
    }

    #[test]
    fn test_descriptor_must_match_value() {
        let descriptor = TypeDescriptor::builder::<Gauge>("test.Gauge").build();
        assert!(ObjectHandle::new(String::from("not a gauge"), descriptor).is_err());
    }

    #[test]
    fn test_handle_knows_its_type() {
        let gauge = handle();
        assert!(gauge.is::<Gauge>());
        assert!(!gauge.is::<String>());
        assert_eq!(gauge.descriptor().rust_type_id(), TypeId::of::<Gauge>());
    }

    #[test]
    fn test_clones_share_the_object() {
        let a = handle();
        let b = a.clone();
        b.with_mut(|g: &mut Gauge| g.value = 9);
        assert_eq!(a.with(|g: &Gauge| g.value), Some(9));
        assert!(a.ptr_eq(&b));
    }
}
