//! Type descriptors: what the builder may call on a registered type
//!
//! A [`TypeDescriptor`] is the compile-time registration of a Rust type under
//! a definition `code`. It lists constructors, directly assignable fields,
//! getter/setter attributes, operations, static members, and optional
//! lifecycle hooks. Every entry is a type-erased closure over
//! `dyn Any + Send`, so a descriptor can drive an object it has never seen
//! statically.

use crate::error::{ReflectError, Result};
use crate::introspect::TypeIntrospector;
use crate::lifecycle::{Lifecycle, LifecyclePhase};
use crate::value::{Args, FromValue, Value};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type Factory = Arc<dyn Fn(Args<'_>) -> Result<Box<dyn Any + Send>> + Send + Sync>;
type Setter = Arc<dyn Fn(&mut (dyn Any + Send), Value) -> Result<()> + Send + Sync>;
type Getter = Arc<dyn Fn(&(dyn Any + Send)) -> Result<Value> + Send + Sync>;
type Method = Arc<dyn Fn(&mut (dyn Any + Send), Args<'_>) -> Result<Produced> + Send + Sync>;
type StaticMethod = Arc<dyn Fn(Args<'_>) -> Result<Produced> + Send + Sync>;
type StaticRead = Arc<dyn Fn() -> Produced + Send + Sync>;
type Hook = Arc<dyn Fn(&mut (dyn Any + Send), LifecyclePhase) -> Result<()> + Send + Sync>;

/// Result of calling an operation or static member
pub enum Produced {
    /// A plain value
    Value(Value),
    /// A new object that still needs to be paired with its descriptor
    Instance {
        code: String,
        object: Box<dyn Any + Send>,
    },
}

impl Produced {
    /// Turn the result into a [`Value`], wrapping new objects in a handle
    pub fn into_value(self, introspector: &dyn TypeIntrospector) -> Result<Value> {
        match self {
            Produced::Value(value) => Ok(value),
            Produced::Instance { code, object } => {
                let descriptor = introspector
                    .descriptor(&code)
                    .ok_or(ReflectError::UnknownType { code })?;
                crate::handle::ObjectHandle::from_boxed(object, descriptor).map(Value::Object)
            }
        }
    }
}

impl fmt::Debug for Produced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Produced::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Produced::Instance { code, .. } => write!(f, "Instance({})", code),
        }
    }
}

/// Anything with a positional parameter list
pub trait Signature {
    fn params(&self) -> &[String];
}

/// Pick the candidate for `declared` argument types
///
/// Candidates must match the arity. Among those, one whose parameter types
/// equal every declared argument type wins; otherwise the first one does.
pub fn select<'d, S: Signature>(
    candidates: impl IntoIterator<Item = &'d S>,
    declared: &[Option<&str>],
) -> Option<&'d S> {
    let by_arity: Vec<&S> = candidates
        .into_iter()
        .filter(|c| c.params().len() == declared.len())
        .collect();

    by_arity
        .iter()
        .find(|c| {
            c.params()
                .iter()
                .zip(declared)
                .all(|(param, declared)| declared.map_or(true, |d| d == param))
        })
        .or_else(|| by_arity.first())
        .copied()
}

pub struct ConstructorDescriptor {
    pub params: Vec<String>,
    factory: Factory,
}

impl ConstructorDescriptor {
    pub(crate) fn construct(&self, args: &[Value]) -> Result<Box<dyn Any + Send>> {
        (self.factory)(Args::new(args))
    }
}

impl Signature for ConstructorDescriptor {
    fn params(&self) -> &[String] {
        &self.params
    }
}

/// A directly assignable field
pub struct FieldDescriptor {
    pub name: String,
    pub type_name: String,
    set: Setter,
}

impl FieldDescriptor {
    pub(crate) fn set(&self, target: &mut (dyn Any + Send), value: Value) -> Result<()> {
        (self.set)(target, value)
    }
}

/// A named property reached through a getter and/or a setter
pub struct AttributeDescriptor {
    pub name: String,
    pub type_name: String,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl AttributeDescriptor {
    pub fn is_readable(&self) -> bool {
        self.getter.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    pub(crate) fn get(&self, target: &(dyn Any + Send)) -> Option<Result<Value>> {
        self.getter.as_ref().map(|get| get(target))
    }

    pub(crate) fn set(&self, target: &mut (dyn Any + Send), value: Value) -> Option<Result<()>> {
        self.setter.as_ref().map(|set| set(target, value))
    }
}

/// An instance method
pub struct OperationDescriptor {
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
    call: Method,
}

impl OperationDescriptor {
    pub(crate) fn call(&self, target: &mut (dyn Any + Send), args: &[Value]) -> Result<Produced> {
        (self.call)(target, Args::new(args))
    }
}

impl Signature for OperationDescriptor {
    fn params(&self) -> &[String] {
        &self.params
    }
}

/// A static method, usually a factory
pub struct StaticMethodDescriptor {
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
    call: StaticMethod,
}

impl StaticMethodDescriptor {
    pub fn call(&self, args: &[Value]) -> Result<Produced> {
        (self.call)(Args::new(args))
    }
}

impl Signature for StaticMethodDescriptor {
    fn params(&self) -> &[String] {
        &self.params
    }
}

/// A static field or constant
pub struct StaticFieldDescriptor {
    pub name: String,
    pub type_name: String,
    read: StaticRead,
}

impl StaticFieldDescriptor {
    pub fn read(&self) -> Produced {
        (self.read)()
    }
}

/// Everything the container knows about one registered type
pub struct TypeDescriptor {
    code: String,
    rust_type_id: TypeId,
    rust_type: &'static str,
    constructors: Vec<ConstructorDescriptor>,
    fields: Vec<FieldDescriptor>,
    attributes: Vec<AttributeDescriptor>,
    operations: Vec<OperationDescriptor>,
    static_methods: Vec<StaticMethodDescriptor>,
    static_fields: Vec<StaticFieldDescriptor>,
    lifecycle: Option<Hook>,
}

impl TypeDescriptor {
    /// Start describing `T` under the definition type name `code`
    pub fn builder<T: Any + Send>(code: impl Into<String>) -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder {
            descriptor: TypeDescriptor {
                code: code.into(),
                rust_type_id: TypeId::of::<T>(),
                rust_type: std::any::type_name::<T>(),
                constructors: Vec::new(),
                fields: Vec::new(),
                attributes: Vec::new(),
                operations: Vec::new(),
                static_methods: Vec::new(),
                static_fields: Vec::new(),
                lifecycle: None,
            },
            _marker: PhantomData,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// `TypeId` of the described Rust type
    pub fn rust_type_id(&self) -> TypeId {
        self.rust_type_id
    }

    pub fn rust_type(&self) -> &'static str {
        self.rust_type
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn operations(&self) -> &[OperationDescriptor] {
        &self.operations
    }

    pub fn operations_named<'d>(&'d self, name: &'d str) -> impl Iterator<Item = &'d OperationDescriptor> {
        self.operations.iter().filter(move |o| o.name == name)
    }

    pub fn static_methods_named<'d>(
        &'d self,
        name: &'d str,
    ) -> impl Iterator<Item = &'d StaticMethodDescriptor> {
        self.static_methods.iter().filter(move |m| m.name == name)
    }

    pub fn static_field(&self, name: &str) -> Option<&StaticFieldDescriptor> {
        self.static_fields.iter().find(|f| f.name == name)
    }

    pub fn has_lifecycle(&self) -> bool {
        self.lifecycle.is_some()
    }

    pub(crate) fn run_lifecycle(&self, target: &mut (dyn Any + Send), phase: LifecyclePhase) -> Result<()> {
        match &self.lifecycle {
            Some(hook) => hook(target, phase),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("code", &self.code)
            .field("rust_type", &self.rust_type)
            .field("constructors", &self.constructors.len())
            .field("fields", &self.fields.iter().map(|x| &x.name).collect::<Vec<_>>())
            .field("attributes", &self.attributes.iter().map(|x| &x.name).collect::<Vec<_>>())
            .field("operations", &self.operations.iter().map(|x| &x.name).collect::<Vec<_>>())
            .field("lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}

fn downcast_mut<'o, T: Any>(target: &'o mut (dyn Any + Send), code: &str) -> Result<&'o mut T> {
    target
        .downcast_mut::<T>()
        .ok_or_else(|| ReflectError::TypeMismatch {
            expected: code.to_string(),
            found: "a foreign object".to_string(),
        })
}

fn downcast_ref<'o, T: Any>(target: &'o (dyn Any + Send), code: &str) -> Result<&'o T> {
    target
        .downcast_ref::<T>()
        .ok_or_else(|| ReflectError::TypeMismatch {
            expected: code.to_string(),
            found: "a foreign object".to_string(),
        })
}

fn owned(params: &[&str]) -> Vec<String> {
    params.iter().map(|p| p.to_string()).collect()
}

/// Fluent registration of a [`TypeDescriptor`]
pub struct TypeDescriptorBuilder<T> {
    descriptor: TypeDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send> TypeDescriptorBuilder<T> {
    /// Construct with no arguments
    pub fn default_constructor<F>(mut self, f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.descriptor.constructors.push(ConstructorDescriptor {
            params: Vec::new(),
            factory: Arc::new(move |_: Args<'_>| -> Result<Box<dyn Any + Send>> { Ok(Box::new(f())) }),
        });
        self
    }

    /// Construct from positional arguments of the given parameter types
    pub fn constructor<F>(mut self, params: &[&str], f: F) -> Self
    where
        F: Fn(Args<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let code = self.descriptor.code.clone();
        self.descriptor.constructors.push(ConstructorDescriptor {
            params: owned(params),
            factory: Arc::new(move |args: Args<'_>| -> Result<Box<dyn Any + Send>> {
                let object = f(args).map_err(|e| ReflectError::invocation(&code, e))?;
                Ok(Box::new(object))
            }),
        });
        self
    }

    /// A field assigned directly after construction
    pub fn field<V, F>(mut self, name: &str, type_name: &str, set: F) -> Self
    where
        V: FromValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let code = self.descriptor.code.clone();
        self.descriptor.fields.push(FieldDescriptor {
            name: name.to_string(),
            type_name: type_name.to_string(),
            set: Arc::new(move |target: &mut (dyn Any + Send), value: Value| -> Result<()> {
                let target = downcast_mut::<T>(target, &code)?;
                set(target, V::from_value(value)?);
                Ok(())
            }),
        });
        self
    }

    /// A readable and writable attribute
    pub fn property<V, R, G, S>(self, name: &str, type_name: &str, get: G, set: S) -> Self
    where
        V: FromValue,
        R: Into<Value>,
        G: Fn(&T) -> R + Send + Sync + 'static,
        S: Fn(&mut T, V) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.getter(name, type_name, get).setter(name, type_name, set)
    }

    /// A read-only attribute, or the read half of a property
    pub fn getter<R, G>(mut self, name: &str, type_name: &str, get: G) -> Self
    where
        R: Into<Value>,
        G: Fn(&T) -> R + Send + Sync + 'static,
    {
        let code = self.descriptor.code.clone();
        let getter: Getter = Arc::new(move |target: &(dyn Any + Send)| -> Result<Value> {
            Ok(get(downcast_ref::<T>(target, &code)?).into())
        });
        self.attribute_entry(name, type_name).getter = Some(getter);
        self
    }

    /// A write-only attribute, or the write half of a property
    pub fn setter<V, S>(mut self, name: &str, type_name: &str, set: S) -> Self
    where
        V: FromValue,
        S: Fn(&mut T, V) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let code = self.descriptor.code.clone();
        let attribute = name.to_string();
        let setter: Setter = Arc::new(move |target: &mut (dyn Any + Send), value: Value| -> Result<()> {
            let target = downcast_mut::<T>(target, &code)?;
            set(target, V::from_value(value)?).map_err(|e| ReflectError::invocation(&attribute, e))
        });
        self.attribute_entry(name, type_name).setter = Some(setter);
        self
    }

    fn attribute_entry(&mut self, name: &str, type_name: &str) -> &mut AttributeDescriptor {
        let attributes = &mut self.descriptor.attributes;
        let index = match attributes.iter().position(|a| a.name == name) {
            Some(index) => index,
            None => {
                attributes.push(AttributeDescriptor {
                    name: name.to_string(),
                    type_name: type_name.to_string(),
                    getter: None,
                    setter: None,
                });
                attributes.len() - 1
            }
        };
        &mut attributes[index]
    }

    /// An operation returning a plain value
    pub fn operation<F>(mut self, name: &str, params: &[&str], return_type: &str, f: F) -> Self
    where
        F: Fn(&mut T, Args<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let code = self.descriptor.code.clone();
        let op = name.to_string();
        self.descriptor.operations.push(OperationDescriptor {
            name: name.to_string(),
            params: owned(params),
            return_type: return_type.to_string(),
            call: Arc::new(move |target: &mut (dyn Any + Send), args: Args<'_>| -> Result<Produced> {
                let target = downcast_mut::<T>(target, &code)?;
                f(target, args)
                    .map(Produced::Value)
                    .map_err(|e| ReflectError::invocation(&op, e))
            }),
        });
        self
    }

    /// An operation producing a new object registered as `result_code`
    pub fn factory_operation<R, F>(
        mut self,
        name: &str,
        params: &[&str],
        result_code: &str,
        f: F,
    ) -> Self
    where
        R: Any + Send,
        F: Fn(&mut T, Args<'_>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let code = self.descriptor.code.clone();
        let op = name.to_string();
        let result = result_code.to_string();
        self.descriptor.operations.push(OperationDescriptor {
            name: name.to_string(),
            params: owned(params),
            return_type: result_code.to_string(),
            call: Arc::new(move |target: &mut (dyn Any + Send), args: Args<'_>| -> Result<Produced> {
                let target = downcast_mut::<T>(target, &code)?;
                let object = f(target, args).map_err(|e| ReflectError::invocation(&op, e))?;
                Ok(Produced::Instance {
                    code: result.clone(),
                    object: Box::new(object),
                })
            }),
        });
        self
    }

    /// A static method returning a plain value
    pub fn static_method<F>(mut self, name: &str, params: &[&str], return_type: &str, f: F) -> Self
    where
        F: Fn(Args<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let op = name.to_string();
        self.descriptor.static_methods.push(StaticMethodDescriptor {
            name: name.to_string(),
            params: owned(params),
            return_type: return_type.to_string(),
            call: Arc::new(move |args: Args<'_>| -> Result<Produced> {
                f(args)
                    .map(Produced::Value)
                    .map_err(|e| ReflectError::invocation(&op, e))
            }),
        });
        self
    }

    /// A static factory producing a new object registered as `result_code`
    pub fn static_factory<R, F>(mut self, name: &str, params: &[&str], result_code: &str, f: F) -> Self
    where
        R: Any + Send,
        F: Fn(Args<'_>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let op = name.to_string();
        let result = result_code.to_string();
        self.descriptor.static_methods.push(StaticMethodDescriptor {
            name: name.to_string(),
            params: owned(params),
            return_type: result_code.to_string(),
            call: Arc::new(move |args: Args<'_>| -> Result<Produced> {
                let object = f(args).map_err(|e| ReflectError::invocation(&op, e))?;
                Ok(Produced::Instance {
                    code: result.clone(),
                    object: Box::new(object),
                })
            }),
        });
        self
    }

    /// A static field holding a plain value
    pub fn static_field<F>(mut self, name: &str, type_name: &str, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.descriptor.static_fields.push(StaticFieldDescriptor {
            name: name.to_string(),
            type_name: type_name.to_string(),
            read: Arc::new(move || Produced::Value(f())),
        });
        self
    }

    /// A static field holding an object registered as `result_code`
    ///
    /// `f` is called on every read, so shared state must live behind an `Arc`
    /// inside the produced object.
    pub fn static_instance<R, F>(mut self, name: &str, result_code: &str, f: F) -> Self
    where
        R: Any + Send,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let result = result_code.to_string();
        self.descriptor.static_fields.push(StaticFieldDescriptor {
            name: name.to_string(),
            type_name: result_code.to_string(),
            read: Arc::new(move || Produced::Instance {
                code: result.clone(),
                object: Box::new(f()),
            }),
        });
        self
    }

    /// Route the container lifecycle to `T`'s [`Lifecycle`] implementation
    pub fn lifecycle(mut self) -> Self
    where
        T: Lifecycle,
    {
        let code = self.descriptor.code.clone();
        self.descriptor.lifecycle = Some(Arc::new(
            move |target: &mut (dyn Any + Send), phase: LifecyclePhase| -> Result<()> {
                let target = downcast_mut::<T>(target, &code)?;
                phase
                    .run(target)
                    .map_err(|e| ReflectError::invocation(phase.as_str(), e))
            },
        ));
        self
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        Arc::new(self.descriptor)
    }
}
