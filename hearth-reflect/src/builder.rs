//! Building live objects from effective definitions
//!
//! The builder walks one [`EffectiveObject`] and produces a value:
//!
//! 1. Construct, in order of precedence: an invoke on an explicit target, a
//!    static factory, a static field, or a constructor of `code` picked by
//!    arity and declared argument types.
//! 2. Assign fields, then attributes, in declaration order. Unknown names are
//!    logged and skipped; failing conversions and setters are fatal.
//! 3. Run the invokes bound to `Creating` or `Created`. Invokes for later
//!    states come back as [`DeferredInvoke`]s for the lifecycle engine.
//!
//! Nested object definitions are built recursively and their deferred
//! invokes are folded into the parent's result.

use crate::descriptor::{select, Signature};
use crate::editor::PropertyEditorRegistry;
use crate::error::{ReflectError, Result};
use crate::handle::ObjectHandle;
use crate::introspect::TypeIntrospector;
use crate::value::Value;
use hearth_metadata::{
    placeholder, ArgumentMetaData, ConstructorKind, DuplicatePolicy, EffectiveObject,
    InvokeMetaData, LifecycleState, ObjectMetaData, PropertySource, ServiceName,
    StaticFieldRefMetaData, StaticInvokeMetaData, ValueMetaData, ValueSlot,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Turns a service reference into the referenced live object
///
/// The container implements this; resolving may create or start the
/// referenced service.
pub trait ServiceResolver {
    fn resolve(&self, name: &ServiceName) -> Result<Value>;
}

/// Collaborators the builder consults
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub introspector: &'a dyn TypeIntrospector,
    pub editors: &'a PropertyEditorRegistry,
    pub resolver: &'a dyn ServiceResolver,
    pub properties: &'a dyn PropertySource,
    pub policy: DuplicatePolicy,
}

/// An invoke to run when its target reaches `invoke.call_state`
#[derive(Debug, Clone)]
pub struct DeferredInvoke {
    pub target: ObjectHandle,
    pub invoke: InvokeMetaData,
    /// Definition source, for editor lookups
    pub source: Arc<str>,
}

impl DeferredInvoke {
    pub fn call_state(&self) -> LifecycleState {
        self.invoke.call_state
    }
}

/// Result of building one definition
#[derive(Debug, Clone, Default)]
pub struct BuiltObject {
    pub value: Value,
    pub deferred: Vec<DeferredInvoke>,
}

impl BuiltObject {
    /// The built object, if the definition produced one
    pub fn handle(&self) -> Option<&ObjectHandle> {
        self.value.as_object()
    }

    pub fn deferred_for(&self, state: LifecycleState) -> impl Iterator<Item = &DeferredInvoke> {
        self.deferred.iter().filter(move |d| d.call_state() == state)
    }
}

/// Whether an invoke declared for `state` runs as part of construction
fn runs_on_construction(state: LifecycleState) -> bool {
    matches!(state, LifecycleState::Creating | LifecycleState::Created)
}

/// Metadata-driven object construction
pub struct ObjectBuilder<'a> {
    cx: BuildContext<'a>,
}

impl<'a> ObjectBuilder<'a> {
    pub fn new(cx: BuildContext<'a>) -> Self {
        Self { cx }
    }

    /// Apply conditional blocks to `meta`, then build it
    pub fn build_definition(&self, meta: &ObjectMetaData) -> Result<BuiltObject> {
        let effective = meta
            .effective(self.cx.properties, self.cx.policy)
            .map_err(|e| ReflectError::Construction {
                code: meta.code.clone().unwrap_or_default(),
                message: e.to_string(),
                source: None,
            })?;
        self.build(&effective)
    }

    /// Build an object whose conditional blocks are already applied
    pub fn build(&self, object: &EffectiveObject<'_>) -> Result<BuiltObject> {
        let meta = object.meta;
        if meta.null_value {
            return Ok(BuiltObject::default());
        }
        let code = meta.code.as_deref().unwrap_or_default();
        let source = &meta.source;
        let mut deferred = Vec::new();

        let value = self.construct(object, code, source, &mut deferred)?;
        let handle = match value {
            Value::Object(handle) => handle,
            other if object.fields.is_empty()
                && object.attributes.is_empty()
                && object.invokes.is_empty() =>
            {
                return Ok(BuiltObject {
                    value: other,
                    deferred,
                });
            }
            other => {
                return Err(ReflectError::TypeMismatch {
                    expected: format!("an object to configure as {}", code),
                    found: other.kind().to_string(),
                })
            }
        };

        for field in &object.fields {
            let Some(descriptor) = handle.descriptor().field(&field.name) else {
                self.skip_missing(&handle, &field.name);
                continue;
            };
            let type_name = descriptor.type_name.clone();
            let value = self
                .resolve_slot(&field.slot, Some(&type_name), source, &mut deferred)
                .map_err(|e| wrap(code, &format!("cannot resolve field '{}'", field.name), e))?;
            handle
                .set_field(&field.name, value)
                .map_err(|e| wrap(code, &format!("cannot set field '{}'", field.name), e))?;
        }

        for attribute in &object.attributes {
            let type_name = match handle.descriptor().attribute(&attribute.name) {
                Some(descriptor) if descriptor.is_writable() => descriptor.type_name.clone(),
                _ => {
                    self.skip_missing(&handle, &attribute.name);
                    continue;
                }
            };
            let value = self
                .resolve_slot(&attribute.slot, Some(&type_name), source, &mut deferred)
                .map_err(|e| {
                    wrap(code, &format!("cannot resolve attribute '{}'", attribute.name), e)
                })?;
            handle
                .set_attribute(&attribute.name, value)
                .map_err(|e| wrap(code, &format!("cannot set attribute '{}'", attribute.name), e))?;
        }

        for invoke in &object.invokes {
            let target = match &invoke.target {
                Some(target) => self
                    .resolve_target(target, source, &mut deferred)
                    .map_err(|e| wrap(code, &format!("invoke '{}' has no usable target", invoke.name), e))?,
                None => handle.clone(),
            };
            if runs_on_construction(invoke.call_state) {
                self.invoke_on(&target, invoke, source, &mut deferred)
                    .map_err(|e| wrap(code, &format!("invoke '{}' failed", invoke.name), e))?;
            } else {
                trace!("Deferring {}.{} until {}", code, invoke.name, invoke.call_state);
                deferred.push(DeferredInvoke {
                    target,
                    invoke: (*invoke).clone(),
                    source: source.clone(),
                });
            }
        }

        debug!("Built {} from {}", code, source);
        Ok(BuiltObject {
            value: Value::Object(handle),
            deferred,
        })
    }

    /// Run an invoke that was deferred at build time
    pub fn run_deferred(&self, deferred: &DeferredInvoke) -> Result<Value> {
        let mut nested = Vec::new();
        let result = self.invoke_on(&deferred.target, &deferred.invoke, &deferred.source, &mut nested)?;
        if !nested.is_empty() {
            warn!(
                "Ignoring {} invoke(s) deferred by arguments of {}",
                nested.len(),
                deferred.invoke.name
            );
        }
        Ok(result)
    }

    fn construct(
        &self,
        object: &EffectiveObject<'_>,
        code: &str,
        source: &Arc<str>,
        deferred: &mut Vec<DeferredInvoke>,
    ) -> Result<Value> {
        match object.constructor.map(|c| &c.kind) {
            Some(ConstructorKind::Invoke(invoke)) => {
                let target = match &invoke.target {
                    Some(target) => self.resolve_target(target, source, deferred)?,
                    None => {
                        return Err(ReflectError::Construction {
                            code: code.to_string(),
                            message: format!("constructor invoke '{}' has no target", invoke.name),
                            source: None,
                        })
                    }
                };
                self.invoke_on(&target, invoke, source, deferred)
            }
            Some(ConstructorKind::StaticInvoke(invoke)) => self.static_invoke(invoke, source, deferred),
            Some(ConstructorKind::StaticFieldRef(field)) => self.static_field(field),
            Some(ConstructorKind::Arguments(args)) => self.construct_with(code, args, source, deferred),
            None => self.construct_with(code, &[], source, deferred),
        }
    }

    fn construct_with(
        &self,
        code: &str,
        args: &[ArgumentMetaData],
        source: &Arc<str>,
        deferred: &mut Vec<DeferredInvoke>,
    ) -> Result<Value> {
        let descriptor = self
            .cx
            .introspector
            .descriptor(code)
            .ok_or_else(|| ReflectError::UnknownType {
                code: code.to_string(),
            })?;
        let declared = declared_types(args);
        let constructor = select(descriptor.constructors(), &declared).ok_or_else(|| {
            ReflectError::NoSuchConstructor {
                code: code.to_string(),
                arity: args.len(),
            }
        })?;
        let values = self.resolve_args(args, constructor, source, deferred)?;
        let object = constructor.construct(&values)?;
        ObjectHandle::from_boxed(object, descriptor.clone()).map(Value::Object)
    }

    fn static_invoke(
        &self,
        invoke: &StaticInvokeMetaData,
        source: &Arc<str>,
        deferred: &mut Vec<DeferredInvoke>,
    ) -> Result<Value> {
        let descriptor = self
            .cx
            .introspector
            .descriptor(&invoke.code)
            .ok_or_else(|| ReflectError::UnknownType {
                code: invoke.code.clone(),
            })?;
        let declared = declared_types(&invoke.arguments);
        let method = select(descriptor.static_methods_named(&invoke.name), &declared).ok_or_else(|| {
            ReflectError::NoSuchStaticMember {
                code: invoke.code.clone(),
                name: invoke.name.clone(),
            }
        })?;
        let values = self.resolve_args(&invoke.arguments, method, source, deferred)?;
        trace!("Calling static {}.{}", invoke.code, invoke.name);
        method.call(&values)?.into_value(self.cx.introspector)
    }

    fn static_field(&self, field: &StaticFieldRefMetaData) -> Result<Value> {
        let descriptor = self
            .cx
            .introspector
            .descriptor(&field.code)
            .ok_or_else(|| ReflectError::UnknownType {
                code: field.code.clone(),
            })?;
        let member = descriptor
            .static_field(&field.name)
            .ok_or_else(|| ReflectError::NoSuchStaticMember {
                code: field.code.clone(),
                name: field.name.clone(),
            })?;
        member.read().into_value(self.cx.introspector)
    }

    fn resolve_target(
        &self,
        target: &ValueMetaData,
        source: &Arc<str>,
        deferred: &mut Vec<DeferredInvoke>,
    ) -> Result<ObjectHandle> {
        let value = self.resolve_value(target, None, source, deferred)?;
        match value {
            Value::Object(handle) => Ok(handle),
            other => Err(ReflectError::TypeMismatch {
                expected: "an object as invoke target".to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    fn invoke_on(
        &self,
        target: &ObjectHandle,
        invoke: &InvokeMetaData,
        source: &Arc<str>,
        deferred: &mut Vec<DeferredInvoke>,
    ) -> Result<Value> {
        let declared = declared_types(&invoke.arguments);
        let operation = select(target.descriptor().operations_named(&invoke.name), &declared)
            .ok_or_else(|| ReflectError::NoSuchOperation {
                code: target.code().to_string(),
                name: invoke.name.clone(),
                arity: invoke.arguments.len(),
            })?;
        let values = self.resolve_args(&invoke.arguments, operation, source, deferred)?;
        trace!("Invoking {}.{}", target.code(), invoke.name);
        target
            .invoke(&invoke.name, &values, &declared)?
            .into_value(self.cx.introspector)
    }

    fn resolve_args(
        &self,
        args: &[ArgumentMetaData],
        signature: &dyn Signature,
        source: &Arc<str>,
        deferred: &mut Vec<DeferredInvoke>,
    ) -> Result<Vec<Value>> {
        args.iter()
            .zip(signature.params())
            .map(|(arg, param)| self.resolve_slot(&arg.slot, Some(param), source, deferred))
            .collect()
    }

    /// Resolve a typed slot; `expected` is the receiving parameter's type
    fn resolve_slot(
        &self,
        slot: &ValueSlot,
        expected: Option<&str>,
        source: &Arc<str>,
        deferred: &mut Vec<DeferredInvoke>,
    ) -> Result<Value> {
        if slot.null_value {
            return Ok(Value::Null);
        }
        match &slot.value {
            ValueMetaData::Text(text) => self.convert_text(text, slot.type_name.as_deref(), expected, source),
            value => self.resolve_value(value, expected, source, deferred),
        }
    }

    fn resolve_value(
        &self,
        value: &ValueMetaData,
        expected: Option<&str>,
        source: &Arc<str>,
        deferred: &mut Vec<DeferredInvoke>,
    ) -> Result<Value> {
        match value {
            ValueMetaData::Text(text) => self.convert_text(text, None, expected, source),
            ValueMetaData::Object(meta) => {
                let built = self.build_definition(meta)?;
                deferred.extend(built.deferred);
                Ok(built.value)
            }
            ValueMetaData::ServiceRef(reference) => {
                let name = reference
                    .resolve(self.cx.properties)
                    .map_err(|e| ReflectError::Unresolved {
                        service: reference.raw.clone(),
                        reason: e.to_string(),
                    })?;
                self.cx.resolver.resolve(&name)
            }
            ValueMetaData::StaticInvoke(invoke) => self.static_invoke(invoke, source, deferred),
            ValueMetaData::StaticFieldRef(field) => self.static_field(field),
            ValueMetaData::Opaque(raw) => Ok(Value::Str(raw.clone())),
        }
    }

    /// Substitute placeholders, then convert with the declared type's editor
    ///
    /// Without a declared type the receiving parameter's type is tried; text
    /// for a parameter type with no editor stays a string.
    fn convert_text(
        &self,
        text: &str,
        declared: Option<&str>,
        expected: Option<&str>,
        source: &str,
    ) -> Result<Value> {
        let text = placeholder::substitute(text, self.cx.properties);
        let editors = self.cx.editors;
        match (declared, expected) {
            (Some(type_name), _) => editors.convert(Some(source), type_name, &text),
            (None, Some(type_name)) if editors.editor_for(Some(source), type_name).is_some() => {
                editors.convert(Some(source), type_name, &text)
            }
            _ => Ok(Value::Str(text)),
        }
    }

    fn skip_missing(&self, handle: &ObjectHandle, name: &str) {
        let err = ReflectError::NoSuchAttribute {
            code: handle.code().to_string(),
            name: name.to_string(),
        };
        warn!("Skipping property: {}", err);
    }
}

fn declared_types(args: &[ArgumentMetaData]) -> Vec<Option<&str>> {
    args.iter().map(|a| a.slot.type_name.as_deref()).collect()
}

/// Fold a failure while configuring `code` into a construction error
fn wrap(code: &str, message: &str, err: ReflectError) -> ReflectError {
    match err {
        ReflectError::Unresolved { .. } | ReflectError::Construction { .. } => err,
        other => ReflectError::construction(code, message, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeDescriptor;
    use crate::introspect::TypeRegistry;
    use hearth_metadata::{parse_server, MapPropertySource, ParseOptions};

    struct Endpoint {
        host: String,
        port: i64,
        tags: Vec<String>,
        warmed: bool,
    }

    struct NoServices;

    impl ServiceResolver for NoServices {
        fn resolve(&self, name: &ServiceName) -> Result<Value> {
            Err(ReflectError::Unresolved {
                service: name.to_string(),
                reason: "not registered".to_string(),
            })
        }
    }

    fn types() -> TypeRegistry {
        TypeRegistry::new().with(
            TypeDescriptor::builder::<Endpoint>("test.Endpoint")
                .default_constructor(|| Endpoint {
                    host: "localhost".to_string(),
                    port: 80,
                    tags: Vec::new(),
                    warmed: false,
                })
                .constructor(&["string", "int"], |args| {
                    Ok(Endpoint {
                        host: args.get(0)?,
                        port: args.get(1)?,
                        tags: Vec::new(),
                        warmed: false,
                    })
                })
                .field("tags", "string[]", |e: &mut Endpoint, v: Vec<String>| e.tags = v)
                .property("Port", "int", |e: &Endpoint| e.port, |e: &mut Endpoint, v: i64| {
                    anyhow::ensure!(v > 0, "port must be positive");
                    e.port = v;
                    Ok(())
                })
                .getter("Host", "string", |e: &Endpoint| e.host.clone())
                .operation("warm", &[], "void", |e: &mut Endpoint, _| {
                    e.warmed = true;
                    Ok(Value::Null)
                })
                .build(),
        )
    }

    fn build(xml: &str, props: &MapPropertySource) -> Result<BuiltObject> {
        let server = parse_server(xml, "builder.xml", &ParseOptions::default()).unwrap();
        let meta = server.managers[0].services[0].object.clone();
        let types = types();
        let editors = PropertyEditorRegistry::new();
        let builder = ObjectBuilder::new(BuildContext {
            introspector: &types,
            editors: &editors,
            resolver: &NoServices,
            properties: props,
            policy: DuplicatePolicy::default(),
        });
        builder.build_definition(&meta)
    }

    #[test]
    fn test_typed_constructor_and_properties() {
        let props = MapPropertySource::from_pairs([("host", "db01")]);
        let built = build(
            r#"<server><manager><service name="E" code="test.Endpoint">
                   <constructor>
                       <argument>${host}</argument>
                       <argument>5432</argument>
                   </constructor>
                   <field name="tags">a, b</field>
                   <invoke name="warm"/>
               </service></manager></server>"#,
            &props,
        )
        .unwrap();

        let handle = built.handle().unwrap();
        handle
            .with(|e: &Endpoint| {
                assert_eq!(e.host, "db01");
                assert_eq!(e.port, 5432);
                assert_eq!(e.tags, ["a", "b"]);
                assert!(e.warmed);
            })
            .unwrap();
        assert!(built.deferred.is_empty());
    }

    #[test]
    fn test_later_invokes_are_deferred() {
        let built = build(
            r#"<server><manager><service name="E" code="test.Endpoint">
                   <invoke name="warm" callState="Started"/>
               </service></manager></server>"#,
            &MapPropertySource::default(),
        )
        .unwrap();

        assert_eq!(built.deferred_for(LifecycleState::Started).count(), 1);
        let handle = built.handle().unwrap();
        assert_eq!(handle.with(|e: &Endpoint| e.warmed), Some(false));
    }

    #[test]
    fn test_unknown_property_is_skipped() {
        let built = build(
            r#"<server><manager><service name="E" code="test.Endpoint">
                   <attribute name="Colour">red</attribute>
                   <attribute name="Host">ignored</attribute>
                   <attribute name="Port">8080</attribute>
               </service></manager></server>"#,
            &MapPropertySource::default(),
        )
        .unwrap();
        let handle = built.handle().unwrap();
        assert_eq!(handle.get_attribute("Port").unwrap(), Value::Int(8080));
        assert_eq!(handle.get_attribute("Host").unwrap(), Value::from("localhost"));
    }

    #[test]
    fn test_failing_setter_is_fatal() {
        let err = build(
            r#"<server><manager><service name="E" code="test.Endpoint">
                   <attribute name="Port">-1</attribute>
               </service></manager></server>"#,
            &MapPropertySource::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReflectError::Construction { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_bad_conversion_is_fatal() {
        let err = build(
            r#"<server><manager><service name="E" code="test.Endpoint">
                   <attribute name="Port">eighty</attribute>
               </service></manager></server>"#,
            &MapPropertySource::default(),
        )
        .unwrap_err();
        let ReflectError::Construction { source: Some(cause), .. } = err else {
            panic!("expected a construction error");
        };
        assert!(matches!(*cause, ReflectError::Conversion { .. }));
    }

    #[test]
    fn test_unknown_type_and_arity() {
        let err = build(
            r#"<server><manager><service name="E" code="test.Missing"/></manager></server>"#,
            &MapPropertySource::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReflectError::UnknownType { .. }));

        let err = build(
            r#"<server><manager><service name="E" code="test.Endpoint">
                   <constructor><argument>1</argument></constructor>
               </service></manager></server>"#,
            &MapPropertySource::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReflectError::NoSuchConstructor { arity: 1, .. }));
    }

    #[test]
    fn test_unresolved_reference_is_reported() {
        let err = build(
            r#"<server><manager name="m"><service name="E" code="test.Endpoint">
                   <constructor>
                       <argument><service-ref>Other</service-ref></argument>
                       <argument>1</argument>
                   </constructor>
               </service></manager></server>"#,
            &MapPropertySource::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReflectError::Unresolved { ref service, .. } if service == "m#Other"));
    }
}
