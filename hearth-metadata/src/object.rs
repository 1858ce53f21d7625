//! Object, constructor, property, and invocation definitions

use crate::error::{DefinitionError, Result};
use crate::ifdef::IfDefMetaData;
use crate::name::{NameError, ServiceName};
use crate::parse::{element_children, tags, text_content, ParseContext};
use crate::placeholder;
use crate::property::PropertySource;
use crate::server::DependsMetaData;
use crate::state::LifecycleState;
use crate::xml::XmlWriter;
use roxmltree::Node;
use std::sync::Arc;

/// Declarative description of one object to construct
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetaData {
    /// Type name registered with the type introspector; absent only for null markers
    pub code: Option<String>,
    /// The whole object stands for a null reference
    pub null_value: bool,
    /// Manager namespace the definition belongs to
    pub manager: String,
    /// Identifier of the definition source that produced this node
    pub source: Arc<str>,
    pub constructor: Option<ConstructorMetaData>,
    /// Direct field assignments, in declaration order
    pub fields: Vec<FieldMetaData>,
    /// Setter-based property assignments, in declaration order
    pub attributes: Vec<AttributeMetaData>,
    pub invokes: Vec<InvokeMetaData>,
    pub ifdefs: Vec<IfDefMetaData>,
    pub comments: Vec<String>,
}

impl ObjectMetaData {
    /// An empty definition for `code` in `manager`
    pub fn new(code: impl Into<String>, manager: impl Into<String>, source: Arc<str>) -> Self {
        Self {
            code: Some(code.into()),
            null_value: false,
            manager: manager.into(),
            source,
            constructor: None,
            fields: Vec::new(),
            attributes: Vec::new(),
            invokes: Vec::new(),
            ifdefs: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Look up an unconditional field by name
    pub fn field(&self, name: &str) -> Option<&FieldMetaData> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up an unconditional attribute by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeMetaData> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Import an `<object>` element
    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::OBJECT)?;
        let (object, _) = Self::import_body(node, cx, false)?;
        Ok(object)
    }

    /// Import the shared body of `<object>` and `<service>` elements
    ///
    /// `<depends>` children are only accepted when `allow_depends` is set and
    /// are returned separately.
    pub(crate) fn import_body(
        node: Node<'_, '_>,
        cx: &mut ParseContext<'_>,
        allow_depends: bool,
    ) -> Result<(Self, Vec<DependsMetaData>)> {
        let element = node.tag_name().name().to_string();
        let null_value = cx.bool_attr(node, "nullValue")?;
        let code = match node.attribute("code") {
            Some(code) => Some(code.to_string()),
            None if null_value => None,
            None => Some(cx.required_attr(node, "code")?),
        };

        let mut object = ObjectMetaData {
            code,
            null_value,
            manager: cx.manager.clone(),
            source: cx.resource.clone(),
            constructor: None,
            fields: Vec::new(),
            attributes: Vec::new(),
            invokes: Vec::new(),
            ifdefs: Vec::new(),
            comments: Vec::new(),
        };
        let mut depends = Vec::new();

        for (comments, child) in element_children(node) {
            match child.tag_name().name() {
                tags::CONSTRUCTOR => {
                    if object.constructor.is_some() {
                        return Err(cx.duplicate_element(node, tags::CONSTRUCTOR));
                    }
                    let mut constructor = ConstructorMetaData::import(child, cx)?;
                    constructor.comments = comments;
                    object.constructor = Some(constructor);
                }
                tags::FIELD => {
                    let mut field = FieldMetaData::import(child, cx)?;
                    if object.field(&field.name).is_some() {
                        return Err(cx.duplicate_name(tags::FIELD, &field.name));
                    }
                    field.comments = comments;
                    object.fields.push(field);
                }
                tags::ATTRIBUTE => {
                    let mut attribute = AttributeMetaData::import(child, cx)?;
                    if object.attribute(&attribute.name).is_some() {
                        return Err(cx.duplicate_name(tags::ATTRIBUTE, &attribute.name));
                    }
                    attribute.comments = comments;
                    object.attributes.push(attribute);
                }
                tags::INVOKE => {
                    let mut invoke = InvokeMetaData::import(child, cx)?;
                    invoke.comments = comments;
                    object.invokes.push(invoke);
                }
                tags::DEPENDS if allow_depends => {
                    let mut dep = DependsMetaData::import(child, cx)?;
                    dep.comments = comments;
                    depends.push(dep);
                }
                tags::IFDEF => {
                    let mut ifdef = IfDefMetaData::import_in_object(child, cx, &element, allow_depends)?;
                    ifdef.comments = comments;
                    object.ifdefs.push(ifdef);
                }
                _ => cx.unexpected(child, "constructor, field, attribute, invoke or ifdef")?,
            }
        }

        Ok((object, depends))
    }

    /// Write the body children shared by `<object>` and `<service>`
    pub(crate) fn write_children(&self, w: &mut XmlWriter, depends: &[DependsMetaData]) {
        if let Some(constructor) = &self.constructor {
            constructor.write_xml(w);
        }
        for field in &self.fields {
            field.write_xml(w);
        }
        for attribute in &self.attributes {
            attribute.write_xml(w);
        }
        for invoke in &self.invokes {
            invoke.write_xml(w);
        }
        for dep in depends {
            dep.write_xml(w);
        }
        for ifdef in &self.ifdefs {
            ifdef.write_xml(w);
        }
    }

    pub(crate) fn has_children(&self) -> bool {
        self.constructor.is_some()
            || !self.fields.is_empty()
            || !self.attributes.is_empty()
            || !self.invokes.is_empty()
            || !self.ifdefs.is_empty()
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        let attrs = [
            ("code", self.code.as_deref()),
            ("nullValue", self.null_value.then_some("true")),
        ];
        if self.has_children() {
            w.open(tags::OBJECT, &attrs);
            self.write_children(w, &[]);
            w.close(tags::OBJECT);
        } else {
            w.empty(tags::OBJECT, &attrs);
        }
    }

    /// Serialize this definition as a standalone `<object>` element
    pub fn to_xml(&self) -> String {
        let mut w = XmlWriter::new();
        self.write_xml(&mut w);
        w.finish()
    }
}

/// How an object is constructed
#[derive(Debug, Clone, PartialEq)]
pub enum ConstructorKind {
    /// Call a method on an explicit target object and use its return value
    Invoke(InvokeMetaData),
    /// Call a static factory method
    StaticInvoke(StaticInvokeMetaData),
    /// Read a static field
    StaticFieldRef(StaticFieldRefMetaData),
    /// Call the type's constructor with these arguments
    Arguments(Vec<ArgumentMetaData>),
}

/// A `<constructor>` element
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorMetaData {
    pub kind: ConstructorKind,
    pub comments: Vec<String>,
}

impl ConstructorMetaData {
    pub fn arguments(arguments: Vec<ArgumentMetaData>) -> Self {
        Self {
            kind: ConstructorKind::Arguments(arguments),
            comments: Vec::new(),
        }
    }

    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::CONSTRUCTOR)?;

        let mut target: Option<ConstructorKind> = None;
        let mut arguments = Vec::new();

        for (_, child) in element_children(node) {
            let kind = match child.tag_name().name() {
                tags::ARGUMENT => {
                    arguments.push(ArgumentMetaData::import(child, cx)?);
                    continue;
                }
                tags::INVOKE => ConstructorKind::Invoke(InvokeMetaData::import(child, cx)?),
                tags::STATIC_INVOKE => {
                    ConstructorKind::StaticInvoke(StaticInvokeMetaData::import(child, cx)?)
                }
                tags::STATIC_FIELD_REF => {
                    ConstructorKind::StaticFieldRef(StaticFieldRefMetaData::import(child, cx)?)
                }
                _ => {
                    cx.unexpected(child, "argument, invoke, static-invoke or static-field-ref")?;
                    continue;
                }
            };
            if target.is_some() {
                return Err(cx.duplicate_element(node, child.tag_name().name()));
            }
            target = Some(kind);
        }

        let kind = match target {
            Some(_) if !arguments.is_empty() => {
                return Err(cx.duplicate_element(node, "argument list or constructor target"));
            }
            Some(kind) => kind,
            None => ConstructorKind::Arguments(arguments),
        };

        Ok(Self {
            kind,
            comments: Vec::new(),
        })
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        if let ConstructorKind::Arguments(args) = &self.kind {
            if args.is_empty() {
                w.empty(tags::CONSTRUCTOR, &[]);
                return;
            }
        }
        w.open(tags::CONSTRUCTOR, &[]);
        match &self.kind {
            ConstructorKind::Invoke(invoke) => invoke.write_xml(w),
            ConstructorKind::StaticInvoke(invoke) => invoke.write_xml(w),
            ConstructorKind::StaticFieldRef(field) => field.write_xml(w),
            ConstructorKind::Arguments(args) => {
                for arg in args {
                    arg.write_xml(w);
                }
            }
        }
        w.close(tags::CONSTRUCTOR);
    }
}

/// Typed value holder shared by arguments, fields, and attributes
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSlot {
    /// Declared type, used to pick a property editor for text values
    pub type_name: Option<String>,
    /// Element type hint for collection values
    pub value_type: Option<String>,
    /// Yield a null reference regardless of type and content
    pub null_value: bool,
    pub value: ValueMetaData,
}

impl ValueSlot {
    /// A plain text slot with no declared type
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            type_name: None,
            value_type: None,
            null_value: false,
            value: ValueMetaData::Text(text.into()),
        }
    }

    fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        Ok(Self {
            type_name: node.attribute("type").map(str::to_string),
            value_type: node.attribute("valueType").map(str::to_string),
            null_value: cx.bool_attr(node, "nullValue")?,
            value: ValueMetaData::import_content(node, cx)?,
        })
    }

    fn write_xml(&self, w: &mut XmlWriter, tag: &str, name: Option<&str>) {
        let attrs = [
            ("name", name),
            ("type", self.type_name.as_deref()),
            ("valueType", self.value_type.as_deref()),
            ("nullValue", self.null_value.then_some("true")),
        ];
        match &self.value {
            ValueMetaData::Text(text) => w.text_element(tag, &attrs, text),
            value => {
                w.open(tag, &attrs);
                value.write_xml(w);
                w.close(tag);
            }
        }
    }
}

/// The value of a slot
#[derive(Debug, Clone, PartialEq)]
pub enum ValueMetaData {
    /// Raw text, converted by a property editor at build time
    Text(String),
    /// A nested object definition
    Object(Box<ObjectMetaData>),
    /// Another managed service, resolved lazily
    ServiceRef(ServiceRefMetaData),
    /// The return value of a static method
    StaticInvoke(StaticInvokeMetaData),
    /// The value of a static field
    StaticFieldRef(StaticFieldRefMetaData),
    /// An unrecognized element, kept as raw XML
    Opaque(String),
}

impl ValueMetaData {
    /// Import the content of a value-carrying element
    pub(crate) fn import_content(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        let children = element_children(node);
        match children.as_slice() {
            [] => Ok(ValueMetaData::Text(text_content(node))),
            [(_, child)] => Self::import_element(*child, cx),
            [_, (_, extra), ..] => Err(cx.duplicate_element(node, extra.tag_name().name())),
        }
    }

    fn import_element(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        Ok(match node.tag_name().name() {
            tags::OBJECT => ValueMetaData::Object(Box::new(ObjectMetaData::import(node, cx)?)),
            tags::SERVICE_REF => ValueMetaData::ServiceRef(ServiceRefMetaData::import(node, cx)?),
            tags::STATIC_INVOKE => {
                ValueMetaData::StaticInvoke(StaticInvokeMetaData::import(node, cx)?)
            }
            tags::STATIC_FIELD_REF => {
                ValueMetaData::StaticFieldRef(StaticFieldRefMetaData::import(node, cx)?)
            }
            _ if cx.options.validate => {
                return Err(DefinitionError::UnexpectedElement {
                    resource: cx.resource.to_string(),
                    expected: "object, service-ref, static-invoke or static-field-ref".to_string(),
                    found: node.tag_name().name().to_string(),
                })
            }
            _ => ValueMetaData::Opaque(cx.raw(node)),
        })
    }

    fn write_xml(&self, w: &mut XmlWriter) {
        match self {
            // Text is written by the owning slot
            ValueMetaData::Text(_) => {}
            ValueMetaData::Object(object) => object.write_xml(w),
            ValueMetaData::ServiceRef(reference) => reference.write_xml(w),
            ValueMetaData::StaticInvoke(invoke) => invoke.write_xml(w),
            ValueMetaData::StaticFieldRef(field) => field.write_xml(w),
            ValueMetaData::Opaque(raw) => w.raw(raw),
        }
    }
}

/// A constructor argument
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentMetaData {
    pub slot: ValueSlot,
    pub comments: Vec<String>,
}

impl ArgumentMetaData {
    pub fn new(slot: ValueSlot) -> Self {
        Self {
            slot,
            comments: Vec::new(),
        }
    }

    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::ARGUMENT)?;
        Ok(Self::new(ValueSlot::import(node, cx)?))
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        self.slot.write_xml(w, tags::ARGUMENT, None);
    }
}

/// A direct field assignment applied after construction
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMetaData {
    pub name: String,
    pub slot: ValueSlot,
    pub comments: Vec<String>,
}

impl FieldMetaData {
    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::FIELD)?;
        Ok(Self {
            name: cx.required_attr(node, "name")?,
            slot: ValueSlot::import(node, cx)?,
            comments: Vec::new(),
        })
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        self.slot.write_xml(w, tags::FIELD, Some(&self.name));
    }
}

/// A setter-based property assignment applied after fields
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMetaData {
    pub name: String,
    pub slot: ValueSlot,
    pub comments: Vec<String>,
}

impl AttributeMetaData {
    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::ATTRIBUTE)?;
        Ok(Self {
            name: cx.required_attr(node, "name")?,
            slot: ValueSlot::import(node, cx)?,
            comments: Vec::new(),
        })
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        self.slot.write_xml(w, tags::ATTRIBUTE, Some(&self.name));
    }
}

/// A method invocation, either post-construction or as a constructor
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeMetaData {
    pub name: String,
    pub arguments: Vec<ArgumentMetaData>,
    /// What to invoke on; `None` means the object being built
    pub target: Option<Box<ValueMetaData>>,
    /// Lifecycle state at which a post-construction invoke fires
    pub call_state: LifecycleState,
    pub comments: Vec<String>,
}

impl InvokeMetaData {
    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::INVOKE)?;
        let mut invoke = Self {
            name: cx.required_attr(node, "name")?,
            arguments: Vec::new(),
            target: None,
            call_state: cx.state_attr(node, "callState", LifecycleState::Created)?,
            comments: Vec::new(),
        };

        for (_, child) in element_children(node) {
            match child.tag_name().name() {
                tags::TARGET => {
                    if invoke.target.is_some() {
                        return Err(cx.duplicate_element(node, tags::TARGET));
                    }
                    invoke.target = Some(Box::new(ValueMetaData::import_content(child, cx)?));
                }
                tags::ARGUMENT => invoke.arguments.push(ArgumentMetaData::import(child, cx)?),
                _ => cx.unexpected(child, "target or argument")?,
            }
        }
        Ok(invoke)
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        let call_state =
            (self.call_state != LifecycleState::Created).then_some(self.call_state.as_str());
        let attrs = [("name", Some(self.name.as_str())), ("callState", call_state)];
        if self.target.is_none() && self.arguments.is_empty() {
            w.empty(tags::INVOKE, &attrs);
            return;
        }
        w.open(tags::INVOKE, &attrs);
        if let Some(target) = &self.target {
            match target.as_ref() {
                ValueMetaData::Text(text) => w.text_element(tags::TARGET, &[], text),
                value => {
                    w.open(tags::TARGET, &[]);
                    value.write_xml(w);
                    w.close(tags::TARGET);
                }
            }
        }
        for arg in &self.arguments {
            arg.write_xml(w);
        }
        w.close(tags::INVOKE);
    }
}

/// A call to a static method registered for `code`
#[derive(Debug, Clone, PartialEq)]
pub struct StaticInvokeMetaData {
    pub code: String,
    pub name: String,
    pub arguments: Vec<ArgumentMetaData>,
}

impl StaticInvokeMetaData {
    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::STATIC_INVOKE)?;
        let mut invoke = Self {
            code: cx.required_attr(node, "code")?,
            name: cx.required_attr(node, "name")?,
            arguments: Vec::new(),
        };
        for (_, child) in element_children(node) {
            match child.tag_name().name() {
                tags::ARGUMENT => invoke.arguments.push(ArgumentMetaData::import(child, cx)?),
                _ => cx.unexpected(child, "argument")?,
            }
        }
        Ok(invoke)
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        let attrs = [("code", Some(self.code.as_str())), ("name", Some(self.name.as_str()))];
        if self.arguments.is_empty() {
            w.empty(tags::STATIC_INVOKE, &attrs);
        } else {
            w.open(tags::STATIC_INVOKE, &attrs);
            for arg in &self.arguments {
                arg.write_xml(w);
            }
            w.close(tags::STATIC_INVOKE);
        }
    }
}

/// A reference to a static field registered for `code`
#[derive(Debug, Clone, PartialEq)]
pub struct StaticFieldRefMetaData {
    pub code: String,
    pub name: String,
}

impl StaticFieldRefMetaData {
    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::STATIC_FIELD_REF)?;
        Ok(Self {
            code: cx.required_attr(node, "code")?,
            name: cx.required_attr(node, "name")?,
        })
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.empty(
            tags::STATIC_FIELD_REF,
            &[("code", Some(self.code.as_str())), ("name", Some(self.name.as_str()))],
        );
    }
}

/// A reference to another managed service
///
/// The raw text may contain `${name}` placeholders, so it is only turned into
/// a [`ServiceName`] when the reference is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRefMetaData {
    pub raw: String,
    /// Manager used when the reference omits the `manager#` prefix
    pub manager: String,
}

impl ServiceRefMetaData {
    pub fn new(raw: impl Into<String>, manager: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            manager: manager.into(),
        }
    }

    /// Substitute placeholders and parse the referenced name
    pub fn resolve(&self, props: &dyn PropertySource) -> std::result::Result<ServiceName, NameError> {
        let text = placeholder::substitute(&self.raw, props);
        ServiceName::resolve(&text, &self.manager)
    }

    pub(crate) fn import_text(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        let raw = text_content(node);
        // Names without placeholders are checked eagerly
        if !raw.contains("${") && ServiceName::resolve(&raw, &cx.manager).is_err() {
            return Err(DefinitionError::InvalidServiceName {
                resource: cx.resource.to_string(),
                name: raw,
            });
        }
        Ok(Self::new(raw, cx.manager.clone()))
    }

    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::SERVICE_REF)?;
        Self::import_text(node, cx)
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.text_element(tags::SERVICE_REF, &[], &self.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::ParseOptions;

    fn import_object(xml: &str) -> Result<ObjectMetaData> {
        let document = roxmltree::Document::parse(xml).unwrap();
        let mut cx = ParseContext::new(xml, "test.xml", ParseOptions::default());
        cx.manager = "app".to_string();
        ObjectMetaData::import(document.root_element(), &mut cx)
    }

    #[test]
    fn test_import_fields_and_attributes_in_order() {
        let object = import_object(
            r#"<object code="pkg.Foo">
                   <field name="b" type="int">2</field>
                   <field name="a">1</field>
                   <attribute name="Name">foo</attribute>
               </object>"#,
        )
        .unwrap();

        assert_eq!(object.code.as_deref(), Some("pkg.Foo"));
        assert_eq!(object.manager, "app");
        let names: Vec<_> = object.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(object.fields[0].slot.type_name.as_deref(), Some("int"));
        assert_eq!(object.attributes[0].slot.value, ValueMetaData::Text("foo".into()));
    }

    #[test]
    fn test_missing_code_is_rejected() {
        let err = import_object(r#"<object/>"#).unwrap_err();
        assert!(matches!(err, DefinitionError::MissingAttribute { ref attribute, .. } if attribute == "code"));
    }

    #[test]
    fn test_null_marker_needs_no_code() {
        let object = import_object(r#"<object nullValue="true"/>"#).unwrap();
        assert!(object.null_value);
        assert!(object.code.is_none());
    }

    #[test]
    fn test_duplicate_constructor_is_rejected() {
        let err = import_object(
            r#"<object code="pkg.Foo"><constructor/><constructor/></object>"#,
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateElement { .. }));
    }

    #[test]
    fn test_duplicate_field_is_rejected() {
        let err = import_object(
            r#"<object code="pkg.Foo"><field name="a">1</field><field name="a">2</field></object>"#,
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateName { ref name, .. } if name == "a"));
    }

    #[test]
    fn test_constructor_target_and_arguments_are_exclusive() {
        let err = import_object(
            r#"<object code="pkg.Foo">
                   <constructor>
                       <static-invoke code="pkg.Factory" name="create"/>
                       <argument>1</argument>
                   </constructor>
               </object>"#,
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateElement { .. }));
    }

    #[test]
    fn test_nested_values() {
        let object = import_object(
            r#"<object code="pkg.Foo">
                   <constructor>
                       <argument type="string">hello</argument>
                       <argument><object code="pkg.Bar"><attribute name="X">1</attribute></object></argument>
                       <argument><service-ref>mgr#Y</service-ref></argument>
                       <argument nullValue="true"/>
                   </constructor>
                   <attribute name="Raw"><custom a="1"/></attribute>
               </object>"#,
        )
        .unwrap();

        let ConstructorKind::Arguments(args) = &object.constructor.as_ref().unwrap().kind else {
            panic!("expected an argument constructor");
        };
        assert_eq!(args.len(), 4);
        assert!(matches!(&args[1].slot.value, ValueMetaData::Object(nested) if nested.attributes.len() == 1));
        assert!(matches!(&args[2].slot.value, ValueMetaData::ServiceRef(r) if r.raw == "mgr#Y"));
        assert!(args[3].slot.null_value);
        assert_eq!(
            object.attributes[0].slot.value,
            ValueMetaData::Opaque(r#"<custom a="1"/>"#.to_string())
        );
    }

    #[test]
    fn test_invoke_call_state() {
        let object = import_object(
            r#"<object code="pkg.Foo">
                   <invoke name="init"/>
                   <invoke name="warm" callState="Started"><argument type="int">3</argument></invoke>
               </object>"#,
        )
        .unwrap();
        assert_eq!(object.invokes[0].call_state, LifecycleState::Created);
        assert_eq!(object.invokes[1].call_state, LifecycleState::Started);
        assert_eq!(object.invokes[1].arguments.len(), 1);

        let err = import_object(r#"<object code="pkg.Foo"><invoke name="x" callState="Later"/></object>"#)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_invalid_service_ref() {
        let err = import_object(
            r#"<object code="pkg.Foo"><attribute name="A"><service-ref>mgr#</service-ref></attribute></object>"#,
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidServiceName { .. }));
    }

    #[test]
    fn test_service_ref_placeholders_resolve_lazily() {
        let reference = ServiceRefMetaData::new("${mgr}#Cache", "app");
        let props = crate::property::MapPropertySource::from_pairs([("mgr", "shared")]);
        assert_eq!(
            reference.resolve(&props).unwrap(),
            ServiceName::new("shared", "Cache")
        );
    }
}
