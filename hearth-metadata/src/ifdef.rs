//! Conditional (`ifdef`) blocks

use crate::error::Result;
use crate::object::{AttributeMetaData, ConstructorMetaData, FieldMetaData, InvokeMetaData};
use crate::parse::{element_children, tags, ParseContext};
use crate::property::PropertySource;
use crate::server::{DependsMetaData, ServiceMetaData};
use crate::xml::XmlWriter;
use roxmltree::Node;
use std::sync::OnceLock;
use tracing::debug;

/// A node gated by an `ifdef` block
#[derive(Debug, Clone, PartialEq)]
pub enum IfDefChild {
    Service(ServiceMetaData),
    Constructor(ConstructorMetaData),
    Field(FieldMetaData),
    Attribute(AttributeMetaData),
    Invoke(InvokeMetaData),
    Depends(DependsMetaData),
}

/// A `name == value` predicate over an external property, guarding child nodes
///
/// The verdict is computed on first evaluation and then kept for the life of
/// the enclosing definition.
#[derive(Debug, Clone)]
pub struct IfDefMetaData {
    pub name: String,
    pub value: String,
    pub children: Vec<IfDefChild>,
    pub comments: Vec<String>,
    verdict: OnceLock<bool>,
}

impl PartialEq for IfDefMetaData {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.value == other.value
            && self.children == other.children
            && self.comments == other.comments
    }
}

impl IfDefMetaData {
    pub fn new(name: impl Into<String>, value: impl Into<String>, children: Vec<IfDefChild>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            children,
            comments: Vec::new(),
            verdict: OnceLock::new(),
        }
    }

    /// Whether the guarded children apply, memoized after the first call
    pub fn evaluate(&self, props: &dyn PropertySource) -> bool {
        *self.verdict.get_or_init(|| {
            let actual = props.property(&self.name);
            let matched = actual.as_deref() == Some(self.value.as_str());
            debug!(
                "ifdef {}={} evaluated to {} (property is {:?})",
                self.name, self.value, matched, actual
            );
            matched
        })
    }

    /// The memoized verdict, if the block has been evaluated
    pub fn verdict(&self) -> Option<bool> {
        self.verdict.get().copied()
    }

    pub fn constructors(&self) -> impl Iterator<Item = &ConstructorMetaData> {
        self.children.iter().filter_map(|c| match c {
            IfDefChild::Constructor(constructor) => Some(constructor),
            _ => None,
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldMetaData> {
        self.children.iter().filter_map(|c| match c {
            IfDefChild::Field(field) => Some(field),
            _ => None,
        })
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeMetaData> {
        self.children.iter().filter_map(|c| match c {
            IfDefChild::Attribute(attribute) => Some(attribute),
            _ => None,
        })
    }

    pub fn invokes(&self) -> impl Iterator<Item = &InvokeMetaData> {
        self.children.iter().filter_map(|c| match c {
            IfDefChild::Invoke(invoke) => Some(invoke),
            _ => None,
        })
    }

    pub fn depends(&self) -> impl Iterator<Item = &DependsMetaData> {
        self.children.iter().filter_map(|c| match c {
            IfDefChild::Depends(dep) => Some(dep),
            _ => None,
        })
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceMetaData> {
        self.children.iter().filter_map(|c| match c {
            IfDefChild::Service(service) => Some(service),
            _ => None,
        })
    }

    fn import_header(node: Node<'_, '_>, cx: &ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::IFDEF)?;
        Ok(Self::new(
            cx.required_attr(node, "name")?,
            cx.required_attr(node, "value")?,
            Vec::new(),
        ))
    }

    /// Import an `ifdef` nested in an `<object>` or `<service>` element
    pub(crate) fn import_in_object(
        node: Node<'_, '_>,
        cx: &mut ParseContext<'_>,
        element: &str,
        allow_depends: bool,
    ) -> Result<Self> {
        let mut ifdef = Self::import_header(node, cx)?;

        for (comments, child) in element_children(node) {
            let entry = match child.tag_name().name() {
                tags::CONSTRUCTOR => {
                    if ifdef.constructors().next().is_some() {
                        return Err(cx.duplicate_element(node, tags::CONSTRUCTOR));
                    }
                    let mut constructor = ConstructorMetaData::import(child, cx)?;
                    constructor.comments = comments;
                    IfDefChild::Constructor(constructor)
                }
                tags::FIELD => {
                    let mut field = FieldMetaData::import(child, cx)?;
                    if ifdef.fields().any(|f| f.name == field.name) {
                        return Err(cx.duplicate_name(tags::FIELD, &field.name));
                    }
                    field.comments = comments;
                    IfDefChild::Field(field)
                }
                tags::ATTRIBUTE => {
                    let mut attribute = AttributeMetaData::import(child, cx)?;
                    if ifdef.attributes().any(|a| a.name == attribute.name) {
                        return Err(cx.duplicate_name(tags::ATTRIBUTE, &attribute.name));
                    }
                    attribute.comments = comments;
                    IfDefChild::Attribute(attribute)
                }
                tags::INVOKE => {
                    let mut invoke = InvokeMetaData::import(child, cx)?;
                    invoke.comments = comments;
                    IfDefChild::Invoke(invoke)
                }
                tags::DEPENDS if allow_depends => {
                    let mut dep = DependsMetaData::import(child, cx)?;
                    dep.comments = comments;
                    IfDefChild::Depends(dep)
                }
                _ => {
                    cx.unexpected(
                        child,
                        &format!("constructor, field, attribute or invoke inside <{}>", element),
                    )?;
                    continue;
                }
            };
            ifdef.children.push(entry);
        }
        Ok(ifdef)
    }

    /// Import an `ifdef` grouping services inside a `<manager>`
    pub(crate) fn import_in_manager(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        let mut ifdef = Self::import_header(node, cx)?;

        for (comments, child) in element_children(node) {
            match child.tag_name().name() {
                tags::SERVICE => {
                    let mut service = ServiceMetaData::import(child, cx)?;
                    if ifdef.services().any(|s| s.name == service.name) {
                        return Err(cx.duplicate_name(tags::SERVICE, &service.name));
                    }
                    service.comments = comments;
                    ifdef.children.push(IfDefChild::Service(service));
                }
                _ => cx.unexpected(child, "service")?,
            }
        }
        Ok(ifdef)
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        let attrs = [
            ("name", Some(self.name.as_str())),
            ("value", Some(self.value.as_str())),
        ];
        if self.children.is_empty() {
            w.empty(tags::IFDEF, &attrs);
            return;
        }
        w.open(tags::IFDEF, &attrs);
        for child in &self.children {
            match child {
                IfDefChild::Service(service) => service.write_xml(w),
                IfDefChild::Constructor(constructor) => constructor.write_xml(w),
                IfDefChild::Field(field) => field.write_xml(w),
                IfDefChild::Attribute(attribute) => attribute.write_xml(w),
                IfDefChild::Invoke(invoke) => invoke.write_xml(w),
                IfDefChild::Depends(dep) => dep.write_xml(w),
            }
        }
        w.close(tags::IFDEF);
    }
}
