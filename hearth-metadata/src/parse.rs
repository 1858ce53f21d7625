//! Entry point and shared helpers for importing definition documents

use crate::error::{DefinitionError, Result};
use crate::server::ServerMetaData;
use crate::state::LifecycleState;
use roxmltree::{Document, Node};
use std::sync::Arc;
use tracing::{debug, warn};

/// Element and attribute vocabulary of a definition document
pub mod tags {
    pub const SERVER: &str = "server";
    pub const MANAGER: &str = "manager";
    pub const SERVICE: &str = "service";
    pub const OBJECT: &str = "object";
    pub const CONSTRUCTOR: &str = "constructor";
    pub const ARGUMENT: &str = "argument";
    pub const FIELD: &str = "field";
    pub const ATTRIBUTE: &str = "attribute";
    pub const INVOKE: &str = "invoke";
    pub const TARGET: &str = "target";
    pub const STATIC_INVOKE: &str = "static-invoke";
    pub const STATIC_FIELD_REF: &str = "static-field-ref";
    pub const SERVICE_REF: &str = "service-ref";
    pub const DEPENDS: &str = "depends";
    pub const IFDEF: &str = "ifdef";
    pub const PROPERTY_EDITORS: &str = "property-editors";
    pub const PROPERTY_EDITOR: &str = "property-editor";
}

/// Options controlling how a definition document is imported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reject any element outside the vocabulary instead of tolerating it
    pub validate: bool,
    /// `initState` of services that do not declare one
    pub default_init_state: LifecycleState,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            validate: false,
            default_init_state: LifecycleState::Started,
        }
    }
}

/// Parse a complete definition document
///
/// `resource` identifies the source (usually its path) and is carried by
/// every error and by every object definition in the resulting tree.
pub fn parse_server(xml: &str, resource: &str, options: &ParseOptions) -> Result<ServerMetaData> {
    // Legacy sources sometimes carry a byte-order mark
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);

    let parsing_options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let document =
        Document::parse_with_options(xml, parsing_options).map_err(|source| DefinitionError::Xml {
            resource: resource.to_string(),
            source,
        })?;

    let mut cx = ParseContext::new(xml, resource, *options);
    let mut server = ServerMetaData::import(document.root_element(), &mut cx)?;
    if let Some((comments, _)) = element_children(document.root()).into_iter().next() {
        server.comments = comments;
    }

    debug!(
        "Parsed definition {} ({} managers)",
        resource,
        server.managers.len()
    );
    Ok(server)
}

/// State threaded through the import functions
pub(crate) struct ParseContext<'x> {
    pub resource: Arc<str>,
    pub xml: &'x str,
    pub options: ParseOptions,
    /// Manager namespace of the definitions currently being imported
    pub manager: String,
}

impl<'x> ParseContext<'x> {
    pub fn new(xml: &'x str, resource: &str, options: ParseOptions) -> Self {
        Self {
            resource: Arc::from(resource),
            xml,
            options,
            manager: crate::DEFAULT_MANAGER.to_string(),
        }
    }

    /// Fail unless `node` has the tag `expected`
    pub fn expect_tag(&self, node: Node<'_, '_>, expected: &str) -> Result<()> {
        if node.tag_name().name() == expected {
            Ok(())
        } else {
            Err(DefinitionError::UnexpectedElement {
                resource: self.resource.to_string(),
                expected: expected.to_string(),
                found: node.tag_name().name().to_string(),
            })
        }
    }

    /// Report an element that is not valid at its position
    ///
    /// In validating mode this is an error; otherwise the element is logged
    /// and skipped.
    pub fn unexpected(&self, node: Node<'_, '_>, expected: &str) -> Result<()> {
        if self.options.validate {
            return Err(DefinitionError::UnexpectedElement {
                resource: self.resource.to_string(),
                expected: expected.to_string(),
                found: node.tag_name().name().to_string(),
            });
        }
        warn!(
            "{}: ignoring unexpected <{}> (expected {})",
            self.resource,
            node.tag_name().name(),
            expected
        );
        Ok(())
    }

    pub fn required_attr(&self, node: Node<'_, '_>, name: &str) -> Result<String> {
        node.attribute(name)
            .map(str::to_string)
            .ok_or_else(|| DefinitionError::MissingAttribute {
                resource: self.resource.to_string(),
                element: node.tag_name().name().to_string(),
                attribute: name.to_string(),
            })
    }

    pub fn bool_attr(&self, node: Node<'_, '_>, name: &str) -> Result<bool> {
        match node.attribute(name).map(str::trim) {
            None => Ok(false),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(self.invalid_attr(node, name, v)),
        }
    }

    pub fn state_attr(
        &self,
        node: Node<'_, '_>,
        name: &str,
        default: LifecycleState,
    ) -> Result<LifecycleState> {
        match node.attribute(name) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| self.invalid_attr(node, name, v)),
        }
    }

    pub fn invalid_attr(&self, node: Node<'_, '_>, name: &str, value: &str) -> DefinitionError {
        DefinitionError::InvalidAttribute {
            resource: self.resource.to_string(),
            element: node.tag_name().name().to_string(),
            attribute: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn duplicate_element(&self, node: Node<'_, '_>, child: &str) -> DefinitionError {
        DefinitionError::DuplicateElement {
            resource: self.resource.to_string(),
            element: node.tag_name().name().to_string(),
            child: child.to_string(),
        }
    }

    pub fn duplicate_name(&self, element: &str, name: &str) -> DefinitionError {
        DefinitionError::DuplicateName {
            resource: self.resource.to_string(),
            element: element.to_string(),
            name: name.to_string(),
        }
    }

    /// Source text of an element, exactly as written
    pub fn raw(&self, node: Node<'_, '_>) -> String {
        self.xml[node.range()].to_string()
    }
}

/// Element children of `node`, each paired with the comments directly preceding it
pub(crate) fn element_children<'a, 'i>(node: Node<'a, 'i>) -> Vec<(Vec<String>, Node<'a, 'i>)> {
    let mut out = Vec::new();
    let mut pending = Vec::new();

    for child in node.children() {
        if child.is_comment() {
            if let Some(text) = child.text() {
                let text = text.trim();
                if !text.is_empty() {
                    pending.push(text.to_string());
                }
            }
        } else if child.is_element() {
            out.push((std::mem::take(&mut pending), child));
        }
    }
    out
}

/// Text content of `node` with line-level normalization applied
pub(crate) fn text_content(node: Node<'_, '_>) -> String {
    let raw: String = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect();
    normalize_text(&raw)
}

/// Trim each line, drop blank leading/trailing lines, join with `\n`
///
/// This is the canonical form the serializer writes back, so text with
/// embedded line breaks survives a round trip regardless of indentation.
pub fn normalize_text(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().map(str::trim).collect();
    let start = lines.iter().position(|l| !l.is_empty());
    let end = lines.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}
