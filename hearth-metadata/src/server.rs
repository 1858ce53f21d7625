//! Document-level definitions: server, managers, services

use crate::error::Result;
use crate::ifdef::IfDefMetaData;
use crate::object::{ObjectMetaData, ServiceRefMetaData};
use crate::parse::{element_children, tags, text_content, ParseContext};
use crate::state::LifecycleState;
use crate::xml::XmlWriter;
use roxmltree::Node;

/// A complete definition source
#[derive(Debug, Clone, PartialEq)]
pub struct ServerMetaData {
    /// Identifier of the source (path or URL)
    pub resource: String,
    pub managers: Vec<ManagerMetaData>,
    /// Type-to-editor bindings scoped to this source
    pub property_editors: Vec<PropertyEditorMetaData>,
    pub comments: Vec<String>,
}

impl ServerMetaData {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            managers: Vec::new(),
            property_editors: Vec::new(),
            comments: Vec::new(),
        }
    }

    pub fn manager(&self, name: &str) -> Option<&ManagerMetaData> {
        self.managers.iter().find(|m| m.name == name)
    }

    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::SERVER)?;
        let mut server = Self::new(cx.resource.to_string());

        for (comments, child) in element_children(node) {
            match child.tag_name().name() {
                tags::MANAGER => {
                    let mut manager = ManagerMetaData::import(child, cx)?;
                    if server.manager(&manager.name).is_some() {
                        return Err(cx.duplicate_name(tags::MANAGER, &manager.name));
                    }
                    manager.comments = comments;
                    server.managers.push(manager);
                }
                tags::PROPERTY_EDITORS => {
                    for (comments, editor) in element_children(child) {
                        if editor.tag_name().name() != tags::PROPERTY_EDITOR {
                            cx.unexpected(editor, tags::PROPERTY_EDITOR)?;
                            continue;
                        }
                        let mut editor = PropertyEditorMetaData::import(editor, cx)?;
                        editor.comments = comments;
                        server.property_editors.push(editor);
                    }
                }
                _ => cx.unexpected(child, "manager or property-editors")?,
            }
        }
        Ok(server)
    }

    /// Serialize the whole definition source
    pub fn to_xml(&self) -> String {
        let mut w = XmlWriter::new();
        w.declaration();
        w.comments(&self.comments);
        w.open(tags::SERVER, &[]);
        if !self.property_editors.is_empty() {
            w.open(tags::PROPERTY_EDITORS, &[]);
            for editor in &self.property_editors {
                editor.write_xml(&mut w);
            }
            w.close(tags::PROPERTY_EDITORS);
        }
        for manager in &self.managers {
            manager.write_xml(&mut w);
        }
        w.close(tags::SERVER);
        w.finish()
    }
}

/// Binds a type name to a named property editor for one definition source
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEditorMetaData {
    pub type_name: String,
    pub editor: String,
    pub comments: Vec<String>,
}

impl PropertyEditorMetaData {
    fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        Ok(Self {
            type_name: cx.required_attr(node, "type")?,
            editor: text_content(node),
            comments: Vec::new(),
        })
    }

    fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        w.text_element(
            tags::PROPERTY_EDITOR,
            &[("type", Some(self.type_name.as_str()))],
            &self.editor,
        );
    }
}

/// A manager namespace and the services declared in it
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerMetaData {
    pub name: String,
    pub services: Vec<ServiceMetaData>,
    /// Conditional groups of services
    pub ifdefs: Vec<IfDefMetaData>,
    pub comments: Vec<String>,
}

impl ManagerMetaData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
            ifdefs: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Look up an unconditional service by name
    pub fn service(&self, name: &str) -> Option<&ServiceMetaData> {
        self.services.iter().find(|s| s.name == name)
    }

    fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        let name = node
            .attribute("name")
            .unwrap_or(crate::DEFAULT_MANAGER)
            .to_string();
        cx.manager = name.clone();
        let mut manager = Self::new(name);

        for (comments, child) in element_children(node) {
            match child.tag_name().name() {
                tags::SERVICE => {
                    let mut service = ServiceMetaData::import(child, cx)?;
                    if manager.service(&service.name).is_some() {
                        return Err(cx.duplicate_name(tags::SERVICE, &service.name));
                    }
                    service.comments = comments;
                    manager.services.push(service);
                }
                tags::IFDEF => {
                    let mut ifdef = IfDefMetaData::import_in_manager(child, cx)?;
                    ifdef.comments = comments;
                    manager.ifdefs.push(ifdef);
                }
                _ => cx.unexpected(child, "service or ifdef")?,
            }
        }

        cx.manager = crate::DEFAULT_MANAGER.to_string();
        Ok(manager)
    }

    fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        let attrs = [("name", Some(self.name.as_str()))];
        if self.services.is_empty() && self.ifdefs.is_empty() {
            w.empty(tags::MANAGER, &attrs);
            return;
        }
        w.open(tags::MANAGER, &attrs);
        for service in &self.services {
            service.write_xml(w);
        }
        for ifdef in &self.ifdefs {
            ifdef.write_xml(w);
        }
        w.close(tags::MANAGER);
    }
}

/// A named, lifecycle-managed object definition
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMetaData {
    pub name: String,
    pub object: ObjectMetaData,
    /// State the container drives the service to when its source is deployed
    pub init_state: LifecycleState,
    /// Explicitly declared dependencies
    pub depends: Vec<DependsMetaData>,
    pub comments: Vec<String>,
}

impl ServiceMetaData {
    pub fn new(name: impl Into<String>, object: ObjectMetaData) -> Self {
        Self {
            name: name.into(),
            object,
            init_state: LifecycleState::Started,
            depends: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Manager namespace the service is declared in
    pub fn manager(&self) -> &str {
        &self.object.manager
    }

    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::SERVICE)?;
        let name = cx.required_attr(node, "name")?;
        let init_state = cx.state_attr(node, "initState", cx.options.default_init_state)?;
        if !matches!(init_state, LifecycleState::Created | LifecycleState::Started) {
            return Err(cx.invalid_attr(node, "initState", init_state.as_str()));
        }

        let (object, depends) = ObjectMetaData::import_body(node, cx, true)?;
        Ok(Self {
            name,
            object,
            init_state,
            depends,
            comments: Vec::new(),
        })
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        let init_state =
            (self.init_state != LifecycleState::Started).then_some(self.init_state.as_str());
        let attrs = [
            ("name", Some(self.name.as_str())),
            ("code", self.object.code.as_deref()),
            ("initState", init_state),
            ("nullValue", self.object.null_value.then_some("true")),
        ];
        if !self.object.has_children() && self.depends.is_empty() {
            w.empty(tags::SERVICE, &attrs);
            return;
        }
        w.open(tags::SERVICE, &attrs);
        self.object.write_children(w, &self.depends);
        w.close(tags::SERVICE);
    }
}

/// An explicit `<depends>` edge
#[derive(Debug, Clone, PartialEq)]
pub struct DependsMetaData {
    pub reference: ServiceRefMetaData,
    pub comments: Vec<String>,
}

impl DependsMetaData {
    pub(crate) fn import(node: Node<'_, '_>, cx: &mut ParseContext<'_>) -> Result<Self> {
        cx.expect_tag(node, tags::DEPENDS)?;
        Ok(Self {
            reference: ServiceRefMetaData::import_text(node, cx)?,
            comments: Vec::new(),
        })
    }

    pub(crate) fn write_xml(&self, w: &mut XmlWriter) {
        w.comments(&self.comments);
        w.text_element(tags::DEPENDS, &[], &self.reference.raw);
    }
}

#[cfg(test)]
mod tests {
    use crate::parse::{parse_server, ParseOptions};
    use crate::{DefinitionError, LifecycleState};

    #[test]
    fn test_parse_managers_and_services() {
        let server = parse_server(
            r#"<server>
                   <!-- shared infrastructure -->
                   <manager name="infra">
                       <service name="Logger" code="pkg.Logger" initState="Created"/>
                   </manager>
                   <manager name="app">
                       <service name="Api" code="pkg.Api">
                           <depends>infra#Logger</depends>
                           <depends>Store</depends>
                       </service>
                   </manager>
               </server>"#,
            "app-service.xml",
            &ParseOptions::default(),
        )
        .unwrap();

        let infra = server.manager("infra").unwrap();
        assert_eq!(infra.comments, ["shared infrastructure"]);
        assert_eq!(infra.services[0].init_state, LifecycleState::Created);
        assert_eq!(infra.services[0].manager(), "infra");

        let api = server.manager("app").unwrap().service("Api").unwrap();
        assert_eq!(api.init_state, LifecycleState::Started);
        assert_eq!(api.depends.len(), 2);
        assert_eq!(api.depends[1].reference.manager, "app");
        assert_eq!(&*api.object.source, "app-service.xml");
    }

    #[test]
    fn test_duplicate_service_is_rejected() {
        let err = parse_server(
            r#"<server><manager name="m">
                   <service name="A" code="pkg.A"/>
                   <service name="A" code="pkg.B"/>
               </manager></server>"#,
            "dup.xml",
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateName { ref name, .. } if name == "A"));
    }

    #[test]
    fn test_init_state_must_be_created_or_started() {
        let err = parse_server(
            r#"<server><manager><service name="A" code="pkg.A" initState="Stopped"/></manager></server>"#,
            "init.xml",
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_property_editors() {
        let server = parse_server(
            r#"<server>
                   <property-editors>
                       <property-editor type="pkg.Color">hex-color</property-editor>
                   </property-editors>
               </server>"#,
            "editors.xml",
            &ParseOptions::default(),
        )
        .unwrap();
        assert_eq!(server.property_editors[0].type_name, "pkg.Color");
        assert_eq!(server.property_editors[0].editor, "hex-color");
    }
}
