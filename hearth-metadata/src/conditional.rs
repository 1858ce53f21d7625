//! Merging matched `ifdef` children into the unconditional definition

use crate::error::{DefinitionError, Result};
use crate::ifdef::IfDefMetaData;
use crate::object::{
    AttributeMetaData, ConstructorKind, ConstructorMetaData, FieldMetaData, InvokeMetaData,
    ObjectMetaData, ServiceRefMetaData, ValueMetaData,
};
use crate::property::PropertySource;
use crate::server::{DependsMetaData, ManagerMetaData, ServiceMetaData};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// What to do when two matched conditional blocks declare the same name
///
/// Unconditional declarations always win over conditional ones; the policy
/// only arbitrates between conditional blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Keep the declaration from the earliest matched block
    #[default]
    FirstWins,
    /// Keep the declaration from the latest matched block
    LastWins,
    /// Fail the definition
    Reject,
}

/// The view of an object definition after conditional blocks are applied
#[derive(Debug, Clone)]
pub struct EffectiveObject<'a> {
    pub meta: &'a ObjectMetaData,
    pub constructor: Option<&'a ConstructorMetaData>,
    pub fields: Vec<&'a FieldMetaData>,
    pub attributes: Vec<&'a AttributeMetaData>,
    pub invokes: Vec<&'a InvokeMetaData>,
    /// Explicit dependencies; only populated for services
    pub depends: Vec<&'a DependsMetaData>,
}

impl ObjectMetaData {
    /// Evaluate this object's conditional blocks and merge their children
    pub fn effective<'a>(
        &'a self,
        props: &dyn PropertySource,
        policy: DuplicatePolicy,
    ) -> Result<EffectiveObject<'a>> {
        let matched: Vec<&IfDefMetaData> =
            self.ifdefs.iter().filter(|i| i.evaluate(props)).collect();

        let element = self.code.as_deref().unwrap_or("object");
        let constructor = match self.constructor.as_ref() {
            Some(constructor) => Some(constructor),
            None => {
                let mut found = None;
                for ifdef in &matched {
                    if let Some(candidate) = ifdef.constructors().next() {
                        if found.is_some() {
                            return Err(self.conflict(element, "a constructor"));
                        }
                        found = Some(candidate);
                    }
                }
                found
            }
        };

        let fields = merge_named(
            self.fields.iter().collect(),
            matched.iter().map(|i| i.fields().collect::<Vec<_>>()),
            |f| &f.name,
            policy,
        )
        .map_err(|name| self.conflict(element, &format!("field '{}'", name)))?;

        let attributes = merge_named(
            self.attributes.iter().collect(),
            matched.iter().map(|i| i.attributes().collect::<Vec<_>>()),
            |a| &a.name,
            policy,
        )
        .map_err(|name| self.conflict(element, &format!("attribute '{}'", name)))?;

        let mut invokes: Vec<&InvokeMetaData> = self.invokes.iter().collect();
        invokes.extend(matched.iter().flat_map(|i| i.invokes()));

        let depends = matched.iter().flat_map(|i| i.depends()).collect();

        Ok(EffectiveObject {
            meta: self,
            constructor,
            fields,
            attributes,
            invokes,
            depends,
        })
    }

    fn conflict(&self, element: &str, what: &str) -> DefinitionError {
        DefinitionError::ConflictingConditional {
            resource: self.source.to_string(),
            element: element.to_string(),
            what: what.to_string(),
        }
    }
}

impl ServiceMetaData {
    /// Effective view of the service object, including its explicit dependencies
    pub fn effective<'a>(
        &'a self,
        props: &dyn PropertySource,
        policy: DuplicatePolicy,
    ) -> Result<EffectiveObject<'a>> {
        let mut effective = self.object.effective(props, policy)?;
        let conditional = std::mem::take(&mut effective.depends);
        effective.depends = self.depends.iter().chain(conditional).collect();
        Ok(effective)
    }
}

impl ManagerMetaData {
    /// Unconditional services followed by services from matched blocks
    pub fn effective_services<'a>(
        &'a self,
        props: &dyn PropertySource,
        policy: DuplicatePolicy,
    ) -> Result<Vec<&'a ServiceMetaData>> {
        let matched = self
            .ifdefs
            .iter()
            .filter(|i| i.evaluate(props))
            .map(|i| i.services().collect::<Vec<_>>());

        merge_named(self.services.iter().collect(), matched, |s| &s.name, policy).map_err(|name| {
            let resource = self
                .services
                .first()
                .map(|s| s.object.source.to_string())
                .or_else(|| {
                    self.ifdefs
                        .iter()
                        .flat_map(|i| i.services())
                        .next()
                        .map(|s| s.object.source.to_string())
                })
                .unwrap_or_default();
            DefinitionError::ConflictingConditional {
                resource,
                element: format!("manager {}", self.name),
                what: format!("service '{}'", name),
            }
        })
    }
}

impl<'a> EffectiveObject<'a> {
    /// Every service reference reachable from this definition
    ///
    /// Nested objects are expanded through their own conditional blocks.
    /// Explicit `<depends>` entries come first.
    pub fn service_refs(
        &self,
        props: &dyn PropertySource,
        policy: DuplicatePolicy,
    ) -> Result<Vec<&'a ServiceRefMetaData>> {
        let mut refs: Vec<&'a ServiceRefMetaData> =
            self.depends.iter().map(|d| &d.reference).collect();
        self.collect_refs(props, policy, &mut refs)?;
        Ok(refs)
    }

    fn collect_refs(
        &self,
        props: &dyn PropertySource,
        policy: DuplicatePolicy,
        refs: &mut Vec<&'a ServiceRefMetaData>,
    ) -> Result<()> {
        if let Some(constructor) = self.constructor {
            match &constructor.kind {
                ConstructorKind::Invoke(invoke) => collect_invoke(invoke, props, policy, refs)?,
                ConstructorKind::StaticInvoke(invoke) => {
                    for arg in &invoke.arguments {
                        collect_value(&arg.slot.value, props, policy, refs)?;
                    }
                }
                ConstructorKind::StaticFieldRef(_) => {}
                ConstructorKind::Arguments(args) => {
                    for arg in args {
                        collect_value(&arg.slot.value, props, policy, refs)?;
                    }
                }
            }
        }
        for field in &self.fields {
            collect_value(&field.slot.value, props, policy, refs)?;
        }
        for attribute in &self.attributes {
            collect_value(&attribute.slot.value, props, policy, refs)?;
        }
        for invoke in &self.invokes {
            collect_invoke(invoke, props, policy, refs)?;
        }
        Ok(())
    }
}

fn collect_invoke<'a>(
    invoke: &'a InvokeMetaData,
    props: &dyn PropertySource,
    policy: DuplicatePolicy,
    refs: &mut Vec<&'a ServiceRefMetaData>,
) -> Result<()> {
    if let Some(target) = &invoke.target {
        collect_value(target, props, policy, refs)?;
    }
    for arg in &invoke.arguments {
        collect_value(&arg.slot.value, props, policy, refs)?;
    }
    Ok(())
}

fn collect_value<'a>(
    value: &'a ValueMetaData,
    props: &dyn PropertySource,
    policy: DuplicatePolicy,
    refs: &mut Vec<&'a ServiceRefMetaData>,
) -> Result<()> {
    match value {
        ValueMetaData::ServiceRef(reference) => refs.push(reference),
        ValueMetaData::Object(object) => {
            object.effective(props, policy)?.collect_refs(props, policy, refs)?
        }
        ValueMetaData::StaticInvoke(invoke) => {
            for arg in &invoke.arguments {
                collect_value(&arg.slot.value, props, policy, refs)?;
            }
        }
        ValueMetaData::Text(_) | ValueMetaData::StaticFieldRef(_) | ValueMetaData::Opaque(_) => {}
    }
    Ok(())
}

/// Merge named conditional entries into the unconditional list
///
/// Returns the offending name when `policy` is [`DuplicatePolicy::Reject`]
/// and two blocks collide.
fn merge_named<'a, T>(
    unconditional: Vec<&'a T>,
    blocks: impl Iterator<Item = Vec<&'a T>>,
    name_of: impl Fn(&T) -> &String,
    policy: DuplicatePolicy,
) -> std::result::Result<Vec<&'a T>, String> {
    let fixed = unconditional.len();
    let mut merged = unconditional;

    for block in blocks {
        for entry in block {
            let name = name_of(entry);
            match merged.iter().position(|e| name_of(*e) == name) {
                Some(index) if index < fixed => {
                    trace!("conditional '{}' shadowed by unconditional declaration", name);
                }
                Some(index) => match policy {
                    DuplicatePolicy::FirstWins => {}
                    DuplicatePolicy::LastWins => merged[index] = entry,
                    DuplicatePolicy::Reject => return Err(name.clone()),
                },
                None => merged.push(entry),
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse_server, ParseOptions};
    use crate::property::MapPropertySource;
    use crate::server::ServerMetaData;

    const CONDITIONAL: &str = r#"
        <server>
            <manager name="app">
                <service name="Store" code="pkg.Store">
                    <attribute name="Url">jdbc://default</attribute>
                    <ifdef name="env" value="dev">
                        <attribute name="Url">jdbc://dev</attribute>
                        <attribute name="Debug">true</attribute>
                        <field name="pool">2</field>
                    </ifdef>
                    <ifdef name="env" value="prod">
                        <attribute name="Replicas">3</attribute>
                        <field name="pool">20</field>
                        <depends>infra#Monitor</depends>
                    </ifdef>
                    <ifdef name="region" value="eu">
                        <field name="pool">8</field>
                    </ifdef>
                </service>
            </manager>
        </server>"#;

    fn server() -> ServerMetaData {
        parse_server(CONDITIONAL, "cond.xml", &ParseOptions::default()).unwrap()
    }

    #[test]
    fn test_only_matching_block_is_merged() {
        let server = server();
        let service = server.manager("app").unwrap().service("Store").unwrap();
        let props = MapPropertySource::from_pairs([("env", "prod")]);
        let effective = service.effective(&props, DuplicatePolicy::FirstWins).unwrap();

        let attrs: Vec<_> = effective.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(attrs, ["Url", "Replicas"]);
        assert_eq!(effective.fields.len(), 1);
        assert_eq!(effective.fields[0].slot.value, ValueMetaData::Text("20".into()));
        assert_eq!(effective.depends.len(), 1);
    }

    #[test]
    fn test_unconditional_is_never_overridden() {
        let server = server();
        let service = server.manager("app").unwrap().service("Store").unwrap();
        let props = MapPropertySource::from_pairs([("env", "dev")]);
        let effective = service.effective(&props, DuplicatePolicy::LastWins).unwrap();

        let url = effective.attributes.iter().find(|a| a.name == "Url").unwrap();
        assert_eq!(url.slot.value, ValueMetaData::Text("jdbc://default".into()));
        assert!(effective.attributes.iter().any(|a| a.name == "Debug"));
    }

    #[test]
    fn test_duplicate_policy_between_blocks() {
        let props = MapPropertySource::from_pairs([("env", "prod"), ("region", "eu")]);

        let server = server();
        let service = server.manager("app").unwrap().service("Store").unwrap();
        let first = service.effective(&props, DuplicatePolicy::FirstWins).unwrap();
        assert_eq!(first.fields[0].slot.value, ValueMetaData::Text("20".into()));

        let server = self::server();
        let service = server.manager("app").unwrap().service("Store").unwrap();
        let last = service.effective(&props, DuplicatePolicy::LastWins).unwrap();
        assert_eq!(last.fields[0].slot.value, ValueMetaData::Text("8".into()));

        let server = self::server();
        let service = server.manager("app").unwrap().service("Store").unwrap();
        let err = service.effective(&props, DuplicatePolicy::Reject).unwrap_err();
        assert!(matches!(err, DefinitionError::ConflictingConditional { .. }));
    }

    #[test]
    fn test_two_matched_constructors_conflict() {
        let server = parse_server(
            r#"<server><manager>
                   <service name="A" code="pkg.A">
                       <ifdef name="x" value="1"><constructor><argument>a</argument></constructor></ifdef>
                       <ifdef name="y" value="1"><constructor><argument>b</argument></constructor></ifdef>
                   </service>
               </manager></server>"#,
            "ctor.xml",
            &ParseOptions::default(),
        )
        .unwrap();
        let service = &server.managers[0].services[0];

        let one = MapPropertySource::from_pairs([("x", "1")]);
        assert!(service.effective(&one, DuplicatePolicy::FirstWins).unwrap().constructor.is_some());

        let server = parse_server(
            &server.to_xml(),
            "ctor.xml",
            &ParseOptions::default(),
        )
        .unwrap();
        let service = &server.managers[0].services[0];
        let both = MapPropertySource::from_pairs([("x", "1"), ("y", "1")]);
        assert!(service.effective(&both, DuplicatePolicy::FirstWins).is_err());
    }

    #[test]
    fn test_service_refs_reach_nested_objects() {
        let server = parse_server(
            r#"<server><manager name="app">
                   <service name="Api" code="pkg.Api">
                       <depends>infra#Logger</depends>
                       <constructor>
                           <argument><object code="pkg.Client">
                               <attribute name="Cache"><service-ref>Cache</service-ref></attribute>
                           </object></argument>
                       </constructor>
                       <invoke name="bind"><target><service-ref>infra#Router</service-ref></target></invoke>
                   </service>
               </manager></server>"#,
            "refs.xml",
            &ParseOptions::default(),
        )
        .unwrap();
        let service = &server.managers[0].services[0];
        let props = MapPropertySource::default();
        let effective = service.effective(&props, DuplicatePolicy::FirstWins).unwrap();
        let names: Vec<String> = effective
            .service_refs(&props, DuplicatePolicy::FirstWins)
            .unwrap()
            .iter()
            .map(|r| r.resolve(&props).unwrap().to_string())
            .collect();

        assert_eq!(names, ["infra#Logger", "app#Cache", "infra#Router"]);
    }

    #[test]
    fn test_conditional_services() {
        let server = parse_server(
            r#"<server><manager name="app">
                   <service name="Mail" code="pkg.SmtpMail"/>
                   <ifdef name="env" value="dev">
                       <service name="Mail" code="pkg.FakeMail"/>
                       <service name="Faker" code="pkg.Faker"/>
                   </ifdef>
               </manager></server>"#,
            "svc.xml",
            &ParseOptions::default(),
        )
        .unwrap();
        let props = MapPropertySource::from_pairs([("env", "dev")]);
        let services = server.managers[0]
            .effective_services(&props, DuplicatePolicy::FirstWins)
            .unwrap();
        let codes: Vec<_> = services.iter().map(|s| s.object.code.as_deref().unwrap()).collect();
        assert_eq!(codes, ["pkg.SmtpMail", "pkg.Faker"]);
    }
}
