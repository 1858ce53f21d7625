//! Serialization round trips and conditional selection over whole documents

use hearth_metadata::{
    parse_server, ConstructorKind, DuplicatePolicy, LifecycleState, MapPropertySource,
    ParseOptions, ServerMetaData, ValueMetaData,
};

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- application services -->
<server>
    <property-editors>
        <property-editor type="pkg.Color">hex-color</property-editor>
    </property-editors>
    <manager name="infra">
        <service name="Logger" code="pkg.Logger" initState="Created">
            <attribute name="Level" type="string">debug</attribute>
        </service>
    </manager>
    <manager name="app">
        <!-- the main entry point -->
        <service name="Api" code="pkg.Api">
            <constructor>
                <argument type="int">8080</argument>
                <argument>
                    <object code="pkg.Client">
                        <field name="timeout" type="long">30</field>
                        <attribute name="Cache"><service-ref>Cache</service-ref></attribute>
                    </object>
                </argument>
                <argument nullValue="true"/>
            </constructor>
            <field name="banner">
                line one &amp; more
                line two &lt;tag&gt;
            </field>
            <attribute name="Color" type="pkg.Color">ff0000</attribute>
            <attribute name="Clock"><static-invoke code="pkg.Clock" name="system"/></attribute>
            <attribute name="Mode"><static-field-ref code="pkg.Mode" name="FAST"/></attribute>
            <invoke name="warm" callState="Started">
                <target><service-ref>infra#Logger</service-ref></target>
                <argument type="string">api</argument>
            </invoke>
            <depends>infra#Logger</depends>
            <ifdef name="env" value="dev">
                <attribute name="Debug" type="boolean">true</attribute>
                <depends>${mgr}#Tracer</depends>
            </ifdef>
        </service>
        <service name="Cache" code="pkg.Cache">
            <constructor>
                <static-invoke code="pkg.CacheFactory" name="create">
                    <argument type="int">64</argument>
                </static-invoke>
            </constructor>
        </service>
        <ifdef name="env" value="dev">
            <service name="Faker" code="pkg.Faker"/>
        </ifdef>
    </manager>
</server>
"#;

fn parse(xml: &str) -> ServerMetaData {
    parse_server(xml, "app-service.xml", &ParseOptions::default()).unwrap()
}

#[test]
fn test_round_trip_preserves_semantics() {
    let first = parse(DOCUMENT);
    let written = first.to_xml();
    let second = parse(&written);

    assert_eq!(first, second);
    // Writing is a pure function of the tree
    assert_eq!(written, second.to_xml());
}

#[test]
fn test_round_trip_of_multiline_and_escaped_text() {
    let server = parse(&parse(DOCUMENT).to_xml());
    let api = server.manager("app").unwrap().service("Api").unwrap();

    assert_eq!(
        api.object.field("banner").unwrap().slot.value,
        ValueMetaData::Text("line one & more\nline two <tag>".to_string())
    );
}

#[test]
fn test_round_trip_keeps_structure() {
    let server = parse(&parse(DOCUMENT).to_xml());
    assert_eq!(server.comments, ["application services"]);
    assert_eq!(server.property_editors.len(), 1);

    let logger = server.manager("infra").unwrap().service("Logger").unwrap();
    assert_eq!(logger.init_state, LifecycleState::Created);

    let app = server.manager("app").unwrap();
    let api = app.service("Api").unwrap();
    assert_eq!(api.comments, ["the main entry point"]);
    assert_eq!(api.object.invokes.len(), 1);
    assert_eq!(api.object.invokes[0].call_state, LifecycleState::Started);

    let cache = app.service("Cache").unwrap();
    assert!(matches!(
        &cache.object.constructor.as_ref().unwrap().kind,
        ConstructorKind::StaticInvoke(invoke) if invoke.arguments.len() == 1
    ));
    assert_eq!(app.ifdefs.len(), 1);
}

#[test]
fn test_only_matching_environment_applies() {
    let server = parse(
        r#"<server><manager name="app">
               <service name="Store" code="pkg.Store">
                   <attribute name="Name">store</attribute>
                   <ifdef name="env" value="dev">
                       <attribute name="Url">mem://</attribute>
                       <field name="verbose">true</field>
                   </ifdef>
                   <ifdef name="env" value="prod">
                       <attribute name="Url">jdbc://prod</attribute>
                       <attribute name="PoolSize" type="int">32</attribute>
                   </ifdef>
               </service>
           </manager></server>"#,
    );
    let store = server.manager("app").unwrap().service("Store").unwrap();
    let props = MapPropertySource::from_pairs([("env", "prod")]);

    let effective = store.effective(&props, DuplicatePolicy::default()).unwrap();
    let names: Vec<_> = effective.attributes.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["Name", "Url", "PoolSize"]);
    assert_eq!(
        effective.attributes[1].slot.value,
        ValueMetaData::Text("jdbc://prod".to_string())
    );
    assert!(effective.fields.is_empty());

    let verdicts: Vec<_> = store.object.ifdefs.iter().map(|i| i.verdict()).collect();
    assert_eq!(verdicts, [Some(false), Some(true)]);
}
