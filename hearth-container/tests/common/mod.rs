//! Shared fixtures: a recording service type and a container around it

#![allow(dead_code)]

use hearth_container::reflect::{Lifecycle, ObjectHandle, TypeDescriptor, TypeIntrospector, TypeRegistry, Value};
use hearth_container::{Container, ContainerBuilder, ContainerConfig, LifecycleState, ServiceName};
use hearth_container::metadata::MapPropertySource;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub type Log = Arc<Mutex<Vec<String>>>;

/// A service that records every hook into a shared log
pub struct Tracer {
    pub label: String,
    pub log: Log,
    /// Hooks that fail after being recorded
    pub fail: Vec<String>,
    /// Hooks that take a while after being recorded
    pub slow: Vec<String>,
    pub peer: Option<ObjectHandle>,
    pub greeting: String,
}

impl Tracer {
    pub fn new(label: String, log: Log) -> Self {
        log.lock().push(format!("{}:new", label));
        Self {
            label,
            log,
            fail: Vec::new(),
            slow: Vec::new(),
            peer: None,
            greeting: "hello".to_string(),
        }
    }

    fn record(&self, event: &str) {
        self.log.lock().push(format!("{}:{}", self.label, event));
    }

    fn hook(&self, phase: &str) -> anyhow::Result<()> {
        self.record(phase);
        if self.slow.iter().any(|s| s == phase) {
            std::thread::sleep(Duration::from_millis(300));
        }
        if self.fail.iter().any(|f| f == phase) {
            anyhow::bail!("{} refused to {}", self.label, phase);
        }
        Ok(())
    }
}

impl Lifecycle for Tracer {
    fn create(&mut self) -> anyhow::Result<()> {
        self.hook("create")
    }

    fn start(&mut self) -> anyhow::Result<()> {
        self.hook("start")
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.hook("stop")
    }

    fn destroy(&mut self) -> anyhow::Result<()> {
        self.hook("destroy")
    }
}

/// A type with no hooks at all
#[derive(Default)]
pub struct Plain {
    pub size: i64,
}

pub fn types(log: &Log) -> Arc<TypeRegistry> {
    let ctor_log = log.clone();
    let registry = TypeRegistry::new()
        .with(
            TypeDescriptor::builder::<Tracer>("test.Tracer")
                .constructor(&["string"], move |args| Ok(Tracer::new(args.get(0)?, ctor_log.clone())))
                .field("fail", "string[]", |p: &mut Tracer, v: Vec<String>| p.fail = v)
                .field("slow", "string[]", |p: &mut Tracer, v: Vec<String>| p.slow = v)
                .setter("Peer", "test.Tracer", |p: &mut Tracer, v: Option<ObjectHandle>| {
                    p.peer = v;
                    Ok(())
                })
                .property(
                    "Greeting",
                    "string",
                    |p: &Tracer| p.greeting.clone(),
                    |p: &mut Tracer, v: String| {
                        p.greeting = v;
                        Ok(())
                    },
                )
                .operation("note", &["string"], "void", |p: &mut Tracer, args| {
                    p.record(&format!("note {}", args.get::<String>(0)?));
                    Ok(Value::Null)
                })
                .operation("greet", &["string"], "string", |p: &mut Tracer, args| {
                    Ok(Value::Str(format!("{}, {}", p.greeting, args.get::<String>(0)?)))
                })
                .lifecycle()
                .build(),
        )
        .with(
            TypeDescriptor::builder::<Plain>("test.Plain")
                .default_constructor(Plain::default)
                .field("size", "long", |p: &mut Plain, v: i64| p.size = v)
                .build(),
        );
    Arc::new(registry)
}

pub struct Fixture {
    pub container: Container,
    pub types: Arc<TypeRegistry>,
    pub log: Log,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(ContainerConfig::default(), MapPropertySource::new())
    }

    /// Services without an `initState` are only created on deploy
    pub fn created_only() -> Self {
        let config = ContainerConfig {
            default_init_state: LifecycleState::Created,
            ..ContainerConfig::default()
        };
        Self::build(config, MapPropertySource::new())
    }

    pub fn build(config: ContainerConfig, properties: MapPropertySource) -> Self {
        let log = Log::default();
        let types = types(&log);
        let container = ContainerBuilder::new()
            .config(config)
            .types(types.clone())
            .properties(properties)
            .build();
        Self {
            container,
            types,
            log,
        }
    }

    pub fn deploy(&self, resource: &str, services: &[String]) -> hearth_container::DeploymentReport {
        self.container
            .deploy(&server("app", services), resource)
            .expect("deploy")
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.log.lock().iter().filter(|e| *e == event).count()
    }

    /// Position of `event` in the log
    pub fn position(&self, event: &str) -> usize {
        self.log
            .lock()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("{} was never recorded", event))
    }

    /// Block until `event` has been recorded
    pub fn wait_for(&self, event: &str) {
        while self.count(event) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn state(&self, service: &str) -> LifecycleState {
        self.container.state(&name(service)).unwrap()
    }

    pub fn tracer(&self, label: &str) -> ObjectHandle {
        let descriptor = self.types.descriptor("test.Tracer").unwrap();
        ObjectHandle::new(Tracer::new(label.to_string(), self.log.clone()), descriptor).unwrap()
    }
}

/// `app#A` for `A`, anything with a `#` as given
pub fn name(text: &str) -> ServiceName {
    ServiceName::resolve(text, "app").unwrap()
}

/// A `test.Tracer` service labelled with its own name
pub fn traced(service: &str, body: &str) -> String {
    format!(
        r#"<service name="{0}" code="test.Tracer"><constructor><argument>{0}</argument></constructor>{1}</service>"#,
        service, body
    )
}

pub fn server(manager: &str, services: &[String]) -> String {
    format!(
        r#"<server><manager name="{}">{}</manager></server>"#,
        manager,
        services.concat()
    )
}
