//! Text-to-value conversion keyed by declared type name

use crate::error::{ReflectError, Result};
use crate::value::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Converts the text of a definition into a [`Value`]
pub trait PropertyEditor: Send + Sync {
    fn edit(&self, text: &str) -> anyhow::Result<Value>;
}

impl<F> PropertyEditor for F
where
    F: Fn(&str) -> anyhow::Result<Value> + Send + Sync,
{
    fn edit(&self, text: &str) -> anyhow::Result<Value> {
        self(text)
    }
}

/// Named editors plus type bindings, globally and per definition source
///
/// Lookup for a type inside a source checks the source's own bindings, then
/// the global bindings, then an editor registered under the type name itself.
pub struct PropertyEditorRegistry {
    editors: RwLock<FxHashMap<String, Arc<dyn PropertyEditor>>>,
    bindings: RwLock<FxHashMap<String, String>>,
    source_bindings: RwLock<FxHashMap<String, FxHashMap<String, String>>>,
}

impl Default for PropertyEditorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyEditorRegistry {
    /// A registry holding the built-in editors
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register("string", |t: &str| Ok(Value::Str(t.to_string())));
        registry.register("int", |t: &str| Ok(Value::Int(t.trim().parse::<i32>()?.into())));
        registry.register("long", |t: &str| Ok(Value::Int(t.trim().parse::<i64>()?)));
        registry.register("short", |t: &str| Ok(Value::Int(t.trim().parse::<i16>()?.into())));
        registry.register("byte", |t: &str| Ok(Value::Int(t.trim().parse::<i8>()?.into())));
        registry.register("boolean", parse_bool);
        registry.register("float", |t: &str| Ok(Value::Float(t.trim().parse::<f32>()?.into())));
        registry.register("double", |t: &str| Ok(Value::Float(t.trim().parse::<f64>()?)));
        registry.register("char", parse_char);
        registry.register("string[]", |t: &str| {
            Ok(Value::List(split_list(t).map(|s| Value::Str(s.to_string())).collect()))
        });
        registry.register("int[]", |t: &str| {
            split_list(t)
                .map(|s| -> anyhow::Result<Value> { Ok(Value::Int(s.parse::<i32>()?.into())) })
                .collect::<anyhow::Result<Vec<_>>>()
                .map(Value::List)
        });
        registry.register("properties", parse_properties);
        registry
    }

    /// A registry with no editors at all
    pub fn empty() -> Self {
        Self {
            editors: RwLock::new(FxHashMap::default()),
            bindings: RwLock::new(FxHashMap::default()),
            source_bindings: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register a conversion function under `name`
    pub fn register<F>(&self, name: &str, editor: F)
    where
        F: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register_editor(name, editor);
    }

    /// Register an editor under `name`
    pub fn register_editor(&self, name: &str, editor: impl PropertyEditor + 'static) {
        self.editors.write().insert(name.to_string(), Arc::new(editor));
    }

    /// Use the editor called `editor` for `type_name` everywhere
    pub fn bind_type(&self, type_name: &str, editor: &str) {
        self.bindings
            .write()
            .insert(type_name.to_string(), editor.to_string());
    }

    /// Use the editor called `editor` for `type_name` inside one definition source
    pub fn bind_source(&self, source: &str, type_name: &str, editor: &str) {
        self.source_bindings
            .write()
            .entry(source.to_string())
            .or_default()
            .insert(type_name.to_string(), editor.to_string());
    }

    /// Drop every binding made for `source`
    pub fn unbind_source(&self, source: &str) {
        self.source_bindings.write().remove(source);
    }

    /// The editor that applies to `type_name` in `source`
    pub fn editor_for(&self, source: Option<&str>, type_name: &str) -> Option<Arc<dyn PropertyEditor>> {
        let scoped = source.and_then(|s| {
            self.source_bindings
                .read()
                .get(s)
                .and_then(|b| b.get(type_name).cloned())
        });
        let name = scoped
            .or_else(|| self.bindings.read().get(type_name).cloned())
            .unwrap_or_else(|| type_name.to_string());
        self.editors.read().get(&name).cloned()
    }

    /// Convert `text` with the editor for `type_name`
    pub fn convert(&self, source: Option<&str>, type_name: &str, text: &str) -> Result<Value> {
        let editor = self
            .editor_for(source, type_name)
            .ok_or_else(|| ReflectError::Conversion {
                type_name: type_name.to_string(),
                text: text.to_string(),
                reason: "no property editor".to_string(),
            })?;
        trace!("Converting '{}' as {}", text, type_name);
        editor.edit(text).map_err(|e| ReflectError::Conversion {
            type_name: type_name.to_string(),
            text: text.to_string(),
            reason: e.to_string(),
        })
    }
}

fn parse_bool(text: &str) -> anyhow::Result<Value> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        other => anyhow::bail!("'{}' is not a boolean", other),
    }
}

fn parse_char(text: &str) -> anyhow::Result<Value> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Str(c.to_string())),
        _ => anyhow::bail!("expected exactly one character"),
    }
}

fn split_list(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// `key=value` lines; blank lines and `#` comments are skipped
fn parse_properties(text: &str) -> anyhow::Result<Value> {
    let mut map = BTreeMap::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("line '{}' has no '='", line))?;
        map.insert(key.trim().to_string(), Value::Str(value.trim().to_string()));
    }
    Ok(Value::Map(map))
}
