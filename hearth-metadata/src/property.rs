//! External property sources consulted by `ifdef` blocks and placeholders

use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Read-only lookup of named configuration properties
pub trait PropertySource {
    /// Value of the property `name`, if defined
    fn property(&self, name: &str) -> Option<String>;
}

impl<T: PropertySource + ?Sized> PropertySource for &T {
    fn property(&self, name: &str) -> Option<String> {
        (**self).property(name)
    }
}

impl<T: PropertySource + ?Sized> PropertySource for Arc<T> {
    fn property(&self, name: &str) -> Option<String> {
        (**self).property(name)
    }
}

/// Properties held in memory
#[derive(Debug, Clone, Default)]
pub struct MapPropertySource {
    values: FxHashMap<String, String>,
}

impl MapPropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }
}

impl PropertySource for MapPropertySource {
    fn property(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Process environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvPropertySource;

impl PropertySource for EnvPropertySource {
    fn property(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Several sources consulted in order; the first defined value wins
#[derive(Default)]
pub struct ChainedPropertySource {
    sources: Vec<Box<dyn PropertySource + Send + Sync>>,
}

impl ChainedPropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source with lower priority than those already added
    pub fn with(mut self, source: impl PropertySource + Send + Sync + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl PropertySource for ChainedPropertySource {
    fn property(&self, name: &str) -> Option<String> {
        self.sources.iter().find_map(|s| s.property(name))
    }
}

/// Turns an encrypted property value back into plain text
pub trait PropertyDecryptor {
    fn decrypt(&self, cipher_text: &str) -> Option<String>;
}

impl<F> PropertyDecryptor for F
where
    F: Fn(&str) -> Option<String>,
{
    fn decrypt(&self, cipher_text: &str) -> Option<String> {
        self(cipher_text)
    }
}

/// Wraps a source and decrypts values written as `ENC(...)`
///
/// Values that are not wrapped pass through unchanged. A value the decryptor
/// rejects is treated as undefined.
pub struct DecryptingPropertySource<S, D> {
    inner: S,
    decryptor: D,
}

impl<S, D> DecryptingPropertySource<S, D> {
    pub fn new(inner: S, decryptor: D) -> Self {
        Self { inner, decryptor }
    }
}

impl<S: PropertySource, D: PropertyDecryptor> PropertySource for DecryptingPropertySource<S, D> {
    fn property(&self, name: &str) -> Option<String> {
        let value = self.inner.property(name)?;
        match value
            .strip_prefix("ENC(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            Some(cipher_text) => self.decryptor.decrypt(cipher_text),
            None => Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chained_first_wins() {
        let chain = ChainedPropertySource::new()
            .with(MapPropertySource::from_pairs([("env", "prod")]))
            .with(MapPropertySource::from_pairs([("env", "dev"), ("region", "eu")]));

        assert_eq!(chain.property("env").as_deref(), Some("prod"));
        assert_eq!(chain.property("region").as_deref(), Some("eu"));
        assert_eq!(chain.property("missing"), None);
    }

    #[test]
    fn test_decrypting_source() {
        let inner = MapPropertySource::from_pairs([("secret", "ENC(terces)"), ("plain", "open")]);
        let source = DecryptingPropertySource::new(inner, |c: &str| -> Option<String> {
            Some(c.chars().rev().collect())
        });

        assert_eq!(source.property("secret").as_deref(), Some("secret"));
        assert_eq!(source.property("plain").as_deref(), Some("open"));
    }
}
