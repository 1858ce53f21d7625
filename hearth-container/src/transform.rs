//! Byte-level transformation hooks applied to loaded resources

use crate::error::{ContainerError, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

/// Rewrites the raw bytes of a resource before it is interpreted
pub trait ByteTransformer: Send + Sync {
    fn transform(&self, name: &str, bytes: Vec<u8>) -> anyhow::Result<Vec<u8>>;
}

impl<F> ByteTransformer for F
where
    F: Fn(&str, Vec<u8>) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    fn transform(&self, name: &str, bytes: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        self(name, bytes)
    }
}

/// Ordered list of transformers owned by a container
///
/// The container creates it empty and clears it on shutdown.
#[derive(Default)]
pub struct TransformRegistry {
    hooks: RwLock<Vec<Arc<dyn ByteTransformer>>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hook: Arc<dyn ByteTransformer>) {
        self.hooks.write().push(hook);
    }

    /// Run every hook in registration order
    pub fn transform(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
        // Hooks may register further hooks, so run them on a snapshot
        let hooks = self.hooks.read().clone();
        hooks.iter().try_fold(bytes, |bytes, hook| {
            trace!("Transforming {} ({} bytes)", name, bytes.len());
            hook.transform(name, bytes)
                .map_err(|source| ContainerError::Transform {
                    name: name.to_string(),
                    source,
                })
        })
    }

    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.hooks.write().clear();
    }
}
