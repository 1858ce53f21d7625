//! Lifecycle hooks implemented by managed objects

use std::fmt;

/// Trait for objects that take part in the container lifecycle
///
/// Every hook defaults to doing nothing. Register the implementation with
/// [`TypeDescriptorBuilder::lifecycle`](crate::TypeDescriptorBuilder::lifecycle).
pub trait Lifecycle {
    /// Called once after construction and property injection
    fn create(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the service is started
    fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the service is stopped
    fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called before the object is released
    fn destroy(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The four lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Create,
    Start,
    Stop,
    Destroy,
}

impl LifecyclePhase {
    pub const ALL: [LifecyclePhase; 4] = [
        LifecyclePhase::Create,
        LifecyclePhase::Start,
        LifecyclePhase::Stop,
        LifecyclePhase::Destroy,
    ];

    /// Operation name as exposed on the management surface
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Create => "create",
            LifecyclePhase::Start => "start",
            LifecyclePhase::Stop => "stop",
            LifecyclePhase::Destroy => "destroy",
        }
    }

    pub(crate) fn run<T: Lifecycle>(&self, target: &mut T) -> anyhow::Result<()> {
        match self {
            LifecyclePhase::Create => target.create(),
            LifecyclePhase::Start => target.start(),
            LifecyclePhase::Stop => target.stop(),
            LifecyclePhase::Destroy => target.destroy(),
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
