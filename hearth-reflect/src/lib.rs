//! Runtime object model for Hearth services
//!
//! Rust has no runtime reflection, so every type a definition may name is
//! registered up front as a [`TypeDescriptor`]. The [`ObjectBuilder`] then
//! drives those descriptors from effective metadata: it picks constructors,
//! converts text through property editors, assigns properties and calls
//! invokes.

pub mod builder;
pub mod descriptor;
pub mod editor;
pub mod error;
pub mod handle;
pub mod introspect;
pub mod lifecycle;
pub mod management;
pub mod value;

pub use builder::{BuildContext, BuiltObject, DeferredInvoke, ObjectBuilder, ServiceResolver};
pub use descriptor::{Produced, TypeDescriptor, TypeDescriptorBuilder};
pub use editor::{PropertyEditor, PropertyEditorRegistry};
pub use error::{BoxError, ReflectError, Result};
pub use handle::ObjectHandle;
pub use introspect::{TypeIntrospector, TypeRegistry};
pub use lifecycle::{Lifecycle, LifecyclePhase};
pub use management::{AttributeInfo, ManagementDescriptor, OperationInfo};
pub use value::{Args, FromValue, Value};

/// Prelude module for registering types
pub mod prelude {
    pub use crate::{Args, Lifecycle, ObjectHandle, TypeDescriptor, TypeRegistry, Value};
}
