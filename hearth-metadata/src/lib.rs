//! Hearth service definition metadata
//!
//! This crate holds the declarative side of the container:
//! - The metadata tree produced from an XML definition source
//! - Parsing (`import`) and serialization (`to_xml`) of that tree
//! - Conditional (`ifdef`) evaluation against an external property source
//! - `${name}` placeholder substitution
//! - The shared vocabulary types: [`ServiceName`] and [`LifecycleState`]
//!
//! Parsing only builds the tree. Nothing here constructs objects or touches
//! a live container.

pub mod conditional;
pub mod error;
pub mod ifdef;
pub mod name;
pub mod object;
pub mod parse;
pub mod placeholder;
pub mod property;
pub mod server;
pub mod state;
pub mod xml;

pub use conditional::{DuplicatePolicy, EffectiveObject};
pub use error::{DefinitionError, Result};
pub use ifdef::{IfDefChild, IfDefMetaData};
pub use name::{NameError, ServiceName};
pub use object::{
    ArgumentMetaData, AttributeMetaData, ConstructorKind, ConstructorMetaData, FieldMetaData, InvokeMetaData,
    ObjectMetaData, ServiceRefMetaData, StaticFieldRefMetaData, StaticInvokeMetaData,
    ValueMetaData, ValueSlot,
};
pub use parse::{parse_server, ParseOptions};
pub use property::{
    ChainedPropertySource, DecryptingPropertySource, EnvPropertySource, MapPropertySource,
    PropertyDecryptor, PropertySource,
};
pub use server::{
    DependsMetaData, ManagerMetaData, PropertyEditorMetaData, ServerMetaData, ServiceMetaData,
};
pub use state::LifecycleState;

/// Name of the manager namespace used when a definition does not declare one
pub const DEFAULT_MANAGER: &str = "default";
