//! json-marshal - Declarative object marshalling over JSON trees.
//!
//! A descriptor registry maps registered types to ordered per-field
//! descriptors (wire key, direction, element type, defaults, merge mode);
//! the serialize and deserialize engines walk an in-memory instance graph
//! and a [`serde_json::Value`] tree respectively, driven entirely by those
//! descriptors. Polymorphic payloads carry `$type` tags, and shared or
//! cyclic subgraphs round-trip through `$id`/`$ref` tokens.
//!
//! The [`Marshaller`] facade bundles the registry, the type-tag dictionary,
//! and the reference session behind the two entry points,
//! [`Marshaller::serialize`] and [`Marshaller::deserialize`].

pub mod instance;
pub mod marshaller;
pub mod ref_cycle;
pub mod registry;
pub mod runtime_typing;
pub mod types;

mod deserialize;
mod serialize;

pub use instance::{Instance, Obj};
pub use marshaller::Marshaller;
pub use registry::{FieldDescriptor, Kind, MetaRegistry, PrimitiveKind, TypeKey, TypeRef};
pub use runtime_typing::TypeTagRegistry;
pub use types::{ArrayMerge, InstantiationPolicy, JsonKind, MarshalError};
