//! Engine facade: one [`Marshaller`] bundles the descriptor registry, the
//! type-tag registry, the reference session, and the call-wide knobs
//! (selective bitmask, default instantiation policy, reference-tracking
//! toggle).
//!
//! A `Marshaller` is single-threaded by construction (instances are
//! `Rc`-shared). Concurrent hosts create one per thread or synchronize
//! externally; nothing in here locks.

use std::cell::RefCell;
use std::fmt;

use serde_json::Value;

use crate::deserialize;
use crate::instance::Instance;
use crate::ref_cycle::RefSession;
use crate::registry::{FieldDescriptor, MetaRegistry, TypeKey, TypeRef};
use crate::runtime_typing::TypeTagRegistry;
use crate::serialize;
use crate::types::{InstantiationPolicy, MarshalError};

pub struct Marshaller {
    pub(crate) registry: MetaRegistry,
    pub(crate) tags: TypeTagRegistry,
    pub(crate) session: RefCell<RefSession>,
    pub(crate) ref_tracking: bool,
    pub(crate) serialize_mask: u64,
    pub(crate) default_policy: InstantiationPolicy,
}

impl Default for Marshaller {
    fn default() -> Self {
        Self::new()
    }
}

impl Marshaller {
    pub fn new() -> Self {
        Marshaller {
            registry: MetaRegistry::new(),
            tags: TypeTagRegistry::new(),
            session: RefCell::new(RefSession::new()),
            ref_tracking: false,
            serialize_mask: u64::MAX,
            default_policy: InstantiationPolicy::Construct,
        }
    }

    // ── registry access ──────────────────────────────────────────────────

    pub fn registry(&self) -> &MetaRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MetaRegistry {
        &mut self.registry
    }

    pub fn tags(&self) -> &TypeTagRegistry {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut TypeTagRegistry {
        &mut self.tags
    }

    /// Shorthand for `registry_mut().declare(name)`.
    pub fn declare(&mut self, name: &str) -> TypeKey {
        self.registry.declare(name)
    }

    /// Shorthand for `registry_mut().field(key, name)`.
    pub fn field(&mut self, key: TypeKey, name: &str) -> &mut FieldDescriptor {
        self.registry.field(key, name)
    }

    // ── call-wide configuration ──────────────────────────────────────────

    /// Only fields whose `bit_mask_serialize` intersects `mask` serialize.
    /// Defaults to all bits set.
    pub fn set_selective_mask(&mut self, mask: u64) {
        self.serialize_mask = mask;
    }

    pub fn set_default_policy(&mut self, policy: InstantiationPolicy) {
        self.default_policy = policy;
    }

    pub fn enable_ref_tracking(&mut self) {
        self.ref_tracking = true;
    }

    pub fn disable_ref_tracking(&mut self) {
        self.ref_tracking = false;
    }

    /// Drop all reference-session state. Never called implicitly; without
    /// it, ids and resolved instances accumulate across top-level calls.
    pub fn clear_refs(&self) {
        self.session.borrow_mut().clear();
    }

    // ── serialize ────────────────────────────────────────────────────────

    /// Serialize an instance as the declared type into a JSON tree.
    pub fn serialize(&self, instance: &Instance, ty: &TypeRef) -> Result<Value, MarshalError> {
        serialize::serialize(self, instance, ty)
    }

    /// Serialize a slice element-wise as an array of the declared type.
    pub fn serialize_array(
        &self,
        items: &[Instance],
        element: &TypeRef,
    ) -> Result<Value, MarshalError> {
        serialize::serialize_slice(self, items, element)
    }

    // ── deserialize ──────────────────────────────────────────────────────

    /// Deserialize a JSON tree into a fresh instance of the declared type,
    /// using the engine default instantiation policy.
    pub fn deserialize(&self, json: &Value, ty: &TypeRef) -> Result<Instance, MarshalError> {
        self.deserialize_with(json, ty, None, self.default_policy)
    }

    /// Deserialize onto an existing target instance (incremental merge).
    pub fn deserialize_into(
        &self,
        json: &Value,
        ty: &TypeRef,
        target: &Instance,
    ) -> Result<Instance, MarshalError> {
        self.deserialize_with(json, ty, Some(target), self.default_policy)
    }

    /// Full-control deserialize: optional target, explicit policy. Deferred
    /// reference patches are applied once the tree is fully walked.
    pub fn deserialize_with(
        &self,
        json: &Value,
        ty: &TypeRef,
        target: Option<&Instance>,
        policy: InstantiationPolicy,
    ) -> Result<Instance, MarshalError> {
        let out = deserialize::deserialize_value(self, json, ty, target, policy)?;
        self.session.borrow_mut().finalize()?;
        Ok(out)
    }

    /// Deserialize a JSON array element-wise as the declared element type.
    pub fn deserialize_array(
        &self,
        json: &Value,
        element: &TypeRef,
    ) -> Result<Instance, MarshalError> {
        self.deserialize_with(json, &TypeRef::array_of(element.clone()), None, self.default_policy)
    }

    // ── internals shared by the engines ──────────────────────────────────

    /// Whether nodes of `key` participate in `$id`/`$ref` tracking: a
    /// per-type override wins, otherwise the engine-wide toggle decides.
    pub(crate) fn tracked(&self, key: Option<TypeKey>) -> bool {
        key.and_then(|k| self.registry.meta(k).ref_override)
            .unwrap_or(self.ref_tracking)
    }
}

impl fmt::Debug for Marshaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Marshaller")
            .field("registry", &self.registry)
            .field("tags", &self.tags)
            .field("ref_tracking", &self.ref_tracking)
            .field("serialize_mask", &self.serialize_mask)
            .field("default_policy", &self.default_policy)
            .finish()
    }
}
