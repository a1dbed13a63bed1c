//! Runtime type tags: the bidirectional map between registered types and
//! the stable string tags carried in `$type` fields for polymorphic
//! payloads.

use std::collections::HashMap;

use crate::registry::TypeKey;
use crate::types::MarshalError;

/// Bidirectional `TypeKey` ↔ tag dictionary with a global on/off toggle.
///
/// When disabled (the default), the engines neither stamp nor consult
/// `$type` fields; tag registrations are kept either way.
#[derive(Debug, Default)]
pub struct TypeTagRegistry {
    type_to_tag: HashMap<TypeKey, String>,
    tag_to_type: HashMap<String, TypeKey>,
    enabled: bool,
}

impl TypeTagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) the tag for a type. Last call wins in both
    /// directions.
    pub fn set_tag(&mut self, key: TypeKey, tag: &str) {
        self.type_to_tag.insert(key, tag.to_string());
        self.tag_to_type.insert(tag.to_string(), key);
    }

    pub fn has_tag(&self, key: TypeKey) -> bool {
        self.type_to_tag.contains_key(&key)
    }

    /// Tag for a type; fails with a lookup error when none is registered.
    pub fn tag_of(&self, key: TypeKey) -> Result<&str, MarshalError> {
        self.try_tag(key)
            .ok_or_else(|| MarshalError::Lookup(format!("{key:?}")))
    }

    pub fn try_tag(&self, key: TypeKey) -> Option<&str> {
        self.type_to_tag.get(&key).map(String::as_str)
    }

    /// Type for a tag; fails with a lookup error when none is registered.
    pub fn type_of(&self, tag: &str) -> Result<TypeKey, MarshalError> {
        self.try_type(tag)
            .ok_or_else(|| MarshalError::Lookup(tag.to_string()))
    }

    pub fn try_type(&self, tag: &str) -> Option<TypeKey> {
        self.tag_to_type.get(tag).copied()
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drop all tag registrations. The toggle is left as-is.
    pub fn reset(&mut self) {
        self.type_to_tag.clear();
        self.tag_to_type.clear();
    }
}
