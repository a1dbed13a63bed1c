//! Descriptor registry: per-type ordered field descriptor tables, type-level
//! lifecycle hooks, constructors, inheritance merge, and the process-wide
//! key-transform functions.
//!
//! The registry is the read side of the annotation mechanism: some external
//! front-end decides *when* to attach a descriptor; the engines only ever
//! consume the resulting table.

use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::instance::Instance;
use crate::types::{ArrayMerge, InstantiationPolicy};

// ── Type identity ─────────────────────────────────────────────────────────

/// Identity of a registered type. Cheap to copy; stable for the lifetime of
/// the registry that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey(pub(crate) usize);

/// The primitive wire types a field can coerce through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    String,
    Boolean,
    Number,
    Date,
    Regex,
}

/// Reference to the type a descriptor recurses into.
///
/// `Lazy` defers resolution to first use, which is what makes forward and
/// self-referential type graphs registrable in any order.
#[derive(Clone)]
pub enum TypeRef {
    Primitive(PrimitiveKind),
    /// An object type with no registered descriptors; serializes to an
    /// empty tree and deserializes to an empty untyped instance.
    Opaque,
    Type(TypeKey),
    Array(Box<TypeRef>),
    Lazy(Rc<dyn Fn() -> TypeRef>),
}

impl TypeRef {
    pub fn array_of(element: TypeRef) -> TypeRef {
        TypeRef::Array(Box::new(element))
    }

    pub fn lazy(f: impl Fn() -> TypeRef + 'static) -> TypeRef {
        TypeRef::Lazy(Rc::new(f))
    }

    /// Resolve deferred references down to a concrete variant.
    pub fn resolve(&self) -> TypeRef {
        match self {
            TypeRef::Lazy(f) => f().resolve(),
            other => other.clone(),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.resolve(), TypeRef::Primitive(_))
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Primitive(p) => write!(f, "Primitive({p:?})"),
            TypeRef::Opaque => write!(f, "Opaque"),
            TypeRef::Type(k) => write!(f, "Type({k:?})"),
            TypeRef::Array(e) => write!(f, "Array({e:?})"),
            TypeRef::Lazy(_) => write!(f, "Lazy(..)"),
        }
    }
}

// ── Descriptor ────────────────────────────────────────────────────────────

/// Which sub-algorithm processes a field's value in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Primitive,
    Object,
    Array,
    Map,
    ObjectMap,
    Set,
    Json,
    Custom,
}

pub type CustomSerializeFn = Rc<dyn Fn(&Instance) -> Value>;
pub type CustomDeserializeFn = Rc<dyn Fn(&Value) -> Instance>;
pub type KeyTransform = Rc<dyn Fn(&str) -> String>;
pub type SerializedHook = Rc<dyn Fn(&mut Map<String, Value>, &Instance) -> Option<Value>>;
pub type DeserializedHook = Rc<dyn Fn(&Value, &Instance, InstantiationPolicy) -> Option<Instance>>;
pub type Constructor = Rc<dyn Fn() -> Instance>;

/// Per-(type, field) behavior descriptor.
///
/// A `None` key suppresses the field in that direction entirely. Setting a
/// kind through one of the `*_as_*` helpers (re)declares the kind and keys
/// for that direction; attribute setters (`emit_default`, `default_value`,
/// `bit_mask`, key renames) never touch the kind.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub field_name: String,
    pub serialized_key: Option<String>,
    pub deserialized_key: Option<String>,
    pub serialize_kind: Option<Kind>,
    pub deserialize_kind: Option<Kind>,
    pub serialized_type: Option<TypeRef>,
    pub deserialized_type: Option<TypeRef>,
    pub serialized_key_type: Option<TypeRef>,
    pub serialized_value_type: Option<TypeRef>,
    pub deserialized_key_type: Option<TypeRef>,
    pub deserialized_value_type: Option<TypeRef>,
    pub custom_serializer: Option<CustomSerializeFn>,
    pub custom_deserializer: Option<CustomDeserializeFn>,
    pub emit_default_value: bool,
    pub explicit_default: Option<Instance>,
    pub bit_mask_serialize: u64,
    pub array_merge: ArrayMerge,
    pub transform_json_keys_serialize: bool,
    pub transform_json_keys_deserialize: bool,
}

impl FieldDescriptor {
    fn new(field_name: &str) -> Self {
        FieldDescriptor {
            field_name: field_name.to_string(),
            serialized_key: None,
            deserialized_key: None,
            serialize_kind: None,
            deserialize_kind: None,
            serialized_type: None,
            deserialized_type: None,
            serialized_key_type: None,
            serialized_value_type: None,
            deserialized_key_type: None,
            deserialized_value_type: None,
            custom_serializer: None,
            custom_deserializer: None,
            emit_default_value: true,
            explicit_default: None,
            bit_mask_serialize: u64::MAX,
            array_merge: ArrayMerge::default(),
            transform_json_keys_serialize: true,
            transform_json_keys_deserialize: true,
        }
    }

    fn kind_for(element: &TypeRef) -> Kind {
        if element.is_primitive() {
            Kind::Primitive
        } else {
            Kind::Object
        }
    }

    // ── serialize direction ──────────────────────────────────────────────

    pub fn serialize_as(&mut self, element: TypeRef) -> &mut Self {
        self.serialize_kind = Some(Self::kind_for(&element));
        self.serialized_type = Some(element);
        self.serialized_key = Some(self.field_name.clone());
        self
    }

    pub fn serialize_as_array(&mut self, element: TypeRef) -> &mut Self {
        self.serialize_kind = Some(Kind::Array);
        self.serialized_type = Some(element);
        self.serialized_key = Some(self.field_name.clone());
        self
    }

    pub fn serialize_as_set(&mut self, element: TypeRef) -> &mut Self {
        self.serialize_kind = Some(Kind::Set);
        self.serialized_type = Some(element);
        self.serialized_key = Some(self.field_name.clone());
        self
    }

    pub fn serialize_as_map(&mut self, key: TypeRef, value: TypeRef) -> &mut Self {
        self.serialize_kind = Some(Kind::Map);
        self.serialized_key_type = Some(key);
        self.serialized_value_type = Some(value);
        self.serialized_key = Some(self.field_name.clone());
        self
    }

    pub fn serialize_as_object_map(&mut self, value: TypeRef) -> &mut Self {
        self.serialize_kind = Some(Kind::ObjectMap);
        self.serialized_value_type = Some(value);
        self.serialized_key = Some(self.field_name.clone());
        self
    }

    pub fn serialize_as_json(&mut self, transform_keys: bool) -> &mut Self {
        self.serialize_kind = Some(Kind::Json);
        self.transform_json_keys_serialize = transform_keys;
        self.serialized_key = Some(self.field_name.clone());
        self
    }

    pub fn serialize_with(&mut self, f: impl Fn(&Instance) -> Value + 'static) -> &mut Self {
        self.serialize_kind = Some(Kind::Custom);
        self.custom_serializer = Some(Rc::new(f));
        self.serialized_key = Some(self.field_name.clone());
        self
    }

    // ── deserialize direction ────────────────────────────────────────────

    pub fn deserialize_as(&mut self, element: TypeRef) -> &mut Self {
        self.deserialize_kind = Some(Self::kind_for(&element));
        self.deserialized_type = Some(element);
        self.deserialized_key = Some(self.field_name.clone());
        self
    }

    pub fn deserialize_as_array(&mut self, element: TypeRef) -> &mut Self {
        self.deserialize_kind = Some(Kind::Array);
        self.deserialized_type = Some(element);
        self.deserialized_key = Some(self.field_name.clone());
        self
    }

    pub fn deserialize_as_set(&mut self, element: TypeRef) -> &mut Self {
        self.deserialize_kind = Some(Kind::Set);
        self.deserialized_type = Some(element);
        self.deserialized_key = Some(self.field_name.clone());
        self
    }

    pub fn deserialize_as_map(&mut self, key: TypeRef, value: TypeRef) -> &mut Self {
        self.deserialize_kind = Some(Kind::Map);
        self.deserialized_key_type = Some(key);
        self.deserialized_value_type = Some(value);
        self.deserialized_key = Some(self.field_name.clone());
        self
    }

    pub fn deserialize_as_object_map(&mut self, value: TypeRef) -> &mut Self {
        self.deserialize_kind = Some(Kind::ObjectMap);
        self.deserialized_value_type = Some(value);
        self.deserialized_key = Some(self.field_name.clone());
        self
    }

    pub fn deserialize_as_json(&mut self, transform_keys: bool) -> &mut Self {
        self.deserialize_kind = Some(Kind::Json);
        self.transform_json_keys_deserialize = transform_keys;
        self.deserialized_key = Some(self.field_name.clone());
        self
    }

    pub fn deserialize_with(&mut self, f: impl Fn(&Value) -> Instance + 'static) -> &mut Self {
        self.deserialize_kind = Some(Kind::Custom);
        self.custom_deserializer = Some(Rc::new(f));
        self.deserialized_key = Some(self.field_name.clone());
        self
    }

    // ── both directions ("auto" forms) ───────────────────────────────────

    pub fn auto_as(&mut self, element: TypeRef) -> &mut Self {
        self.serialize_as(element.clone());
        self.deserialize_as(element)
    }

    pub fn auto_as_array(&mut self, element: TypeRef) -> &mut Self {
        self.serialize_as_array(element.clone());
        self.deserialize_as_array(element)
    }

    pub fn auto_as_set(&mut self, element: TypeRef) -> &mut Self {
        self.serialize_as_set(element.clone());
        self.deserialize_as_set(element)
    }

    pub fn auto_as_map(&mut self, key: TypeRef, value: TypeRef) -> &mut Self {
        self.serialize_as_map(key.clone(), value.clone());
        self.deserialize_as_map(key, value)
    }

    pub fn auto_as_object_map(&mut self, value: TypeRef) -> &mut Self {
        self.serialize_as_object_map(value.clone());
        self.deserialize_as_object_map(value)
    }

    pub fn auto_as_json(&mut self, transform_keys: bool) -> &mut Self {
        self.serialize_as_json(transform_keys);
        self.deserialize_as_json(transform_keys)
    }

    // ── independent attributes ───────────────────────────────────────────

    /// Rename the key used on the wire in both directions.
    pub fn key(&mut self, key: &str) -> &mut Self {
        self.serialized_key = Some(key.to_string());
        self.deserialized_key = Some(key.to_string());
        self
    }

    pub fn serialized_key(&mut self, key: Option<&str>) -> &mut Self {
        self.serialized_key = key.map(str::to_string);
        self
    }

    pub fn deserialized_key(&mut self, key: Option<&str>) -> &mut Self {
        self.deserialized_key = key.map(str::to_string);
        self
    }

    pub fn emit_default(&mut self, emit: bool) -> &mut Self {
        self.emit_default_value = emit;
        self
    }

    pub fn default_value(&mut self, value: Instance) -> &mut Self {
        self.explicit_default = Some(value);
        self
    }

    pub fn bit_mask(&mut self, mask: u64) -> &mut Self {
        self.bit_mask_serialize = mask;
        self
    }

    pub fn merge_mode(&mut self, mode: ArrayMerge) -> &mut Self {
        self.array_merge = mode;
        self
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("field_name", &self.field_name)
            .field("serialized_key", &self.serialized_key)
            .field("deserialized_key", &self.deserialized_key)
            .field("serialize_kind", &self.serialize_kind)
            .field("deserialize_kind", &self.deserialize_kind)
            .field("emit_default_value", &self.emit_default_value)
            .field("bit_mask_serialize", &self.bit_mask_serialize)
            .field("array_merge", &self.array_merge)
            .finish()
    }
}

// ── Type metadata ─────────────────────────────────────────────────────────

/// Everything registered for one type: ordered descriptors, lifecycle
/// hooks, a zero-argument constructor, and the reference-tracking override.
#[derive(Clone, Default)]
pub struct TypeMeta {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub on_serialized: Option<SerializedHook>,
    pub on_deserialized: Option<DeserializedHook>,
    pub constructor: Option<Constructor>,
    /// When set, overrides the engine-wide reference-tracking toggle for
    /// nodes of this type.
    pub ref_override: Option<bool>,
}

impl fmt::Debug for TypeMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMeta")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("has_on_serialized", &self.on_serialized.is_some())
            .field("has_on_deserialized", &self.on_deserialized.is_some())
            .field("has_constructor", &self.constructor.is_some())
            .field("ref_override", &self.ref_override)
            .finish()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────

/// The descriptor table keyed by type identity.
#[derive(Default)]
pub struct MetaRegistry {
    types: Vec<TypeMeta>,
    serialize_key_transform: Option<KeyTransform>,
    deserialize_key_transform: Option<KeyTransform>,
}

impl fmt::Debug for MetaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaRegistry")
            .field("types", &self.types)
            .field(
                "has_serialize_key_transform",
                &self.serialize_key_transform.is_some(),
            )
            .field(
                "has_deserialize_key_transform",
                &self.deserialize_key_transform.is_some(),
            )
            .finish()
    }
}

impl MetaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new type and hand out its identity.
    pub fn declare(&mut self, name: &str) -> TypeKey {
        let key = TypeKey(self.types.len());
        self.types.push(TypeMeta {
            name: name.to_string(),
            ..TypeMeta::default()
        });
        key
    }

    pub fn meta(&self, key: TypeKey) -> &TypeMeta {
        &self.types[key.0]
    }

    pub fn meta_mut(&mut self, key: TypeKey) -> &mut TypeMeta {
        &mut self.types[key.0]
    }

    pub fn type_name(&self, key: TypeKey) -> &str {
        &self.types[key.0].name
    }

    /// Get or create the descriptor for `(type, field)`. Idempotent: the
    /// same pair always yields the same slot, in first-touch order.
    pub fn field(&mut self, key: TypeKey, name: &str) -> &mut FieldDescriptor {
        let fields = &mut self.types[key.0].fields;
        if let Some(pos) = fields.iter().position(|d| d.field_name == name) {
            &mut fields[pos]
        } else {
            fields.push(FieldDescriptor::new(name));
            fields.last_mut().unwrap()
        }
    }

    /// Ordered descriptor list, or `None` when the type has none registered
    /// (treated as primitive or opaque by the engines).
    pub fn descriptors(&self, key: TypeKey) -> Option<&[FieldDescriptor]> {
        let fields = &self.types[key.0].fields;
        if fields.is_empty() {
            None
        } else {
            Some(fields)
        }
    }

    /// Merge a parent's metadata into a child: the child's descriptor list
    /// becomes the parent's (in parent order) with the child's own
    /// descriptors replacing same-named entries in place and new ones
    /// appended. Hooks and the ref override are inherited where the child
    /// has none of its own. Call after the child's own fields are declared.
    pub fn inherit(&mut self, parent: TypeKey, child: TypeKey) {
        let parent_meta = self.types[parent.0].clone();
        let child_meta = &mut self.types[child.0];

        let mut merged = parent_meta.fields;
        for field in child_meta.fields.drain(..) {
            if let Some(pos) = merged.iter().position(|d| d.field_name == field.field_name) {
                merged[pos] = field;
            } else {
                merged.push(field);
            }
        }
        child_meta.fields = merged;

        if child_meta.on_serialized.is_none() {
            child_meta.on_serialized = parent_meta.on_serialized;
        }
        if child_meta.on_deserialized.is_none() {
            child_meta.on_deserialized = parent_meta.on_deserialized;
        }
        if child_meta.ref_override.is_none() {
            child_meta.ref_override = parent_meta.ref_override;
        }
        if child_meta.constructor.is_none() {
            child_meta.constructor = parent_meta.constructor;
        }
    }

    pub fn set_constructor(&mut self, key: TypeKey, f: impl Fn() -> Instance + 'static) {
        self.types[key.0].constructor = Some(Rc::new(f));
    }

    pub fn on_serialized(
        &mut self,
        key: TypeKey,
        hook: impl Fn(&mut Map<String, Value>, &Instance) -> Option<Value> + 'static,
    ) {
        self.types[key.0].on_serialized = Some(Rc::new(hook));
    }

    pub fn on_deserialized(
        &mut self,
        key: TypeKey,
        hook: impl Fn(&Value, &Instance, InstantiationPolicy) -> Option<Instance> + 'static,
    ) {
        self.types[key.0].on_deserialized = Some(Rc::new(hook));
    }

    /// Per-type reference-tracking override (`None` defers to the engine
    /// toggle).
    pub fn set_ref_override(&mut self, key: TypeKey, tracked: Option<bool>) {
        self.types[key.0].ref_override = tracked;
    }

    // ── key transforms ───────────────────────────────────────────────────

    pub fn set_serialize_key_transform(&mut self, f: Option<KeyTransform>) {
        self.serialize_key_transform = f;
    }

    pub fn set_deserialize_key_transform(&mut self, f: Option<KeyTransform>) {
        self.deserialize_key_transform = f;
    }

    /// Serialize-direction key transform; identity when unset.
    pub fn transform_serialize_key(&self, key: &str) -> String {
        match &self.serialize_key_transform {
            Some(f) => f(key),
            None => key.to_string(),
        }
    }

    /// Deserialize-direction key transform; identity when unset.
    pub fn transform_deserialize_key(&self, key: &str) -> String {
        match &self.deserialize_key_transform {
            Some(f) => f(key),
            None => key.to_string(),
        }
    }

    pub(crate) fn has_deserialize_key_transform(&self) -> bool {
        self.deserialize_key_transform.is_some()
    }

    pub(crate) fn has_serialize_key_transform(&self) -> bool {
        self.serialize_key_transform.is_some()
    }
}
