//! Serialize engine: recursive tree-builder turning an instance graph into
//! a `serde_json::Value`, driven by the descriptor table.

use serde_json::{Map, Value};

use crate::instance::Instance;
use crate::marshaller::Marshaller;
use crate::registry::{Kind, PrimitiveKind, TypeKey, TypeRef};
use crate::types::MarshalError;

/// Serialize `instance` as the declared type.
///
/// `Null` serializes to JSON null before any dispatch. An array-declared
/// type maps element-wise; a primitive type coerces; otherwise the object
/// path below runs.
pub(crate) fn serialize(
    m: &Marshaller,
    instance: &Instance,
    ty: &TypeRef,
) -> Result<Value, MarshalError> {
    if instance.is_null() {
        return Ok(Value::Null);
    }
    match ty.resolve() {
        TypeRef::Primitive(p) => Ok(serialize_primitive(m, instance, p)),
        TypeRef::Array(elem) => serialize_array_value(m, instance, &elem),
        TypeRef::Opaque => serialize_object(m, instance, None),
        TypeRef::Type(k) => serialize_object(m, instance, Some(k)),
        TypeRef::Lazy(f) => serialize(m, instance, &f()),
    }
}

pub(crate) fn serialize_slice(
    m: &Marshaller,
    items: &[Instance],
    element: &TypeRef,
) -> Result<Value, MarshalError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(serialize(m, item, element)?);
    }
    Ok(Value::Array(out))
}

// ── object path ───────────────────────────────────────────────────────────

fn serialize_object(
    m: &Marshaller,
    instance: &Instance,
    declared: Option<TypeKey>,
) -> Result<Value, MarshalError> {
    let mut out = Map::new();
    let mut effective = declared;

    // Runtime typing dispatches on the instance's actual type, not the
    // declared field type, and stamps the tag so the other side can do the
    // same lookup.
    if m.tags.is_enabled() {
        if let Some(actual) = instance.type_key() {
            let tag = m.tags.try_tag(actual).ok_or_else(|| {
                MarshalError::Lookup(m.registry.type_name(actual).to_string())
            })?;
            out.insert("$type".to_string(), Value::String(tag.to_string()));
            effective = Some(actual);
        }
    }

    let Some(fields) = effective.and_then(|k| m.registry.descriptors(k)) else {
        // No descriptors: opaque types serialize to an empty tree.
        return Ok(Value::Object(out));
    };

    if m.tracked(effective) {
        if let Some(ident) = instance.identity() {
            let mut session = m.session.borrow_mut();
            if let Some(id) = session.id_for(ident) {
                let mut token = Map::new();
                token.insert("$ref".to_string(), Value::String(id.to_string()));
                return Ok(Value::Object(token));
            }
            let id = session.assign(ident);
            out.insert("$id".to_string(), Value::String(id));
        }
    }

    for d in fields {
        if d.bit_mask_serialize & m.serialize_mask == 0 {
            continue;
        }
        let Some(key_base) = &d.serialized_key else {
            continue;
        };
        let Some(kind) = d.serialize_kind else {
            continue;
        };
        // Absent source is a silent skip; explicit Null is emitted.
        let Some(source) = instance.get(&d.field_name) else {
            continue;
        };
        if !d.emit_default_value && is_default(m, d, &source) {
            continue;
        }

        let value = match kind {
            Kind::Primitive => serialize_primitive(m, &source, primitive_of(&d.serialized_type)),
            Kind::Object => serialize(
                m,
                &source,
                d.serialized_type.as_ref().unwrap_or(&TypeRef::Opaque),
            )?,
            Kind::Array | Kind::Set => serialize_array_value(
                m,
                &source,
                d.serialized_type.as_ref().unwrap_or(&TypeRef::Opaque),
            )?,
            Kind::Map => serialize_map(
                m,
                &source,
                &d.serialized_key_type,
                &d.serialized_value_type,
            )?,
            Kind::ObjectMap => serialize_object_map(m, &source, &d.serialized_value_type)?,
            Kind::Json => serialize_json(m, &source, d.transform_json_keys_serialize),
            Kind::Custom => match &d.custom_serializer {
                Some(f) => f(&source),
                None => Value::Null,
            },
        };

        let out_key = if key_base == &d.field_name {
            m.registry.transform_serialize_key(key_base)
        } else {
            key_base.clone()
        };
        out.insert(out_key, value);
    }

    if let Some(k) = effective {
        if let Some(hook) = m.registry.meta(k).on_serialized.clone() {
            if let Some(replacement) = hook(&mut out, instance) {
                return Ok(replacement);
            }
        }
    }
    Ok(Value::Object(out))
}

// ── kind handlers ─────────────────────────────────────────────────────────

/// Element-wise array serialization. Sets convert to a sequence in
/// iteration order first. A non-sequence source yields null, not an error.
fn serialize_array_value(
    m: &Marshaller,
    instance: &Instance,
    element: &TypeRef,
) -> Result<Value, MarshalError> {
    let items = match instance {
        Instance::Array(a) | Instance::Set(a) => a.borrow().clone(),
        _ => return Ok(Value::Null),
    };
    serialize_slice(m, &items, element)
}

fn serialize_map(
    m: &Marshaller,
    instance: &Instance,
    key_type: &Option<TypeRef>,
    value_type: &Option<TypeRef>,
) -> Result<Value, MarshalError> {
    let Instance::Map(entries) = instance else {
        return Ok(Value::Null);
    };
    let entries = entries.borrow().clone();
    let key_type = key_type
        .as_ref()
        .map(TypeRef::resolve)
        .unwrap_or(TypeRef::Primitive(PrimitiveKind::String));
    let value_type = value_type.as_ref().cloned().unwrap_or(TypeRef::Opaque);

    let mut out = Map::new();
    for (key, value) in entries {
        // String-typed keys pass through the global key transform; anything
        // else serializes through its key type and is rendered as a string
        // so the output object stays structurally valid.
        let out_key = match key_type {
            TypeRef::Primitive(PrimitiveKind::String) => {
                m.registry.transform_serialize_key(&js_string(m, &key))
            }
            _ => value_to_key(&serialize(m, &key, &key_type)?),
        };
        out.insert(out_key, serialize(m, &value, &value_type)?);
    }
    Ok(Value::Object(out))
}

/// Plain key→value container: its own property names are the map keys.
fn serialize_object_map(
    m: &Marshaller,
    instance: &Instance,
    value_type: &Option<TypeRef>,
) -> Result<Value, MarshalError> {
    let Instance::Object(obj) = instance else {
        return Ok(Value::Null);
    };
    let props = obj.borrow().props.clone();
    let value_type = value_type.as_ref().cloned().unwrap_or(TypeRef::Opaque);

    let mut out = Map::new();
    for (key, value) in props {
        out.insert(
            m.registry.transform_serialize_key(&key),
            serialize(m, &value, &value_type)?,
        );
    }
    Ok(Value::Object(out))
}

/// Verbatim deep copy to the wire tree, with no descriptor dispatch.
pub(crate) fn serialize_json(m: &Marshaller, instance: &Instance, transform: bool) -> Value {
    match instance {
        Instance::Null => Value::Null,
        Instance::Bool(b) => Value::Bool(*b),
        Instance::Number(n) => number_value(*n),
        Instance::Str(s) => Value::String(s.clone()),
        Instance::Date(ms) => number_value(*ms),
        Instance::Regex(src) => Value::String(format!("/{src}/")),
        Instance::Array(items) | Instance::Set(items) => Value::Array(
            items
                .borrow()
                .iter()
                .map(|v| serialize_json(m, v, transform))
                .collect(),
        ),
        Instance::Map(entries) => {
            let mut out = Map::new();
            for (k, v) in entries.borrow().iter() {
                out.insert(js_string(m, k), serialize_json(m, v, transform));
            }
            Value::Object(out)
        }
        Instance::Object(obj) => {
            let mut out = Map::new();
            for (k, v) in &obj.borrow().props {
                let key = if transform && m.registry.has_serialize_key_transform() {
                    m.registry.transform_serialize_key(k)
                } else {
                    k.clone()
                };
                out.insert(key, serialize_json(m, v, transform));
            }
            Value::Object(out)
        }
    }
}

// ── primitive coercion ────────────────────────────────────────────────────

pub(crate) fn serialize_primitive(m: &Marshaller, instance: &Instance, p: PrimitiveKind) -> Value {
    if instance.is_null() {
        return Value::Null;
    }
    match p {
        PrimitiveKind::String => Value::String(js_string(m, instance)),
        PrimitiveKind::Boolean => Value::Bool(truthy(instance)),
        // A non-numeric source and an already-NaN source both land on null.
        PrimitiveKind::Number | PrimitiveKind::Date => match to_number(instance) {
            Some(n) if !n.is_nan() => number_value(n),
            _ => Value::Null,
        },
        PrimitiveKind::Regex => Value::String(match instance {
            Instance::Regex(src) => format!("/{src}/"),
            Instance::Str(s) => s.clone(),
            other => js_string(m, other),
        }),
    }
}

pub(crate) fn primitive_of(ty: &Option<TypeRef>) -> PrimitiveKind {
    match ty.as_ref().map(TypeRef::resolve) {
        Some(TypeRef::Primitive(p)) => p,
        _ => PrimitiveKind::String,
    }
}

fn is_default(m: &Marshaller, d: &crate::registry::FieldDescriptor, source: &Instance) -> bool {
    match &d.explicit_default {
        Some(dv) => source == dv,
        None => *source == zero_value(m, d.serialize_kind, &d.serialized_type),
    }
}

/// The implicit default of a field: what constructing its element type with
/// no arguments yields. Containers and hook-less object types default to
/// null.
pub(crate) fn zero_value(
    m: &Marshaller,
    kind: Option<Kind>,
    ty: &Option<TypeRef>,
) -> Instance {
    match kind {
        Some(Kind::Primitive) => match primitive_of(ty) {
            PrimitiveKind::String => Instance::Str(String::new()),
            PrimitiveKind::Boolean => Instance::Bool(false),
            PrimitiveKind::Number => Instance::Number(0.0),
            PrimitiveKind::Date | PrimitiveKind::Regex => Instance::Null,
        },
        Some(Kind::Object) => match ty.as_ref().map(TypeRef::resolve) {
            Some(TypeRef::Type(k)) => match m.registry.meta(k).constructor.clone() {
                Some(ctor) => ctor(),
                None => Instance::Null,
            },
            _ => Instance::Null,
        },
        _ => Instance::Null,
    }
}

// ── scalar coercion helpers ───────────────────────────────────────────────

pub(crate) fn js_string(m: &Marshaller, instance: &Instance) -> String {
    match instance {
        Instance::Null => "null".to_string(),
        Instance::Bool(b) => b.to_string(),
        Instance::Number(n) => js_number_string(*n),
        Instance::Str(s) => s.clone(),
        Instance::Date(ms) => js_number_string(*ms),
        Instance::Regex(src) => format!("/{src}/"),
        other => serialize_json(m, other, false).to_string(),
    }
}

pub(crate) fn js_number_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn truthy(instance: &Instance) -> bool {
    match instance {
        Instance::Null => false,
        Instance::Bool(b) => *b,
        Instance::Number(n) => *n != 0.0 && !n.is_nan(),
        Instance::Str(s) => !s.is_empty(),
        _ => true,
    }
}

fn to_number(instance: &Instance) -> Option<f64> {
    match instance {
        Instance::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Instance::Number(n) => Some(*n),
        Instance::Date(ms) => Some(*ms),
        Instance::Str(s) => {
            let t = s.trim();
            if t.is_empty() {
                Some(0.0)
            } else {
                Some(t.parse::<f64>().unwrap_or(f64::NAN))
            }
        }
        _ => None,
    }
}

/// Integral floats become JSON integers so output matches hand-written
/// fixtures; everything else keeps its float representation.
pub(crate) fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 {
        if n < 0.0 {
            Value::from(n as i64)
        } else {
            Value::from(n as u64)
        }
    } else {
        Value::from(n)
    }
}

fn value_to_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
