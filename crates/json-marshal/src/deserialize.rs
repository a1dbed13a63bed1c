//! Deserialize engine: walks a `serde_json::Value` tree and materializes an
//! instance graph, driven by the descriptor table. Forward `$ref` tokens
//! leave null placeholders behind and are patched by the session finalize
//! pass in the engine facade.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::instance::{ArrayRef, Instance};
use crate::marshaller::Marshaller;
use crate::ref_cycle::PatchSite;
use crate::registry::{Kind, PrimitiveKind, TypeKey, TypeRef};
use crate::serialize::{js_number_string, primitive_of, zero_value};
use crate::types::{ArrayMerge, InstantiationPolicy, JsonKind, MarshalError};

pub(crate) fn deserialize_value(
    m: &Marshaller,
    json: &Value,
    ty: &TypeRef,
    target: Option<&Instance>,
    policy: InstantiationPolicy,
) -> Result<Instance, MarshalError> {
    match ty.resolve() {
        TypeRef::Primitive(p) => deserialize_primitive(json, p),
        TypeRef::Array(elem) => {
            deserialize_array(m, json, &elem, target.cloned(), ArrayMerge::Replace, policy)
        }
        TypeRef::Opaque => deserialize_object(m, json, None, target, policy),
        TypeRef::Type(k) => deserialize_object(m, json, Some(k), target, policy),
        TypeRef::Lazy(f) => deserialize_value(m, json, &f(), target, policy),
    }
}

// ── object path ───────────────────────────────────────────────────────────

fn deserialize_object(
    m: &Marshaller,
    json: &Value,
    declared: Option<TypeKey>,
    target: Option<&Instance>,
    policy: InstantiationPolicy,
) -> Result<Instance, MarshalError> {
    if json.is_null() {
        return Ok(Instance::Null);
    }
    let Some(input) = json.as_object() else {
        return Err(MarshalError::ExpectedObject(JsonKind::of(json)));
    };

    // A bare reference token at this level happens when the caller did not
    // intercept it (top-level calls). The id must already be resolved.
    if m.tracked(declared) {
        if let Some(id) = ref_id(json) {
            return m
                .session
                .borrow()
                .lookup(id)
                .ok_or_else(|| MarshalError::UnresolvedRef(id.to_string()));
        }
    }

    // Runtime typing: the stamped tag decides the concrete type, overriding
    // whatever the field declared.
    let mut effective = declared;
    if m.tags.is_enabled() {
        if let Some(tag) = input.get("$type").and_then(Value::as_str) {
            effective = Some(
                m.tags
                    .try_type(tag)
                    .ok_or_else(|| MarshalError::TypeResolution(tag.to_string()))?,
            );
        }
    }

    let instance = match target {
        Some(t) if t.as_object().is_some() => t.clone(),
        _ => instantiate(m, effective, policy),
    };

    // Register the id before walking children so self-references resolve
    // to this same node.
    if m.tracked(effective) {
        if let Some(id) = input.get("$id").and_then(Value::as_str) {
            m.session.borrow_mut().resolve(id, instance.clone());
        }
    }

    let Some(fields) = effective.and_then(|k| m.registry.descriptors(k)) else {
        return Ok(instance);
    };

    for d in fields {
        let Some(key_base) = &d.deserialized_key else {
            continue;
        };
        let Some(kind) = d.deserialize_kind else {
            continue;
        };
        let input_key = if key_base == &d.field_name {
            m.registry.transform_deserialize_key(key_base)
        } else {
            key_base.clone()
        };

        let Some(raw) = input.get(&input_key) else {
            // Absent key: fields that suppress their default on the wire
            // get it back here; everything else stays untouched.
            if !d.emit_default_value {
                let value = d
                    .explicit_default
                    .clone()
                    .unwrap_or_else(|| zero_value(m, d.deserialize_kind, &d.deserialized_type));
                instance.set(&d.field_name, value);
            }
            continue;
        };

        if kind == Kind::Object {
            let elem_key = d.deserialized_type.as_ref().and_then(type_key_of);
            if m.tracked(elem_key) {
                if let Some(id) = ref_id(raw) {
                    let resolved = m.session.borrow().lookup(id);
                    match resolved {
                        Some(t) => instance.set(&d.field_name, t),
                        None => {
                            instance.set(&d.field_name, Instance::Null);
                            if let Some(o) = instance.as_object() {
                                m.session.borrow_mut().defer(
                                    PatchSite::Prop(o.clone(), d.field_name.clone()),
                                    id,
                                );
                            }
                        }
                    }
                    continue;
                }
            }
        }

        let value = match kind {
            Kind::Primitive => deserialize_primitive(raw, primitive_of(&d.deserialized_type))?,
            Kind::Object => {
                let sub_target = instance
                    .get(&d.field_name)
                    .filter(|v| v.as_object().is_some());
                deserialize_value(
                    m,
                    raw,
                    d.deserialized_type.as_ref().unwrap_or(&TypeRef::Opaque),
                    sub_target.as_ref(),
                    policy,
                )?
            }
            Kind::Array => deserialize_array(
                m,
                raw,
                d.deserialized_type.as_ref().unwrap_or(&TypeRef::Opaque),
                instance.get(&d.field_name),
                d.array_merge,
                policy,
            )?,
            Kind::Set => deserialize_set(
                m,
                raw,
                d.deserialized_type.as_ref().unwrap_or(&TypeRef::Opaque),
                policy,
            )?,
            Kind::Map => deserialize_map(
                m,
                raw,
                &d.deserialized_key_type,
                &d.deserialized_value_type,
                policy,
            )?,
            Kind::ObjectMap => {
                deserialize_object_map(m, raw, &d.deserialized_value_type, policy)?
            }
            Kind::Json => deserialize_json(m, raw, d.transform_json_keys_deserialize),
            Kind::Custom => match &d.custom_deserializer {
                Some(f) => f(raw),
                None => Instance::Null,
            },
        };
        instance.set(&d.field_name, value);
    }

    if let Some(k) = effective {
        if let Some(hook) = m.registry.meta(k).on_deserialized.clone() {
            if let Some(replacement) = hook(json, &instance, policy) {
                return Ok(replacement);
            }
        }
    }
    Ok(instance)
}

fn instantiate(m: &Marshaller, key: Option<TypeKey>, policy: InstantiationPolicy) -> Instance {
    match policy {
        InstantiationPolicy::Construct => key
            .and_then(|k| m.registry.meta(k).constructor.clone())
            .map(|ctor| ctor())
            .unwrap_or_else(|| Instance::object(key)),
        InstantiationPolicy::AllocateOnly => Instance::object(key),
        InstantiationPolicy::Bare => Instance::object(None),
    }
}

// ── container kinds ───────────────────────────────────────────────────────

fn deserialize_array(
    m: &Marshaller,
    json: &Value,
    element: &TypeRef,
    existing: Option<Instance>,
    mode: ArrayMerge,
    policy: InstantiationPolicy,
) -> Result<Instance, MarshalError> {
    if json.is_null() {
        return Ok(Instance::Null);
    }
    let Some(items) = json.as_array() else {
        return Err(MarshalError::ExpectedArray(JsonKind::of(json)));
    };
    let tracked = m.tracked(type_key_of(element));

    match mode {
        ArrayMerge::Replace => {
            let out: ArrayRef = Rc::new(RefCell::new(Vec::with_capacity(items.len())));
            for (i, item) in items.iter().enumerate() {
                let value =
                    element_value(m, item, element, None, tracked, policy, || {
                        PatchSite::Index(out.clone(), i)
                    })?;
                out.borrow_mut().push(value);
            }
            Ok(Instance::Array(out))
        }
        ArrayMerge::Into => {
            // Merge element-wise onto the existing array, then cut it down
            // to the input's length.
            let out: ArrayRef = match existing {
                Some(Instance::Array(a)) => a,
                _ => Rc::new(RefCell::new(Vec::new())),
            };
            for (i, item) in items.iter().enumerate() {
                let slot = out.borrow().get(i).cloned();
                let sub_target = slot.filter(|s| s.as_object().is_some());
                let value =
                    element_value(m, item, element, sub_target.as_ref(), tracked, policy, || {
                        PatchSite::Index(out.clone(), i)
                    })?;
                let mut vec = out.borrow_mut();
                if i < vec.len() {
                    vec[i] = value;
                } else {
                    vec.push(value);
                }
            }
            out.borrow_mut().truncate(items.len());
            Ok(Instance::Array(out))
        }
        ArrayMerge::ConcatAtEnd => {
            let out: ArrayRef = match existing {
                Some(Instance::Array(a)) => a,
                _ => Rc::new(RefCell::new(Vec::new())),
            };
            for item in items {
                let at = out.borrow().len();
                let value =
                    element_value(m, item, element, None, tracked, policy, || {
                        PatchSite::Index(out.clone(), at)
                    })?;
                out.borrow_mut().push(value);
            }
            Ok(Instance::Array(out))
        }
    }
}

/// One array slot: intercepts reference tokens (leaving a placeholder and a
/// patch site for unresolved ids), otherwise recurses.
fn element_value(
    m: &Marshaller,
    item: &Value,
    element: &TypeRef,
    sub_target: Option<&Instance>,
    tracked: bool,
    policy: InstantiationPolicy,
    site: impl FnOnce() -> PatchSite,
) -> Result<Instance, MarshalError> {
    if tracked {
        if let Some(id) = ref_id(item) {
            let resolved = m.session.borrow().lookup(id);
            return Ok(match resolved {
                Some(t) => t,
                None => {
                    m.session.borrow_mut().defer(site(), id);
                    Instance::Null
                }
            });
        }
    }
    deserialize_value(m, item, element, sub_target, policy)
}

fn deserialize_set(
    m: &Marshaller,
    json: &Value,
    element: &TypeRef,
    policy: InstantiationPolicy,
) -> Result<Instance, MarshalError> {
    let Some(items) = json.as_array() else {
        return Err(MarshalError::ExpectedArray(JsonKind::of(json)));
    };
    let tracked = m.tracked(type_key_of(element));
    let out = Rc::new(RefCell::new(Vec::with_capacity(items.len())));
    for item in items {
        let at = out.borrow().len();
        if tracked {
            if let Some(id) = ref_id(item) {
                let resolved = m.session.borrow().lookup(id);
                let value = match resolved {
                    Some(t) => t,
                    None => {
                        m.session
                            .borrow_mut()
                            .defer(PatchSite::SetSlot(out.clone(), at), id);
                        Instance::Null
                    }
                };
                out.borrow_mut().push(value);
                continue;
            }
        }
        let value = deserialize_value(m, item, element, None, policy)?;
        // Set semantics: scalar members collapse by value; container
        // elements are fresh identities and always insert.
        let duplicate =
            value.identity().is_none() && out.borrow().iter().any(|v| *v == value);
        if !duplicate {
            out.borrow_mut().push(value);
        }
    }
    Ok(Instance::Set(out))
}

fn deserialize_map(
    m: &Marshaller,
    json: &Value,
    key_type: &Option<TypeRef>,
    value_type: &Option<TypeRef>,
    policy: InstantiationPolicy,
) -> Result<Instance, MarshalError> {
    if json.is_null() {
        return Ok(Instance::Null);
    }
    let Some(input) = json.as_object() else {
        return Err(MarshalError::ExpectedObject(JsonKind::of(json)));
    };
    let key_type = key_type
        .as_ref()
        .map(TypeRef::resolve)
        .unwrap_or(TypeRef::Primitive(PrimitiveKind::String));
    let value_type = value_type.as_ref().cloned().unwrap_or(TypeRef::Opaque);
    let tracked = m.tracked(type_key_of(&value_type));

    let out = Rc::new(RefCell::new(Vec::with_capacity(input.len())));
    for (k, v) in input {
        let wire_key = Value::String(m.registry.transform_deserialize_key(k));
        let key = deserialize_value(m, &wire_key, &key_type, None, policy)?;
        let at = out.borrow().len();
        if tracked {
            if let Some(id) = ref_id(v) {
                let resolved = m.session.borrow().lookup(id);
                let value = match resolved {
                    Some(t) => t,
                    None => {
                        m.session
                            .borrow_mut()
                            .defer(PatchSite::MapValue(out.clone(), at), id);
                        Instance::Null
                    }
                };
                out.borrow_mut().push((key, value));
                continue;
            }
        }
        let value = deserialize_value(m, v, &value_type, None, policy)?;
        out.borrow_mut().push((key, value));
    }
    Ok(Instance::Map(out))
}

fn deserialize_object_map(
    m: &Marshaller,
    json: &Value,
    value_type: &Option<TypeRef>,
    policy: InstantiationPolicy,
) -> Result<Instance, MarshalError> {
    if json.is_null() {
        return Ok(Instance::Null);
    }
    let Some(input) = json.as_object() else {
        return Err(MarshalError::ExpectedObject(JsonKind::of(json)));
    };
    let value_type = value_type.as_ref().cloned().unwrap_or(TypeRef::Opaque);
    let tracked = m.tracked(type_key_of(&value_type));

    let out = Instance::object(None);
    for (k, v) in input {
        let key = m.registry.transform_deserialize_key(k);
        if tracked {
            if let Some(id) = ref_id(v) {
                let resolved = m.session.borrow().lookup(id);
                match resolved {
                    Some(t) => out.set(&key, t),
                    None => {
                        out.set(&key, Instance::Null);
                        if let Some(o) = out.as_object() {
                            m.session
                                .borrow_mut()
                                .defer(PatchSite::Prop(o.clone(), key.clone()), id);
                        }
                    }
                }
                continue;
            }
        }
        out.set(&key, deserialize_value(m, v, &value_type, None, policy)?);
    }
    Ok(out)
}

/// Verbatim deep copy from the wire tree, with no descriptor dispatch.
pub(crate) fn deserialize_json(m: &Marshaller, json: &Value, transform: bool) -> Instance {
    match json {
        Value::Null => Instance::Null,
        Value::Bool(b) => Instance::Bool(*b),
        Value::Number(n) => Instance::Number(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => Instance::Str(s.clone()),
        Value::Array(items) => Instance::array(
            items
                .iter()
                .map(|v| deserialize_json(m, v, transform))
                .collect(),
        ),
        Value::Object(props) => {
            let out = Instance::object(None);
            for (k, v) in props {
                let key = if transform && m.registry.has_deserialize_key_transform() {
                    m.registry.transform_deserialize_key(k)
                } else {
                    k.clone()
                };
                out.set(&key, deserialize_json(m, v, transform));
            }
            out
        }
    }
}

// ── primitives ────────────────────────────────────────────────────────────

pub(crate) fn deserialize_primitive(
    json: &Value,
    p: PrimitiveKind,
) -> Result<Instance, MarshalError> {
    if json.is_null() {
        return Ok(Instance::Null);
    }
    Ok(match p {
        PrimitiveKind::String => Instance::Str(string_of_value(json)),
        PrimitiveKind::Boolean => Instance::Bool(truthy_value(json)),
        PrimitiveKind::Number => Instance::Number(number_of_value(json)),
        PrimitiveKind::Date => Instance::Date(number_of_value(json)),
        PrimitiveKind::Regex => {
            let text = string_of_value(json);
            let source = regex_source(&text);
            regex::Regex::new(source).map_err(|e| MarshalError::InvalidRegex {
                pattern: source.to_string(),
                message: e.to_string(),
            })?;
            Instance::Regex(source.to_string())
        }
    })
}

/// Strip the `/source/flags` envelope; a bare pattern passes through.
fn regex_source(s: &str) -> &str {
    if let Some(rest) = s.strip_prefix('/') {
        if let Some(pos) = rest.rfind('/') {
            return &rest[..pos];
        }
    }
    s
}

fn string_of_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => js_number_string(n.as_f64().unwrap_or(f64::NAN)),
        other => other.to_string(),
    }
}

fn truthy_value(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => {
            let f = n.as_f64().unwrap_or(f64::NAN);
            f != 0.0 && !f.is_nan()
        }
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn number_of_value(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                0.0
            } else {
                t.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        _ => f64::NAN,
    }
}

fn ref_id(v: &Value) -> Option<&str> {
    v.as_object()?.get("$ref")?.as_str()
}

fn type_key_of(ty: &TypeRef) -> Option<TypeKey> {
    match ty.resolve() {
        TypeRef::Type(k) => Some(k),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitive_coercions_follow_loose_rules() {
        assert_eq!(
            deserialize_primitive(&json!("x"), PrimitiveKind::String).unwrap(),
            Instance::Str("x".into())
        );
        assert_eq!(
            deserialize_primitive(&json!(2), PrimitiveKind::Boolean).unwrap(),
            Instance::Bool(true)
        );
        assert_eq!(
            deserialize_primitive(&json!("42"), PrimitiveKind::Number).unwrap(),
            Instance::Number(42.0)
        );
        assert_eq!(
            deserialize_primitive(&json!(null), PrimitiveKind::Number).unwrap(),
            Instance::Null
        );
    }

    #[test]
    fn date_carries_epoch_milliseconds() {
        assert_eq!(
            deserialize_primitive(&json!(1500), PrimitiveKind::Date).unwrap(),
            Instance::Date(1500.0)
        );
    }

    #[test]
    fn regex_strips_envelope_and_validates() {
        assert_eq!(
            deserialize_primitive(&json!("/a+b/"), PrimitiveKind::Regex).unwrap(),
            Instance::Regex("a+b".into())
        );
        assert_eq!(
            deserialize_primitive(&json!("/a+b/gi"), PrimitiveKind::Regex).unwrap(),
            Instance::Regex("a+b".into())
        );
        assert!(matches!(
            deserialize_primitive(&json!("/(/"), PrimitiveKind::Regex),
            Err(MarshalError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn non_numeric_strings_become_nan() {
        let got = deserialize_primitive(&json!("abc"), PrimitiveKind::Number).unwrap();
        match got {
            Instance::Number(n) => assert!(n.is_nan()),
            other => panic!("expected number, got {other:?}"),
        }
    }
}
