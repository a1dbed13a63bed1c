use std::rc::Rc;

use json_marshal::{Instance, Marshaller, PrimitiveKind, TypeRef};
use serde_json::{json, Value};

fn num() -> TypeRef {
    TypeRef::Primitive(PrimitiveKind::Number)
}

fn string() -> TypeRef {
    TypeRef::Primitive(PrimitiveKind::String)
}

fn boolean() -> TypeRef {
    TypeRef::Primitive(PrimitiveKind::Boolean)
}

#[test]
fn serialize_primitive_matrix() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "n").serialize_as(num());
    m.field(t, "s").serialize_as(string());
    m.field(t, "b").serialize_as(boolean());

    let inst = Instance::object(Some(t));
    inst.set("n", 1i64.into());
    inst.set("s", "hello".into());
    inst.set("b", true.into());
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"n": 1, "s": "hello", "b": true})
    );

    // loose coercion through the declared primitive
    inst.set("n", "32".into());
    inst.set("s", 100i64.into());
    inst.set("b", 0i64.into());
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"n": 32, "s": "100", "b": false})
    );

    // NaN has no JSON representation
    inst.set("n", f64::NAN.into());
    inst.set("s", "".into());
    inst.set("b", "yes".into());
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"n": null, "s": "", "b": true})
    );
}

#[test]
fn serialize_null_and_absent_fields() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "a").serialize_as(num());
    m.field(t, "b").serialize_as(num());

    let inst = Instance::object(Some(t));
    inst.set("a", Instance::Null);
    // "b" never set: skipped entirely; explicit null is emitted
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"a": null})
    );
}

#[test]
fn serialize_date_and_regex() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "at").serialize_as(TypeRef::Primitive(PrimitiveKind::Date));
    m.field(t, "pat").serialize_as(TypeRef::Primitive(PrimitiveKind::Regex));

    let inst = Instance::object(Some(t));
    inst.set("at", Instance::Date(2500.0));
    inst.set("pat", Instance::Regex("[123]".into()));
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"at": 2500, "pat": "/[123]/"})
    );
}

#[test]
fn serialize_nested_object_matrix() {
    let mut m = Marshaller::new();
    let inner = m.declare("Inner");
    m.field(inner, "x").serialize_as(num());
    let outer = m.declare("Outer");
    m.field(outer, "child").serialize_as(TypeRef::Type(inner));

    let child = Instance::object(Some(inner));
    child.set("x", 5i64.into());
    let root = Instance::object(Some(outer));
    root.set("child", child);
    assert_eq!(
        m.serialize(&root, &TypeRef::Type(outer)).unwrap(),
        json!({"child": {"x": 5}})
    );

    // null child serializes to null, untyped opaque child to {}
    root.set("child", Instance::Null);
    assert_eq!(
        m.serialize(&root, &TypeRef::Type(outer)).unwrap(),
        json!({"child": null})
    );
}

#[test]
fn serialize_array_and_set_matrix() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "nums").serialize_as_array(num());
    m.field(t, "tags").serialize_as_set(string());

    let inst = Instance::object(Some(t));
    inst.set("nums", Instance::array(vec![1i64.into(), 2i64.into(), 3i64.into()]));
    inst.set("tags", Instance::set_of(vec!["a".into(), "b".into()]));
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"nums": [1, 2, 3], "tags": ["a", "b"]})
    );

    // a non-sequence source for a sequence field yields null
    inst.set("nums", 7i64.into());
    inst.set("tags", Instance::Null);
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"nums": null, "tags": null})
    );
}

#[test]
fn serialize_top_level_array() {
    let mut m = Marshaller::new();
    let t = m.declare("Elem");
    m.field(t, "v").serialize_as(num());

    let mk = |v: i64| {
        let e = Instance::object(Some(t));
        e.set("v", v.into());
        e
    };
    let items = [mk(1), mk(2)];
    assert_eq!(
        m.serialize_array(&items, &TypeRef::Type(t)).unwrap(),
        json!([{"v": 1}, {"v": 2}])
    );
}

#[test]
fn serialize_map_matrix() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "values").serialize_as_map(string(), num());

    let inst = Instance::object(Some(t));
    inst.set(
        "values",
        Instance::map(vec![
            ("v0".into(), 1i64.into()),
            ("v1".into(), 2i64.into()),
        ]),
    );
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"values": {"v0": 1, "v1": 2}})
    );

    // non-string key types render through their own serialization
    let t2 = m.declare("NumKeys");
    m.field(t2, "values").serialize_as_map(num(), num());
    let inst = Instance::object(Some(t2));
    inst.set(
        "values",
        Instance::map(vec![(1i64.into(), 10i64.into()), (2i64.into(), 20i64.into())]),
    );
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t2)).unwrap(),
        json!({"values": {"1": 10, "2": 20}})
    );
}

#[test]
fn serialize_object_map_matrix() {
    let mut m = Marshaller::new();
    let inner = m.declare("Inner");
    m.field(inner, "x").serialize_as(num());
    let t = m.declare("Test");
    m.field(t, "bag").serialize_as_object_map(TypeRef::Type(inner));

    let a = Instance::object(Some(inner));
    a.set("x", 1i64.into());
    let b = Instance::object(Some(inner));
    b.set("x", 2i64.into());
    let bag = Instance::object(None);
    bag.set("first", a);
    bag.set("second", b);

    let inst = Instance::object(Some(t));
    inst.set("bag", bag);
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"bag": {"first": {"x": 1}, "second": {"x": 2}}})
    );
}

#[test]
fn serialize_json_passthrough_matrix() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "data").serialize_as_json(false);

    let nested = Instance::object(None);
    nested.set("things", Instance::array(vec![1i64.into(), "two".into(), Instance::Null]));
    nested.set("flag", true.into());
    let inst = Instance::object(Some(t));
    inst.set("data", nested);
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"data": {"things": [1, "two", null], "flag": true}})
    );
}

#[test]
fn serialize_json_passthrough_key_transform_flag() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "raw").serialize_as_json(false);
    m.field(t, "cooked").serialize_as_json(true);
    m.registry_mut()
        .set_serialize_key_transform(Some(Rc::new(|k: &str| k.to_uppercase())));

    let mk = || {
        let o = Instance::object(None);
        o.set("inner", 1i64.into());
        o
    };
    let inst = Instance::object(Some(t));
    inst.set("raw", mk());
    inst.set("cooked", mk());
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"RAW": {"inner": 1}, "COOKED": {"INNER": 1}})
    );
}

#[test]
fn serialize_key_rename_and_transform() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "plain").serialize_as(num());
    m.field(t, "renamed").serialize_as(num()).key("other");
    m.registry_mut()
        .set_serialize_key_transform(Some(Rc::new(|k: &str| k.to_uppercase())));

    let inst = Instance::object(Some(t));
    inst.set("plain", 1i64.into());
    inst.set("renamed", 2i64.into());
    // explicit renames bypass the global transform
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"PLAIN": 1, "other": 2})
    );
}

#[test]
fn serialize_selective_bitmask() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "a").serialize_as(num()).bit_mask(0b01);
    m.field(t, "b").serialize_as(num()).bit_mask(0b10);
    m.field(t, "c").serialize_as(num());

    let inst = Instance::object(Some(t));
    inst.set("a", 1i64.into());
    inst.set("b", 2i64.into());
    inst.set("c", 3i64.into());

    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"a": 1, "b": 2, "c": 3})
    );
    m.set_selective_mask(0b01);
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"a": 1, "c": 3})
    );
    m.set_selective_mask(0b10);
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"b": 2, "c": 3})
    );
}

#[test]
fn serialize_default_suppression_matrix() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "n").serialize_as(num()).emit_default(false);
    m.field(t, "s").serialize_as(string()).emit_default(false);
    m.field(t, "b").serialize_as(boolean()).emit_default(false);
    m.field(t, "pick")
        .serialize_as(num())
        .emit_default(false)
        .default_value(4i64.into());

    let inst = Instance::object(Some(t));
    inst.set("n", 0i64.into());
    inst.set("s", "".into());
    inst.set("b", false.into());
    inst.set("pick", 4i64.into());
    assert_eq!(m.serialize(&inst, &TypeRef::Type(t)).unwrap(), json!({}));

    inst.set("n", 1i64.into());
    inst.set("s", "x".into());
    inst.set("b", true.into());
    inst.set("pick", 0i64.into());
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"n": 1, "s": "x", "b": true, "pick": 0})
    );
}

#[test]
fn serialize_custom_function() {
    let mut m = Marshaller::new();
    let t = m.declare("Test");
    m.field(t, "v").serialize_with(|inst| match inst {
        Instance::Number(n) => Value::String(format!("#{n}")),
        _ => Value::Null,
    });

    let inst = Instance::object(Some(t));
    inst.set("v", 7.0f64.into());
    assert_eq!(
        m.serialize(&inst, &TypeRef::Type(t)).unwrap(),
        json!({"v": "#7"})
    );
}

#[test]
fn on_serialized_hook_can_edit_or_replace() {
    let mut m = Marshaller::new();
    let edited = m.declare("Edited");
    m.field(edited, "v").serialize_as(num());
    m.registry_mut().on_serialized(edited, |out, _inst| {
        out.insert("extra".to_string(), json!(true));
        None
    });

    let replaced = m.declare("Replaced");
    m.field(replaced, "v").serialize_as(num());
    m.registry_mut()
        .on_serialized(replaced, |_out, _inst| Some(json!("gone")));

    let a = Instance::object(Some(edited));
    a.set("v", 1i64.into());
    assert_eq!(
        m.serialize(&a, &TypeRef::Type(edited)).unwrap(),
        json!({"v": 1, "extra": true})
    );

    let b = Instance::object(Some(replaced));
    b.set("v", 1i64.into());
    assert_eq!(m.serialize(&b, &TypeRef::Type(replaced)).unwrap(), json!("gone"));
}

#[test]
fn serialize_unannotated_type_is_empty_tree() {
    let mut m = Marshaller::new();
    let t = m.declare("Plain");
    let inst = Instance::object(Some(t));
    inst.set("anything", 1i64.into());
    assert_eq!(m.serialize(&inst, &TypeRef::Type(t)).unwrap(), json!({}));
    assert_eq!(m.serialize(&inst, &TypeRef::Opaque).unwrap(), json!({}));
}
