//! In-memory instance graph.
//!
//! The engines operate on a dynamic value tree rather than concrete host
//! structs: object, array, set, and map nodes are shared (`Rc<RefCell<…>>`)
//! so the graph can carry identity, back-edges, and in-place merge. Object
//! nodes optionally carry the [`TypeKey`] of a registered type, which is
//! what runtime typing and descriptor lookup dispatch on.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::registry::TypeKey;

/// Shared object node.
pub type ObjRef = Rc<RefCell<Obj>>;
/// Shared array node.
pub type ArrayRef = Rc<RefCell<Vec<Instance>>>;
/// Shared set node. Insertion order is iteration order.
pub type SetRef = Rc<RefCell<Vec<Instance>>>;
/// Shared map node. Entries are kept in insertion order; keys may be any
/// instance value, so lookup is linear.
pub type MapRef = Rc<RefCell<Vec<(Instance, Instance)>>>;

/// An object node: an ordered property table plus an optional type identity.
#[derive(Debug, Clone, Default)]
pub struct Obj {
    pub type_key: Option<TypeKey>,
    pub props: IndexMap<String, Instance>,
}

/// A node in the instance graph.
///
/// `Date` carries epoch milliseconds; `Regex` carries the pattern source
/// (without surrounding slashes). Absent values are represented by a missing
/// property, never by a variant: `Null` is always the explicit JSON null.
#[derive(Debug, Clone)]
pub enum Instance {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Date(f64),
    Regex(String),
    Array(ArrayRef),
    Set(SetRef),
    Map(MapRef),
    Object(ObjRef),
}

impl Instance {
    /// Fresh object node, optionally bound to a registered type.
    pub fn object(type_key: Option<TypeKey>) -> Instance {
        Instance::Object(Rc::new(RefCell::new(Obj {
            type_key,
            props: IndexMap::new(),
        })))
    }

    pub fn array(items: Vec<Instance>) -> Instance {
        Instance::Array(Rc::new(RefCell::new(items)))
    }

    pub fn set_of(items: Vec<Instance>) -> Instance {
        Instance::Set(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: Vec<(Instance, Instance)>) -> Instance {
        Instance::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn str(s: impl Into<String>) -> Instance {
        Instance::Str(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Instance::Null)
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Instance::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Type identity of an object node, if any.
    pub fn type_key(&self) -> Option<TypeKey> {
        match self {
            Instance::Object(o) => o.borrow().type_key,
            _ => None,
        }
    }

    /// Read a property of an object node. `None` both for non-objects and
    /// for absent properties.
    pub fn get(&self, prop: &str) -> Option<Instance> {
        match self {
            Instance::Object(o) => o.borrow().props.get(prop).cloned(),
            _ => None,
        }
    }

    /// Write a property of an object node. No-op on non-objects.
    pub fn set(&self, prop: &str, value: Instance) {
        if let Instance::Object(o) = self {
            o.borrow_mut().props.insert(prop.to_string(), value);
        }
    }

    /// Node identity for reference tracking: the shared allocation address
    /// of container nodes. Scalars have no identity.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Instance::Object(o) => Some(Rc::as_ptr(o) as usize),
            Instance::Array(a) | Instance::Set(a) => Some(Rc::as_ptr(a) as usize),
            Instance::Map(m) => Some(Rc::as_ptr(m) as usize),
            _ => None,
        }
    }

    /// Identity comparison: true when both values are the same shared node
    /// (or the same scalar variant is irrelevant here — scalars are never
    /// identical, only equal).
    pub fn same(&self, other: &Instance) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Structural equality. Shared nodes compare by contents, not identity.
///
/// Comparing cyclic graphs recurses without bound; cycle-safe comparison is
/// the caller's responsibility, as with traversal depth in the engines.
impl PartialEq for Instance {
    fn eq(&self, other: &Instance) -> bool {
        match (self, other) {
            (Instance::Null, Instance::Null) => true,
            (Instance::Bool(a), Instance::Bool(b)) => a == b,
            (Instance::Number(a), Instance::Number(b)) => a == b,
            (Instance::Str(a), Instance::Str(b)) => a == b,
            (Instance::Date(a), Instance::Date(b)) => a == b,
            (Instance::Regex(a), Instance::Regex(b)) => a == b,
            (Instance::Array(a), Instance::Array(b)) | (Instance::Set(a), Instance::Set(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                *a.borrow() == *b.borrow()
            }
            (Instance::Map(a), Instance::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                *a.borrow() == *b.borrow()
            }
            (Instance::Object(a), Instance::Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.type_key == b.type_key
                    && a.props.len() == b.props.len()
                    && a.props
                        .iter()
                        .all(|(k, v)| b.props.get(k).is_some_and(|w| v == w))
            }
            _ => false,
        }
    }
}

impl From<bool> for Instance {
    fn from(v: bool) -> Self {
        Instance::Bool(v)
    }
}

impl From<f64> for Instance {
    fn from(v: f64) -> Self {
        Instance::Number(v)
    }
}

impl From<i64> for Instance {
    fn from(v: i64) -> Self {
        Instance::Number(v as f64)
    }
}

impl From<&str> for Instance {
    fn from(v: &str) -> Self {
        Instance::Str(v.to_string())
    }
}
