//! Shared types for the marshalling engine: error kinds, JSON kind
//! classification, instantiation policies, and array merge modes.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────

/// Errors raised by the serialize/deserialize engines.
///
/// All errors propagate synchronously to the top-level caller; a failure
/// mid-traversal aborts the whole call.
#[derive(Debug, Error, PartialEq)]
pub enum MarshalError {
    /// A map-shaped descriptor received something other than a JSON object.
    #[error("Expected input to be of type `object` but received: {0}")]
    ExpectedObject(JsonKind),

    /// An array-shaped descriptor received something other than a JSON array.
    #[error("Expected input to be an array but received: {0}")]
    ExpectedArray(JsonKind),

    /// A dictionary lookup that must succeed came up empty.
    #[error("The dictionary doesn't have the key {0}")]
    Lookup(String),

    /// A `$type` tag in the input is not registered.
    #[error("unregistered $type tag: {0}")]
    TypeResolution(String),

    /// A `$ref` id never received a matching `$id` in the same session.
    #[error("unresolved $ref: {0}")]
    UnresolvedRef(String),

    /// A regular-expression field received a pattern that does not compile.
    #[error("invalid regular expression `{pattern}`: {message}")]
    InvalidRegex { pattern: String, message: String },
}

// ── JSON kind ─────────────────────────────────────────────────────────────

/// The shape of a JSON value, used to name what an error actually received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl JsonKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonKind::Null,
            Value::Bool(_) => JsonKind::Boolean,
            Value::Number(_) => JsonKind::Number,
            Value::String(_) => JsonKind::String,
            Value::Array(_) => JsonKind::Array,
            Value::Object(_) => JsonKind::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JsonKind::Null => "null",
            JsonKind::Boolean => "boolean",
            JsonKind::Number => "number",
            JsonKind::String => "string",
            JsonKind::Array => "array",
            JsonKind::Object => "object",
        }
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Instantiation policy ──────────────────────────────────────────────────

/// How the deserialize engine obtains a target instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstantiationPolicy {
    /// Run the type's registered zero-argument constructor.
    #[default]
    Construct,
    /// Produce an instance bound to the type identity without running
    /// constructor logic.
    AllocateOnly,
    /// Produce a plain untyped property bag.
    Bare,
}

// ── Array merge mode ──────────────────────────────────────────────────────

/// How deserialized array elements combine with an existing target array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayMerge {
    /// Discard the existing array and build a new one.
    #[default]
    Replace,
    /// Overwrite element-wise onto existing elements; result length follows
    /// the input.
    Into,
    /// Keep existing elements and append the new ones.
    ConcatAtEnd,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_kind_of_covers_all_shapes() {
        assert_eq!(JsonKind::of(&json!(null)), JsonKind::Null);
        assert_eq!(JsonKind::of(&json!(true)), JsonKind::Boolean);
        assert_eq!(JsonKind::of(&json!(1.5)), JsonKind::Number);
        assert_eq!(JsonKind::of(&json!("s")), JsonKind::String);
        assert_eq!(JsonKind::of(&json!([1])), JsonKind::Array);
        assert_eq!(JsonKind::of(&json!({"a": 1})), JsonKind::Object);
    }

    #[test]
    fn mismatch_messages_name_received_kind() {
        let err = MarshalError::ExpectedObject(JsonKind::Number);
        assert_eq!(
            err.to_string(),
            "Expected input to be of type `object` but received: number"
        );
        let err = MarshalError::ExpectedArray(JsonKind::Object);
        assert_eq!(
            err.to_string(),
            "Expected input to be an array but received: object"
        );
    }

    #[test]
    fn defaults() {
        assert_eq!(InstantiationPolicy::default(), InstantiationPolicy::Construct);
        assert_eq!(ArrayMerge::default(), ArrayMerge::Replace);
    }
}
