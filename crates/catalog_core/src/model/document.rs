//! Dynamic, field-keyed document representation.
//!
//! # Invariants
//! - Field order is insertion order (`serde_json` built with `preserve_order`).
//! - Values are the closed JSON variant set: null, number, string, boolean,
//!   nested document, sequence.

use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// One entity after folding or normalization.
pub type Document = Map<String, Value>;

/// Hashable projection of an identifier value.
///
/// Integers and text are kept distinct so that `1` and `"1"` never collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Int(i64),
    Text(String),
    Other(String),
}

impl IdentityKey {
    /// Returns `None` for `null`, which marks an absent outer-joined entity.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(number) => Some(match number.as_i64() {
                Some(int) => Self::Int(int),
                None => Self::Other(number.to_string()),
            }),
            Value::String(text) => Some(Self::Text(text.clone())),
            other => Some(Self::Other(other.to_string())),
        }
    }
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(int) => write!(f, "{int}"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

/// Reads a positive integer id from a loosely typed value (`7`, `7.0`, `"7"`).
pub fn id_from_value(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::{id_from_value, IdentityKey};
    use serde_json::json;

    #[test]
    fn identity_keys_keep_int_and_text_apart() {
        assert_ne!(
            IdentityKey::from_value(&json!(1)),
            IdentityKey::from_value(&json!("1"))
        );
        assert_eq!(IdentityKey::from_value(&json!(null)), None);
    }

    #[test]
    fn id_from_value_accepts_loose_positive_integers() {
        assert_eq!(id_from_value(&json!(7)), Some(7));
        assert_eq!(id_from_value(&json!(7.0)), Some(7));
        assert_eq!(id_from_value(&json!(" 7 ")), Some(7));
        assert_eq!(id_from_value(&json!(0)), None);
        assert_eq!(id_from_value(&json!(1.5)), None);
        assert_eq!(id_from_value(&json!(true)), None);
    }
}
