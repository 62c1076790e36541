use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::registry::FieldKey;

/// Snapshot mapping of field name to value, in registration order.
pub type FormValues = IndexMap<FieldKey, FieldValue>;

/// Dynamically typed field value.
///
/// Structural checks (`min_length`, `max_length`, `pattern`) apply to `Text`
/// values only; `required` treats `Null`, empty `Text`, and empty `List` as
/// missing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum FieldValue {
    #[default]
    Null,
    Text(String),
    Flag(bool),
    Number(Decimal),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Flag(_) | FieldValue::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Number(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::List(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emptiness_matches_required_semantics() {
        assert!(FieldValue::Null.is_empty());
        assert!(FieldValue::from("").is_empty());
        assert!(FieldValue::List(Vec::new()).is_empty());
        assert!(!FieldValue::from("x").is_empty());
        assert!(!FieldValue::from(false).is_empty());
        assert!(!FieldValue::Number(Decimal::ZERO).is_empty());
    }
}
