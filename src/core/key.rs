use std::fmt;

use serde::{Deserialize, Serialize};

use super::FieldValue;

/// Identity of an entity: its primary-key values in key declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(Vec<FieldValue>);

impl EntityKey {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self(values)
    }

    /// Key of a single-field primary key.
    pub fn from_value(value: impl Into<FieldValue>) -> Self {
        Self(vec![value.into()])
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<FieldValue>> for EntityKey {
    fn from(values: Vec<FieldValue>) -> Self {
        Self(values)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.0.as_slice() {
            return write!(f, "{}", single);
        }
        write!(f, "(")?;
        for (idx, value) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_equality_is_ordered() {
        let a = EntityKey::new(vec![FieldValue::Integer(1), FieldValue::from("x")]);
        let b = EntityKey::new(vec![FieldValue::Integer(1), FieldValue::from("x")]);
        let swapped = EntityKey::new(vec![FieldValue::from("x"), FieldValue::Integer(1)]);
        assert_eq!(a, b);
        assert_ne!(a, swapped);
    }

    #[test]
    fn test_display() {
        assert_eq!(EntityKey::from_value(7).to_string(), "7");
        let composite = EntityKey::new(vec![FieldValue::Integer(1), FieldValue::from("x")]);
        assert_eq!(composite.to_string(), "(1, 'x')");
    }
}
