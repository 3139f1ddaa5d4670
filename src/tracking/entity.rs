use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::core::{
    EntityDescriptor, EntityKey, FieldDescriptor, FieldKind, FieldValue, Result, TrackError,
};

/// Trait for scalar types a field may hold and still be tracked.
///
/// Implemented for the persistable allowlist only; a field whose type does not
/// implement it has to be declared `#[track(skip)]`.
pub trait TrackedValue: Clone + PartialEq + Send + Sync + 'static {
    const KIND: FieldKind;
    const NULLABLE: bool = false;

    fn to_field_value(&self) -> FieldValue;

    /// Converts back from a stored value; `None` when the value does not fit.
    fn from_field_value(value: FieldValue) -> Option<Self>;
}

impl TrackedValue for i64 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        value.as_i64()
    }
}

impl TrackedValue for i32 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Integer(i64::from(*self))
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        value.as_i64().and_then(|i| i32::try_from(i).ok())
    }
}

impl TrackedValue for i16 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Integer(i64::from(*self))
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        value.as_i64().and_then(|i| i16::try_from(i).ok())
    }
}

impl TrackedValue for u32 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Integer(i64::from(*self))
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        value.as_i64().and_then(|i| u32::try_from(i).ok())
    }
}

impl TrackedValue for f64 {
    const KIND: FieldKind = FieldKind::Float;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Float(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(f) => Some(f),
            _ => None,
        }
    }
}

impl TrackedValue for f32 {
    const KIND: FieldKind = FieldKind::Float;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Float(f64::from(*self))
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(f) => Some(f as f32),
            _ => None,
        }
    }
}

impl TrackedValue for bool {
    const KIND: FieldKind = FieldKind::Boolean;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Boolean(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl TrackedValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl TrackedValue for NaiveDate {
    const KIND: FieldKind = FieldKind::Date;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Date(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Date(d) => Some(d),
            _ => None,
        }
    }
}

impl TrackedValue for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Timestamp;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Timestamp(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Timestamp(t) => Some(t),
            _ => None,
        }
    }
}

impl TrackedValue for Uuid {
    const KIND: FieldKind = FieldKind::Uuid;

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Uuid(*self)
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Uuid(u) => Some(u),
            _ => None,
        }
    }
}

impl<T: TrackedValue> TrackedValue for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_field_value(&self) -> FieldValue {
        match self {
            Some(value) => value.to_field_value(),
            None => FieldValue::Null,
        }
    }

    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(None),
            other => T::from_field_value(other).map(Some),
        }
    }
}

impl FieldDescriptor {
    /// Descriptor for a field holding `T`.
    pub fn of<T: TrackedValue>(name: &'static str, primary_key: bool) -> Self {
        Self {
            name,
            kind: T::KIND,
            nullable: T::NULLABLE,
            primary_key,
        }
    }
}

/// Core trait for entity types whose instances can be change-tracked.
///
/// Usually generated by [`tracked_entity!`](crate::tracked_entity); hand-written
/// impls must keep `read_field`/`write_field` in agreement with `descriptor`.
pub trait TrackedEntity: Sized {
    /// Returns the static field layout of the type.
    fn descriptor() -> EntityDescriptor;

    /// Reads a trackable field, `None` for unknown names.
    fn read_field(&self, field: &str) -> Option<FieldValue>;

    /// Writes a trackable field.
    fn write_field(&mut self, field: &str, value: FieldValue) -> Result<()>;

    /// Produces a blank instance to copy snapshot values into.
    fn blank() -> Result<Self> {
        Err(TrackError::Construction {
            type_name: std::any::type_name::<Self>().to_string(),
            reason: "no blank constructor available".to_string(),
        })
    }

    /// Identity of this entity.
    fn entity_key(&self) -> Result<EntityKey> {
        key_of(self, &Self::descriptor())
    }
}

/// Reads the primary-key tuple of `entity` in key declaration order.
pub fn key_of<E: TrackedEntity>(entity: &E, descriptor: &EntityDescriptor) -> Result<EntityKey> {
    let mut values = Vec::new();
    for field in descriptor.key_fields() {
        let value = entity
            .read_field(field.name)
            .ok_or_else(|| TrackError::Inconsistent(format!(
                "key field '{}' of '{}' is not readable",
                field.name,
                descriptor.type_name()
            )))?;
        if value.is_null() {
            return Err(TrackError::NullEntity {
                type_name: descriptor.type_name().to_string(),
                field: field.name.to_string(),
            });
        }
        values.push(value);
    }

    if values.is_empty() {
        return Err(TrackError::UnsupportedType {
            type_name: descriptor.type_name().to_string(),
            reason: "no primary key field".to_string(),
        });
    }

    Ok(EntityKey::new(values))
}

/// Builds the error a `write_field` impl returns when a value does not fit.
pub fn field_write_error(type_name: &str, field: &str, value: &FieldValue) -> TrackError {
    field_kind_mismatch(type_name, field, value.type_name())
}

#[doc(hidden)]
pub fn field_kind_mismatch(type_name: &str, field: &str, found: &str) -> TrackError {
    TrackError::Construction {
        type_name: type_name.to_string(),
        reason: format!("cannot write {} value into field '{}'", found, field),
    }
}
