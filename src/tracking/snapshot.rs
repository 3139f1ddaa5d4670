use serde::{Deserialize, Serialize};

use super::changes::FieldChange;
use super::entity::{TrackedEntity, key_of};
use crate::core::{EntityDescriptor, EntityKey, FieldValue, Result, TrackError};

/// An owned copy of one entity's trackable field values.
///
/// Values are held in descriptor order. Nothing here borrows from the entity it
/// was taken from, so later mutation of that entity never reaches the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    key: EntityKey,
    fields: Vec<(String, FieldValue)>,
}

impl EntitySnapshot {
    /// Copies every trackable field of `entity`.
    pub fn capture<E: TrackedEntity>(entity: &E, descriptor: &EntityDescriptor) -> Result<Self> {
        if descriptor.field_count() == 0 {
            return Err(TrackError::UnsupportedType {
                type_name: descriptor.type_name().to_string(),
                reason: "no persistable fields".to_string(),
            });
        }

        let key = key_of(entity, descriptor)?;
        let mut fields = Vec::with_capacity(descriptor.field_count());
        for field in descriptor.fields() {
            let value = entity.read_field(field.name).ok_or_else(|| {
                TrackError::Inconsistent(format!(
                    "field '{}' of '{}' is not readable",
                    field.name,
                    descriptor.type_name()
                ))
            })?;
            if !field.kind.is_compatible(&value, field.nullable) {
                return Err(TrackError::Inconsistent(format!(
                    "field '{}' of '{}' declared {} but holds {}",
                    field.name,
                    descriptor.type_name(),
                    field.kind,
                    value.type_name()
                )));
            }
            fields.push((field.name.to_string(), value));
        }

        Ok(Self { key, fields })
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Stored value of one field.
    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Field-by-field comparison against the current state of `entity`.
    pub fn diff<E: TrackedEntity>(&self, entity: &E) -> Result<Vec<FieldChange>> {
        let mut changes = Vec::new();
        for (name, original) in &self.fields {
            let current = entity.read_field(name).ok_or_else(|| {
                TrackError::Inconsistent(format!("field '{}' is no longer readable", name))
            })?;
            if current != *original {
                changes.push(FieldChange {
                    field: name.clone(),
                    original: original.clone(),
                    current,
                });
            }
        }
        Ok(changes)
    }

    pub fn is_modified<E: TrackedEntity>(&self, entity: &E) -> Result<bool> {
        for (name, original) in &self.fields {
            match entity.read_field(name) {
                Some(current) if current == *original => {}
                Some(_) => return Ok(true),
                None => {
                    return Err(TrackError::Inconsistent(format!(
                        "field '{}' is no longer readable",
                        name
                    )));
                }
            }
        }
        Ok(false)
    }

    /// Builds a fresh entity holding the snapshot values.
    pub fn materialize<E: TrackedEntity>(&self) -> Result<E> {
        let mut entity = E::blank()?;
        self.restore_into(&mut entity)?;
        Ok(entity)
    }

    /// Writes the snapshot values back into an existing entity. Untracked
    /// fields keep whatever they hold.
    pub fn restore_into<E: TrackedEntity>(&self, entity: &mut E) -> Result<()> {
        for (name, value) in &self.fields {
            entity.write_field(name, value.clone())?;
        }
        Ok(())
    }
}
