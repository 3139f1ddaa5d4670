use super::{FieldKind, Result, TrackError};

/// One persistable field of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub primary_key: bool,
}

impl FieldDescriptor {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            primary_key: false,
        }
    }

    pub fn key(name: &'static str, kind: FieldKind) -> Self {
        Self::new(name, kind).primary_key()
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Static description of an entity type: its trackable fields in declaration
/// order, some of which form the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    type_name: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    pub fn new(type_name: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        Self { type_name, fields }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|field| field.primary_key)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Checks that the type can be tracked at all.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(self.unsupported("no persistable fields"));
        }

        let mut has_key = false;
        for (idx, field) in self.fields.iter().enumerate() {
            if self.fields[..idx].iter().any(|prev| prev.name == field.name) {
                return Err(self.unsupported(&format!("field '{}' declared twice", field.name)));
            }
            if !field.primary_key {
                continue;
            }
            has_key = true;
            if !field.kind.is_identity_kind() {
                return Err(self.unsupported(&format!(
                    "key field '{}' has non-persistable key type {}",
                    field.name, field.kind
                )));
            }
            if field.nullable {
                return Err(self.unsupported(&format!(
                    "key field '{}' must not be nullable",
                    field.name
                )));
            }
        }

        if !has_key {
            return Err(self.unsupported("no primary key field"));
        }

        Ok(())
    }

    fn unsupported(&self, reason: &str) -> TrackError {
        TrackError::UnsupportedType {
            type_name: self.type_name.to_string(),
            reason: reason.to_string(),
        }
    }
}
