use serde::{Deserialize, Serialize};

use super::snapshot::EntitySnapshot;
use crate::core::{EntityKey, FieldValue};

/// One field whose current value differs from its snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub original: FieldValue,
    pub current: FieldValue,
}

/// A live entity that differs from its snapshot, with the differing fields.
#[derive(Debug)]
pub struct ModifiedEntity<'a, E> {
    pub key: EntityKey,
    pub entity: &'a E,
    pub changes: Vec<FieldChange>,
}

impl<E> ModifiedEntity<'_, E> {
    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|change| change.field.as_str())
    }
}

/// Everything a persistence executor has to write for one save cycle.
///
/// `added` and `modified` borrow the live entities; `removed` carries the
/// last-persisted snapshot of each deleted entity.
#[derive(Debug)]
pub struct ChangeSet<'a, E> {
    pub added: Vec<&'a E>,
    pub removed: Vec<&'a EntitySnapshot>,
    pub modified: Vec<ModifiedEntity<'a, E>>,
}

impl<E> ChangeSet<'_, E> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn summary(&self) -> SaveSummary {
        SaveSummary {
            inserted: self.added.len(),
            deleted: self.removed.len(),
            updated: self.modified.len(),
        }
    }
}

/// Counts of the writes issued by one save cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSummary {
    pub inserted: usize,
    pub deleted: usize,
    pub updated: usize,
}

impl SaveSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.deleted + self.updated
    }
}

/// The external collaborator that turns a [`ChangeSet`] into durable writes.
///
/// Returning `Err` means the whole set must be treated as unwritten; the
/// tracker is only advanced after `Ok`.
pub trait ChangeExecutor<E> {
    fn execute(&mut self, changes: &ChangeSet<'_, E>) -> anyhow::Result<()>;
}
