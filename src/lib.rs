// ============================================================================
// memorm Library
// ============================================================================

//! Change-tracking core for a small object-relational mapper.
//!
//! An [`EntityCollection`] owns live entities and mirrors every add and remove
//! into a [`ChangeTracker`], which keeps an owned [`EntitySnapshot`] of each
//! entity's last-persisted field values. At save time the tracker produces a
//! [`ChangeSet`] (added, removed, field-modified) for a [`ChangeExecutor`] to
//! write, and is refreshed only after that write succeeds.
//!
//! # Examples
//!
//! ```
//! use memorm::{ChangeExecutor, ChangeSet, EntityCollection, EntityKey, tracked_entity};
//!
//! tracked_entity! {
//!     #[derive(Debug)]
//!     pub struct Employee {
//!         #[track(key)]
//!         pub id: i64,
//!         pub name: String,
//!     }
//! }
//!
//! struct SqlWriter;
//!
//! impl ChangeExecutor<Employee> for SqlWriter {
//!     fn execute(&mut self, changes: &ChangeSet<'_, Employee>) -> anyhow::Result<()> {
//!         // issue INSERT / DELETE / UPDATE statements here
//!         assert_eq!(changes.added.len(), 1);
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> memorm::Result<()> {
//! let mut employees = EntityCollection::load(vec![
//!     Employee::new(1, "A".to_string()),
//!     Employee::new(2, "B".to_string()),
//! ])?;
//!
//! employees.update(&EntityKey::from_value(1), |e| e.name = "A2".to_string())?;
//! employees.add(Employee::new(3, "C".to_string()))?;
//! employees.remove(&EntityKey::from_value(2))?;
//!
//! let summary = employees.save_changes(&mut SqlWriter)?;
//! assert_eq!(summary.total(), 3);
//! assert!(!employees.has_changes()?);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod tracking;

// Re-export main types for convenience
pub use crate::core::{
    EntityDescriptor, EntityKey, FieldDescriptor, FieldKind, FieldValue, Result, TrackError,
};
pub use tracking::{
    ChangeExecutor, ChangeSet, ChangeTracker, EntityCollection, EntitySnapshot, EntityState,
    FieldChange, ModifiedEntity, RemovalPolicy, SaveSummary, TrackedEntity, TrackedValue,
    TrackerConfig, field_write_error, key_of,
};
#[doc(hidden)]
pub use tracking::field_kind_mismatch;
