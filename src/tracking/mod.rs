//! Change tracking: snapshots, identity matching and field-level diffing.

pub mod changes;
pub mod collection;
pub mod config;
pub mod entity;
mod macros;
pub mod snapshot;
pub mod tracker;

pub use changes::{ChangeExecutor, ChangeSet, FieldChange, ModifiedEntity, SaveSummary};
pub use collection::EntityCollection;
pub use config::{RemovalPolicy, TrackerConfig};
pub use entity::{TrackedEntity, TrackedValue, field_write_error, key_of};
#[doc(hidden)]
pub use entity::field_kind_mismatch;
pub use snapshot::EntitySnapshot;
pub use tracker::{ChangeTracker, EntityState};
