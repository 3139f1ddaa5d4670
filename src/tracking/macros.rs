//! Macro definitions for declaring tracked entities.
//!
//! Attribute helpers live apart from the entity macro so each stays readable.

#[path = "macros/attr_helpers.rs"]
mod attr_helpers;
#[path = "macros/tracked_entity.rs"]
mod tracked_entity;
