pub mod error;
pub mod key;
pub mod types;
pub mod value;

pub use error::{Result, TrackError};
pub use key::EntityKey;
pub use types::{EntityDescriptor, FieldDescriptor};
pub use value::{FieldKind, FieldValue};
