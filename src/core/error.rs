use thiserror::Error;

use super::EntityKey;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Duplicate key {key} for entity type '{type_name}'")]
    DuplicateKey { type_name: String, key: EntityKey },

    #[error("Unsupported entity type '{type_name}': {reason}")]
    UnsupportedType { type_name: String, reason: String },

    #[error("Cannot construct entity of type '{type_name}': {reason}")]
    Construction { type_name: String, reason: String },

    #[error("Entity of type '{type_name}' has no value for key field '{field}'")]
    NullEntity { type_name: String, field: String },

    #[error("Primary key of '{type_name}' changed from {before} to {after}")]
    KeyMutated {
        type_name: String,
        before: EntityKey,
        after: EntityKey,
    },

    #[error("Entity {key} of type '{type_name}' is not tracked")]
    NotTracked { type_name: String, key: EntityKey },

    #[error("Tracker state is inconsistent: {0}")]
    Inconsistent(String),

    #[error("Persistence executor failed: {0}")]
    Executor(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TrackError>;

impl From<serde_json::Error> for TrackError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
