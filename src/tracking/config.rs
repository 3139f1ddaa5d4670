use serde::{Deserialize, Serialize};

use crate::core::{Result, TrackError};

/// What to do when asked to remove an entity that is not tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Report the miss through the return value and log a warning.
    #[default]
    Ignore,
    /// Fail with `TrackError::NotTracked`.
    Reject,
}

/// Change tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Logical name of the tracked set, used in log output
    pub name: String,

    /// Handling of removals that match no tracked entity
    pub removal_policy: RemovalPolicy,

    /// Emit one trace event per changed field while diffing
    pub trace_field_diffs: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            removal_policy: RemovalPolicy::Ignore,
            trace_field_diffs: false,
        }
    }
}

impl TrackerConfig {
    /// Create a configuration for a named set
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Set the removal policy
    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    /// Enable or disable per-field trace events
    pub fn trace_field_diffs(mut self, enabled: bool) -> Self {
        self.trace_field_diffs = enabled;
        self
    }

    /// Parse from JSON; missing keys take their defaults.
    ///
    /// ```
    /// # use memorm::{RemovalPolicy, TrackerConfig};
    /// let config = TrackerConfig::from_json(r#"{"name": "employees", "removal_policy": "reject"}"#)?;
    /// assert_eq!(config.removal_policy, RemovalPolicy::Reject);
    /// # Ok::<(), memorm::TrackError>(())
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TrackError::Config("name cannot be empty".to_string()));
        }
        Ok(())
    }
}
