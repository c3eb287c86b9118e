//! Store Configuration
//!
//! A [`StoreConfig`] is fixed when a store is created. It can be built in
//! code or loaded from JSON; missing fields take their defaults.
//!
//! ```rust
//! use ripple_core::{StoreConfig, TriggerPolicy};
//!
//! let config = StoreConfig::from_json(r#"{ "trigger_policy": "isolate" }"#).unwrap();
//! assert_eq!(config.trigger_policy, TriggerPolicy::Isolate);
//! assert_eq!(config.max_trigger_depth, StoreConfig::DEFAULT_MAX_TRIGGER_DEPTH);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What a trigger does when one of its dependents fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Stop at the first failing dependent and return its error. Dependents
    /// already notified in the batch stay notified.
    #[default]
    Abort,

    /// Notify every dependent in the batch, then return the first error.
    /// Later errors are logged.
    Isolate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub trigger_policy: TriggerPolicy,

    /// How deeply triggers may nest (a write in a dependent that triggers
    /// another write, and so on) before a write fails with
    /// [`ReactiveError::TriggerDepthExceeded`](crate::ReactiveError::TriggerDepthExceeded).
    pub max_trigger_depth: usize,
}

impl StoreConfig {
    pub const DEFAULT_MAX_TRIGGER_DEPTH: usize = 100;

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_trigger_policy(mut self, policy: TriggerPolicy) -> Self {
        self.trigger_policy = policy;
        self
    }

    pub fn with_max_trigger_depth(mut self, depth: usize) -> Self {
        self.max_trigger_depth = depth;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            trigger_policy: TriggerPolicy::Abort,
            max_trigger_depth: Self::DEFAULT_MAX_TRIGGER_DEPTH,
        }
    }
}
