//! Error types for the reactive engine.
//!
//! Writes return `Result` because a write synchronously runs every
//! dependent of the location written; a dependent's failure surfaces at the
//! write site.

use thiserror::Error;

use crate::reactive::ComputationId;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A write went through a read-only container or ref.
    #[error("cannot write `{key}`: target is read-only")]
    ReadOnly { key: String },

    /// The key cannot address the container it was used on.
    #[error("invalid key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// `run()` was called from inside the computation's own body.
    #[error("computation {0} is already running")]
    AlreadyRunning(ComputationId),

    /// Re-entrant triggers nested deeper than the configured limit, or more
    /// deferred re-runs of one computation or watcher than that limit.
    #[error("trigger nesting exceeded the limit of {limit}")]
    TriggerDepthExceeded { limit: usize },

    /// Cyclic data cannot be snapshotted to JSON.
    #[error("cyclic data cannot be converted to JSON")]
    Cycle,

    #[error("invalid store configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A failure raised by a computation body, getter or watch callback.
    #[error("{0}")]
    Body(String),
}

impl ReactiveError {
    /// Build a [`ReactiveError::Body`] from any message.
    pub fn body(message: impl Into<String>) -> Self {
        ReactiveError::Body(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_key() {
        let err = ReactiveError::ReadOnly { key: "count".into() };
        assert_eq!(err.to_string(), "cannot write `count`: target is read-only");

        let err = ReactiveError::body("boom");
        assert_eq!(err.to_string(), "boom");
    }
}
