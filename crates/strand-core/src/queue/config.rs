//! Pool configuration.
//!
//! [`PoolConfig`] carries the limits shared by [`WorkQueue`](super::WorkQueue)
//! and [`Cargo`](super::Cargo). It is plain serde data so it can be loaded
//! from a JSON file; missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::domain::FlowError;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default number of work items (or batches) in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Default maximum number of items handed to a cargo worker in one batch.
pub const DEFAULT_PAYLOAD: usize = 5;

// =============================================================================
// Pool Configuration
// =============================================================================

/// Limits of a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Work items (queue) or batches (cargo) running at the same time.
    pub concurrency: usize,

    /// Items per batch. Ignored by `WorkQueue`.
    pub payload: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            payload: DEFAULT_PAYLOAD,
        }
    }
}

impl PoolConfig {
    /// Both limits must be at least 1.
    pub fn validate(&self) -> Result<(), FlowError> {
        validate_limit("concurrency", self.concurrency)?;
        validate_limit("payload", self.payload)?;
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, FlowError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| FlowError::invalid(format!("pool config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn validate_limit(name: &str, value: usize) -> Result<usize, FlowError> {
    if value < 1 {
        return Err(FlowError::invalid(format!("{name} must be at least 1, got {value}")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn default_uses_constants() {
        let config = PoolConfig::default();
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.payload, DEFAULT_PAYLOAD);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = PoolConfig::from_json(r#"{"concurrency": 4}"#).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.payload, DEFAULT_PAYLOAD);

        let config = PoolConfig::from_json("{}").unwrap();
        assert_eq!(config, PoolConfig::default());
    }

    #[rstest]
    #[case(r#"{"concurrency": 0}"#)]
    #[case(r#"{"payload": 0}"#)]
    #[case(r#"{"concurrency": "two"}"#)]
    #[case("not json")]
    fn bad_documents_are_rejected(#[case] text: &str) {
        let err = PoolConfig::from_json(text).unwrap_err();
        assert!(matches!(err, FlowError::InvalidArgument(_)));
    }
}
