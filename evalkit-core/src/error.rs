use std::{error::Error as StdError, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid stop reason: {0}")]
    InvalidStopReason(String),
    #[error("LLM provider failed: {0}")]
    LlmProvider(String),
    #[error("Only {valid} valid completions out of {requested} requested")]
    InsufficientValids { valid: usize, requested: usize },
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Cache failed: {0}")]
    Cache(String),
    #[error("Dataset state failed: {0}")]
    Dataset(String),
    #[error("Max retries ({max}) exceeded")]
    MaxRetriesExceeded {
        max: usize,
        #[source]
        last: Box<EvalError>,
    },
    #[error("Serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

/// Failures a row task records as data instead of propagating.
pub fn is_transient(error: &EvalError) -> bool {
    matches!(
        error,
        EvalError::LlmProvider(_) | EvalError::InsufficientValids { .. } | EvalError::Timeout(_)
    )
}

/// Failures a whole batch can be re-run after.
pub fn is_retryable(error: &EvalError) -> bool {
    is_transient(error) || matches!(error, EvalError::Cache(_) | EvalError::Dataset(_))
}

/// Renders an error followed by its `source()` chain, one cause per line.
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
