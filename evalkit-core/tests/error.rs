use std::time::Duration;

use evalkit_core::{error_chain, is_retryable, is_transient, EvalError};

#[test]
fn transient_errors_are_row_level() {
    assert!(is_transient(&EvalError::LlmProvider("503".into())));
    assert!(is_transient(&EvalError::InsufficientValids {
        valid: 0,
        requested: 1
    }));
    assert!(is_transient(&EvalError::Timeout(Duration::from_secs(1))));
    assert!(!is_transient(&EvalError::Cache("io".into())));
    assert!(!is_transient(&EvalError::InvalidConfig("bad".into())));
}

#[test]
fn io_failures_are_retryable_but_validation_is_not() {
    assert!(is_retryable(&EvalError::Dataset("io".into())));
    assert!(is_retryable(&EvalError::Cache("io".into())));
    assert!(is_retryable(&EvalError::LlmProvider("429".into())));
    assert!(!is_retryable(&EvalError::InvalidStopReason("eos".into())));
    assert!(!is_retryable(&EvalError::Custom("bug".into())));
}

#[test]
fn error_chain_includes_sources() {
    let err = EvalError::MaxRetriesExceeded {
        max: 3,
        last: Box::new(EvalError::LlmProvider("rate limited".into())),
    };
    let rendered = error_chain(&err);
    assert_eq!(
        rendered,
        "Max retries (3) exceeded\ncaused by: LLM provider failed: rate limited"
    );
}
