mod error;
mod inference;
mod llm;
pub mod retry;

pub use error::{error_chain, is_retryable, is_transient, EvalError};
pub use inference::{
    accept_all, contains_marker, CostTracker, Inference, InferenceRequest, ModelTiming,
    ValidityFn,
};
pub use llm::{
    ChatMessage, InsufficientValidsBehaviour, LlmParams, LlmResponse, ModelIds, Prompt, Role,
    StopReason,
};
pub use retry::{run_until_complete, BatchReport, RetryPolicy};
