//! Resumable, cache-aware evaluation of LLMs over tabular datasets.
//!
//! ```ignore
//! use evalkit::prelude::*;
//!
//! let backend = OpenAiCompatibleBackend::builder().build()?;
//! let inference = Arc::new(InferenceApi::new(backend).with_rate_limit(50, 0.5));
//! let runner = DatasetRunner::new(ab_prompt_builder(template, false), params, inference)?
//!     .with_cache(FileCache::from_optional_dir(cache_dir).map(|c| Arc::new(c) as _));
//! let done = run_dataset_until_complete(&store, &runner, &options, &RetryPolicy::new(5)).await?;
//! ```

pub use evalkit_cache as cache;
pub use evalkit_core as core;
#[cfg(feature = "openai")]
pub use evalkit_llm as llm;
pub use evalkit_prompt as prompt;
#[cfg(feature = "runner")]
pub use evalkit_runner as runner;

pub mod prelude {
    pub use evalkit_cache::{CacheEntry, FileCache, Fingerprint, InMemoryCache, ResponseCache};
    pub use evalkit_core::{
        BatchReport, ChatMessage, EvalError, Inference, InferenceRequest,
        InsufficientValidsBehaviour, LlmParams, LlmResponse, ModelIds, Prompt, RetryPolicy, Role,
        StopReason,
    };
    #[cfg(feature = "openai")]
    pub use evalkit_llm::{InferenceApi, ModelPricing, OpenAiCompatibleBackend};
    pub use evalkit_prompt::{MessageTemplate, PromptTemplate, TextTemplate};
    #[cfg(feature = "runner")]
    pub use evalkit_runner::{
        ab_prompt_builder, materialize_dataset, run_dataset, run_dataset_until_complete,
        BatchOptions, CsvRowStore, DatasetRow, DatasetRunner, RowOutcome, RowStore, RowTable,
    };
    pub use std::sync::Arc;
}
