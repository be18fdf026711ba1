//! Content-addressed storage of model responses.
//!
//! A cache slot is keyed by the value of a `(Prompt, LlmParams)` pair, so the
//! same request from any row, process or run lands on the same entry. A hit
//! is authoritative and is never re-checked against a live backend.

mod file;
mod fingerprint;
mod memory;

use evalkit_core::{EvalError, LlmParams, LlmResponse, Prompt};
use serde::{Deserialize, Serialize};

pub use file::FileCache;
pub use fingerprint::Fingerprint;
pub use memory::InMemoryCache;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub prompt: Prompt,
    pub params: LlmParams,
    pub responses: Vec<LlmResponse>,
}

impl CacheEntry {
    pub fn new(
        prompt: &Prompt,
        params: &LlmParams,
        responses: &[LlmResponse],
    ) -> Result<Self, EvalError> {
        if responses.is_empty() {
            return Err(EvalError::Cache("refusing to cache an empty response set".into()));
        }
        Ok(Self {
            fingerprint: Fingerprint::of(prompt, params)?,
            prompt: prompt.clone(),
            params: params.clone(),
            responses: responses.to_vec(),
        })
    }

    pub fn first_completion(&self) -> Option<&str> {
        self.responses.first().map(|response| response.completion.as_str())
    }
}

/// Read-through/write-through response store shared by concurrent row tasks.
#[async_trait::async_trait]
pub trait ResponseCache: Send + Sync {
    /// Never mutates state and never calls a model.
    async fn lookup(
        &self,
        prompt: &Prompt,
        params: &LlmParams,
    ) -> Result<Option<CacheEntry>, EvalError>;

    /// Idempotent: storing the same payload twice leaves one equivalent entry.
    async fn store(
        &self,
        prompt: &Prompt,
        params: &LlmParams,
        responses: &[LlmResponse],
    ) -> Result<(), EvalError>;
}
