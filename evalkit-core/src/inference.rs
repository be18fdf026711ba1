use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::{EvalError, InsufficientValidsBehaviour, LlmParams, LlmResponse, ModelIds, Prompt};

/// Structural acceptance check applied to every sampled candidate.
pub type ValidityFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Accepts completions containing `marker`.
pub fn contains_marker(marker: impl Into<String>) -> ValidityFn {
    let marker = marker.into();
    Arc::new(move |completion: &str| completion.contains(&marker))
}

/// Accepts every completion.
pub fn accept_all() -> ValidityFn {
    Arc::new(|_: &str| true)
}

#[derive(Clone)]
pub struct InferenceRequest {
    pub model_ids: ModelIds,
    pub prompt: Prompt,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub top_p: f64,
    pub n: usize,
    pub num_candidates_per_completion: usize,
    pub insufficient_valids_behaviour: InsufficientValidsBehaviour,
    pub logprobs: Option<u32>,
    pub is_valid: ValidityFn,
    pub print_prompt_and_response: bool,
}

impl InferenceRequest {
    pub fn from_params(params: &LlmParams, prompt: Prompt, is_valid: ValidityFn) -> Self {
        Self {
            model_ids: params.model.clone(),
            prompt,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            n: params.n,
            num_candidates_per_completion: params.num_candidates_per_completion,
            insufficient_valids_behaviour: params.insufficient_valids_behaviour,
            logprobs: params.logprobs,
            is_valid,
            print_prompt_and_response: false,
        }
    }

    pub fn with_print_prompt_and_response(mut self, enabled: bool) -> Self {
        self.print_prompt_and_response = enabled;
        self
    }
}

impl fmt::Debug for InferenceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceRequest")
            .field("model_ids", &self.model_ids)
            .field("prompt", &self.prompt)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .field("n", &self.n)
            .field(
                "num_candidates_per_completion",
                &self.num_candidates_per_completion,
            )
            .field(
                "insufficient_valids_behaviour",
                &self.insufficient_valids_behaviour,
            )
            .field("logprobs", &self.logprobs)
            .field("print_prompt_and_response", &self.print_prompt_and_response)
            .finish_non_exhaustive()
    }
}

/// A capability that turns one request into scored completions.
///
/// On success the returned sequence is non-empty. Backend, timeout and
/// validity-exhaustion problems surface as transient errors
/// (see [`crate::is_transient`]).
#[async_trait::async_trait]
pub trait Inference: Send + Sync {
    async fn call(&self, request: InferenceRequest) -> Result<Vec<LlmResponse>, EvalError>;

    /// Total spend so far, in USD.
    fn running_cost(&self) -> f64 {
        0.0
    }

    fn log_model_timings(&self) {}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelTiming {
    pub calls: usize,
    pub total_duration: f64,
    pub total_api_duration: f64,
}

impl ModelTiming {
    pub fn mean_duration(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_duration / self.calls as f64
        }
    }
}

#[derive(Debug, Default)]
struct CostState {
    running_cost: f64,
    timings: BTreeMap<String, ModelTiming>,
}

/// Running spend and per-model timings for one capability instance.
#[derive(Clone, Debug, Default)]
pub struct CostTracker {
    inner: Arc<Mutex<CostState>>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one backend round-trip that produced `responses`.
    pub fn record(&self, model_id: &str, responses: &[LlmResponse], duration: f64) {
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        let cost: f64 = responses.iter().map(|response| response.cost).sum();
        let api_duration = responses
            .iter()
            .filter_map(|response| response.api_duration)
            .fold(0.0, f64::max);
        state.running_cost += cost;
        let timing = state.timings.entry(model_id.to_string()).or_default();
        timing.calls += 1;
        timing.total_duration += duration;
        timing.total_api_duration += api_duration;
    }

    pub fn running_cost(&self) -> f64 {
        self.inner
            .lock()
            .map(|state| state.running_cost)
            .unwrap_or_default()
    }

    pub fn model_timings(&self) -> BTreeMap<String, ModelTiming> {
        self.inner
            .lock()
            .map(|state| state.timings.clone())
            .unwrap_or_default()
    }
}
