use evalkit_core::{EvalError, InferenceRequest, LlmResponse, Prompt};

#[derive(Clone, Debug, PartialEq)]
pub struct SamplingOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: Option<u32>,
    pub logprobs: Option<u32>,
}

impl From<&InferenceRequest> for SamplingOptions {
    fn from(request: &InferenceRequest) -> Self {
        Self {
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            logprobs: request.logprobs,
        }
    }
}

/// One provider round-trip producing `count` independent completions.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    async fn sample(
        &self,
        model: &str,
        prompt: &Prompt,
        options: &SamplingOptions,
        count: usize,
    ) -> Result<Vec<LlmResponse>, EvalError>;
}
