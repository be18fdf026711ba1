//! Backend for any provider speaking OpenAI's chat completions format.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use evalkit_core::{ChatMessage, EvalError, LlmResponse, Prompt};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{ChatBackend, SamplingOptions};

/// USD per 1K tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ModelPricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

impl ModelPricing {
    pub fn cost(&self, usage: &Usage) -> f64 {
        (usage.prompt_tokens as f64 * self.prompt_per_1k
            + usage.completion_tokens as f64 * self.completion_per_1k)
            / 1000.0
    }
}

#[derive(Serialize, Debug)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    top_p: f64,
    n: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_logprobs: Option<u32>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub logprobs: Option<ChoiceLogprobs>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChoiceLogprobs {
    #[serde(default)]
    pub content: Option<Vec<TokenLogprob>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TokenLogprob {
    pub token: String,
    pub logprob: f64,
    #[serde(default)]
    pub top_logprobs: Vec<TopLogprob>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TopLogprob {
    pub token: String,
    pub logprob: f64,
}

#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Deserialize, Debug, Clone)]
struct OpenAiError {
    error: ErrorDetail,
}

#[derive(Deserialize, Debug, Clone)]
struct ErrorDetail {
    message: String,
}

#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    base_url: String,
    api_key: Option<SecretString>,
    pricing: HashMap<String, ModelPricing>,
    timeout: Duration,
    http: Client,
}

impl std::fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleBackend {
    pub fn builder() -> OpenAiCompatibleBuilder {
        OpenAiCompatibleBuilder::default()
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn map_send_error(&self, err: reqwest::Error) -> EvalError {
        if err.is_timeout() {
            EvalError::Timeout(self.timeout)
        } else {
            EvalError::LlmProvider(err.to_string())
        }
    }

    fn to_responses(
        &self,
        model: &str,
        body: ChatCompletionResponse,
        api_duration: f64,
    ) -> Result<Vec<LlmResponse>, EvalError> {
        if body.choices.is_empty() {
            return Err(EvalError::LlmProvider(format!("{model} returned no choices")));
        }
        let model_id = body.model.clone().unwrap_or_else(|| model.to_string());
        let total_cost = match (self.pricing.get(model), body.usage.as_ref()) {
            (Some(pricing), Some(usage)) => pricing.cost(usage),
            _ => 0.0,
        };
        let per_choice = total_cost / body.choices.len() as f64;

        let mut choices = body.choices;
        choices.sort_by_key(|choice| choice.index);
        choices
            .into_iter()
            .map(|choice| {
                let finish = choice.finish_reason.as_deref().unwrap_or("stop");
                let mut response = LlmResponse::new(
                    model_id.as_str(),
                    choice.message.content.unwrap_or_default(),
                    finish,
                    per_choice,
                )
                .map_err(|err| EvalError::LlmProvider(format!("{model}: {err}")))?
                .with_api_duration(api_duration);
                if let Some(tokens) = choice.logprobs.and_then(|logprobs| logprobs.content) {
                    response = response.with_logprobs(token_logprobs(tokens));
                }
                Ok(response)
            })
            .collect()
    }
}

fn token_logprobs(tokens: Vec<TokenLogprob>) -> Vec<BTreeMap<String, f64>> {
    tokens
        .into_iter()
        .map(|token| {
            if token.top_logprobs.is_empty() {
                BTreeMap::from([(token.token, token.logprob)])
            } else {
                token
                    .top_logprobs
                    .into_iter()
                    .map(|top| (top.token, top.logprob))
                    .collect()
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    async fn sample(
        &self,
        model: &str,
        prompt: &Prompt,
        options: &SamplingOptions,
        count: usize,
    ) -> Result<Vec<LlmResponse>, EvalError> {
        let request = ChatCompletionRequest {
            model,
            messages: &prompt.messages,
            temperature: options.temperature,
            top_p: options.top_p,
            n: count,
            max_tokens: options.max_tokens,
            logprobs: options.logprobs.map(|_| true),
            top_logprobs: options.logprobs,
        };

        let started = Instant::now();
        let mut builder = self.http.post(self.chat_url()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        let response = builder
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiError>(&text)
                .map(|err| err.error.message)
                .unwrap_or(text);
            return Err(match status {
                StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                    EvalError::Timeout(self.timeout)
                }
                _ => EvalError::LlmProvider(format!("{model} returned {status}: {message}")),
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| self.map_send_error(err))?;
        self.to_responses(model, body, started.elapsed().as_secs_f64())
    }
}

pub struct OpenAiCompatibleBuilder {
    base_url: String,
    api_key: Option<SecretString>,
    pricing: HashMap<String, ModelPricing>,
    timeout: Duration,
}

impl Default for OpenAiCompatibleBuilder {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            pricing: HashMap::new(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl OpenAiCompatibleBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn pricing(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.pricing.insert(model.into(), pricing);
        self
    }

    pub fn pricing_table(mut self, table: HashMap<String, ModelPricing>) -> Self {
        self.pricing.extend(table);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<OpenAiCompatibleBackend, EvalError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(EvalError::InvalidConfig(format!(
                "base_url must be an http(s) URL: {}",
                self.base_url
            )));
        }
        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| EvalError::InvalidConfig(err.to_string()))?;
        Ok(OpenAiCompatibleBackend {
            base_url: self.base_url,
            api_key: self.api_key,
            pricing: self.pricing,
            timeout: self.timeout,
            http,
        })
    }
}
