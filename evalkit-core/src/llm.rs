use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::EvalError;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// The exact message sequence sent to a model. Half of a cache key.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prompt {
    pub messages: Vec<ChatMessage>,
}

impl Prompt {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, message) in self.messages.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            write!(f, "[{role}] {}", message.content)?;
        }
        Ok(())
    }
}

/// One model id, or an ordered list tried in turn.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum ModelIds {
    Single(String),
    Fallback(Vec<String>),
}

impl ModelIds {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            ModelIds::Single(id) => vec![id.clone()],
            ModelIds::Fallback(ids) => ids.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ModelIds::Single(id) => id.trim().is_empty(),
            ModelIds::Fallback(ids) => ids.is_empty() || ids.iter().any(|id| id.trim().is_empty()),
        }
    }
}

impl From<&str> for ModelIds {
    fn from(value: &str) -> Self {
        ModelIds::Single(value.to_string())
    }
}

impl From<String> for ModelIds {
    fn from(value: String) -> Self {
        ModelIds::Single(value)
    }
}

impl From<Vec<String>> for ModelIds {
    fn from(value: Vec<String>) -> Self {
        ModelIds::Fallback(value)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientValidsBehaviour {
    #[default]
    Error,
    Continue,
    PadInvalids,
}

fn default_temperature() -> f64 {
    0.2
}

fn default_top_p() -> f64 {
    1.0
}

fn default_one() -> usize {
    1
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LlmParams {
    pub model: ModelIds,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_one")]
    pub n: usize,
    #[serde(default = "default_one")]
    pub num_candidates_per_completion: usize,
    #[serde(default)]
    pub insufficient_valids_behaviour: InsufficientValidsBehaviour,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub logprobs: Option<u32>,
}

impl LlmParams {
    pub fn new(model: impl Into<ModelIds>) -> Self {
        Self {
            model: model.into(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            n: 1,
            num_candidates_per_completion: 1,
            insufficient_valids_behaviour: InsufficientValidsBehaviour::Error,
            max_tokens: None,
            logprobs: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_n(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    pub fn with_candidates(mut self, num_candidates_per_completion: usize) -> Self {
        self.num_candidates_per_completion = num_candidates_per_completion;
        self
    }

    pub fn with_insufficient_valids(mut self, behaviour: InsufficientValidsBehaviour) -> Self {
        self.insufficient_valids_behaviour = behaviour;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_logprobs(mut self, logprobs: u32) -> Self {
        self.logprobs = Some(logprobs);
        self
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if self.model.is_empty() {
            return Err(EvalError::InvalidConfig("model id must not be empty".into()));
        }
        if self.n == 0 {
            return Err(EvalError::InvalidConfig("n must be at least 1".into()));
        }
        if self.num_candidates_per_completion == 0 {
            return Err(EvalError::InvalidConfig(
                "num_candidates_per_completion must be at least 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(EvalError::InvalidConfig(format!(
                "temperature {} outside [0, 2]",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(EvalError::InvalidConfig(format!(
                "top_p {} outside (0, 1]",
                self.top_p
            )));
        }
        if self.max_tokens == Some(0) {
            return Err(EvalError::InvalidConfig("max_tokens must be at least 1".into()));
        }
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn key(
        &self,
    ) -> (
        &ModelIds,
        u64,
        u64,
        usize,
        usize,
        InsufficientValidsBehaviour,
        Option<u32>,
        Option<u32>,
    ) {
        (
            &self.model,
            float_bits(self.temperature),
            float_bits(self.top_p),
            self.n,
            self.num_candidates_per_completion,
            self.insufficient_valids_behaviour,
            self.max_tokens,
            self.logprobs,
        )
    }
}

// Collapses -0.0 onto 0.0 so equal values hash alike.
fn float_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

impl PartialEq for LlmParams {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for LlmParams {}

impl Hash for LlmParams {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for LlmParams {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Orders by bit pattern, which is total and agrees with `Eq`.
impl Ord for LlmParams {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum StopReason {
    MaxTokens,
    StopSequence,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
        }
    }
}

impl FromStr for StopReason {
    type Err = EvalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "length" | "max_tokens" => Ok(StopReason::MaxTokens),
            "stop" | "stop_sequence" => Ok(StopReason::StopSequence),
            other => Err(EvalError::InvalidStopReason(other.to_string())),
        }
    }
}

impl TryFrom<String> for StopReason {
    type Error = EvalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn non_negative_cost<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let cost = f64::deserialize(deserializer)?;
    if cost.is_nan() || cost < 0.0 {
        return Err(serde::de::Error::custom(format!("negative cost {cost}")));
    }
    Ok(cost)
}

/// One normalized completion.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LlmResponse {
    pub model_id: String,
    pub completion: String,
    pub stop_reason: StopReason,
    #[serde(deserialize_with = "non_negative_cost")]
    pub cost: f64,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub api_duration: Option<f64>,
    #[serde(default)]
    pub logprobs: Option<Vec<BTreeMap<String, f64>>>,
}

impl LlmResponse {
    /// Builds a response from a provider's raw stop reason.
    pub fn new(
        model_id: impl Into<String>,
        completion: impl Into<String>,
        stop_reason: &str,
        cost: f64,
    ) -> Result<Self, EvalError> {
        if cost.is_nan() || cost < 0.0 {
            return Err(EvalError::InvalidConfig(format!("negative cost {cost}")));
        }
        Ok(Self {
            model_id: model_id.into(),
            completion: completion.into(),
            stop_reason: stop_reason.parse()?,
            cost,
            duration: None,
            api_duration: None,
            logprobs: None,
        })
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_api_duration(mut self, api_duration: f64) -> Self {
        self.api_duration = Some(api_duration);
        self
    }

    pub fn with_logprobs(mut self, logprobs: Vec<BTreeMap<String, f64>>) -> Self {
        self.logprobs = Some(logprobs);
        self
    }
}
