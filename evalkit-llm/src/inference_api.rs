use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use evalkit_core::{
    is_transient, CostTracker, EvalError, Inference, InferenceRequest,
    InsufficientValidsBehaviour, LlmResponse, Prompt, ValidityFn,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::{ChatBackend, SamplingOptions};

const DEFAULT_MAX_IN_FLIGHT: usize = 50;

/// Simultaneous backend calls allowed for a rate-limit share.
pub fn gate_size(max_in_flight: usize, rate_limit_fraction: f64) -> usize {
    let scaled = (max_in_flight as f64 * rate_limit_fraction.clamp(0.0, 1.0)).floor() as usize;
    scaled.max(1)
}

/// Picks `n` completions from sampled candidates according to `behaviour`.
///
/// Valid candidates keep their sampling order. Under `PadInvalids` the
/// shortfall is filled with invalid candidates, also in sampling order.
pub fn select_candidates(
    candidates: Vec<LlmResponse>,
    n: usize,
    behaviour: InsufficientValidsBehaviour,
    is_valid: &ValidityFn,
) -> Result<Vec<LlmResponse>, EvalError> {
    let (mut valid, invalid): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|candidate| is_valid(candidate.completion.as_str()));

    if valid.len() >= n {
        valid.truncate(n);
        return Ok(valid);
    }

    let insufficient = EvalError::InsufficientValids {
        valid: valid.len(),
        requested: n,
    };
    match behaviour {
        InsufficientValidsBehaviour::Error => Err(insufficient),
        InsufficientValidsBehaviour::Continue if valid.is_empty() => Err(insufficient),
        InsufficientValidsBehaviour::Continue => Ok(valid),
        InsufficientValidsBehaviour::PadInvalids => {
            let missing = n - valid.len();
            valid.extend(invalid.into_iter().take(missing));
            if valid.is_empty() {
                return Err(insufficient);
            }
            Ok(valid)
        }
    }
}

#[derive(Serialize)]
struct HistoryRecord<'a> {
    timestamp: String,
    model: &'a str,
    prompt: &'a Prompt,
    completions: Vec<&'a str>,
}

/// The inference capability used by row tasks.
///
/// Samples `n * num_candidates_per_completion` candidates per model, filters
/// them with the request's validity predicate and falls through the model
/// list on transient failures. Spend and timings accumulate in an owned
/// [`CostTracker`].
pub struct InferenceApi<B> {
    backend: B,
    gate: Arc<Semaphore>,
    costs: CostTracker,
    prompt_history_dir: Option<PathBuf>,
}

impl<B: ChatBackend> InferenceApi<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            gate: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
            costs: CostTracker::new(),
            prompt_history_dir: None,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.gate = Arc::new(Semaphore::new(max_in_flight.max(1)));
        self
    }

    pub fn with_rate_limit(self, max_in_flight: usize, fraction: f64) -> Self {
        self.with_max_in_flight(gate_size(max_in_flight, fraction))
    }

    pub fn with_prompt_history_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.prompt_history_dir = dir;
        self
    }

    pub fn costs(&self) -> &CostTracker {
        &self.costs
    }

    async fn sample_model(
        &self,
        model: &str,
        request: &InferenceRequest,
    ) -> Result<Vec<LlmResponse>, EvalError> {
        let count = request.n * request.num_candidates_per_completion;
        let options = SamplingOptions::from(request);

        let started = Instant::now();
        let candidates = {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| EvalError::Custom("inference gate closed".into()))?;
            self.backend
                .sample(model, &request.prompt, &options, count)
                .await?
        };
        let duration = started.elapsed().as_secs_f64();
        let candidates: Vec<LlmResponse> = candidates
            .into_iter()
            .map(|candidate| candidate.with_duration(duration))
            .collect();

        self.costs.record(model, &candidates, duration);
        self.append_history(model, &request.prompt, &candidates).await;
        if request.print_prompt_and_response {
            for candidate in &candidates {
                tracing::info!(model, "prompt:\n{}\nresponse:\n{}", request.prompt, candidate.completion);
            }
        }

        select_candidates(
            candidates,
            request.n,
            request.insufficient_valids_behaviour,
            &request.is_valid,
        )
    }

    async fn append_history(&self, model: &str, prompt: &Prompt, responses: &[LlmResponse]) {
        let Some(dir) = &self.prompt_history_dir else {
            return;
        };
        let now = chrono::Utc::now();
        let record = HistoryRecord {
            timestamp: now.to_rfc3339(),
            model,
            prompt,
            completions: responses.iter().map(|r| r.completion.as_str()).collect(),
        };
        let path = dir.join(format!("{}.jsonl", now.format("%Y-%m-%d")));
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(&line).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(path = %path.display(), error = %err, "failed to write prompt history");
        }
    }
}

#[async_trait::async_trait]
impl<B: ChatBackend> Inference for InferenceApi<B> {
    async fn call(&self, request: InferenceRequest) -> Result<Vec<LlmResponse>, EvalError> {
        let models = request.model_ids.to_vec();
        if models.is_empty() {
            return Err(EvalError::InvalidConfig("no model ids given".into()));
        }

        let mut last_error = None;
        for model in &models {
            match self.sample_model(model, &request).await {
                Ok(responses) => return Ok(responses),
                Err(err) if is_transient(&err) => {
                    tracing::warn!(model = %model, error = %err, "model call failed");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error.unwrap_or_else(|| EvalError::LlmProvider("no model succeeded".into())))
    }

    fn running_cost(&self) -> f64 {
        self.costs.running_cost()
    }

    fn log_model_timings(&self) {
        for (model, timing) in self.costs.model_timings() {
            tracing::debug!(
                model = %model,
                calls = timing.calls,
                mean_duration = timing.mean_duration(),
                total_api_duration = timing.total_api_duration,
                "model timings"
            );
        }
    }
}
