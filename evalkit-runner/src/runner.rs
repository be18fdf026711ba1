use std::sync::Arc;

use evalkit_cache::ResponseCache;
use evalkit_core::{
    contains_marker, error_chain, is_transient, EvalError, Inference, InferenceRequest,
    LlmParams, ValidityFn,
};

use crate::{DatasetRow, PromptBuilder};

/// Marker a completion must contain to count as an answer.
pub const DEFAULT_ANSWER_MARKER: &str = "Answer:";

/// Result of running one row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowOutcome {
    Success { answer: String, cached: bool },
    Failure { diagnostic: String },
}

impl RowOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, RowOutcome::Success { .. })
    }

    /// The text stored in the row's `answer` column.
    pub fn answer(&self) -> &str {
        match self {
            RowOutcome::Success { answer, .. } => answer,
            RowOutcome::Failure { diagnostic } => diagnostic,
        }
    }
}

/// Runs single rows: build prompt, consult cache, call the model on a miss.
pub struct DatasetRunner {
    prompt_builder: PromptBuilder,
    params: LlmParams,
    inference: Arc<dyn Inference>,
    is_valid: ValidityFn,
    cache: Option<Arc<dyn ResponseCache>>,
    print_prompt_and_response: bool,
}

impl DatasetRunner {
    pub fn new(
        prompt_builder: PromptBuilder,
        params: LlmParams,
        inference: Arc<dyn Inference>,
    ) -> Result<Self, EvalError> {
        params.validate()?;
        Ok(Self {
            prompt_builder,
            params,
            inference,
            is_valid: contains_marker(DEFAULT_ANSWER_MARKER),
            cache: None,
            print_prompt_and_response: false,
        })
    }

    pub fn with_validity(mut self, is_valid: ValidityFn) -> Self {
        self.is_valid = is_valid;
        self
    }

    pub fn with_cache(mut self, cache: Option<Arc<dyn ResponseCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_print_prompt_and_response(mut self, enabled: bool) -> Self {
        self.print_prompt_and_response = enabled;
        self
    }

    pub fn params(&self) -> &LlmParams {
        &self.params
    }

    pub fn inference(&self) -> &Arc<dyn Inference> {
        &self.inference
    }

    /// Transient model failures come back as [`RowOutcome::Failure`]; any
    /// other error (bad template, cache I/O) is returned as `Err`.
    pub async fn run(&self, row: &DatasetRow) -> Result<RowOutcome, EvalError> {
        let prompt = (self.prompt_builder)(row)?;

        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.lookup(&prompt, &self.params).await? {
                if let Some(answer) = entry.first_completion() {
                    tracing::info!(row = row.index, "loaded cache");
                    return Ok(RowOutcome::Success {
                        answer: answer.to_string(),
                        cached: true,
                    });
                }
            }
        }

        let request =
            InferenceRequest::from_params(&self.params, prompt.clone(), Arc::clone(&self.is_valid))
                .with_print_prompt_and_response(self.print_prompt_and_response);

        let responses = match self.inference.call(request).await {
            Ok(responses) => responses,
            Err(err) if is_transient(&err) => {
                let diagnostic = error_chain(&err);
                tracing::warn!(row = row.index, error = %err, "failed row");
                return Ok(RowOutcome::Failure { diagnostic });
            }
            Err(err) => return Err(err),
        };
        let Some(first) = responses.first() else {
            tracing::warn!(row = row.index, "inference returned no completions");
            return Ok(RowOutcome::Failure {
                diagnostic: "inference returned no completions".to_string(),
            });
        };

        if let Some(cache) = &self.cache {
            cache.store(&prompt, &self.params, &responses).await?;
        }

        self.inference.log_model_timings();
        tracing::info!(
            row = row.index,
            "completed row, running cost: ${:.3}",
            self.inference.running_cost()
        );
        Ok(RowOutcome::Success {
            answer: first.completion.clone(),
            cached: false,
        })
    }
}
