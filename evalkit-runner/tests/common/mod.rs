#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use evalkit_core::{
    EvalError, Inference, InferenceRequest, LlmParams, LlmResponse, Prompt,
};
use evalkit_prompt::{MessageTemplate, PromptTemplate};
use evalkit_runner::{ab_prompt_builder, DatasetRow, DatasetRunner};

type Reply = dyn Fn(&str, usize) -> Result<String, EvalError> + Send + Sync;
type Delay = dyn Fn(&str) -> Duration + Send + Sync;

/// Answers from the user message, honoring the request's validity predicate.
pub struct StubInference {
    reply: Box<Reply>,
    delay: Option<Box<Delay>>,
    calls: AtomicUsize,
    calls_by_question: Mutex<HashMap<String, usize>>,
    prompts: Mutex<Vec<Prompt>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubInference {
    /// `reply` receives the user message and how many times it was seen before.
    pub fn new(
        reply: impl Fn(&str, usize) -> Result<String, EvalError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            delay: None,
            calls: AtomicUsize::new(0),
            calls_by_question: Mutex::new(HashMap::new()),
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Echoes "Answer: A (<user message>)".
    pub fn echo() -> Self {
        Self::new(|question, _| Ok(format!("Answer: A ({question})")))
    }

    pub fn with_delay(mut self, delay: impl Fn(&str) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, user_message: &str) -> usize {
        self.calls_by_question
            .lock()
            .unwrap()
            .get(user_message)
            .copied()
            .unwrap_or_default()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Inference for StubInference {
    async fn call(&self, request: InferenceRequest) -> Result<Vec<LlmResponse>, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let user = request
            .prompt
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let seen = {
            let mut by_question = self.calls_by_question.lock().unwrap();
            let counter = by_question.entry(user.clone()).or_default();
            *counter += 1;
            *counter - 1
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(&user)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let completion = (self.reply)(&user, seen)?;
        if !(request.is_valid)(completion.as_str()) {
            return Err(EvalError::InsufficientValids {
                valid: 0,
                requested: request.n,
            });
        }
        Ok(vec![LlmResponse::new("stub-model", completion, "stop", 0.001)?])
    }
}

/// The user message is the bare question so stubs can key on it.
pub fn template() -> PromptTemplate {
    PromptTemplate::new(vec![
        MessageTemplate::system("Pick (A) $answer_a or (B) $answer_b. Reply 'Answer: <letter>'."),
        MessageTemplate::user("$question"),
    ])
}

pub fn qa_row(index: usize, question: &str) -> DatasetRow {
    DatasetRow::new(index)
        .with_field("question", question)
        .with_field("correct_answer", format!("right {index}"))
        .with_field("negative_answer", format!("wrong {index}"))
}

pub fn runner(inference: Arc<StubInference>) -> DatasetRunner {
    DatasetRunner::new(
        ab_prompt_builder(template(), false),
        LlmParams::new("stub-model").with_temperature(0.0),
        inference,
    )
    .unwrap()
}

pub const QA_CSV: &str = "question,correct_answer,negative_answer\n\
Q0,right 0,wrong 0\n\
Q1,right 1,wrong 1\n\
Q2,right 2,wrong 2\n\
Q3,right 3,wrong 3\n\
Q4,right 4,wrong 4\n";
