use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use evalkit_core::{
    accept_all, contains_marker, ChatMessage, EvalError, Inference, InferenceRequest,
    InsufficientValidsBehaviour, LlmParams, LlmResponse, Prompt,
};
use evalkit_llm::{gate_size, select_candidates, ChatBackend, InferenceApi, SamplingOptions};

/// Returns scripted completions per model and counts calls.
#[derive(Default)]
struct ScriptedBackend {
    scripts: HashMap<String, Result<Vec<&'static str>, &'static str>>,
    calls: Arc<AtomicUsize>,
    requested_counts: Arc<Mutex<Vec<usize>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    delay: Duration,
}

impl ScriptedBackend {
    fn with(mut self, model: &str, script: Result<Vec<&'static str>, &'static str>) -> Self {
        self.scripts.insert(model.to_string(), script);
        self
    }
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    async fn sample(
        &self,
        model: &str,
        _prompt: &Prompt,
        _options: &SamplingOptions,
        count: usize,
    ) -> Result<Vec<LlmResponse>, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested_counts.lock().unwrap().push(count);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.scripts.get(model) {
            Some(Ok(completions)) => Ok(completions
                .iter()
                .take(count)
                .map(|c| LlmResponse::new(model, *c, "stop", 0.5).unwrap())
                .collect()),
            Some(Err(message)) => Err(EvalError::LlmProvider(message.to_string())),
            None => Err(EvalError::InvalidConfig(format!("unknown model {model}"))),
        }
    }
}

fn request(params: &LlmParams) -> InferenceRequest {
    InferenceRequest::from_params(
        params,
        Prompt::new(vec![ChatMessage::user("2+2?")]),
        contains_marker("Answer:"),
    )
}

fn completions(responses: &[LlmResponse]) -> Vec<&str> {
    responses.iter().map(|r| r.completion.as_str()).collect()
}

#[tokio::test]
async fn samples_candidates_and_keeps_valid_ones() {
    let backend = ScriptedBackend::default().with(
        "m",
        Ok(vec!["nope", "Answer: A", "Answer: B", "Answer: C"]),
    );
    let counts = Arc::clone(&backend.requested_counts);
    let api = InferenceApi::new(backend);
    let params = LlmParams::new("m").with_n(2).with_candidates(2);

    let responses = api.call(request(&params)).await.unwrap();

    assert_eq!(completions(&responses), vec!["Answer: A", "Answer: B"]);
    assert_eq!(*counts.lock().unwrap(), vec![4]);
    assert!(responses.iter().all(|r| r.duration.is_some()));
    assert!((api.running_cost() - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn error_policy_fails_when_too_few_valid() {
    let backend = ScriptedBackend::default().with("m", Ok(vec!["nope", "Answer: A"]));
    let api = InferenceApi::new(backend);
    let params = LlmParams::new("m").with_n(2);

    let err = api.call(request(&params)).await.unwrap_err();
    assert!(matches!(
        err,
        EvalError::InsufficientValids {
            valid: 1,
            requested: 2
        }
    ));
}

#[test]
fn continue_policy_returns_fewer() {
    let candidates = vec![
        LlmResponse::new("m", "bad", "stop", 0.0).unwrap(),
        LlmResponse::new("m", "Answer: A", "stop", 0.0).unwrap(),
    ];
    let selected = select_candidates(
        candidates,
        2,
        InsufficientValidsBehaviour::Continue,
        &contains_marker("Answer:"),
    )
    .unwrap();
    assert_eq!(completions(&selected), vec!["Answer: A"]);

    let none_valid = select_candidates(
        vec![LlmResponse::new("m", "bad", "stop", 0.0).unwrap()],
        1,
        InsufficientValidsBehaviour::Continue,
        &contains_marker("Answer:"),
    );
    assert!(none_valid.is_err());
}

#[test]
fn pad_invalids_fills_with_invalid_candidates() {
    let candidates = vec![
        LlmResponse::new("m", "bad 1", "stop", 0.0).unwrap(),
        LlmResponse::new("m", "Answer: A", "stop", 0.0).unwrap(),
        LlmResponse::new("m", "bad 2", "stop", 0.0).unwrap(),
        LlmResponse::new("m", "bad 3", "stop", 0.0).unwrap(),
    ];
    let selected = select_candidates(
        candidates,
        3,
        InsufficientValidsBehaviour::PadInvalids,
        &contains_marker("Answer:"),
    )
    .unwrap();
    assert_eq!(completions(&selected), vec!["Answer: A", "bad 1", "bad 2"]);
}

#[tokio::test]
async fn falls_back_to_next_model_on_transient_failure() {
    let backend = ScriptedBackend::default()
        .with("primary", Err("overloaded"))
        .with("secondary", Ok(vec!["Answer: D"]));
    let calls = Arc::clone(&backend.calls);
    let api = InferenceApi::new(backend);
    let params = LlmParams::new(vec!["primary".to_string(), "secondary".to_string()]);

    let responses = api.call(request(&params)).await.unwrap();
    assert_eq!(responses[0].model_id, "secondary");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn non_transient_errors_stop_the_fallback_chain() {
    let backend = ScriptedBackend::default().with("secondary", Ok(vec!["Answer: D"]));
    let calls = Arc::clone(&backend.calls);
    let api = InferenceApi::new(backend);
    let params = LlmParams::new(vec!["missing".to_string(), "secondary".to_string()]);

    let err = api.call(request(&params)).await.unwrap_err();
    assert!(matches!(err, EvalError::InvalidConfig(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gate_bounds_simultaneous_backend_calls() {
    let backend = ScriptedBackend {
        delay: Duration::from_millis(20),
        ..ScriptedBackend::default()
    }
    .with("m", Ok(vec!["Answer: A"]));
    let max_in_flight = Arc::clone(&backend.max_in_flight);
    let api = Arc::new(InferenceApi::new(backend).with_max_in_flight(2));
    let params = LlmParams::new("m");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let api = Arc::clone(&api);
            let req = request(&params);
            tokio::spawn(async move { api.call(req).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn writes_prompt_history_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::default().with("m", Ok(vec!["Answer: A"]));
    let api = InferenceApi::new(backend).with_prompt_history_dir(Some(dir.path().to_path_buf()));
    let req = InferenceRequest::from_params(
        &LlmParams::new("m"),
        Prompt::new(vec![ChatMessage::user("hello")]),
        accept_all(),
    );

    api.call(req).await.unwrap();

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
    let record: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(record["model"], "m");
    assert_eq!(record["completions"][0], "Answer: A");
    assert_eq!(record["prompt"]["messages"][0]["content"], "hello");
}

#[test]
fn gate_size_scales_with_fraction() {
    assert_eq!(gate_size(100, 0.5), 50);
    assert_eq!(gate_size(10, 0.01), 1);
    assert_eq!(gate_size(10, 2.0), 10);
}

#[tokio::test]
async fn timings_are_tracked_per_model() {
    let backend = ScriptedBackend::default().with("m", Ok(vec!["Answer: A"]));
    let api = InferenceApi::new(backend);
    api.call(request(&LlmParams::new("m"))).await.unwrap();
    api.call(request(&LlmParams::new("m"))).await.unwrap();
    api.log_model_timings();

    let timings = api.costs().model_timings();
    assert_eq!(timings["m"].calls, 2);
}
