mod common;

use std::sync::Arc;

use common::{qa_row, runner, template, StubInference};
use evalkit_cache::{FileCache, InMemoryCache, ResponseCache};
use evalkit_core::{EvalError, LlmParams};
use evalkit_runner::{ab_prompt_builder, ab_variables, DatasetRow, DatasetRunner, RowOutcome};

#[tokio::test]
async fn second_run_of_same_request_is_served_from_cache() {
    let stub = Arc::new(StubInference::echo());
    let cache = Arc::new(InMemoryCache::new());
    let runner = runner(Arc::clone(&stub)).with_cache(Some(cache.clone() as Arc<dyn ResponseCache>));
    let row = qa_row(0, "Q0");

    let first = runner.run(&row).await.unwrap();
    let second = runner.run(&row).await.unwrap();

    assert_eq!(
        first,
        RowOutcome::Success {
            answer: "Answer: A (Q0)".to_string(),
            cached: false
        }
    );
    assert_eq!(second.answer(), first.answer());
    assert!(matches!(second, RowOutcome::Success { cached: true, .. }));
    assert_eq!(stub.calls(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn file_cache_survives_a_new_runner() {
    let dir = tempfile::tempdir().unwrap();
    let row = qa_row(0, "Q0");

    let first_stub = Arc::new(StubInference::echo());
    let cache: Arc<dyn ResponseCache> = Arc::new(FileCache::new(dir.path()));
    runner(Arc::clone(&first_stub))
        .with_cache(Some(Arc::clone(&cache)))
        .run(&row)
        .await
        .unwrap();

    // A fresh process: new stub, new cache handle on the same directory.
    let second_stub = Arc::new(StubInference::echo());
    let reopened: Arc<dyn ResponseCache> = Arc::new(FileCache::new(dir.path()));
    let outcome = runner(Arc::clone(&second_stub))
        .with_cache(Some(reopened))
        .run(&row)
        .await
        .unwrap();

    assert_eq!(outcome.answer(), "Answer: A (Q0)");
    assert_eq!(first_stub.calls(), 1);
    assert_eq!(second_stub.calls(), 0);
}

#[tokio::test]
async fn transient_failure_becomes_row_failure() {
    let stub = Arc::new(StubInference::new(|_, _| {
        Err(EvalError::LlmProvider("503 overloaded".to_string()))
    }));
    let cache = Arc::new(InMemoryCache::new());
    let runner = runner(Arc::clone(&stub)).with_cache(Some(cache.clone() as Arc<dyn ResponseCache>));

    let outcome = runner.run(&qa_row(0, "Q0")).await.unwrap();

    match outcome {
        RowOutcome::Failure { diagnostic } => assert!(diagnostic.contains("503 overloaded")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(cache.is_empty());
}

#[tokio::test]
async fn invalid_completions_fail_the_row() {
    let stub = Arc::new(StubInference::new(|_, _| Ok("I am not sure".to_string())));
    let outcome = runner(Arc::clone(&stub)).run(&qa_row(0, "Q0")).await.unwrap();

    assert!(!outcome.is_complete());
    assert!(outcome.answer().contains("valid completions"));
}

#[tokio::test]
async fn non_transient_errors_propagate() {
    let stub = Arc::new(StubInference::new(|_, _| {
        Err(EvalError::Custom("logic bug".to_string()))
    }));
    let err = runner(stub).run(&qa_row(0, "Q0")).await.unwrap_err();
    assert!(matches!(err, EvalError::Custom(_)));
}

#[tokio::test]
async fn missing_fields_leave_placeholders_verbatim() {
    let stub = Arc::new(StubInference::echo());
    let row = DatasetRow::new(0)
        .with_field("question", "Q0")
        .with_field("correct_answer", "4");

    runner(Arc::clone(&stub)).run(&row).await.unwrap();

    let prompt = &stub.prompts()[0];
    assert_eq!(
        prompt.messages[0].content,
        "Pick (A) 4 or (B) $answer_b. Reply 'Answer: <letter>'."
    );
}

#[test]
fn swap_exchanges_answer_positions() {
    let row = qa_row(3, "Q3");
    let plain = ab_variables(&row, false);
    let swapped = ab_variables(&row, true);

    assert_eq!(plain["answer_a"], "right 3");
    assert_eq!(plain["answer_b"], "wrong 3");
    assert_eq!(swapped["answer_a"], "wrong 3");
    assert_eq!(swapped["answer_b"], "right 3");
    assert_eq!(swapped["question"], "Q3");
}

#[test]
fn prompt_derivation_is_reproducible() {
    let build = ab_prompt_builder(template(), true);
    let row = qa_row(1, "Q1");
    assert_eq!(build(&row).unwrap(), build(&row.clone()).unwrap());
}

#[test]
fn rejects_invalid_params_at_construction() {
    let stub = Arc::new(StubInference::echo());
    let result = DatasetRunner::new(
        ab_prompt_builder(template(), false),
        LlmParams::new("stub-model").with_n(0),
        stub,
    );
    assert!(matches!(result, Err(EvalError::InvalidConfig(_))));
}
