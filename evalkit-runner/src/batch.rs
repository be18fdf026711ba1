use std::sync::Arc;

use evalkit_core::{run_until_complete, BatchReport, EvalError, RetryPolicy};
use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::{DatasetRunner, RowOutcome, RowStore};

#[derive(Clone, Debug, Default)]
pub struct BatchOptions {
    /// Upper bound on rows in flight; `None` dispatches every row at once.
    pub concurrency: Option<usize>,
    /// Only the first `limit` rows are dispatched and judged.
    pub limit: Option<usize>,
}

/// One pass over the dataset.
///
/// Loads the durable table, runs every incomplete row concurrently, waits for
/// all of them, merges results by row index and rewrites the whole table.
/// Rows that returned an outcome are saved even when another row raised a
/// non-transient error; that error is returned afterwards.
pub async fn run_dataset(
    store: &dyn RowStore,
    runner: &DatasetRunner,
    options: &BatchOptions,
) -> Result<BatchReport, EvalError> {
    let mut table = store.load().await?;
    let pending = table.incomplete(options.limit);
    tracing::info!(rows = pending.len(), "processing rows");

    let gate = options
        .concurrency
        .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
    let tasks = pending.iter().map(|row| {
        let gate = gate.clone();
        async move {
            let outcome = match gate {
                Some(gate) => match gate.acquire().await {
                    Ok(_permit) => runner.run(row).await,
                    Err(_) => Err(EvalError::Custom("batch gate closed".into())),
                },
                None => runner.run(row).await,
            };
            (row.index, outcome)
        }
    });
    let results = join_all(tasks).await;

    let mut first_error = None;
    let mut completed = 0;
    let processed = results.len();
    for (index, result) in results {
        match result {
            Ok(outcome) => {
                let complete = outcome.is_complete();
                if complete {
                    completed += 1;
                }
                let answer = match outcome {
                    RowOutcome::Success { answer, .. } => answer,
                    RowOutcome::Failure { diagnostic } => diagnostic,
                };
                table.record(index, answer, complete)?;
            }
            Err(err) => {
                tracing::warn!(row = index, error = %err, "row aborted");
                first_error.get_or_insert(err);
            }
        }
    }
    tracing::info!("Processed {processed} rows. {completed} were complete.");

    store.save(&table).await?;
    if let Some(err) = first_error {
        return Err(err);
    }

    let report = table.report(options.limit);
    if report.is_complete() {
        tracing::info!("All rows complete!");
    } else {
        tracing::info!("Not all rows complete.");
    }
    Ok(report)
}

/// Runs [`run_dataset`] until every row is complete or `policy` gives up.
pub async fn run_dataset_until_complete(
    store: &dyn RowStore,
    runner: &DatasetRunner,
    options: &BatchOptions,
    policy: &RetryPolicy,
) -> Result<bool, EvalError> {
    run_until_complete(policy, || run_dataset(store, runner, options)).await
}
