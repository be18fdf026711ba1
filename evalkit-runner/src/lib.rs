//! Resumable dataset evaluation.
//!
//! [`run_dataset`] makes one pass over the durable row table, and
//! [`run_dataset_until_complete`] repeats it until every row is done. Rows
//! already marked complete are never dispatched again, and a cached request
//! finishes without a model call, so re-running is always safe.

mod batch;
mod dataset;
mod materialize;
mod prompt;
mod runner;

pub use batch::{run_dataset, run_dataset_until_complete, BatchOptions};
pub use dataset::{
    CsvRowStore, DatasetRow, InMemoryRowStore, RowStore, RowTable, ANSWER_COLUMN,
    COMPLETE_COLUMN, SWAP_COLUMN,
};
pub use materialize::{dataset_path, materialize_dataset};
pub use prompt::{ab_prompt_builder, ab_variables, PromptBuilder};
pub use runner::{DatasetRunner, RowOutcome, DEFAULT_ANSWER_MARKER};
