use std::path::{Path, PathBuf};

use evalkit_core::EvalError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::{CsvRowStore, RowStore, RowTable};

/// `<exp_dir>/data<seed>_swap<True|False>.csv`
pub fn dataset_path(exp_dir: &Path, seed: u64, swap: bool) -> PathBuf {
    let swap = if swap { "True" } else { "False" };
    exp_dir.join(format!("data{seed}_swap{swap}.csv"))
}

/// Writes a seeded shuffle of `source` to `dest` with fresh progress columns.
///
/// Returns the number of rows written.
pub async fn materialize_dataset(
    source: &Path,
    dest: &Path,
    seed: u64,
    num_items: Option<usize>,
) -> Result<usize, EvalError> {
    let source_table = CsvRowStore::new(source).load().await?;
    let columns = source_table.columns().to_vec();
    let mut rows = source_table.into_rows();

    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);
    if let Some(num_items) = num_items {
        rows.truncate(num_items);
    }
    for row in &mut rows {
        row.answer.clear();
        row.complete = false;
        row.swap.clear();
    }

    let table = RowTable::from_rows(columns, rows);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| EvalError::Dataset(format!("{}: {err}", parent.display())))?;
    }
    CsvRowStore::new(dest).save(&table).await?;
    tracing::info!(rows = table.len(), path = %dest.display(), "materialized dataset");
    Ok(table.len())
}
