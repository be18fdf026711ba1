use std::collections::HashMap;
use std::sync::Arc;

use evalkit_core::{EvalError, Prompt};
use evalkit_prompt::PromptTemplate;

use crate::DatasetRow;

/// Pure mapping from a row to the exact prompt sent for it.
pub type PromptBuilder = Arc<dyn Fn(&DatasetRow) -> Result<Prompt, EvalError> + Send + Sync>;

/// Template variables for an A/B comparison row.
///
/// Every domain field is exposed under its column name. `answer_a` and
/// `answer_b` carry `correct_answer` and `negative_answer`, in that order
/// unless `swap` is set.
pub fn ab_variables(row: &DatasetRow, swap: bool) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = row
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let (first, second) = if swap {
        ("negative_answer", "correct_answer")
    } else {
        ("correct_answer", "negative_answer")
    };
    if let Some(value) = row.field(first) {
        vars.insert("answer_a".to_string(), value.to_string());
    }
    if let Some(value) = row.field(second) {
        vars.insert("answer_b".to_string(), value.to_string());
    }
    vars
}

pub fn ab_prompt_builder(template: PromptTemplate, swap: bool) -> PromptBuilder {
    Arc::new(move |row: &DatasetRow| template.format(&ab_variables(row, swap)))
}
