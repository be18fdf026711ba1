use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use evalkit_core::{BatchReport, EvalError};

pub const ANSWER_COLUMN: &str = "answer";
pub const COMPLETE_COLUMN: &str = "complete";
pub const SWAP_COLUMN: &str = "swap";

const MANAGED_COLUMNS: [&str; 3] = [ANSWER_COLUMN, COMPLETE_COLUMN, SWAP_COLUMN];

/// One dataset item: domain fields plus pipeline-managed progress.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetRow {
    /// Position in the durable table; the row's identity across a run.
    pub index: usize,
    pub fields: BTreeMap<String, String>,
    pub answer: String,
    pub complete: bool,
    pub swap: String,
}

impl DatasetRow {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// The full durable row state of a dataset, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowTable {
    columns: Vec<String>,
    rows: Vec<DatasetRow>,
}

impl RowTable {
    /// `columns` may omit the managed columns; missing ones are appended.
    pub fn new(columns: Vec<String>) -> Self {
        let mut table = Self {
            columns,
            rows: Vec::new(),
        };
        for managed in MANAGED_COLUMNS {
            if !table.columns.iter().any(|c| c == managed) {
                table.columns.push(managed.to_string());
            }
        }
        table
    }

    /// Re-indexes `rows` by position.
    pub fn from_rows(columns: Vec<String>, rows: Vec<DatasetRow>) -> Self {
        let mut table = Self::new(columns);
        for (index, mut row) in rows.into_iter().enumerate() {
            row.index = index;
            table.rows.push(row);
        }
        table
    }

    pub fn push(&mut self, mut row: DatasetRow) {
        row.index = self.rows.len();
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<DatasetRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DatasetRow> {
        self.rows.get(index)
    }

    /// Rows within the first `limit` that still need work.
    pub fn incomplete(&self, limit: Option<usize>) -> Vec<DatasetRow> {
        self.scoped(limit)
            .iter()
            .filter(|row| !row.complete)
            .cloned()
            .collect()
    }

    pub fn report(&self, limit: Option<usize>) -> BatchReport {
        let scoped = self.scoped(limit);
        let completed = scoped.iter().filter(|row| row.complete).count();
        BatchReport::new(completed, scoped.len())
    }

    /// Records a row result. A complete row is never reopened.
    pub fn record(&mut self, index: usize, answer: String, complete: bool) -> Result<(), EvalError> {
        let row = self
            .rows
            .get_mut(index)
            .ok_or_else(|| EvalError::Dataset(format!("no row with index {index}")))?;
        if row.complete {
            return Ok(());
        }
        row.answer = answer;
        row.complete = complete;
        Ok(())
    }

    fn scoped(&self, limit: Option<usize>) -> &[DatasetRow] {
        match limit {
            Some(limit) => &self.rows[..limit.min(self.rows.len())],
            None => &self.rows,
        }
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self, EvalError> {
        let mut reader = csv::ReaderBuilder::new().from_reader(reader);
        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();

        let mut table = Self::new(headers.clone());
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let mut row = DatasetRow::new(table.rows.len());
            for (column, value) in headers.iter().zip(record.iter()) {
                match column.as_str() {
                    ANSWER_COLUMN => row.answer = value.to_string(),
                    COMPLETE_COLUMN => row.complete = parse_complete(value, row.index)?,
                    SWAP_COLUMN => row.swap = value.to_string(),
                    _ => {
                        row.fields.insert(column.clone(), value.to_string());
                    }
                }
            }
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), EvalError> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns).map_err(csv_error)?;
        for row in &self.rows {
            let record = self.columns.iter().map(|column| match column.as_str() {
                ANSWER_COLUMN => row.answer.as_str(),
                COMPLETE_COLUMN => {
                    if row.complete {
                        "True"
                    } else {
                        "False"
                    }
                }
                SWAP_COLUMN => row.swap.as_str(),
                other => row.field(other).unwrap_or_default(),
            });
            writer.write_record(record).map_err(csv_error)?;
        }
        writer
            .flush()
            .map_err(|err| EvalError::Dataset(err.to_string()))?;
        Ok(())
    }
}

fn parse_complete(raw: &str, index: usize) -> Result<bool, EvalError> {
    match raw.trim() {
        "" | "False" | "false" | "FALSE" | "0" | "0.0" => Ok(false),
        "True" | "true" | "TRUE" | "1" | "1.0" => Ok(true),
        other => Err(EvalError::Dataset(format!(
            "row {index}: unrecognized complete value '{other}'"
        ))),
    }
}

fn csv_error(err: csv::Error) -> EvalError {
    EvalError::Dataset(err.to_string())
}

/// Durable home of a [`RowTable`].
#[async_trait::async_trait]
pub trait RowStore: Send + Sync {
    async fn load(&self) -> Result<RowTable, EvalError>;

    /// Replaces the stored table in full.
    async fn save(&self, table: &RowTable) -> Result<(), EvalError>;
}

#[derive(Clone, Debug)]
pub struct CsvRowStore {
    path: PathBuf,
}

impl CsvRowStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl RowStore for CsvRowStore {
    async fn load(&self) -> Result<RowTable, EvalError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|err| EvalError::Dataset(format!("{}: {err}", self.path.display())))?;
        RowTable::read_csv(bytes.as_slice())
    }

    async fn save(&self, table: &RowTable) -> Result<(), EvalError> {
        let mut buffer = Vec::new();
        table.write_csv(&mut buffer)?;

        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| EvalError::Dataset(format!("bad path {}", self.path.display())))?;
        let tmp = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, buffer)
            .await
            .map_err(|err| EvalError::Dataset(format!("{}: {err}", tmp.display())))?;
        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(EvalError::Dataset(format!("{}: {err}", self.path.display())));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryRowStore {
    inner: Arc<Mutex<RowTable>>,
}

impl InMemoryRowStore {
    pub fn new(table: RowTable) -> Self {
        Self {
            inner: Arc::new(Mutex::new(table)),
        }
    }

    pub fn snapshot(&self) -> Result<RowTable, EvalError> {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| EvalError::Dataset("lock".into()))
    }
}

#[async_trait::async_trait]
impl RowStore for InMemoryRowStore {
    async fn load(&self) -> Result<RowTable, EvalError> {
        self.snapshot()
    }

    async fn save(&self, table: &RowTable) -> Result<(), EvalError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| EvalError::Dataset("lock".into()))?;
        *guard = table.clone();
        Ok(())
    }
}
