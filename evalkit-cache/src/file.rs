use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use evalkit_core::{EvalError, LlmParams, LlmResponse, Prompt};

use crate::{CacheEntry, Fingerprint, ResponseCache};

/// Stores one JSON file per fingerprint under
/// `<root>/<params_hash>/<prompt_hash>.json`.
#[derive(Clone, Debug)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// `None` when no cache root is configured, which disables caching.
    pub fn from_optional_dir(root: Option<PathBuf>) -> Option<Self> {
        root.map(Self::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root
            .join(&fingerprint.params_hash)
            .join(format!("{}.json", fingerprint.prompt_hash))
    }
}

#[async_trait::async_trait]
impl ResponseCache for FileCache {
    async fn lookup(
        &self,
        prompt: &Prompt,
        params: &LlmParams,
    ) -> Result<Option<CacheEntry>, EvalError> {
        let fingerprint = Fingerprint::of(prompt, params)?;
        let path = self.entry_path(&fingerprint);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(EvalError::Cache(format!("{}: {err}", path.display()))),
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable cache entry");
                return Ok(None);
            }
        };
        if entry.prompt != *prompt || entry.params != *params || entry.responses.is_empty() {
            tracing::warn!(path = %path.display(), "ignoring mismatched cache entry");
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn store(
        &self,
        prompt: &Prompt,
        params: &LlmParams,
        responses: &[LlmResponse],
    ) -> Result<(), EvalError> {
        let entry = CacheEntry::new(prompt, params, responses)?;
        let path = self.entry_path(&entry.fingerprint);
        let dir = path
            .parent()
            .ok_or_else(|| EvalError::Cache(format!("no parent for {}", path.display())))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| EvalError::Cache(format!("{}: {err}", dir.display())))?;

        let payload = serde_json::to_vec_pretty(&entry)?;
        let tmp = dir.join(format!(
            "{}.{}.tmp",
            entry.fingerprint.prompt_hash,
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|err| EvalError::Cache(format!("{}: {err}", tmp.display())))?;
        // Racing writers for one fingerprint resolve as last-write-wins.
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(EvalError::Cache(format!("{}: {err}", path.display())));
        }
        Ok(())
    }
}
