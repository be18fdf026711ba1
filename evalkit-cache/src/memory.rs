use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use evalkit_core::{EvalError, LlmParams, LlmResponse, Prompt};

use crate::{CacheEntry, Fingerprint, ResponseCache};

#[derive(Default, Clone, Debug)]
pub struct InMemoryCache {
    inner: Arc<RwLock<HashMap<Fingerprint, CacheEntry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|guard| guard.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ResponseCache for InMemoryCache {
    async fn lookup(
        &self,
        prompt: &Prompt,
        params: &LlmParams,
    ) -> Result<Option<CacheEntry>, EvalError> {
        let fingerprint = Fingerprint::of(prompt, params)?;
        let guard = self
            .inner
            .read()
            .map_err(|_| EvalError::Cache("lock".into()))?;
        Ok(guard.get(&fingerprint).cloned())
    }

    async fn store(
        &self,
        prompt: &Prompt,
        params: &LlmParams,
        responses: &[LlmResponse],
    ) -> Result<(), EvalError> {
        let entry = CacheEntry::new(prompt, params, responses)?;
        let mut guard = self
            .inner
            .write()
            .map_err(|_| EvalError::Cache("lock".into()))?;
        guard.insert(entry.fingerprint.clone(), entry);
        Ok(())
    }
}
