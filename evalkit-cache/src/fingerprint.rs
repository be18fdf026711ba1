use std::fmt;

use evalkit_core::{EvalError, LlmParams, Prompt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content address of a request: SHA-256 of the canonical JSON of its
/// parameters and of its prompt.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint {
    pub params_hash: String,
    pub prompt_hash: String,
}

impl Fingerprint {
    pub fn of(prompt: &Prompt, params: &LlmParams) -> Result<Self, EvalError> {
        let mut canonical = params.clone();
        // -0.0 and 0.0 are equal params and must share a slot.
        canonical.temperature += 0.0;
        canonical.top_p += 0.0;
        Ok(Self {
            params_hash: digest(&canonical)?,
            prompt_hash: digest(prompt)?,
        })
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.params_hash, self.prompt_hash)
    }
}

fn digest<T: Serialize>(value: &T) -> Result<String, EvalError> {
    let bytes = serde_json::to_vec(value)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
