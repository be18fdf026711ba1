mod backend;
mod inference_api;

// OpenAI-compatible HTTP backend (OpenAI, Together, vLLM, ...)
pub mod openai_compatible;

pub use backend::{ChatBackend, SamplingOptions};
pub use inference_api::{gate_size, select_candidates, InferenceApi};
pub use openai_compatible::{ModelPricing, OpenAiCompatibleBackend, OpenAiCompatibleBuilder};
