use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use evalkit_core::LlmParams;
use evalkit_llm::ModelPricing;
use evalkit_prompt::PromptTemplate;
use evalkit_runner::DEFAULT_ANSWER_MARKER;
use serde::Deserialize;

/// One evaluation run, as read from YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub exp_dir: PathBuf,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub swap: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Re-materialize the dataset even if the experiment file exists.
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub prompt_history_dir: Option<PathBuf>,
    #[serde(default)]
    pub print_prompt_and_response: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default = "default_logging")]
    pub logging: String,
    #[serde(default = "default_answer_marker")]
    pub answer_marker: String,
    pub language_model: LlmParams,
    pub prompt: PromptSource,
    #[serde(default)]
    pub provider: ProviderConfig,
    pub dataset: DatasetConfig,
}

/// Either a path to a YAML/JSON template file or the template inline.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PromptSource {
    Path(PathBuf),
    Inline(PromptTemplate),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_rate_limit_fraction")]
    pub rate_limit_fraction: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: default_api_key_env(),
            pricing: HashMap::new(),
            max_in_flight: default_max_in_flight(),
            rate_limit_fraction: default_rate_limit_fraction(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub source: PathBuf,
    #[serde(default)]
    pub num_items: Option<usize>,
}

fn default_max_attempts() -> usize {
    5
}

fn default_logging() -> String {
    "info".to_string()
}

fn default_answer_marker() -> String {
    DEFAULT_ANSWER_MARKER.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_in_flight() -> usize {
    50
}

fn default_rate_limit_fraction() -> f64 {
    1.0
}

fn default_timeout_secs() -> u64 {
    120
}

impl RunConfig {
    pub fn from_yaml_str(input: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(input).context("invalid run configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.language_model.validate()?;
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.provider.rate_limit_fraction) {
            bail!(
                "rate_limit_fraction must be within [0, 1], got {}",
                self.provider.rate_limit_fraction
            );
        }
        Ok(())
    }

    /// Relative template paths resolve against `base`, normally the config's directory.
    pub fn prompt_template(&self, base: &Path) -> anyhow::Result<PromptTemplate> {
        match &self.prompt {
            PromptSource::Inline(template) => Ok(template.clone()),
            PromptSource::Path(path) => {
                let path = if path.is_relative() {
                    base.join(path)
                } else {
                    path.clone()
                };
                Ok(PromptTemplate::from_path(&path)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalkit_core::{InsufficientValidsBehaviour, ModelIds};

    const MINIMAL: &str = r#"
exp_dir: exp/run1
language_model:
  model: gpt-4o-mini
prompt:
  messages:
    - role: system
      content: "Pick (A) $answer_a or (B) $answer_b."
    - role: user
      content: "$question"
dataset:
  source: data/questions.csv
"#;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = RunConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(config.seed, 0);
        assert!(!config.swap);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.answer_marker, "Answer:");
        assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.language_model.temperature, 0.2);
        assert_eq!(
            config.language_model.insufficient_valids_behaviour,
            InsufficientValidsBehaviour::Error
        );
        assert!(matches!(config.prompt, PromptSource::Inline(_)));
    }

    #[test]
    fn reads_fallback_models_and_template_path() {
        let yaml = r#"
exp_dir: exp
seed: 3
swap: true
language_model:
  model: [primary, backup]
  n: 2
  insufficient_valids_behaviour: pad_invalids
prompt: prompts/ab.yaml
provider:
  base_url: http://localhost:8000/v1
  rate_limit_fraction: 0.5
  pricing:
    primary: { prompt_per_1k: 0.01, completion_per_1k: 0.03 }
dataset:
  source: data.csv
  num_items: 10
"#;
        let config = RunConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.language_model.model,
            ModelIds::from(vec!["primary".to_string(), "backup".to_string()])
        );
        assert_eq!(config.dataset.num_items, Some(10));
        assert!(matches!(&config.prompt, PromptSource::Path(p) if p == Path::new("prompts/ab.yaml")));
        assert_eq!(config.provider.pricing["primary"].completion_per_1k, 0.03);
    }

    #[test]
    fn rejects_invalid_model_params() {
        let yaml = MINIMAL.replace("model: gpt-4o-mini", "model: gpt-4o-mini\n  temperature: 3.5");
        assert!(RunConfig::from_yaml_str(&yaml).is_err());
    }
}
