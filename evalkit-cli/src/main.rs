//! `evalkit` - run a dataset evaluation from a YAML configuration.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use evalkit_cache::{FileCache, ResponseCache};
use evalkit_core::{contains_marker, Inference, RetryPolicy};
use evalkit_llm::{InferenceApi, OpenAiCompatibleBackend};
use evalkit_runner::{
    ab_prompt_builder, dataset_path, materialize_dataset, run_dataset_until_complete,
    BatchOptions, CsvRowStore, DatasetRunner,
};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use crate::config::RunConfig;

#[derive(Parser)]
#[command(name = "evalkit")]
#[command(about = "Resumable, cache-aware LLM dataset evaluation", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run (or resume) an evaluation until every row is complete
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the YAML run configuration
    #[arg(short, long, env = "EVALKIT_CONFIG")]
    config: PathBuf,
    /// Experiment directory holding the materialized dataset
    #[arg(long)]
    exp_dir: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    /// Swap the order of the two candidate answers
    #[arg(long)]
    swap: Option<bool>,
    /// Only dispatch and judge the first N rows
    #[arg(long)]
    limit: Option<usize>,
    /// Re-materialize the dataset, discarding progress
    #[arg(long)]
    reset: bool,
    #[arg(long, env = "EVALKIT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
    #[arg(long)]
    prompt_history_dir: Option<PathBuf>,
    #[arg(long)]
    max_attempts: Option<usize>,
    /// Maximum rows in flight at once
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long)]
    print_prompt_and_response: bool,
}

impl RunArgs {
    fn apply(self, config: &mut RunConfig) {
        if let Some(exp_dir) = self.exp_dir {
            config.exp_dir = exp_dir;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(swap) = self.swap {
            config.swap = swap;
        }
        if self.limit.is_some() {
            config.limit = self.limit;
        }
        config.reset |= self.reset;
        if self.cache_dir.is_some() {
            config.cache_dir = self.cache_dir;
        }
        if self.prompt_history_dir.is_some() {
            config.prompt_history_dir = self.prompt_history_dir;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if self.concurrency.is_some() {
            config.concurrency = self.concurrency;
        }
        config.print_prompt_and_response |= self.print_prompt_and_response;
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config_path = args.config.clone();
            let mut config = RunConfig::from_path(&config_path)?;
            args.apply(&mut config);
            config.validate()?;
            init_logging(&config.logging);

            let base = config_path.parent().unwrap_or_else(|| Path::new("."));
            let complete = run(config, base).await?;
            Ok(if complete {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

async fn run(config: RunConfig, base: &Path) -> anyhow::Result<bool> {
    let path = dataset_path(&config.exp_dir, config.seed, config.swap);
    if config.reset || !path.exists() {
        materialize_dataset(&config.dataset.source, &path, config.seed, config.dataset.num_items)
            .await
            .with_context(|| format!("failed to materialize {}", path.display()))?;
    } else {
        tracing::info!(path = %path.display(), "resuming from existing dataset");
    }

    let mut builder = OpenAiCompatibleBackend::builder()
        .pricing_table(config.provider.pricing.clone())
        .timeout(Duration::from_secs(config.provider.timeout_secs));
    if let Some(base_url) = &config.provider.base_url {
        builder = builder.base_url(base_url.as_str());
    }
    match std::env::var(&config.provider.api_key_env) {
        Ok(key) => builder = builder.api_key(SecretString::new(key)),
        Err(_) => tracing::warn!(
            env = %config.provider.api_key_env,
            "no API key set, sending unauthenticated requests"
        ),
    }
    let inference = Arc::new(
        InferenceApi::new(builder.build()?)
            .with_rate_limit(config.provider.max_in_flight, config.provider.rate_limit_fraction)
            .with_prompt_history_dir(config.prompt_history_dir.clone()),
    );

    let cache = FileCache::from_optional_dir(config.cache_dir.clone())
        .map(|cache| Arc::new(cache) as Arc<dyn ResponseCache>);
    let template = config.prompt_template(base)?;
    let runner = DatasetRunner::new(
        ab_prompt_builder(template, config.swap),
        config.language_model.clone(),
        Arc::clone(&inference) as Arc<dyn Inference>,
    )?
    .with_validity(contains_marker(config.answer_marker.as_str()))
    .with_cache(cache)
    .with_print_prompt_and_response(config.print_prompt_and_response);

    let store = CsvRowStore::new(&path);
    let options = BatchOptions {
        concurrency: config.concurrency,
        limit: config.limit,
    };
    let complete = run_dataset_until_complete(
        &store,
        &runner,
        &options,
        &RetryPolicy::new(config.max_attempts),
    )
    .await?;

    inference.log_model_timings();
    println!("Total cost: ${:.3}", inference.running_cost());
    if complete {
        println!("All rows complete: {}", path.display());
    } else {
        eprintln!(
            "Rows still incomplete after {} attempts: {}",
            config.max_attempts,
            path.display()
        );
    }
    Ok(complete)
}
