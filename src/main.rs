use anyhow::{Context, Result};
use clap::Parser;
use mod_translator::config::Config;
use mod_translator::pipeline::ArchiveOutcome;
use mod_translator::progress::TracingSink;
use mod_translator::{CancelFlag, GeminiTranslator, KeyPolicy, Pipeline, PipelineOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Translate the en_us.json bundled in Minecraft mod jars into Korean
#[derive(Parser, Debug)]
#[command(name = "mod-translator", version, about)]
struct Cli {
    /// Folder containing the mod archives to translate
    #[arg(short, long, env = "MOD_INPUT_DIR")]
    input: PathBuf,

    /// Folder receiving the translated archives
    #[arg(short, long, env = "MOD_OUTPUT_DIR", default_value = "translated")]
    output: PathBuf,

    /// Gemini API key (falls back to GEMINI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Gemini model name
    #[arg(long)]
    model: Option<String>,

    /// How to handle translated key sets that differ from the source: strict | best-effort
    #[arg(long)]
    key_policy: Option<KeyPolicy>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Working directory for extracted archives
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.api_key {
            Some(key) => Config::from_env_with_api_key(key.clone())?,
            None => Config::from_env().context("Pass --api-key or set GEMINI_API_KEY")?,
        };

        if let Some(model) = &self.model {
            config.gemini_model = model.clone();
        }
        if let Some(policy) = self.key_policy {
            config.key_policy = policy;
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir = dir.clone();
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mod_translator=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    info!(
        "Translating {} -> {} with {} (key policy: {})",
        cli.input.display(),
        cli.output.display(),
        config.gemini_model,
        config.key_policy
    );

    let translator = GeminiTranslator::from_config(&config)?;
    let pipeline = Pipeline::new(Arc::new(translator), PipelineOptions::from(&config));

    let cancel = CancelFlag::new();
    let ctrl_c_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current archive");
            ctrl_c_flag.cancel();
        }
    });

    let summary = pipeline
        .run(&cli.input, &cli.output, &TracingSink, &cancel)
        .await
        .context("Batch run could not start")?;

    for report in &summary.reports {
        if let ArchiveOutcome::Failed { stage, error } = &report.outcome {
            error!("✗ {} (after {}): {}", report.archive, stage, error);
        }
    }

    if summary.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
