//! `entity-extraction` CLI entry point.
//!
//! Provides `run` (one JSON record), `batch` (JSON Lines, one envelope per
//! line) and `config` (print the effective configuration).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use entity_extraction::logging;
use entity_extraction::pipeline::input::UNKNOWN_ID;
use entity_extraction::pipeline::VALIDATOR_COMPONENT;
use entity_extraction::{ExtractionOutput, Pipeline, PipelineConfig};

/// Multi-engine entity extraction for normalized message bodies.
#[derive(Parser)]
#[command(name = "entity-extraction", version, about)]
struct Cli {
    /// Config file (TOML). Defaults to `$NER_CONFIG_PATH`, then
    /// `~/.entity-extraction/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pattern rule lexicon (JSON or TOML) replacing the built-in rules.
    #[arg(long, global = true)]
    patterns: Option<PathBuf>,

    /// Gazetteer (JSON or TOML).
    #[arg(long, global = true)]
    gazetteer: Option<PathBuf>,

    /// Pretty-print the envelope (`run` only).
    #[arg(long, global = true)]
    pretty: bool,

    /// Also write JSON logs to this directory, rotated daily.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Process one JSON record and print its envelope.
    Run {
        /// Input file, or `-` for stdin.
        #[arg(long, short, default_value = "-")]
        input: String,
    },
    /// Process a JSON Lines file, printing one envelope per line.
    Batch {
        /// Input file with one JSON record per line.
        #[arg(long, short)]
        input: PathBuf,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A local .env may carry NER_* overrides.
    let _ = dotenvy::dotenv();

    let _logging_guard = match &cli.log_dir {
        Some(dir) => Some(logging::init_production(dir)?),
        None => {
            logging::init_cli("warn");
            None
        }
    };

    let config =
        PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match &cli.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Run { input } => {
            let pipeline = build_pipeline(&cli, config)?;
            handle_run(&pipeline, input, cli.pretty).await
        }
        Command::Batch { input } => {
            let pipeline = build_pipeline(&cli, config)?;
            handle_batch(&pipeline, input).await
        }
    }
}

fn build_pipeline(cli: &Cli, config: PipelineConfig) -> anyhow::Result<Pipeline> {
    let mut builder = Pipeline::builder().config(config);
    if let Some(path) = &cli.patterns {
        builder = builder
            .patterns_file(path)
            .with_context(|| format!("failed to load patterns from {}", path.display()))?;
    }
    if let Some(path) = &cli.gazetteer {
        builder = builder
            .gazetteer_file(path)
            .with_context(|| format!("failed to load gazetteer from {}", path.display()))?;
    }
    builder.build().context("failed to build pipeline")
}

/// Process one record from a file or stdin.
async fn handle_run(pipeline: &Pipeline, input: &str, pretty: bool) -> anyhow::Result<()> {
    let contents = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))?
    };

    let out = process_line(pipeline, &contents).await;
    println!("{}", out.to_json(pretty));
    Ok(())
}

/// Process every non-blank line of a JSON Lines file, in order.
async fn handle_batch(pipeline: &Pipeline, input: &Path) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let mut processed: usize = 0;
    let mut failed: usize = 0;
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let out = process_line(pipeline, line).await;
        if !out.is_ok() {
            failed = failed.saturating_add(1);
        }
        processed = processed.saturating_add(1);
        println!("{}", out.to_json(false));
    }
    info!(processed, failed, input = %input.display(), "batch finished");
    Ok(())
}

/// Parse and run one record; unparseable JSON yields a failed envelope.
async fn process_line(pipeline: &Pipeline, line: &str) -> ExtractionOutput {
    match serde_json::from_str::<Value>(line) {
        Ok(raw) => pipeline.run(raw).await,
        Err(e) => {
            warn!(error = %e, "input is not valid JSON");
            let mut out = ExtractionOutput::new(UNKNOWN_ID, UNKNOWN_ID, pipeline.config());
            out.add_error(VALIDATOR_COMPONENT, format!("invalid JSON: {e}"));
            out.set_failed("input validation failed with 1 error(s)");
            out
        }
    }
}
