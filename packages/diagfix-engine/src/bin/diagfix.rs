//! diagfix command line
//!
//! ```text
//! diagfix run --include src --max-diagnostics 50
//! diagfix retrain
//! diagfix stats
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use diagfix_engine::config::{EngineConfig, Preset};
use diagfix_engine::context::EngineContext;
use diagfix_engine::metrics::MetricsService;
use diagfix_engine::prioritize::{PrioritizationOptions, PrioritizationStrategy, PriorityThresholds};
use diagfix_engine::runner::{BatchRunner, RunOptions};
use diagfix_engine::telemetry;
use diagfix_storage::{FixStore, InMemoryFixStore, SqliteFixStore};

#[derive(Parser, Debug)]
#[command(name = "diagfix", version, about = "Resolve type-checker diagnostics automatically")]
struct Cli {
    /// YAML configuration (schema v1)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root; overrides the configuration
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Preset used when no configuration file is given
    #[arg(long, global = true, value_parser = Preset::from_str)]
    preset: Option<Preset>,

    /// SQLite database for diagnostics, fixes and logs; in-memory when omitted
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect, prioritize and resolve diagnostics
    Run(RunArgs),
    /// Rebuild the predictor from its outcome log
    Retrain,
    /// Print success rates, trends and feedback weights
    Stats,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directories to scan, relative to the root
    #[arg(long = "include")]
    include: Vec<PathBuf>,

    #[arg(long = "exclude")]
    exclude: Vec<PathBuf>,

    #[arg(long)]
    max_diagnostics: Option<usize>,

    /// Report validated fixes as suggestions without keeping them
    #[arg(long)]
    no_auto_fix: bool,

    #[arg(long, default_value = "severity", value_parser = PrioritizationStrategy::from_str)]
    prioritize: PrioritizationStrategy,

    #[arg(long)]
    high_threshold: Option<f64>,

    #[arg(long)]
    medium_threshold: Option<f64>,

    /// Concurrent file groups
    #[arg(long)]
    concurrency: Option<usize>,

    /// Write the summary here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_yaml(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => EngineConfig::preset(cli.preset.unwrap_or_default()),
    };
    let config = match &cli.root {
        Some(root) => config.project_root(root),
        None => config,
    };
    Ok(config.build()?)
}

fn open_store(cli: &Cli) -> Result<Arc<dyn FixStore>> {
    Ok(match &cli.db {
        Some(path) => Arc::new(
            SqliteFixStore::new(path).with_context(|| format!("opening database {}", path.display()))?,
        ),
        None => Arc::new(InMemoryFixStore::new()),
    })
}

fn build_context(cli: &Cli, store: Arc<dyn FixStore>) -> Result<EngineContext> {
    let config = load_config(cli)?;
    info!(config = %config.describe(), "configuration loaded");
    Ok(EngineContext::builder(config).store(store).build()?)
}

async fn run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let store = open_store(cli)?;
    let metrics = MetricsService::from_store(store.as_ref()).await?;
    let config = load_config(cli)?;
    info!(config = %config.describe(), "configuration loaded");
    let ctx = EngineContext::builder(config).store(store).metrics(metrics).build()?;

    let defaults = PriorityThresholds::default();
    let thresholds = PriorityThresholds {
        high: args.high_threshold.unwrap_or(defaults.high),
        medium: args.medium_threshold.unwrap_or(defaults.medium),
    };
    thresholds.validate().map_err(anyhow::Error::msg)?;

    let options = RunOptions {
        include_dirs: args.include.clone(),
        exclude_dirs: args.exclude.clone(),
        max_diagnostics: args.max_diagnostics,
        auto_fix: !args.no_auto_fix,
        prioritization: PrioritizationOptions {
            strategy: args.prioritize,
            thresholds,
        },
        concurrency: args.concurrency,
    };

    let summary = BatchRunner::new(Arc::new(ctx)).run(options).await?;
    let json = serde_json::to_string_pretty(&summary)?;
    match &args.output {
        Some(path) => std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn retrain(cli: &Cli) -> Result<()> {
    let ctx = build_context(cli, open_store(cli)?)?;
    let report = ctx.predictor().retrain();
    ctx.flush().context("persisting predictor snapshot")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn stats(cli: &Cli) -> Result<()> {
    let store = open_store(cli)?;
    let metrics = MetricsService::from_store(store.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(telemetry::level_for(cli.verbose));

    match &cli.command {
        Command::Run(args) => run(&cli, args).await,
        Command::Retrain => retrain(&cli),
        Command::Stats => stats(&cli).await,
    }
}
