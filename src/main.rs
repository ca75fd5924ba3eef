//! world-events CLI: build a pipeline from configuration and run one unit of work.
//!
//! Usage:
//!   world-events date 2024-05-01
//!   world-events range 2024-05-01 2024-05-07
//!   world-events topic "climate summit" ["second topic" ...]
//!   world-events maintain rescore|reenrich|bias

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use world_events::config::{GenerativeConfig, PipelineConfig};
use world_events::logging::init_tracing;
use world_events::metrics::Metrics;
use world_events::store::JsonDirStore;
use world_events::{MaintenanceMode, Pipeline, UnitOfWork};

#[derive(Parser)]
#[command(
    name = "world-events",
    version,
    about = "Collect, group, score, enrich and store world events"
)]
struct Cli {
    /// Pipeline config (TOML); defaults to $PIPELINE_CONFIG_PATH or config/pipeline.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory of the JSON document store (overrides the config)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,
    /// Print Prometheus metrics after the run
    #[arg(long, global = true)]
    metrics: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect events for one calendar date (YYYY-MM-DD)
    Date { date: NaiveDate },
    /// Sweep an inclusive date range
    Range { start: NaiveDate, end: NaiveDate },
    /// Collect events for one or more free-text topics
    Topic {
        #[arg(required = true)]
        topics: Vec<String>,
    },
    /// Maintenance pass over stored records
    Maintain {
        #[arg(value_enum)]
        mode: MaintainArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MaintainArg {
    Rescore,
    Reenrich,
    Bias,
}

impl Command {
    fn unit(self) -> UnitOfWork {
        match self {
            Command::Date { date } => UnitOfWork::Date(date),
            Command::Range { start, end } => UnitOfWork::DateRange { start, end },
            Command::Topic { mut topics } => {
                if topics.len() == 1 {
                    UnitOfWork::Topic(topics.remove(0))
                } else {
                    UnitOfWork::Topics(topics)
                }
            }
            Command::Maintain { mode } => UnitOfWork::Maintenance(match mode {
                MaintainArg::Rescore => MaintenanceMode::Rescore,
                MaintainArg::Reenrich => MaintenanceMode::Reenrich,
                MaintainArg::Bias => MaintenanceMode::BiasAnalyze,
            }),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::load_from_path(path),
        None => PipelineConfig::load_default(),
    }
    .context("loading pipeline config")?;
    if let Some(dir) = cli.store_dir {
        cfg.store.dir = dir;
    }

    let ai = GenerativeConfig::load_default().unwrap_or_else(|e| {
        tracing::warn!(target: "pipeline", error = %e, "AI config unusable, enrichment uses heuristics");
        GenerativeConfig::default()
    });

    let metrics = if cli.metrics {
        Some(Metrics::init()?)
    } else {
        None
    };

    let store = Arc::new(JsonDirStore::new(cfg.store.dir.clone()));
    let pipeline = Pipeline::from_config(&cfg, &ai, store).context("building pipeline")?;

    let summary = pipeline.run(&cli.command.unit()).await;
    println!("{summary}");

    if let Some(m) = metrics {
        println!("\n{}", m.render());
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
