//! Optimizer Binary
//!
//! Hyperparameter search for the tree models and ensemble weight
//! optimization over a CSV draw history.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drawcast::application::engine::Engine;
use drawcast::application::optimization::OptimizeReporter;
use drawcast::config::{EngineConfig, RunConfig, WeightStrategy};
use drawcast::domain::events::History;
use drawcast::domain::optimization::search_space::SearchSpace;
use drawcast::infrastructure::history::{CsvHistoryProvider, SourceOrder};
use drawcast::infrastructure::observability::{EngineMetrics, init_tracing};
use drawcast::infrastructure::{RecencyFrequencyModel, open_store};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

const SEQUENCE_WINDOW: usize = 50;

#[derive(Parser)]
#[command(author, version, about = "Hyperparameter and ensemble weight optimizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search hyperparameters of one or more tree models
    Hyper {
        /// CSV history file
        #[arg(long)]
        history: String,

        #[arg(long)]
        newest_first: bool,

        /// TOML run configuration
        #[arg(long)]
        config: Option<String>,

        /// Comma-separated model names from the roster
        #[arg(short, long, default_value = "boosted")]
        models: String,

        /// TOML file with the search space (overrides the run configuration)
        #[arg(long)]
        space: Option<String>,

        /// Output JSON file (one file per model when several are given)
        #[arg(short, long, default_value = "optimization_results.json")]
        output: String,

        /// Number of top results to display
        #[arg(short, long, default_value = "10")]
        top_n: usize,
    },
    /// Derive ensemble weights from recent walk-forward predictions
    Weights {
        #[arg(long)]
        history: String,

        #[arg(long)]
        newest_first: bool,

        #[arg(long)]
        config: Option<String>,

        /// static, dynamic, adaptive or bayesian (defaults to the run configuration)
        #[arg(short, long)]
        strategy: Option<String>,

        #[arg(short, long, default_value = "ensemble_weights.json")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    let reporter = OptimizeReporter::default();

    match cli.command {
        Commands::Hyper {
            history,
            newest_first,
            config: run_path,
            models,
            space,
            output,
            top_n,
        } => {
            let mut run = load_run(run_path.as_deref())?;
            if let Some(space_file) = space {
                info!("Loading search space from: {}", space_file);
                run.search_space = load_space_from_toml(&space_file)?;
            } else {
                info!("Using configured search space");
            }
            let (engine, events) = open(&config, run, &history, newest_first).await?;

            reporter.print_header("HYPERPARAMETER SEARCH", &history, events.len(), &output);
            reporter.print_space_info(&engine.run_config().search_space);
            println!("{}\n", "=".repeat(80));

            let names: Vec<String> = models.split(',').map(|s| s.trim().to_string()).collect();
            let single = names.len() == 1;
            for name in names {
                println!("🚀 Starting optimization of {}...\n", name);
                match engine.optimize_hyperparameters(&events, &name).await {
                    Ok(result) => {
                        reporter.print_results_table(&result, top_n);
                        reporter.print_best_config(&result);
                        let filename = if single {
                            output.clone()
                        } else {
                            format!("{}_{}", name, output)
                        };
                        reporter.export_json(&result, &filename)?;
                    }
                    Err(e) => eprintln!("❌ Error optimizing {}: {}", name, e),
                }
            }
            println!("✅ Optimization complete!\n");
            write_metrics(&engine, &config)?;
        }
        Commands::Weights {
            history,
            newest_first,
            config: run_path,
            strategy,
            output,
        } => {
            let strategy = strategy
                .as_deref()
                .map(WeightStrategy::from_str)
                .transpose()?;
            let run = load_run(run_path.as_deref())?;
            let (engine, events) = open(&config, run, &history, newest_first).await?;
            reporter.print_header("ENSEMBLE WEIGHTS", &history, events.len(), &output);

            let restored = engine.restore().await?;
            info!("Restored {} persisted models", restored.len());

            println!("🚀 Collecting walk-forward predictions...\n");
            let outputs = engine.collect_model_outputs(&events).await?;
            let report = engine
                .optimize_ensemble_weights(&events, &outputs, strategy)
                .await?;
            reporter.print_weights(&report);

            engine.persist().await?;
            reporter.export_json(&report, &output)?;
            println!("✅ Weight optimization complete!\n");
            write_metrics(&engine, &config)?;
        }
    }

    Ok(())
}

fn load_run(path: Option<&str>) -> Result<RunConfig> {
    match path {
        Some(path) => RunConfig::load(path),
        None => Ok(RunConfig::default()),
    }
}

async fn open(
    config: &EngineConfig,
    run: RunConfig,
    history: &str,
    newest_first: bool,
) -> Result<(Engine, History)> {
    let mut engine = Engine::new(config.clone(), run)?
        .with_sequence_model(Arc::new(RecencyFrequencyModel::new(
            config.engine.domain_size,
            SEQUENCE_WINDOW,
        )))
        .with_store(open_store(&config.engine).await?);
    if config.observability.metrics_enabled {
        engine = engine.with_metrics(EngineMetrics::new()?);
    }

    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let order = if newest_first {
        SourceOrder::NewestFirst
    } else {
        SourceOrder::OldestFirst
    };
    let events = engine
        .load_history(&CsvHistoryProvider::new(history).with_order(order))
        .await
        .context(format!("Failed to load history from {}", history))?;
    Ok((engine, events))
}

/// Loads a search space from a TOML file of `name = [candidates]` entries.
fn load_space_from_toml(path: &str) -> Result<SearchSpace> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read search space file: {}", path))?;
    let space: SearchSpace = toml::from_str(&content)
        .context(format!("Failed to parse search space TOML: {}", path))?;
    space.validate()?;
    Ok(space)
}

fn write_metrics(engine: &Engine, config: &EngineConfig) -> Result<()> {
    if let (Some(metrics), Some(path)) = (engine.metrics(), &config.observability.metrics_path) {
        std::fs::write(path, metrics.render())
            .context(format!("Failed to write metrics to {:?}", path))?;
    }
    Ok(())
}
