//! drawcast CLI
//!
//! Loads a CSV draw history, runs one engine operation over it and writes the
//! result as JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use drawcast::application::engine::Engine;
use drawcast::application::optimization::OptimizeReporter;
use drawcast::config::{EngineConfig, RunConfig};
use drawcast::domain::events::History;
use drawcast::infrastructure::history::{CsvHistoryProvider, SourceOrder};
use drawcast::infrastructure::observability::{EngineMetrics, init_tracing};
use drawcast::infrastructure::{RecencyFrequencyModel, open_store};
use std::sync::Arc;
use tracing::{info, warn};

/// Look-back of the bundled recency-frequency model.
const SEQUENCE_WINDOW: usize = 50;

#[derive(Parser)]
#[command(author, version, about = "Ensemble forecaster for draw histories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// CSV history file (`timestamp,n1,n2,...`)
    #[arg(long)]
    history: String,

    /// The file lists the most recent draw first
    #[arg(long)]
    newest_first: bool,

    /// TOML run configuration (models, validation, weights, search, backtest)
    #[arg(long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export feature vectors of every entity over the latest window
    Features {
        #[command(flatten)]
        source: Source,

        /// Events in the look-back window
        #[arg(short, long, default_value = "50")]
        window: usize,

        #[arg(short, long, default_value = "features.json")]
        output: String,
    },
    /// Train every configured model and persist the artifacts
    Train {
        #[command(flatten)]
        source: Source,

        #[arg(short, long, default_value = "training.json")]
        output: String,
    },
    /// Predict the next draw, reusing persisted models when available
    Predict {
        #[command(flatten)]
        source: Source,

        /// Candidates to return (defaults to DRAWCAST_TOP_N)
        #[arg(short, long)]
        top_n: Option<usize>,

        #[arg(short, long, default_value = "prediction.json")]
        output: String,
    },
    /// Walk-forward cross-validation of one or all models
    Validate {
        #[command(flatten)]
        source: Source,

        /// Only validate this model
        #[arg(short, long)]
        model: Option<String>,

        #[arg(short, long, default_value = "validation.json")]
        output: String,
    },
    /// Walk-forward backtest of the whole roster
    Backtest {
        #[command(flatten)]
        source: Source,

        #[arg(short, long, default_value = "backtest.json")]
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
        Commands::Features {
            source,
            window,
            output,
        } => {
            let (engine, history) = open(&config, &source).await?;
            reporter.print_header("Feature extraction", &source.history, history.len(), &output);
            let rows = engine.extract_features_by_entity(&history, window);
            reporter.export_json(&rows, &output)?;
            finish(&engine, &config)?;
        }
        Commands::Train { source, output } => {
            let (engine, history) = open(&config, &source).await?;
            reporter.print_header("Training", &source.history, history.len(), &output);
            println!("🚀 Training {} models...\n", engine.run_config().models.len());

            let trained = engine.train_ensemble(&history).await?;
            for (name, metrics) in &trained {
                println!(
                    "  {:<20} {:>4} trees  {:>6} samples  accuracy {}",
                    name,
                    metrics.trees,
                    metrics.samples,
                    metrics
                        .training_accuracy
                        .map(|a| format!("{:.3}", a))
                        .unwrap_or_else(|| "-".to_string())
                );
            }
            let manifest = engine.persist().await?;
            info!("Persisted {} models", manifest.models.len());

            reporter.export_json(&trained, &output)?;
            println!("✅ Training complete!\n");
            finish(&engine, &config)?;
        }
        Commands::Predict {
            source,
            top_n,
            output,
        } => {
            let (engine, history) = open(&config, &source).await?;
            reporter.print_header("Prediction", &source.history, history.len(), &output);

            let restored = engine.restore().await?;
            for spec in &engine.run_config().models {
                if !restored.contains(&spec.name) {
                    info!("{}: no persisted artifact, training now", spec.name);
                    engine.train_model(&history, &spec.name).await?;
                }
            }

            let prediction = engine.predict(&history, top_n).await?;
            println!("🎯 Next draw candidates:");
            for (rank, c) in prediction.combined.iter().enumerate() {
                println!(
                    "  {:>2}. {:>4}  p={:.3}  conf={:.3}  unc={:.3}  [{}]",
                    rank + 1,
                    c.entity,
                    c.probability,
                    c.confidence,
                    c.uncertainty,
                    c.contributing_features.join(", ")
                );
            }
            reporter.export_json(&prediction, &output)?;
            finish(&engine, &config)?;
        }
        Commands::Validate {
            source,
            model,
            output,
        } => {
            let (engine, history) = open(&config, &source).await?;
            reporter.print_header("Cross-validation", &source.history, history.len(), &output);
            let reports = engine.cross_validate(&history, model.as_deref()).await?;
            reporter.print_validation(&reports);
            reporter.export_json(&reports, &output)?;
            finish(&engine, &config)?;
        }
        Commands::Backtest { source, output } => {
            let (engine, history) = open(&config, &source).await?;
            reporter.print_header("Backtest", &source.history, history.len(), &output);
            println!("🚀 Starting backtest...\n");
            let report = engine.run_backtest(&history).await?;
            reporter.print_backtest_summary(&report.summary);
            reporter.export_json(&report, &output)?;
            println!("✅ Backtest complete ({:?})!\n", report.stop_reason);
            finish(&engine, &config)?;
        }
    }

    Ok(())
}

/// Builds the engine for `source` and loads its history.
async fn open(config: &EngineConfig, source: &Source) -> Result<(Engine, History)> {
    let run = match &source.config {
        Some(path) => {
            info!("Loading run configuration from: {}", path);
            RunConfig::load(path)?
        }
        None => RunConfig::default(),
    };

    let store = open_store(&config.engine).await?;
    let mut engine = Engine::new(config.clone(), run)?
        .with_sequence_model(Arc::new(RecencyFrequencyModel::new(
            config.engine.domain_size,
            SEQUENCE_WINDOW,
        )))
        .with_store(store);
    if config.observability.metrics_enabled {
        engine = engine.with_metrics(EngineMetrics::new()?);
    }

    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            token.cancel();
        }
    });

    let order = if source.newest_first {
        SourceOrder::NewestFirst
    } else {
        SourceOrder::OldestFirst
    };
    let provider = CsvHistoryProvider::new(&source.history).with_order(order);
    let history = engine
        .load_history(&provider)
        .await
        .context(format!("Failed to load history from {}", source.history))?;
    Ok((engine, history))
}

fn finish(engine: &Engine, config: &EngineConfig) -> Result<()> {
    if let (Some(metrics), Some(path)) = (engine.metrics(), &config.observability.metrics_path) {
        std::fs::write(path, metrics.render())
            .context(format!("Failed to write metrics to {:?}", path))?;
        info!("Metrics written to {:?}", path);
    }
    Ok(())
}
