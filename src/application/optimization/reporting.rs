//! Reporting utilities for optimization and backtest results.
//!
//! Provides formatted console output and JSON export capabilities.

use crate::application::optimization::ensemble_weights::WeightReport;
use crate::application::validation::CrossValidationReport;
use crate::domain::optimization::search_space::{SearchSpace, param_set_key};
use crate::domain::optimization::trial::OptimizationResult;
use crate::domain::performance::backtest_summary::BacktestSummary;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Reporter for console tables and JSON artifacts.
pub struct OptimizeReporter {
    output_dir: String,
}

impl OptimizeReporter {
    pub fn new(output_dir: &str) -> Self {
        Self {
            output_dir: output_dir.to_string(),
        }
    }

    pub fn print_space_info(&self, space: &SearchSpace) {
        println!("\n📊 Search Space:");
        for (name, candidates) in space.iter() {
            let values: Vec<String> = candidates.iter().map(|c| c.to_string()).collect();
            println!("  {:<20} [{}]", name, values.join(", "));
        }
        println!("\n🔢 Distinct configurations: {}", space.cardinality());
    }

    /// Prints the `top_n` best successful trials.
    pub fn print_results_table(&self, result: &OptimizationResult, top_n: usize) {
        println!("\n{}", "=".repeat(80));
        println!(
            "✅ SEARCH {:?} - {} trials, {}ms - Top {} Results",
            result.stop_reason,
            result.history.len(),
            result.elapsed_ms,
            top_n
        );
        println!("{}", "=".repeat(80));

        println!(
            "{:<4} | {:<5} | {:>8} | {:>8} | {:>8} | {:<36}",
            "#", "Iter", "HitRate", "F1", "Score", "Configuration"
        );
        println!("{}", "-".repeat(80));

        for (i, trial) in result.ranked().into_iter().take(top_n).enumerate() {
            let (hit_rate, f1) = trial
                .metrics
                .map(|m| (m.hit_rate, m.f1))
                .unwrap_or((0.0, 0.0));
            println!(
                "{:<4} | {:<5} | {:>8.3} | {:>8.3} | {:>8.4} | {:<36}",
                i + 1,
                trial.iteration,
                hit_rate,
                f1,
                trial.score,
                param_set_key(&trial.config)
            );
        }

        let failed = result.history.iter().filter(|t| !t.succeeded()).count();
        if failed > 0 {
            println!("{}", "-".repeat(80));
            println!("⚠️  {} trials failed", failed);
        }
        println!("{}\n", "=".repeat(80));
    }

    pub fn print_best_config(&self, result: &OptimizationResult) {
        let Some(best) = &result.best else {
            println!("❌ No successful trial");
            return;
        };
        println!("🏆 BEST CONFIGURATION ({}):", result.model_kind);
        for (name, value) in &best.config {
            println!("  {:<20} {}", name, value);
        }
        if let Some(m) = &best.metrics {
            println!("\n  Hit Rate:         {:.3}", m.hit_rate);
            println!("  Coverage:         {:.3}", m.coverage_rate);
            println!("  F1:               {:.3}", m.f1);
            println!("  Expected Value:   {:.3}", m.expected_value);
        }
        println!("  Composite:        {:.4}", best.score);
        println!("{}\n", "=".repeat(80));
    }

    pub fn print_weights(&self, report: &WeightReport) {
        println!("\n⚖️  Ensemble weights ({:?}):", report.strategy);
        for (model, weight) in report.weights.iter() {
            let score = report.scores.get(model).copied().unwrap_or(0.0);
            println!("  {:<20} {:>6.3}  (score {:.4})", model, weight, score);
        }
    }

    pub fn print_validation(&self, reports: &[CrossValidationReport]) {
        println!("\n{}", "=".repeat(80));
        println!("🧪 CROSS-VALIDATION");
        println!("{}", "=".repeat(80));
        println!(
            "{:<20} | {:>5} | {:>6} | {:>9} | {:>9} | {:>9} | {:>6}",
            "Model", "Folds", "Failed", "Composite", "Stability", "Slope", "Stable"
        );
        println!("{}", "-".repeat(80));
        for r in reports {
            println!(
                "{:<20} | {:>5} | {:>6} | {:>9.4} | {:>9.4} | {:>9.4} | {:>6}",
                r.model,
                r.valid_folds,
                r.failed_folds,
                r.mean_composite,
                r.stability_score,
                r.convergence_slope,
                if r.stable { "yes" } else { "no" }
            );
        }
        println!("{}\n", "=".repeat(80));
    }

    pub fn print_backtest_summary(&self, summary: &BacktestSummary) {
        println!("\n{}", "=".repeat(80));
        println!("📈 BACKTEST SUMMARY");
        println!("{}", "=".repeat(80));
        println!("  Trades:           {}", summary.total_trades);
        println!("  Hit Rate:         {:.3}", summary.hit_rate);
        println!("  Cumulative P/L:   {:.2}", summary.cumulative_profit);
        println!("  Max Drawdown:     {:.2}", summary.max_drawdown);
        println!("  Sharpe-like:      {:.3}", summary.sharpe_ratio);
        println!("  Win Rate:         {:.3}", summary.win_rate);
        if summary.skipped_steps > 0 {
            println!("  Skipped Steps:    {}", summary.skipped_steps);
        }
        println!("{}", "-".repeat(80));
        println!(
            "{:<20} | {:>7} | {:>8} | {:>10} | {:>8}",
            "Algorithm", "Trades", "HitRate", "Profit", "Sharpe"
        );
        for (name, stats) in &summary.per_algorithm {
            println!(
                "{:<20} | {:>7} | {:>8.3} | {:>10.2} | {:>8.3}",
                name, stats.trades, stats.hit_rate, stats.total_profit, stats.sharpe_ratio
            );
        }
        if let Some(best) = &summary.best_algorithm {
            println!("\n🏆 Best algorithm: {}", best);
        }
        println!("{}\n", "=".repeat(80));
    }

    /// Writes any serializable report as pretty JSON. Bare file names land in
    /// the output directory.
    pub fn export_json<T: Serialize + ?Sized>(&self, value: &T, filename: &str) -> Result<()> {
        let output_path = if filename.contains('/') || filename.contains('\\') {
            filename.to_string()
        } else {
            format!("{}/{}", self.output_dir, filename)
        };

        if let Some(parent) = Path::new(&output_path).parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {:?}", parent))?;
        }

        let json_output =
            serde_json::to_string_pretty(value).context("Failed to serialize report to JSON")?;

        std::fs::write(&output_path, json_output)
            .context(format!("Failed to write report to {}", output_path))?;

        println!("💾 Results saved to: {}", output_path);
        Ok(())
    }

    pub fn print_header(&self, title: &str, source: &str, events: usize, output: &str) {
        println!("{}", "=".repeat(80));
        println!("🔍 {}", title);
        println!("{}", "=".repeat(80));
        println!("History:      {}", source);
        println!("Events:       {}", events);
        println!("Output:       {}", output);
        println!("{}", "=".repeat(80));
    }
}

impl Default for OptimizeReporter {
    fn default() -> Self {
        Self::new(".")
    }
}
