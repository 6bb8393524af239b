use crate::domain::events::EntityId;
use crate::domain::performance::stats::Stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One algorithm's prediction at one walk-forward step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub algorithm: String,
    pub predictions: Vec<EntityId>,
    pub actual_outcome: Vec<EntityId>,
    pub hits: usize,
    pub profit: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmStats {
    pub trades: usize,
    pub hits: usize,
    pub hit_rate: f64,
    pub total_profit: f64,
    pub win_rate: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStats {
    /// `YYYY-MM`
    pub month: String,
    pub trades: usize,
    pub hits: usize,
    pub hit_rate: f64,
    pub profit: f64,
}

/// Trailing window of steps ending at `step`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingWindowStats {
    pub step: usize,
    pub trades: usize,
    pub hit_rate: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub total_trades: usize,
    pub total_predictions: usize,
    pub total_hits: usize,
    pub hit_rate: f64,
    pub cumulative_profit: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub best_algorithm: Option<String>,
    pub per_algorithm: BTreeMap<String, AlgorithmStats>,
    pub monthly: Vec<MonthlyStats>,
    pub rolling: Vec<RollingWindowStats>,
    pub skipped_steps: usize,
}

impl BacktestSummary {
    /// Aggregates trades in the order they were executed.
    pub fn from_trades(trades: &[BacktestTrade], rolling_window: usize) -> Self {
        if trades.is_empty() {
            return Self::default();
        }

        let profits: Vec<f64> = trades.iter().map(|t| t.profit).collect();
        let total_hits: usize = trades.iter().map(|t| t.hits).sum();
        let total_predictions: usize = trades.iter().map(|t| t.predictions.len()).sum();

        let mut per_algorithm_trades: BTreeMap<String, Vec<&BacktestTrade>> = BTreeMap::new();
        let mut first_seen: Vec<String> = Vec::new();
        for trade in trades {
            if !per_algorithm_trades.contains_key(&trade.algorithm) {
                first_seen.push(trade.algorithm.clone());
            }
            per_algorithm_trades
                .entry(trade.algorithm.clone())
                .or_default()
                .push(trade);
        }

        let per_algorithm: BTreeMap<String, AlgorithmStats> = per_algorithm_trades
            .iter()
            .map(|(name, list)| (name.clone(), algorithm_stats(list)))
            .collect();

        // Ties go to the algorithm that traded first.
        let mut best_algorithm: Option<(String, f64)> = None;
        for name in &first_seen {
            let profit = per_algorithm[name].total_profit;
            if best_algorithm.as_ref().is_none_or(|(_, best)| profit > *best) {
                best_algorithm = Some((name.clone(), profit));
            }
        }

        Self {
            total_trades: trades.len(),
            total_predictions,
            total_hits,
            hit_rate: ratio(total_hits, total_predictions),
            cumulative_profit: profits.iter().sum(),
            max_drawdown: Stats::max_drawdown(&cumulative(&profits)),
            sharpe_ratio: Stats::sharpe_like(&profits),
            win_rate: ratio(profits.iter().filter(|&&p| p > 0.0).count(), trades.len()),
            best_algorithm: best_algorithm.map(|(name, _)| name),
            per_algorithm,
            monthly: monthly_stats(trades),
            rolling: rolling_stats(trades, rolling_window),
            skipped_steps: 0,
        }
    }
}

fn algorithm_stats(trades: &[&BacktestTrade]) -> AlgorithmStats {
    let profits: Vec<f64> = trades.iter().map(|t| t.profit).collect();
    let hits: usize = trades.iter().map(|t| t.hits).sum();
    let predictions: usize = trades.iter().map(|t| t.predictions.len()).sum();
    AlgorithmStats {
        trades: trades.len(),
        hits,
        hit_rate: ratio(hits, predictions),
        total_profit: profits.iter().sum(),
        win_rate: ratio(profits.iter().filter(|&&p| p > 0.0).count(), trades.len()),
        max_drawdown: Stats::max_drawdown(&cumulative(&profits)),
        sharpe_ratio: Stats::sharpe_like(&profits),
    }
}

fn monthly_stats(trades: &[BacktestTrade]) -> Vec<MonthlyStats> {
    let mut months: BTreeMap<String, (usize, usize, usize, f64)> = BTreeMap::new();
    for trade in trades {
        let entry = months
            .entry(trade.timestamp.format("%Y-%m").to_string())
            .or_default();
        entry.0 += 1;
        entry.1 += trade.hits;
        entry.2 += trade.predictions.len();
        entry.3 += trade.profit;
    }
    months
        .into_iter()
        .map(|(month, (trades, hits, predictions, profit))| MonthlyStats {
            month,
            trades,
            hits,
            hit_rate: ratio(hits, predictions),
            profit,
        })
        .collect()
}

/// One entry per distinct step, covering the trailing `window` steps.
fn rolling_stats(trades: &[BacktestTrade], window: usize) -> Vec<RollingWindowStats> {
    let mut steps: BTreeMap<usize, (usize, usize, usize, f64)> = BTreeMap::new();
    for trade in trades {
        let entry = steps.entry(trade.step).or_default();
        entry.0 += 1;
        entry.1 += trade.hits;
        entry.2 += trade.predictions.len();
        entry.3 += trade.profit;
    }
    let per_step: Vec<(usize, (usize, usize, usize, f64))> = steps.into_iter().collect();
    let window = window.max(1);

    (0..per_step.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &per_step[start..=i];
            let trades: usize = slice.iter().map(|(_, s)| s.0).sum();
            let hits: usize = slice.iter().map(|(_, s)| s.1).sum();
            let predictions: usize = slice.iter().map(|(_, s)| s.2).sum();
            let profit: f64 = slice.iter().map(|(_, s)| s.3).sum();
            RollingWindowStats {
                step: per_step[i].0,
                trades,
                hit_rate: ratio(hits, predictions),
                profit,
            }
        })
        .collect()
}

fn cumulative(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}
