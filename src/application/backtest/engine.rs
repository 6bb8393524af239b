use crate::application::context::EngineContext;
use crate::application::ml::{Model, ModelFactory, Predictable, Trainable};
use crate::application::optimization::{ModelOutputs, StepPrediction};
use crate::config::{BacktestConfig, NamedModelSpec};
use crate::domain::errors::EngineError;
use crate::domain::events::History;
use crate::domain::optimization::trial::StopReason;
use crate::domain::performance::backtest_summary::{BacktestSummary, BacktestTrade};
use crate::domain::performance::metrics::ProfitModel;
use crate::domain::prediction::top_entities;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub run_id: Uuid,
    pub summary: BacktestSummary,
    pub trades: Vec<BacktestTrade>,
    /// Full candidate lists per model, aligned to history indices.
    pub outputs: ModelOutputs,
    pub stop_reason: StopReason,
    pub elapsed_ms: u64,
}

pub struct BacktestEngine {
    config: BacktestConfig,
    top_n: usize,
    profit: ProfitModel,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, top_n: usize) -> Self {
        Self {
            config,
            top_n,
            profit: ProfitModel::default(),
        }
    }

    pub fn with_profit(mut self, profit: ProfitModel) -> Self {
        self.profit = profit;
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Walks forward from `min_training_size`, predicting every event from
    /// the events before it.
    ///
    /// Models are retrained on everything seen so far every
    /// `rebalance_frequency` steps. A model that fails to retrain or predict
    /// is skipped for that step. Cancellation or an exhausted budget returns
    /// the partial report.
    pub async fn run(
        &self,
        specs: &[NamedModelSpec],
        history: &History,
        factory: &ModelFactory,
        ctx: &EngineContext,
    ) -> Result<BacktestReport, EngineError> {
        let min = self.config.min_training_size;
        if history.len() < min + 1 {
            return Err(EngineError::InsufficientData {
                operation: "backtest",
                required: min + 1,
                available: history.len(),
            });
        }
        if self.config.rebalance_frequency == 0 {
            return Err(EngineError::invalid_config(
                "rebalance_frequency must be positive",
            ));
        }

        let mut models: Vec<Model> = specs
            .iter()
            .map(|spec| factory.build(spec))
            .collect::<Result<_, _>>()?;

        let clock = ctx.clock();
        let run_id = Uuid::new_v4();
        let mut trades = Vec::new();
        let mut outputs: ModelOutputs = specs.iter().map(|s| (s.name.clone(), Vec::new())).collect();
        let mut skipped_steps = 0usize;
        let mut stop_reason = StopReason::Completed;

        info!(
            "Backtest {}: {} models over steps {}..{}, retraining every {}",
            run_id,
            models.len(),
            min,
            history.len(),
            self.config.rebalance_frequency
        );

        for t in min..history.len() {
            if let Err(e) = ctx.checkpoint(&clock) {
                warn!("Backtest {} stopped at step {}: {}", run_id, t, e);
                stop_reason = match e {
                    EngineError::DeadlineExceeded { .. } => StopReason::DeadlineExceeded,
                    _ => StopReason::Cancelled,
                };
                break;
            }
            let seen = history.prefix(t);
            let Some(actual) = history.get(t) else {
                break;
            };

            if (t - min) % self.config.rebalance_frequency == 0 {
                debug!("Backtest {}: retraining on {} events", run_id, t);
                for model in models.iter_mut() {
                    match model.train(&seen, ctx, &clock).await {
                        Ok(_) => {}
                        Err(e) if e.is_interruption() => {
                            debug!("{}: retraining interrupted: {}", model.name(), e);
                        }
                        Err(e) => warn!("{}: retraining at step {} failed: {}", model.name(), t, e),
                    }
                }
            }

            for model in &models {
                match model.predict(&seen, self.top_n).await {
                    Ok(candidates) => {
                        let predictions = top_entities(&candidates, self.top_n);
                        let hits = predictions.iter().filter(|&&e| actual.contains(e)).count();
                        trades.push(BacktestTrade {
                            step: t,
                            timestamp: actual.timestamp,
                            algorithm: model.name().to_string(),
                            profit: self.profit.profit(hits, predictions.len()),
                            predictions,
                            actual_outcome: actual.outcome_set.clone(),
                            hits,
                        });
                        if let Some(steps) = outputs.get_mut(model.name()) {
                            steps.push(StepPrediction {
                                step: t,
                                candidates,
                            });
                        }
                        if let Some(m) = ctx.metrics() {
                            m.record_backtest_step(true);
                        }
                    }
                    Err(e) => {
                        warn!("{}: prediction at step {} skipped: {}", model.name(), t, e);
                        skipped_steps += 1;
                        if let Some(m) = ctx.metrics() {
                            m.record_backtest_step(false);
                        }
                    }
                }
            }
        }

        for model in models.iter_mut() {
            if let Err(e) = model.dispose().await {
                warn!("{}: dispose after backtest failed: {}", model.name(), e);
            }
        }

        let mut summary = BacktestSummary::from_trades(&trades, self.config.rolling_window);
        summary.skipped_steps = skipped_steps;
        info!(
            "Backtest {} finished ({:?}): {} trades, hit rate {:.3}, profit {:.2}",
            run_id, stop_reason, summary.total_trades, summary.hit_rate, summary.cumulative_profit
        );

        Ok(BacktestReport {
            run_id,
            summary,
            trades,
            outputs,
            stop_reason,
            elapsed_ms: clock.elapsed_ms(),
        })
    }
}
