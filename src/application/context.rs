//! Per-engine execution context: the single seedable RNG, cooperative
//! cancellation and the wall-clock budget of long-running loops.

use crate::domain::errors::EngineError;
use crate::infrastructure::observability::EngineMetrics;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared stop flag; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clears a previous cancellation so the engine can be reused.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Start time and optional budget of one operation.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started: Instant,
    budget: Option<Duration>,
}

impl RunClock {
    pub fn start(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn is_expired(&self) -> bool {
        self.budget
            .is_some_and(|budget| self.started.elapsed() >= budget)
    }

    pub fn budget_ms(&self) -> u64 {
        self.budget.map(|b| b.as_millis() as u64).unwrap_or(0)
    }
}

pub struct EngineContext {
    rng: Mutex<StdRng>,
    seed: u64,
    cancel: CancellationToken,
    time_budget: Option<Duration>,
    metrics: Option<EngineMetrics>,
}

impl EngineContext {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            seed,
            cancel: CancellationToken::new(),
            time_budget: None,
            metrics: None,
        }
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn with_metrics(mut self, metrics: EngineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn metrics(&self) -> Option<&EngineMetrics> {
        self.metrics.as_ref()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Starts the clock of a new budgeted operation.
    pub fn clock(&self) -> RunClock {
        RunClock::start(self.time_budget)
    }

    /// Cooperative stop point, called once per outer iteration.
    pub fn checkpoint(&self, clock: &RunClock) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if clock.is_expired() {
            return Err(EngineError::DeadlineExceeded {
                budget_ms: clock.budget_ms(),
            });
        }
        Ok(())
    }

    /// Runs `f` with exclusive access to the engine RNG.
    pub fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }

    /// Independent generator seeded from the engine RNG.
    pub fn fork_rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.with_rng(|rng| rng.random::<u64>()))
    }

    /// `n` seeds drawn in sequence, for work that runs in parallel.
    pub fn seeds(&self, n: usize) -> Vec<u64> {
        self.with_rng(|rng| (0..n).map(|_| rng.random::<u64>()).collect())
    }
}
