use serde::{Deserialize, Serialize};
use std::ops::Range;

const MAX_EVENTS_SCAN: usize = 100_000;

/// Walk-forward fold layout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldConfig {
    pub n_folds: usize,
    pub test_fraction: f64,
    pub min_train_size: usize,
    pub step_size: usize,
    pub purge_gap: usize,
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            test_fraction: 0.2,
            min_train_size: 50,
            step_size: 10,
            purge_gap: 5,
        }
    }
}

/// One (train, test) split of the event sequence.
///
/// `train` always starts at 0 and ends at least `purge_gap` events before
/// `test` starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

impl Fold {
    pub fn gap(&self) -> usize {
        self.test.start - self.train.end
    }
}

impl FoldConfig {
    /// Smallest history length that yields at least one fold, if any does.
    pub fn min_events(&self) -> Option<usize> {
        (1..=MAX_EVENTS_SCAN).find(|&n| !self.folds(n).is_empty())
    }

    /// Generates the folds that fit into `total` events.
    ///
    /// Folds that would need more data than available, or leave less than
    /// `min_train_size` training events, are skipped without error.
    pub fn folds(&self, total: usize) -> Vec<Fold> {
        let test_len = (total as f64 * self.test_fraction.clamp(0.0, 1.0)).floor() as usize;
        let mut folds = Vec::new();
        if test_len == 0 {
            return folds;
        }

        for i in 0..self.n_folds {
            // Offsets only grow with `i`; once one overflows, so do the rest.
            let Some((test_start, test_end)) = i
                .checked_mul(self.step_size)
                .and_then(|offset| self.min_train_size.checked_add(offset))
                .and_then(|start| start.checked_add(test_len).map(|end| (start, end)))
            else {
                break;
            };
            let Some(train_end) = test_start.checked_sub(self.purge_gap) else {
                continue;
            };
            if train_end < self.min_train_size || test_end > total {
                continue;
            }
            folds.push(Fold {
                index: i,
                train: 0..train_end,
                test: test_start..test_end,
            });
        }
        folds
    }
}
