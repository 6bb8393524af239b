use serde::{Deserialize, Serialize};

/// Ordered list of feature names.
/// This order MUST match `FeatureVector` indices; persisted tree models
/// reference features by position.
pub const FEATURE_NAMES: &[&str] = &[
    "frequency",
    "gap",
    "momentum",
    "volatility",
    "trend",
    "day_of_week_sin",
    "month_sin",
    "quarter_sin",
    "co_occurrence",
    "interaction",
];

pub const FEATURE_COUNT: usize = 10;

pub const FREQUENCY: usize = 0;
pub const GAP: usize = 1;
pub const MOMENTUM: usize = 2;
pub const VOLATILITY: usize = 3;
pub const TREND: usize = 4;
pub const DAY_OF_WEEK_SIN: usize = 5;
pub const MONTH_SIN: usize = 6;
pub const QUARTER_SIN: usize = 7;
pub const CO_OCCURRENCE: usize = 8;
pub const INTERACTION: usize = 9;

/// Fixed-width feature vector for one entity over one look-back window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Named view, in registry order.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }
}

impl AsRef<[f64]> for FeatureVector {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

pub fn feature_name(index: usize) -> &'static str {
    FEATURE_NAMES.get(index).copied().unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_length() {
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
        let fv = FeatureVector::default();
        assert_eq!(fv.as_ref().len(), FEATURE_NAMES.len());
    }

    #[test]
    fn test_feature_consistency() {
        let mut values = [0.0; FEATURE_COUNT];
        values[FREQUENCY] = 0.7;
        values[INTERACTION] = 0.25;
        let fv = FeatureVector::new(values);

        assert_eq!(fv.get(0), 0.7);
        assert_eq!(fv.get(9), 0.25);
        assert_eq!(feature_name(INTERACTION), "interaction");
        let named: Vec<_> = fv.named().collect();
        assert_eq!(named[0], ("frequency", 0.7));
    }
}
