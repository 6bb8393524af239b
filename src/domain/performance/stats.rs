use statrs::statistics::Statistics;

/// Shared statistics helpers.
///
/// All functions return 0.0 for empty or degenerate input instead of NaN.
pub struct Stats;

impl Stats {
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        finite_or_zero(values.iter().mean())
    }

    /// Population variance.
    pub fn variance(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        finite_or_zero(values.iter().population_variance()).max(0.0)
    }

    /// Population standard deviation.
    pub fn std_dev(values: &[f64]) -> f64 {
        Self::variance(values).sqrt()
    }

    /// std / |mean|; 0 when the mean is (near) zero.
    pub fn coefficient_of_variation(values: &[f64]) -> f64 {
        let mean = Self::mean(values);
        if mean.abs() < 1e-12 {
            return 0.0;
        }
        Self::std_dev(values) / mean.abs()
    }

    /// Least-squares slope of `values` against their index.
    pub fn slope(values: &[f64]) -> f64 {
        let n = values.len();
        if n < 2 {
            return 0.0;
        }
        let mean_x = (n - 1) as f64 / 2.0;
        let mean_y = Self::mean(values);
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, y) in values.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (y - mean_y);
            den += dx * dx;
        }
        if den > 0.0 { num / den } else { 0.0 }
    }

    /// Largest peak-to-trough decline of a cumulative series, starting from a
    /// peak of 0.
    pub fn max_drawdown(cumulative: &[f64]) -> f64 {
        let mut peak = 0.0_f64;
        let mut max_dd = 0.0_f64;
        for &value in cumulative {
            peak = peak.max(value);
            max_dd = max_dd.max(peak - value);
        }
        max_dd
    }

    /// mean / std of per-period values; 0 if std is 0.
    pub fn sharpe_like(values: &[f64]) -> f64 {
        let std = Self::std_dev(values);
        if std < 1e-12 {
            return 0.0;
        }
        Self::mean(values) / std
    }

    pub fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    /// Jaccard similarity of two id sets; 1.0 when both are empty.
    pub fn jaccard<T: PartialEq>(a: &[T], b: &[T]) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        let intersection = a.iter().filter(|x| b.contains(x)).count();
        let union = a.len() + b.len() - intersection;
        intersection as f64 / union as f64
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(Stats::mean(&[]), 0.0);
        assert_eq!(Stats::variance(&[3.0]), 0.0);
        assert_eq!(Stats::coefficient_of_variation(&[0.0, 0.0]), 0.0);
        assert_eq!(Stats::slope(&[1.0]), 0.0);
        assert_eq!(Stats::sharpe_like(&[1.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_variance_and_slope() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((Stats::variance(&values) - 1.25).abs() < 1e-12);
        assert!((Stats::slope(&values) - 1.0).abs() < 1e-12);
        assert!((Stats::slope(&[5.0, 5.0, 5.0])).abs() < 1e-12);
    }

    #[test]
    fn test_max_drawdown() {
        assert_eq!(Stats::max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
        let dd = Stats::max_drawdown(&[1.0, 3.0, 0.5, 2.0, -1.0]);
        assert!((dd - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(Stats::jaccard(&[1, 2, 3], &[1, 2, 3]), 1.0);
        assert_eq!(Stats::jaccard(&[1, 2], &[3, 4]), 0.0);
        assert!((Stats::jaccard(&[1, 2, 3], &[2, 3, 4]) - 0.5).abs() < 1e-12);
    }
}
