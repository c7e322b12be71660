//! Percentile bootstrap for means and for differences of means.

use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::BenchConfig;

/// Mean with its bootstrap confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Two-sample comparison of mean scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceTest {
    /// Difference of the sample means (first minus second).
    pub observed_diff: f64,
    /// Mean of the resampled differences.
    pub mean_diff: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Whether the interval excludes zero.
    pub significant: bool,
    /// Share of resampled differences on the other side of zero.
    pub p_value: f64,
}

impl SignificanceTest {
    fn degenerate() -> Self {
        Self {
            observed_diff: 0.0,
            mean_diff: 0.0,
            ci_lower: 0.0,
            ci_upper: 0.0,
            significant: false,
            p_value: 1.0,
        }
    }
}

/// Bootstrap settings. With a seed, results are reproducible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bootstrap {
    iterations: usize,
    confidence_level: f64,
    seed: Option<u64>,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self {
            iterations: 1000,
            confidence_level: 0.95,
            seed: None,
        }
    }
}

impl Bootstrap {
    pub fn new(iterations: usize, confidence_level: f64) -> Self {
        Self {
            iterations: iterations.max(1),
            confidence_level: confidence_level.clamp(f64::EPSILON, 1.0 - f64::EPSILON),
            seed: None,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        let bootstrap = Self::new(config.bootstrap_iterations, config.confidence_level);
        match config.seed {
            Some(seed) => bootstrap.with_seed(seed),
            None => bootstrap,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    fn create_rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }

    /// Percentile bounds `(alpha/2, 1 - alpha/2)` of a sorted distribution.
    fn bounds(&self, mut distribution: Vec<f64>) -> (f64, f64) {
        distribution.sort_by(|a, b| a.total_cmp(b));
        let alpha = 1.0 - self.confidence_level;
        (
            percentile(&distribution, alpha / 2.0),
            percentile(&distribution, 1.0 - alpha / 2.0),
        )
    }

    /// Mean of `scores` and the percentile interval of resampled means.
    ///
    /// Empty input yields `(0, 0, 0)`.
    pub fn interval(&self, scores: &[f64]) -> ConfidenceInterval {
        if scores.is_empty() {
            return ConfidenceInterval::default();
        }

        let mut rng = self.create_rng();
        let means: Vec<f64> = (0..self.iterations)
            .map(|_| resample_mean(scores, &mut rng))
            .collect();
        let (lower, upper) = self.bounds(means);

        ConfidenceInterval {
            mean: mean(scores),
            lower,
            upper,
        }
    }

    /// Bootstraps the difference of means between `first` and `second`.
    ///
    /// Either side empty yields a non-significant result with `p = 1`.
    pub fn compare(&self, first: &[f64], second: &[f64]) -> SignificanceTest {
        if first.is_empty() || second.is_empty() {
            return SignificanceTest::degenerate();
        }

        let mut rng = self.create_rng();
        let differences: Vec<f64> = (0..self.iterations)
            .map(|_| resample_mean(first, &mut rng) - resample_mean(second, &mut rng))
            .collect();

        let mean_diff = mean(&differences);
        let crossing = if mean_diff > 0.0 {
            differences.iter().filter(|d| **d <= 0.0).count()
        } else {
            differences.iter().filter(|d| **d >= 0.0).count()
        };
        let p_value = crossing as f64 / differences.len() as f64;

        let (ci_lower, ci_upper) = self.bounds(differences);
        SignificanceTest {
            observed_diff: mean(first) - mean(second),
            mean_diff,
            ci_lower,
            ci_upper,
            significant: !(ci_lower <= 0.0 && 0.0 <= ci_upper),
            p_value,
        }
    }
}

/// `(mean, ci_lower, ci_upper)` of `scores` with a fresh unseeded bootstrap.
pub fn bootstrap(scores: &[f64], confidence_level: f64, iterations: usize) -> (f64, f64, f64) {
    let ci = Bootstrap::new(iterations, confidence_level).interval(scores);
    (ci.mean, ci.lower, ci.upper)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Linear-interpolation percentile of an ascending slice, `q` in `[0, 1]`.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = position.floor() as usize;
            let hi = position.ceil() as usize;
            let weight = position - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * weight
        }
    }
}

fn resample_mean(values: &[f64], rng: &mut ChaCha8Rng) -> f64 {
    let n = values.len();
    let total: f64 = (0..n).map(|_| values[rng.random_range(0..n)]).sum();
    total / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scores_are_degenerate() {
        let ci = Bootstrap::default().interval(&[]);
        assert_eq!(ci, ConfidenceInterval::default());
        assert_eq!(bootstrap(&[], 0.95, 1000), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_single_score_interval_collapses() {
        let ci = Bootstrap::default().with_seed(7).interval(&[0.8]);
        assert_eq!(ci.mean, 0.8);
        assert_eq!(ci.lower, 0.8);
        assert_eq!(ci.upper, 0.8);
    }

    #[test]
    fn test_seed_makes_interval_reproducible() {
        let scores = [0.1, 0.9, 0.4, 0.7, 0.3];
        let a = Bootstrap::default().with_seed(42).interval(&scores);
        let b = Bootstrap::default().with_seed(42).interval(&scores);
        assert_eq!(a, b);
    }

    #[test]
    fn test_interval_contains_sample_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        for case in 0..200u64 {
            let n = rng.random_range(1..40);
            let scores: Vec<f64> = (0..n).map(|_| rng.random_range(0.0..1.0)).collect();
            let ci = Bootstrap::new(500, 0.95).with_seed(case).interval(&scores);
            assert!(
                ci.lower <= ci.mean + 1e-12 && ci.mean <= ci.upper + 1e-12,
                "case {}: {:?}",
                case,
                ci
            );
        }
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 1.0), 4.0);
        assert!((percentile(&sorted, 0.5) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_std_dev_is_population() {
        assert_eq!(std_dev(&[1.0, 1.0, 1.0]), 0.0);
        assert!((std_dev(&[0.0, 1.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_compare_detects_clear_difference() {
        let strong = vec![1.0; 30];
        let weak = vec![0.0; 30];
        let test = Bootstrap::default().with_seed(1).compare(&strong, &weak);
        assert!(test.significant);
        assert_eq!(test.observed_diff, 1.0);
        assert_eq!(test.p_value, 0.0);
        assert!(test.ci_lower > 0.0);
    }

    #[test]
    fn test_compare_identical_samples_not_significant() {
        let scores = [0.2, 0.8, 0.5, 0.6, 0.4, 0.9, 0.1];
        let test = Bootstrap::default().with_seed(3).compare(&scores, &scores);
        assert!(!test.significant);
        assert!(test.p_value > 0.05);
    }

    #[test]
    fn test_compare_empty_side() {
        let test = Bootstrap::default().compare(&[], &[1.0]);
        assert!(!test.significant);
        assert_eq!(test.p_value, 1.0);
    }
}
