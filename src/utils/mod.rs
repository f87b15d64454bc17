//! This module contains various utility functions and helper macros used
//! throughout the acmr crate.
//!
//! Key functionalities include:
//!
//! - Statistical functions, such as Pearson correlation, the Mann-Whitney U
//!   test and the Kolmogorov-Smirnov probability series.
//! - Robust summaries (median, MAD) shared by the penalty estimation and the
//!   residual tests.
//! - Macros for common struct operations (e.g., getter functions, builder-style
//!   `with_*` methods).
//! - The global thread pool used for data-parallel work.

use log::warn;
use once_cell::sync::Lazy;
use rayon::{
    ThreadPool,
    ThreadPoolBuilder,
};

mod stats;
pub use stats::*;

/// Scale factor making the MAD a consistent estimator of the standard
/// deviation under normality.
pub const MAD_SCALE: f64 = 1.4826;

/// Relative threshold under which a noise variance estimate counts as zero.
const NOISE_VARIANCE_RTOL: f64 = 1e-12;

pub static THREAD_POOL: Lazy<ThreadPool> = Lazy::new(|| {
    let num_threads: Option<usize> = std::env::var("ACMR_NUM_THREADS")
        .ok()
        .and_then(|str| str.parse::<usize>().ok());
    ThreadPoolBuilder::new()
        .num_threads(num_threads.unwrap_or(0))
        .build()
        .expect("Failed to create thread pool")
});

pub fn n_threads() -> usize {
    THREAD_POOL.current_num_threads()
}

#[macro_export]
macro_rules! getter_fn {
    ($field_name: ident, $field_type: ty) => {
        pub fn $field_name(&self) -> &$field_type {
            &self.$field_name
        }
    };
}
pub use getter_fn;

#[macro_export]
macro_rules! with_field_fn {
    ($field_name: ident, $field_type: ty) => {
        paste::paste! {
            pub fn [<with_$field_name>](mut self, value: $field_type) -> Self {
            self.$field_name = value;
            self
            }
        }
    };
}

/// Median of a slice. Returns `NaN` for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
    else {
        sorted[mid]
    }
}

/// Median absolute deviation (unscaled).
pub fn mad(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations = values
        .iter()
        .map(|v| (v - center).abs())
        .collect::<Vec<_>>();
    median(&deviations)
}

/// Robust noise variance estimate from first differences.
///
/// For `y = signal + e` with a slowly varying signal, `diff(y) ≈ diff(e)`
/// has variance `2σ²`. Falls back to the sample variance of the scaled
/// differences, and finally to `1.0`, when the MAD collapses to zero.
pub fn diff_noise_variance(y: &[f64]) -> f64 {
    if y.len() < 3 {
        warn!(
            "Noise variance requested for a series of length {}, using 1.0",
            y.len()
        );
        return 1.0;
    }
    let diffs = y
        .windows(2)
        .map(|w| (w[1] - w[0]) / std::f64::consts::SQRT_2)
        .collect::<Vec<_>>();

    // variances below this are rounding noise on the scale of the differences
    let mean_sq = diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64;
    let zero_tol = NOISE_VARIANCE_RTOL * mean_sq.max(f64::MIN_POSITIVE);

    let sigma = MAD_SCALE * mad(&diffs);
    if sigma.is_finite() && sigma * sigma > zero_tol {
        return sigma * sigma;
    }

    let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let var = diffs
        .iter()
        .map(|d| (d - mean).powi(2))
        .sum::<f64>()
        / (diffs.len() - 1) as f64;
    if var.is_finite() && var > zero_tol {
        var
    }
    else {
        warn!("Noise variance estimate degenerated to zero, using 1.0");
        1.0
    }
}
