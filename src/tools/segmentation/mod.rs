//! Adjacency-constrained monotonic segmentation.
//!
//! A series is partitioned into alternating non-decreasing and
//! non-increasing segments whose boundaries are local extrema of the
//! observations. Each segment is fitted with weighted isotonic regression
//! and the partition minimizing the total squared error (optionally plus a
//! per-segment penalty) is found by dynamic programming.
//!
//! ```
//! use acmr::prelude::*;
//!
//! let y = [0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0, 1.0, 2.0];
//! let decomposition = Segmenter::new(
//!     SegmentationConfig::default().with_stopping(Stopping::KnownSegments(3)),
//! )
//! .unwrap()
//! .fit(&y)
//! .unwrap();
//! assert_eq!(decomposition.breakpoints(), vec![3, 6]);
//! ```

mod costs;
mod dynp;

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{
    anyhow,
    bail,
    ensure,
    Result,
};
use log::{
    debug,
    info,
};
use serde::{
    Deserialize,
    Serialize,
};

use self::costs::CostTable;
use self::dynp::{
    optimal_partitioning,
    DynpSelection,
    DynpSweep,
};
use crate::data_structs::{
    Decomposition,
    Segment,
};
use crate::tools::extrema::ExtremaFinder;
use crate::tools::isotonic::{
    isotonic_unchecked,
    validate_inputs,
};
use crate::utils::diff_noise_variance;
use crate::with_field_fn;

/// Default upper bound for the cost table (1 GiB).
pub const DEFAULT_MEMORY_BUDGET: usize = 1 << 30;

/// Per-segment penalty for the penalized search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Penalty {
    Manual(f64),
    /// `2 σ² ln n` with σ² estimated from first differences.
    Bic,
    /// `4 σ²` with σ² estimated from first differences.
    Aic,
}

impl Penalty {
    /// Resolves the penalty to a value on the scale of the squared error.
    pub fn resolve(
        &self,
        y: &[f64],
    ) -> Result<f64> {
        let beta = match self {
            Penalty::Manual(value) => *value,
            Penalty::Bic => 2.0 * diff_noise_variance(y) * (y.len().max(2) as f64).ln(),
            Penalty::Aic => 4.0 * diff_noise_variance(y),
        };
        ensure!(
            beta.is_finite() && beta >= 0.0,
            "Resolved penalty must be finite and non-negative, got {}",
            beta
        );
        Ok(beta)
    }
}

impl Display for Penalty {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Penalty::Manual(v) => write!(f, "{}", v),
            Penalty::Bic => write!(f, "bic"),
            Penalty::Aic => write!(f, "aic"),
        }
    }
}

impl FromStr for Penalty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bic" => Ok(Penalty::Bic),
            "aic" => Ok(Penalty::Aic),
            other => {
                other
                    .parse::<f64>()
                    .map(Penalty::Manual)
                    .map_err(|_| anyhow!("Unknown penalty: {}", other))
            },
        }
    }
}

/// How the number of segments is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Stopping {
    KnownSegments(usize),
    Penalized(Penalty),
}

impl Default for Stopping {
    fn default() -> Self { Stopping::Penalized(Penalty::Bic) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    pub stopping:            Stopping,
    pub min_segment_len:     usize,
    pub min_prominence:      f64,
    pub weights:             Option<Vec<f64>>,
    pub memory_budget_bytes: Option<usize>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            stopping:            Stopping::default(),
            min_segment_len:     1,
            min_prominence:      0.0,
            weights:             None,
            memory_budget_bytes: Some(DEFAULT_MEMORY_BUDGET),
        }
    }
}

impl SegmentationConfig {
    with_field_fn!(stopping, Stopping);

    with_field_fn!(min_segment_len, usize);

    with_field_fn!(min_prominence, f64);

    with_field_fn!(weights, Option<Vec<f64>>);

    with_field_fn!(memory_budget_bytes, Option<usize>);

    fn validate(&self) -> Result<()> {
        ensure!(self.min_segment_len >= 1, "Minimal segment length must be at least 1");
        if let Stopping::KnownSegments(k) = self.stopping {
            ensure!(k >= 1, "Number of segments must be at least 1, got {}", k);
        }
        if let Stopping::Penalized(Penalty::Manual(beta)) = self.stopping {
            ensure!(
                beta.is_finite() && beta >= 0.0,
                "Manual penalty must be finite and non-negative, got {}",
                beta
            );
        }
        ensure!(
            self.min_prominence.is_finite() && self.min_prominence >= 0.0,
            "Minimal prominence must be finite and non-negative, got {}",
            self.min_prominence
        );
        Ok(())
    }
}

/// Fits adjacency-constrained monotonic decompositions.
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: SegmentationConfig,
}

struct Prepared {
    weights: Vec<f64>,
    table:   CostTable,
}

impl Segmenter {
    pub fn new(config: SegmentationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SegmentationConfig { &self.config }

    fn prepare(
        &self,
        y: &[f64],
    ) -> Result<Prepared> {
        ensure!(!y.is_empty(), "Cannot segment an empty series");
        let weights = validate_inputs(y, self.config.weights.as_deref())?;
        let extrema = ExtremaFinder::new(self.config.min_prominence).find(y)?;
        debug!("Series of {} points has {} candidate extrema", y.len(), extrema.len());
        let table = CostTable::build(
            y,
            &weights,
            &extrema,
            self.config.min_segment_len,
            self.config.memory_budget_bytes,
        )?;
        Ok(Prepared { weights, table })
    }

    /// Decomposes `y` into fitted monotone segments and residuals.
    pub fn fit(
        &self,
        y: &[f64],
    ) -> Result<Decomposition> {
        let prepared = self.prepare(y)?;
        let last = prepared.table.len() - 1;

        let (selection, penalty) = match self.config.stopping {
            Stopping::KnownSegments(k) => {
                let sweep = DynpSweep::run(&prepared.table, k)?;
                (sweep.reconstruct(k, last)?, None)
            },
            Stopping::Penalized(penalty) => {
                let beta = penalty.resolve(y)?;
                (optimal_partitioning(&prepared.table, beta)?, Some(beta))
            },
        };

        let decomposition = materialize(y, &prepared, &selection, penalty)?;
        info!(
            "Segmented {} points into {} segments (sse={:.4})",
            y.len(),
            decomposition.segments().len(),
            decomposition.objective()
        );
        Ok(decomposition)
    }

    /// Optimal objective for every segment count in `1..=max_segments`.
    ///
    /// Entry `k - 1` is `+inf` when `k` segments are infeasible.
    pub fn fit_path(
        &self,
        y: &[f64],
        max_segments: usize,
    ) -> Result<Vec<f64>> {
        let prepared = self.prepare(y)?;
        let sweep = DynpSweep::run(&prepared.table, max_segments)?;
        Ok(sweep.objectives()[1..].to_vec())
    }
}

fn materialize(
    y: &[f64],
    prepared: &Prepared,
    selection: &DynpSelection,
    penalty: Option<f64>,
) -> Result<Decomposition> {
    let table = &prepared.table;
    let mut fitted = vec![0.0; y.len()];
    let mut segments = Vec::with_capacity(selection.endpoints.len().saturating_sub(1));

    for pair in selection.endpoints.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (start, end) = (table.position(a), table.position(b));
        if start >= end {
            bail!("Degenerate segment {}..{} selected", start, end);
        }
        let direction = table.direction(a, b);
        let fit = isotonic_unchecked(&y[start..end], &prepared.weights[start..end], direction);
        fitted[start..end].copy_from_slice(&fit.fitted);
        segments.push(Segment {
            start,
            end,
            direction,
            level_count: fit.blocks.len(),
            sse: fit.sse,
        });
    }

    let decomposition = Decomposition::new(y.to_vec(), fitted, segments, penalty);
    debug!(
        "DP objective {:.6}, refit objective {:.6}",
        selection.objective,
        decomposition.objective()
    );
    Ok(decomposition)
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use rstest::rstest;

    use super::*;
    use crate::data_structs::Direction;
    use crate::utils::MAD_SCALE;

    fn known(k: usize) -> Segmenter {
        Segmenter::new(SegmentationConfig::default().with_stopping(Stopping::KnownSegments(k)))
            .unwrap()
    }

    #[test]
    fn test_tent_two_segments() {
        let y = [0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0];
        let d = known(2).fit(&y).unwrap();
        d.validate().unwrap();
        assert_eq!(d.breakpoints(), vec![3]);
        assert_eq!(d.segments()[0].direction, Direction::Increasing);
        assert_eq!(d.segments()[1].direction, Direction::Decreasing);
        assert_approx_eq!(d.objective(), 0.0);
    }

    #[test]
    fn test_single_point() {
        let d = known(1).fit(&[4.2]).unwrap();
        d.validate().unwrap();
        assert_eq!(d.segments().len(), 1);
        assert_eq!(d.segments()[0].direction, Direction::Increasing);
        assert_eq!(d.fitted(), &vec![4.2]);
        assert!(known(2).fit(&[4.2]).is_err());
    }

    #[test]
    fn test_constant_series_penalized() {
        let y = vec![3.0; 25];
        let d = Segmenter::new(SegmentationConfig::default())
            .unwrap()
            .fit(&y)
            .unwrap();
        assert_eq!(d.segments().len(), 1);
        // both directions fit exactly; the tie goes to increasing
        assert_eq!(d.segments()[0].direction, Direction::Increasing);
        assert_approx_eq!(d.objective(), 0.0);
        assert!(d.residuals().iter().all(|r| r.abs() < 1e-12));
    }

    #[test]
    fn test_empty_series_rejected() {
        assert!(known(1).fit(&[]).is_err());
    }

    #[rstest]
    #[case(SegmentationConfig::default().with_stopping(Stopping::KnownSegments(0)))]
    #[case(SegmentationConfig::default().with_min_segment_len(0))]
    #[case(SegmentationConfig::default().with_min_prominence(-0.5))]
    #[case(SegmentationConfig::default().with_stopping(Stopping::Penalized(Penalty::Manual(-1.0))))]
    fn test_invalid_config(#[case] config: SegmentationConfig) {
        assert!(Segmenter::new(config).is_err());
    }

    #[test]
    fn test_weights_length_checked() {
        let segmenter = Segmenter::new(
            SegmentationConfig::default().with_weights(Some(vec![1.0, 1.0])),
        )
        .unwrap();
        assert!(segmenter.fit(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_too_many_segments_is_error() {
        let y = [0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0];
        assert!(known(4).fit(&y).is_err());
    }

    #[test]
    fn test_breakpoints_are_extrema() {
        let y = [0.0, 1.5, 1.0, 2.0, 3.0, 2.2, 2.5, 1.0, 0.2, 0.4, 1.8, 2.0];
        let d = Segmenter::new(
            SegmentationConfig::default().with_stopping(Stopping::Penalized(Penalty::Manual(0.1))),
        )
        .unwrap()
        .fit(&y)
        .unwrap();
        d.validate().unwrap();
        let extrema = crate::tools::extrema::find_extrema(&y).unwrap();
        for (bp, kind) in d.turning_points() {
            assert!(extrema
                .iter()
                .any(|e| e.index == bp && e.kind == kind));
        }
    }

    #[test]
    fn test_fit_path_consistent_with_fit() {
        let y = [0.0, 2.0, 1.0, 3.0, 0.5, 0.7, 4.0, 3.5, 1.0, 1.2, 0.2];
        let path = known(1).fit_path(&y, 4).unwrap();
        assert_eq!(path.len(), 4);
        for (idx, objective) in path.iter().enumerate() {
            let fit = known(idx + 1).fit(&y);
            if objective.is_finite() {
                assert_approx_eq!(fit.unwrap().objective(), *objective, 1e-9);
            }
            else {
                assert!(fit.is_err());
            }
        }
    }

    #[test]
    fn test_penalty_values() {
        // noise variance 2 * MAD_SCALE^2, see utils::diff_noise_variance
        let y = [0.0, 1.0, 0.0, 2.0, 0.0, 3.0];
        let sigma2 = 2.0 * MAD_SCALE * MAD_SCALE;
        assert_approx_eq!(Penalty::Aic.resolve(&y).unwrap(), 4.0 * sigma2, 1e-10);
        assert_approx_eq!(
            Penalty::Bic.resolve(&y).unwrap(),
            2.0 * sigma2 * 6f64.ln(),
            1e-10
        );
        assert_approx_eq!(Penalty::Manual(0.75).resolve(&y).unwrap(), 0.75);
        assert!(Penalty::Manual(f64::INFINITY).resolve(&y).is_err());
    }

    #[test]
    fn test_equal_cost_breakpoints_prefer_earliest() {
        // max@1 and max@3 both give a total error of 0.5 with two segments
        let y = [0.0, 1.0, 0.0, 1.0, 0.0];
        let d = known(2).fit(&y).unwrap();
        assert_eq!(d.breakpoints(), vec![1]);
        assert_approx_eq!(d.objective(), 0.5);
    }

    #[test]
    fn test_penalty_parsing() {
        assert_eq!("bic".parse::<Penalty>().unwrap(), Penalty::Bic);
        assert_eq!("AIC".parse::<Penalty>().unwrap(), Penalty::Aic);
        assert_eq!("2.5".parse::<Penalty>().unwrap(), Penalty::Manual(2.5));
        assert!("lots".parse::<Penalty>().is_err());
    }
}
