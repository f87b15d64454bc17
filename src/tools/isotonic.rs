//! Weighted isotonic regression by pool-adjacent-violators.
//!
//! Decreasing fits are solved as increasing fits of the negated series.
//! Pooled blocks carry `(weight, mean, sse)` and are merged with the
//! parallel-axis update, which keeps the running error exact without the
//! cancellation of the raw second-moment formula.

use anyhow::{
    ensure,
    Result,
};
use log::trace;
use serde::{
    Deserialize,
    Serialize,
};

use crate::data_structs::Direction;

/// A run of consecutive observations sharing one fitted level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub start:  usize,
    pub end:    usize,
    pub weight: f64,
    pub level:  f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsotonicFit {
    pub fitted: Vec<f64>,
    pub blocks: Vec<Block>,
    /// Weighted sum of squared errors.
    pub sse:    f64,
}

#[derive(Debug, Clone, Copy)]
struct Pool {
    start:  usize,
    weight: f64,
    mean:   f64,
    sse:    f64,
}

impl Pool {
    /// Merges `other` (which follows `self`) and returns the SSE increase.
    fn absorb(
        &mut self,
        other: Pool,
    ) -> f64 {
        let total = self.weight + other.weight;
        let delta = other.mean - self.mean;
        let increase = self.weight * other.weight / total * delta * delta;
        self.mean += delta * other.weight / total;
        self.sse += other.sse + increase;
        self.weight = total;
        increase
    }
}

/// Incremental non-decreasing PAV over a stream of weighted points.
///
/// Each push is amortized O(1); `sse()` is the error of the optimal fit of
/// everything pushed so far.
#[derive(Debug, Clone, Default)]
pub(crate) struct PavStack {
    pools: Vec<Pool>,
    len:   usize,
    sse:   f64,
}

impl PavStack {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            pools: Vec::with_capacity(capacity),
            len:   0,
            sse:   0.0,
        }
    }

    pub(crate) fn push(
        &mut self,
        value: f64,
        weight: f64,
    ) -> f64 {
        let mut pool = Pool {
            start: self.len,
            weight,
            mean: value,
            sse: 0.0,
        };
        self.len += 1;

        while let Some(prev) = self.pools.last_mut() {
            if prev.mean <= pool.mean {
                break;
            }
            self.sse += prev.absorb(pool);
            // prev now holds the merged pool; continue checking backwards
            pool = *prev;
            self.pools.pop();
        }
        self.pools.push(pool);
        self.sse
    }

    pub(crate) fn sse(&self) -> f64 { self.sse }

    fn into_blocks(self) -> Vec<Block> {
        let ends = self
            .pools
            .iter()
            .skip(1)
            .map(|p| p.start)
            .chain(std::iter::once(self.len));
        self.pools
            .iter()
            .zip(ends)
            .map(|(pool, end)| {
                Block {
                    start: pool.start,
                    end,
                    weight: pool.weight,
                    level: pool.mean,
                }
            })
            .collect()
    }
}

/// Checks values and weights, returning the effective weights.
pub(crate) fn validate_inputs(
    y: &[f64],
    w: Option<&[f64]>,
) -> Result<Vec<f64>> {
    ensure!(
        y.iter().all(|v| v.is_finite()),
        "Series contains non-finite values"
    );
    match w {
        None => Ok(vec![1.0; y.len()]),
        Some(w) => {
            ensure!(
                w.len() == y.len(),
                "Weights length ({}) doesn't match series length ({})",
                w.len(),
                y.len()
            );
            if let Some((idx, bad)) = w
                .iter()
                .enumerate()
                .find(|(_, v)| !(v.is_finite() && **v > 0.0))
            {
                anyhow::bail!("Weight at {} must be finite and positive, got {}", idx, bad);
            }
            Ok(w.to_vec())
        },
    }
}

/// Weighted least-squares fit of `y` under a monotonicity constraint.
pub fn isotonic_regression(
    y: &[f64],
    w: Option<&[f64]>,
    direction: Direction,
) -> Result<IsotonicFit> {
    let weights = validate_inputs(y, w)?;
    Ok(isotonic_unchecked(y, &weights, direction))
}

pub(crate) fn isotonic_unchecked(
    y: &[f64],
    w: &[f64],
    direction: Direction,
) -> IsotonicFit {
    let sign = direction.sign();
    let mut stack = PavStack::with_capacity(y.len());
    for (value, weight) in y.iter().zip(w.iter()) {
        stack.push(sign * value, *weight);
    }
    let sse = stack.sse();

    let blocks = stack
        .into_blocks()
        .into_iter()
        .map(|b| {
            Block {
                level: sign * b.level,
                ..b
            }
        })
        .collect::<Vec<_>>();

    let mut fitted = vec![0.0; y.len()];
    for block in blocks.iter() {
        fitted[block.start..block.end].fill(block.level);
    }

    trace!(
        "Isotonic {} fit of {} points: {} blocks, sse={:.6}",
        direction,
        y.len(),
        blocks.len(),
        sse
    );

    IsotonicFit {
        fitted,
        blocks,
        sse,
    }
}

/// Isotonic error of every prefix: element `j` is the weighted SSE of the
/// monotone fit of `y[0..=j]`.
pub fn prefix_errors(
    y: &[f64],
    w: Option<&[f64]>,
    direction: Direction,
) -> Result<Vec<f64>> {
    let weights = validate_inputs(y, w)?;
    Ok(prefix_errors_unchecked(y, &weights, direction))
}

pub(crate) fn prefix_errors_unchecked(
    y: &[f64],
    w: &[f64],
    direction: Direction,
) -> Vec<f64> {
    let sign = direction.sign();
    let mut stack = PavStack::with_capacity(y.len());
    y.iter()
        .zip(w.iter())
        .map(|(value, weight)| stack.push(sign * value, *weight))
        .collect()
}
