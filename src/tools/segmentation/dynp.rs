use anyhow::{
    bail,
    ensure,
    Result,
};
use log::{
    debug,
    trace,
};

use super::costs::CostTable;

/// Chosen endpoint indices `0 = e_0 < e_1 < ... < e_k = last`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DynpSelection {
    pub(crate) endpoints: Vec<usize>,
    pub(crate) objective: f64,
}

/// Layered sweep for a fixed number of segments.
#[derive(Debug, Clone)]
pub(crate) struct DynpSweep {
    backpointers:               Vec<Vec<usize>>,
    objective_by_segment_count: Vec<f64>,
}

impl DynpSweep {
    pub(crate) fn run(
        table: &CostTable,
        max_segments: usize,
    ) -> Result<Self> {
        ensure!(max_segments >= 1, "Number of segments must be at least 1");
        let m = table.len();
        let inf = f64::INFINITY;
        let mut backpointers = vec![vec![usize::MAX; m]; max_segments + 1];
        let mut objective_by_segment_count = vec![inf; max_segments + 1];
        let mut dp_prev = vec![inf; m];
        dp_prev[0] = 0.0;

        for (segment_count, backpointer_row) in backpointers
            .iter_mut()
            .enumerate()
            .skip(1)
        {
            let mut dp_curr = vec![inf; m];
            for end_idx in segment_count..m {
                let mut best_objective = inf;
                let mut best_prev_idx = usize::MAX;

                for start_idx in (segment_count - 1)..end_idx {
                    if !dp_prev[start_idx].is_finite() {
                        continue;
                    }
                    let objective = dp_prev[start_idx] + table.cost(start_idx, end_idx);
                    if objective < best_objective {
                        best_objective = objective;
                        best_prev_idx = start_idx;
                    }
                }

                if best_prev_idx != usize::MAX {
                    dp_curr[end_idx] = best_objective;
                    backpointer_row[end_idx] = best_prev_idx;
                }
            }
            objective_by_segment_count[segment_count] = dp_curr[m - 1];
            trace!(
                "dynp layer {}: objective={}",
                segment_count,
                dp_curr[m - 1]
            );
            dp_prev = dp_curr;
        }

        Ok(Self {
            backpointers,
            objective_by_segment_count,
        })
    }

    /// Objective for `k` segments, `+inf` when infeasible; index 0 unused.
    pub(crate) fn objectives(&self) -> &[f64] { &self.objective_by_segment_count }

    pub(crate) fn reconstruct(
        &self,
        segment_count: usize,
        last_idx: usize,
    ) -> Result<DynpSelection> {
        ensure!(
            segment_count >= 1 && segment_count < self.backpointers.len(),
            "Invalid segment count {} for backtracking",
            segment_count
        );
        let objective = self.objective_by_segment_count[segment_count];
        if !objective.is_finite() {
            bail!(
                "No feasible segmentation with {} segments; the series has too \
                 few compatible extrema",
                segment_count
            );
        }

        let mut endpoints = Vec::with_capacity(segment_count + 1);
        let mut cursor = last_idx;
        endpoints.push(cursor);
        for current in (1..=segment_count).rev() {
            let prev = self.backpointers[current][cursor];
            ensure!(
                prev != usize::MAX,
                "Backtracking failed at segment {} endpoint {}",
                current,
                cursor
            );
            endpoints.push(prev);
            cursor = prev;
        }
        ensure!(cursor == 0, "Backtracking did not reach the series start");
        endpoints.reverse();
        Ok(DynpSelection {
            endpoints,
            objective,
        })
    }
}

/// Optimal partitioning with a constant per-segment penalty.
pub(crate) fn optimal_partitioning(
    table: &CostTable,
    beta: f64,
) -> Result<DynpSelection> {
    ensure!(
        beta.is_finite() && beta >= 0.0,
        "Penalty must be finite and non-negative, got {}",
        beta
    );
    let m = table.len();
    #[allow(non_snake_case)]
    let mut F = vec![f64::INFINITY; m];
    let mut prev = vec![usize::MAX; m];
    F[0] = 0.0;

    for end_idx in 1..m {
        for start_idx in 0..end_idx {
            if !F[start_idx].is_finite() {
                continue;
            }
            let candidate = F[start_idx] + table.cost(start_idx, end_idx) + beta;
            if candidate < F[end_idx] {
                F[end_idx] = candidate;
                prev[end_idx] = start_idx;
            }
        }
    }

    if !F[m - 1].is_finite() {
        bail!("No feasible segmentation under the given constraints");
    }

    let mut endpoints = vec![m - 1];
    let mut cursor = m - 1;
    while cursor > 0 {
        cursor = prev[cursor];
        ensure!(cursor != usize::MAX, "Backtracking failed");
        endpoints.push(cursor);
    }
    endpoints.reverse();

    let segments = endpoints.len() - 1;
    let objective = F[m - 1] - beta * segments as f64;
    debug!(
        "Optimal partitioning: beta={:.4}, segments={}, objective={:.4}",
        beta, segments, objective
    );
    Ok(DynpSelection {
        endpoints,
        objective,
    })
}
