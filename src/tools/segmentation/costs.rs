use std::mem::size_of;

use anyhow::{
    bail,
    Result,
};
use log::debug;
use rayon::prelude::*;

use crate::data_structs::{
    Direction,
    Extremum,
    ExtremumKind,
};
use crate::tools::isotonic::PavStack;
use crate::utils::THREAD_POOL;

/// Candidate segment boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Endpoint {
    Start,
    Turn(ExtremumKind),
    End,
}

impl Endpoint {
    /// Directions a segment starting here may take.
    fn outgoing(self) -> &'static [Direction] {
        match self {
            Endpoint::Start => &[Direction::Increasing, Direction::Decreasing],
            Endpoint::Turn(ExtremumKind::Minimum) => &[Direction::Increasing],
            Endpoint::Turn(ExtremumKind::Maximum) => &[Direction::Decreasing],
            Endpoint::End => &[],
        }
    }

    /// Whether a segment of `direction` may end here.
    fn terminates(
        self,
        direction: Direction,
    ) -> bool {
        match self {
            Endpoint::End => true,
            Endpoint::Turn(kind) => kind == ExtremumKind::terminating(direction),
            Endpoint::Start => false,
        }
    }
}

/// Segment costs between every pair of candidate endpoints.
///
/// Row `a` holds the costs of `[positions[a], positions[b])` for all
/// `b > a`; incompatible or too short segments cost `+inf`.
#[derive(Debug, Clone)]
pub(crate) struct CostTable {
    positions:        Vec<usize>,
    kinds:            Vec<Endpoint>,
    rows:             Vec<Vec<f64>>,
    /// Direction of the cheaper first-segment fit for each end.
    first_directions: Vec<Direction>,
}

/// Cost cells plus the first-row directions.
pub(crate) fn estimate_table_bytes(endpoints: usize) -> Option<usize> {
    endpoints
        .checked_mul(endpoints.saturating_sub(1))
        .map(|cells| cells / 2)
        .and_then(|cells| cells.checked_mul(size_of::<f64>()))
        .and_then(|bytes| {
            bytes.checked_add(endpoints.saturating_sub(1) * size_of::<Direction>())
        })
}

impl CostTable {
    pub(crate) fn build(
        y: &[f64],
        w: &[f64],
        extrema: &[Extremum],
        min_segment_len: usize,
        memory_budget_bytes: Option<usize>,
    ) -> Result<Self> {
        let n = y.len();
        let mut positions = Vec::with_capacity(extrema.len() + 2);
        let mut kinds = Vec::with_capacity(extrema.len() + 2);
        positions.push(0);
        kinds.push(Endpoint::Start);
        for extremum in extrema.iter() {
            positions.push(extremum.index);
            kinds.push(Endpoint::Turn(extremum.kind));
        }
        positions.push(n);
        kinds.push(Endpoint::End);

        let m = positions.len();
        let required = estimate_table_bytes(m);
        match (required, memory_budget_bytes) {
            (None, _) => bail!("Cost table size overflows for {} endpoints", m),
            (Some(required), Some(limit)) if required > limit => {
                bail!(
                    "Cost table needs {} bytes for {} endpoints, limit is {}; \
                     raise the memory budget or the minimal prominence",
                    required,
                    m,
                    limit
                )
            },
            _ => {},
        }

        let rows = THREAD_POOL.install(|| {
            (1..m - 1)
                .into_par_iter()
                .map(|a| {
                    Self::build_row(y, w, &positions, &kinds, a, min_segment_len, None)
                })
                .collect::<Vec<_>>()
        });
        // only segments leaving the start may take either direction
        let mut first_directions = vec![Direction::Increasing; m - 1];
        let first_row = Self::build_row(
            y,
            w,
            &positions,
            &kinds,
            0,
            min_segment_len,
            Some(&mut first_directions),
        );
        let rows = std::iter::once(first_row)
            .chain(rows)
            .collect::<Vec<_>>();

        debug!(
            "Built cost table: n={}, endpoints={}, min_segment_len={}",
            n, m, min_segment_len
        );

        Ok(Self {
            positions,
            kinds,
            rows,
            first_directions,
        })
    }

    fn build_row(
        y: &[f64],
        w: &[f64],
        positions: &[usize],
        kinds: &[Endpoint],
        a: usize,
        min_segment_len: usize,
        mut directions: Option<&mut Vec<Direction>>,
    ) -> Vec<f64> {
        let start = positions[a];
        let targets = &positions[a + 1..];
        let mut row = vec![f64::INFINITY; targets.len()];

        for &direction in kinds[a].outgoing() {
            let sign = direction.sign();
            let mut stack = PavStack::with_capacity(64);
            let mut cursor = start;
            for (offset, &end) in targets.iter().enumerate() {
                while cursor < end {
                    stack.push(sign * y[cursor], w[cursor]);
                    cursor += 1;
                }
                if end - start < min_segment_len
                    || !kinds[a + 1 + offset].terminates(direction)
                {
                    continue;
                }
                let cost = stack.sse();
                if cost < row[offset] {
                    row[offset] = cost;
                    if let Some(dirs) = directions.as_deref_mut() {
                        dirs[offset] = direction;
                    }
                }
            }
        }
        row
    }

    pub(crate) fn len(&self) -> usize { self.positions.len() }

    pub(crate) fn position(
        &self,
        idx: usize,
    ) -> usize {
        self.positions[idx]
    }

    /// Cost of the segment between endpoints `a < b`.
    pub(crate) fn cost(
        &self,
        a: usize,
        b: usize,
    ) -> f64 {
        self.rows[a][b - a - 1]
    }

    /// Direction of the segment between endpoints `a < b`.
    pub(crate) fn direction(
        &self,
        a: usize,
        b: usize,
    ) -> Direction {
        match self.kinds[a] {
            Endpoint::Start => self.first_directions[b - 1],
            Endpoint::Turn(kind) => kind.outgoing(),
            Endpoint::End => unreachable!("no segment starts at the series end"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;
    use crate::tools::extrema::find_extrema;
    use crate::tools::isotonic::isotonic_regression;

    #[test]
    fn test_costs_match_direct_fits() {
        let y = [0.0, 2.0, 1.0, 3.0, 0.5, 0.7, 4.0, 3.5];
        let w = vec![1.0; y.len()];
        let extrema = find_extrema(&y).unwrap();
        let table = CostTable::build(&y, &w, &extrema, 1, None).unwrap();
        assert_eq!(table.len(), extrema.len() + 2);

        for a in 0..table.len() - 1 {
            for b in a + 1..table.len() {
                let cost = table.cost(a, b);
                if !cost.is_finite() {
                    continue;
                }
                let dir = table.direction(a, b);
                let (s, e) = (table.position(a), table.position(b));
                let direct = isotonic_regression(&y[s..e], None, dir).unwrap();
                assert_approx_eq!(cost, direct.sse, 1e-9);
            }
        }
    }

    #[test]
    fn test_incompatible_endpoints_are_infinite() {
        // extrema: max@1, min@2, max@3
        let y = [0.0, 2.0, 1.0, 3.0, 2.5];
        let w = vec![1.0; y.len()];
        let extrema = find_extrema(&y).unwrap();
        let table = CostTable::build(&y, &w, &extrema, 1, None).unwrap();
        // a segment from min@2 is increasing and cannot end at min@... only
        // at max@3 or at the end
        assert!(table.cost(2, 3).is_finite());
        // from max@1 (decreasing) to max@3 is not allowed
        assert!(table.cost(1, 3).is_infinite());
        // from the start both kinds are reachable
        assert!(table.cost(0, 1).is_finite());
        assert!(table.cost(0, 2).is_finite());
        assert_eq!(table.direction(0, 1), Direction::Increasing);
        assert_eq!(table.direction(0, 2), Direction::Decreasing);
    }

    #[test]
    fn test_min_segment_len_masks_short_segments() {
        let y = [0.0, 2.0, 1.0, 3.0, 2.5];
        let w = vec![1.0; y.len()];
        let extrema = find_extrema(&y).unwrap();
        let table = CostTable::build(&y, &w, &extrema, 2, None).unwrap();
        // [1, 2) has length 1
        assert!(table.cost(1, 2).is_infinite());
        assert!(table.cost(0, 2).is_finite());
    }

    #[test]
    fn test_table_size_estimate() {
        // 3 rows of decreasing length plus 3 first-row directions
        assert_eq!(
            estimate_table_bytes(4),
            Some(6 * size_of::<f64>() + 3 * size_of::<Direction>())
        );
        assert_eq!(estimate_table_bytes(1), Some(0));
        assert_eq!(estimate_table_bytes(usize::MAX), None);
    }

    #[test]
    fn test_memory_budget() {
        let y = [0.0, 2.0, 1.0, 3.0, 2.5];
        let w = vec![1.0; y.len()];
        let extrema = find_extrema(&y).unwrap();
        assert!(CostTable::build(&y, &w, &extrema, 1, Some(8)).is_err());
    }
}
