use std::ops::Range;

use anyhow::ensure;
use itertools::Itertools;
use serde::{
    Deserialize,
    Serialize,
};

use super::enums::{
    Direction,
    ExtremumKind,
};
use crate::getter_fn;

/// A local extremum of an observed series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extremum {
    pub index: usize,
    pub kind:  ExtremumKind,
    pub value: f64,
}

impl Extremum {
    pub fn new(
        index: usize,
        kind: ExtremumKind,
        value: f64,
    ) -> Self {
        Self { index, kind, value }
    }
}

/// Half-open range `[start, end)` fitted monotonically in `direction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start:       usize,
    pub end:         usize,
    pub direction:   Direction,
    /// Number of PAV blocks, i.e. distinct fitted levels.
    pub level_count: usize,
    /// Weighted sum of squared errors of the segment fit.
    pub sse:         f64,
}

impl Segment {
    pub fn len(&self) -> usize { self.end - self.start }

    pub fn is_empty(&self) -> bool { self.end <= self.start }

    pub fn range(&self) -> Range<usize> { self.start..self.end }
}

/// Signal/noise decomposition of a series into alternating monotone
/// segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decomposition {
    observed:  Vec<f64>,
    fitted:    Vec<f64>,
    residuals: Vec<f64>,
    segments:  Vec<Segment>,
    /// Sum of the segment costs, without penalty.
    objective: f64,
    /// Per-segment penalty used for the selection, if any.
    penalty:   Option<f64>,
}

impl Decomposition {
    getter_fn!(observed, Vec<f64>);

    getter_fn!(fitted, Vec<f64>);

    getter_fn!(residuals, Vec<f64>);

    getter_fn!(segments, Vec<Segment>);

    pub(crate) fn new(
        observed: Vec<f64>,
        fitted: Vec<f64>,
        segments: Vec<Segment>,
        penalty: Option<f64>,
    ) -> Self {
        let residuals = observed
            .iter()
            .zip(fitted.iter())
            .map(|(y, f)| y - f)
            .collect_vec();
        let objective = segments.iter().map(|s| s.sse).sum();
        Self {
            observed,
            fitted,
            residuals,
            segments,
            objective,
            penalty,
        }
    }

    pub fn len(&self) -> usize { self.observed.len() }

    pub fn is_empty(&self) -> bool { self.observed.is_empty() }

    pub fn objective(&self) -> f64 { self.objective }

    pub fn penalty(&self) -> Option<f64> { self.penalty }

    /// Objective plus the penalty charged for every segment.
    pub fn penalized_objective(&self) -> f64 {
        self.objective + self.penalty.unwrap_or(0.0) * self.segments.len() as f64
    }

    /// Unweighted residual sum of squares.
    pub fn sse(&self) -> f64 {
        self.residuals.iter().map(|r| r * r).sum()
    }

    /// Interior segment starts.
    pub fn breakpoints(&self) -> Vec<usize> {
        self.segments
            .iter()
            .skip(1)
            .map(|s| s.start)
            .collect()
    }

    /// Interior breakpoints tagged with the extremum kind implied by the
    /// direction of the segment they start.
    pub fn turning_points(&self) -> Vec<(usize, ExtremumKind)> {
        self.segments
            .iter()
            .skip(1)
            .map(|s| {
                let kind = match s.direction {
                    Direction::Increasing => ExtremumKind::Minimum,
                    Direction::Decreasing => ExtremumKind::Maximum,
                };
                (s.start, kind)
            })
            .collect()
    }

    /// Segment index for every observation.
    pub fn segment_labels(&self) -> Vec<usize> {
        self.segments
            .iter()
            .enumerate()
            .flat_map(|(idx, s)| std::iter::repeat(idx).take(s.len()))
            .collect()
    }

    /// Checks the structural invariants of the decomposition.
    pub fn validate(&self) -> anyhow::Result<()> {
        let n = self.observed.len();
        ensure!(
            self.fitted.len() == n && self.residuals.len() == n,
            "Length mismatch: observed={}, fitted={}, residuals={}",
            n,
            self.fitted.len(),
            self.residuals.len()
        );
        if n == 0 {
            ensure!(self.segments.is_empty(), "Segments on empty series");
            return Ok(());
        }
        ensure!(!self.segments.is_empty(), "No segments for non-empty series");
        ensure!(
            self.segments[0].start == 0,
            "First segment starts at {}",
            self.segments[0].start
        );
        ensure!(
            self.segments.last().map(|s| s.end) == Some(n),
            "Last segment does not end at {}",
            n
        );
        for (prev, next) in self.segments.iter().tuple_windows() {
            ensure!(
                prev.end == next.start,
                "Gap between segments at {}..{}",
                prev.end,
                next.start
            );
            ensure!(
                prev.direction != next.direction,
                "Consecutive segments at {} share direction {}",
                next.start,
                next.direction
            );
        }
        for segment in self.segments.iter() {
            ensure!(!segment.is_empty(), "Empty segment at {}", segment.start);
            let slack = 1e-9 * segment.direction.sign();
            let monotone = self.fitted[segment.range()]
                .iter()
                .tuple_windows()
                .all(|(a, b)| segment.direction.admits(*a, *b + slack));
            ensure!(
                monotone,
                "Fitted values not {} in segment {}..{}",
                segment.direction,
                segment.start,
                segment.end
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    fn two_segments() -> Decomposition {
        Decomposition::new(
            vec![0.0, 1.0, 2.0, 1.5, 0.5],
            vec![0.0, 1.0, 2.0, 1.5, 0.5],
            vec![
                Segment {
                    start:       0,
                    end:         2,
                    direction:   Direction::Increasing,
                    level_count: 2,
                    sse:         0.0,
                },
                Segment {
                    start:       2,
                    end:         5,
                    direction:   Direction::Decreasing,
                    level_count: 3,
                    sse:         0.0,
                },
            ],
            Some(2.0),
        )
    }

    #[test]
    fn test_decomposition_accessors() {
        let d = two_segments();
        assert_eq!(d.breakpoints(), vec![2]);
        assert_eq!(d.turning_points(), vec![(2, ExtremumKind::Maximum)]);
        assert_eq!(d.segment_labels(), vec![0, 0, 1, 1, 1]);
        assert_approx_eq!(d.penalized_objective(), 4.0);
        d.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_same_direction() {
        let mut d = two_segments();
        d.segments[1].direction = Direction::Increasing;
        assert!(d.validate().is_err());
    }
}
