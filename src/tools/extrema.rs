//! Local extrema of a series, used as candidate breakpoints by the
//! segmenter.

use anyhow::{
    ensure,
    Result,
};
use itertools::Itertools;
use log::{
    debug,
    trace,
};

use crate::data_structs::{
    Extremum,
    ExtremumKind,
};
use crate::with_field_fn;

/// Finds the local maxima and minima of `y`, in index order.
///
/// A plateau (run of equal values) counts as a single point located at its
/// first index. The endpoints are never reported. The result alternates
/// between maxima and minima.
pub fn find_extrema(y: &[f64]) -> Result<Vec<Extremum>> {
    ensure!(
        y.iter().all(|v| v.is_finite()),
        "Series contains non-finite values"
    );

    // (first index, value) of every run of equal values
    let runs = y
        .iter()
        .enumerate()
        .dedup_by(|(_, a), (_, b)| a == b)
        .map(|(idx, v)| (idx, *v))
        .collect_vec();

    let extrema = runs
        .iter()
        .tuple_windows()
        .filter_map(|(prev, cur, next)| {
            if cur.1 > prev.1 && cur.1 > next.1 {
                Some(Extremum::new(cur.0, ExtremumKind::Maximum, cur.1))
            }
            else if cur.1 < prev.1 && cur.1 < next.1 {
                Some(Extremum::new(cur.0, ExtremumKind::Minimum, cur.1))
            }
            else {
                None
            }
        })
        .collect_vec();

    trace!(
        "Found {} extrema in {} runs of {} values",
        extrema.len(),
        runs.len(),
        y.len()
    );
    Ok(extrema)
}

/// Hysteresis filter over an alternating extrema sequence.
///
/// A swing smaller than `min_prominence` is dropped. When two extrema of
/// the same kind become adjacent, the more extreme one is kept, so the
/// output still alternates.
pub fn filter_prominence(
    extrema: &[Extremum],
    min_prominence: f64,
) -> Vec<Extremum> {
    if min_prominence <= 0.0 {
        return extrema.to_vec();
    }

    let mut accepted: Vec<Extremum> = Vec::with_capacity(extrema.len());
    for extremum in extrema.iter().copied() {
        match accepted.last().copied() {
            None => accepted.push(extremum),
            Some(last) if last.kind == extremum.kind => {
                let more_extreme = match extremum.kind {
                    ExtremumKind::Maximum => extremum.value > last.value,
                    ExtremumKind::Minimum => extremum.value < last.value,
                };
                if more_extreme {
                    let last_idx = accepted.len() - 1;
                    accepted[last_idx] = extremum;
                }
            },
            Some(last) => {
                if (extremum.value - last.value).abs() >= min_prominence {
                    accepted.push(extremum);
                }
            },
        }
    }

    debug!(
        "Prominence filter {} kept {} of {} extrema",
        min_prominence,
        accepted.len(),
        extrema.len()
    );
    accepted
}

/// Configurable extrema search.
#[derive(Debug, Clone, Default)]
pub struct ExtremaFinder {
    min_prominence: f64,
}

impl ExtremaFinder {
    with_field_fn!(min_prominence, f64);

    pub fn new(min_prominence: f64) -> Self { Self { min_prominence } }

    pub fn find(
        &self,
        y: &[f64],
    ) -> Result<Vec<Extremum>> {
        ensure!(
            self.min_prominence.is_finite() && self.min_prominence >= 0.0,
            "Minimal prominence must be finite and non-negative, got {}",
            self.min_prominence
        );
        let raw = find_extrema(y)?;
        Ok(filter_prominence(&raw, self.min_prominence))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn indices(extrema: &[Extremum]) -> Vec<(usize, ExtremumKind)> {
        extrema
            .iter()
            .map(|e| (e.index, e.kind))
            .collect()
    }

    #[test]
    fn test_simple_zigzag() {
        let y = [0.0, 2.0, 1.0, 3.0, 0.5, 4.0];
        let ex = find_extrema(&y).unwrap();
        assert_eq!(
            indices(&ex),
            vec![
                (1, ExtremumKind::Maximum),
                (2, ExtremumKind::Minimum),
                (3, ExtremumKind::Maximum),
                (4, ExtremumKind::Minimum),
            ]
        );
    }

    #[test]
    fn test_plateau_reports_first_index() {
        let y = [0.0, 1.0, 2.0, 2.0, 2.0, 1.0, 1.0, 3.0];
        let ex = find_extrema(&y).unwrap();
        assert_eq!(
            indices(&ex),
            vec![(2, ExtremumKind::Maximum), (5, ExtremumKind::Minimum)]
        );
    }

    #[test]
    fn test_shoulder_is_not_extremum() {
        let y = [0.0, 1.0, 1.0, 2.0, 1.0];
        let ex = find_extrema(&y).unwrap();
        assert_eq!(indices(&ex), vec![(3, ExtremumKind::Maximum)]);
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![1.0])]
    #[case(vec![1.0, 2.0])]
    #[case(vec![1.0, 2.0, 3.0, 4.0])]
    #[case(vec![5.0, 5.0, 5.0])]
    fn test_no_extrema(#[case] y: Vec<f64>) {
        assert!(find_extrema(&y).unwrap().is_empty());
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(find_extrema(&[0.0, f64::NAN, 1.0]).is_err());
        assert!(find_extrema(&[0.0, f64::INFINITY, 1.0]).is_err());
    }

    #[test]
    fn test_prominence_keeps_more_extreme() {
        // small wiggle at 2..4 on the way up, then a real peak
        let y = [0.0, 1.0, 1.05, 1.02, 1.5, 3.0, 0.0, 0.5];
        let ex = ExtremaFinder::default()
            .with_min_prominence(0.5)
            .find(&y)
            .unwrap();
        assert_eq!(
            indices(&ex),
            vec![(5, ExtremumKind::Maximum), (6, ExtremumKind::Minimum)]
        );
    }

    #[test]
    fn test_prominence_output_alternates() {
        let y = (0..200)
            .map(|i| ((i as f64) * 0.7).sin() + 0.1 * ((i * 7919 % 13) as f64))
            .collect_vec();
        let ex = ExtremaFinder::new(0.3).find(&y).unwrap();
        assert!(ex
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.kind != b.kind && a.index < b.index));
        assert!(ex
            .iter()
            .tuple_windows()
            .all(|(a, b)| (a.value - b.value).abs() >= 0.3));
    }

    #[test]
    fn test_negative_prominence_rejected() {
        assert!(ExtremaFinder::new(-1.0).find(&[0.0, 1.0, 0.0]).is_err());
    }
}
