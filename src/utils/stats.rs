use log::*;
use num::ToPrimitive;
use statrs::function::erf::erfc;
use statrs::statistics::Statistics;

/// Two-sided p-value of a standard normal z-score.
pub fn normal_two_sided_p(z: f64) -> f64 {
    if !z.is_finite() {
        return if z.is_nan() { 1.0 } else { 0.0 };
    }
    erfc(z.abs() / std::f64::consts::SQRT_2).min(1.0)
}

fn to_f64_vec<T: ToPrimitive>(values: &[T]) -> Vec<f64> {
    values
        .iter()
        .filter_map(|v| v.to_f64())
        .collect()
}

/// Calculates Pearson correlation coefficient between two variables.
pub fn pearson_r<X, Y>(
    x: &[X],
    y: &[Y],
) -> f64
where
    X: ToPrimitive,
    Y: ToPrimitive, {
    if x.len() != y.len() {
        warn!(
            "Cannot calculate Pearson's r: x length ({}) doesn't match y \
             length ({})",
            x.len(),
            y.len()
        );
        return 0.0;
    }

    if x.is_empty() {
        warn!("Cannot calculate Pearson's r: empty arrays");
        return 0.0;
    }

    let x_f64 = to_f64_vec(x);
    let y_f64 = to_f64_vec(y);

    let x_mean = x_f64.iter().mean();
    let y_mean = y_f64.iter().mean();

    let numerator = x_f64
        .iter()
        .zip(y_f64.iter())
        .map(|(valx, valy)| (valx - x_mean) * (valy - y_mean))
        .sum::<f64>();

    let denominator = {
        let x_dev: f64 = x_f64
            .iter()
            .map(|valx| (valx - x_mean).powi(2))
            .sum();
        let y_dev: f64 = y_f64
            .iter()
            .map(|valy| (valy - y_mean).powi(2))
            .sum();
        (x_dev * y_dev).sqrt()
    };

    if denominator == 0.0 {
        debug!("Denominator is zero, returning r=0");
        return 0.0;
    }

    let r = numerator / denominator;
    trace!("Pearson's r = {:.4}", r);
    r
}

/// Computes the Kolmogorov distribution tail `Q_KS(lambda)`.
/// Based on Numerical Recipes algorithm.
pub fn ks_prob(
    alam: f64,
    iter: Option<usize>,
    prec: Option<f64>,
) -> f64 {
    let iter = iter.unwrap_or(100);
    let prec = prec.unwrap_or(1e-17);

    // The series converges too slowly near zero; the tail is 1 there.
    if alam < 0.2 {
        return 1.0;
    }

    let mut qks = 0f64;
    let mut last_term = f64::MAX;
    let mut j = 1;

    while (j < iter) && (last_term.abs() > prec * 2.0) {
        let term = 2.0
            * (-1.0f64).powi(j as i32 - 1)
            * (-2.0 * (j * j) as f64 * alam.powi(2)).exp();
        qks += term;
        last_term = term;
        j += 1;
    }

    if j == iter {
        warn!(
            "KS probability calculation did not converge after {} iterations",
            iter
        );
        return 1.0;
    }

    if qks > 1.0 {
        debug!("KS probability resulted in value > 1.0: {}", qks);
        return 1.0;
    }

    if qks < prec {
        0.0
    }
    else {
        qks
    }
}

/// Two-sample Kolmogorov-Smirnov test.
///
/// Returns `(D, p)` where `D` is the maximal distance between the empirical
/// CDFs and `p` the asymptotic p-value with the Stephens small-sample
/// correction.
pub fn ks_2sample<F: ToPrimitive>(
    sample1: &[F],
    sample2: &[F],
) -> (f64, f64) {
    let mut a = to_f64_vec(sample1);
    let mut b = to_f64_vec(sample2);
    if a.is_empty() || b.is_empty() {
        warn!("KS test: one or both samples are empty");
        return (0.0, 1.0);
    }
    a.sort_by(|x, y| x.total_cmp(y));
    b.sort_by(|x, y| x.total_cmp(y));

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d = 0f64;
    while i < a.len() && j < b.len() {
        let (d1, d2) = (a[i], b[j]);
        if d1 <= d2 {
            while i < a.len() && a[i] == d1 {
                i += 1;
            }
        }
        if d2 <= d1 {
            while j < b.len() && b[j] == d2 {
                j += 1;
            }
        }
        d = d.max((i as f64 / n1 - j as f64 / n2).abs());
    }

    let en = (n1 * n2 / (n1 + n2)).sqrt();
    let prob = ks_prob((en + 0.12 + 0.11 / en) * d, None, None);
    debug!("KS test results: d={:.4}, p={:.6}", d, prob);
    (d, prob)
}

/// Represents an observation in the Mann-Whitney U test
#[derive(Debug)]
struct Observation {
    value: f64,
    /// 0 for group1, 1 for group2
    group: usize,
    rank:  f64,
}

/// Performs Mann-Whitney U test.
/// A non-parametric test for distribution differences.
///
/// Returns `(U, p)` with `U` the smaller of the two U statistics and `p` the
/// two-tailed normal-approximation p-value with tie and continuity
/// correction.
pub fn mann_whitney_u<F: ToPrimitive>(
    group1: &[F],
    group2: &[F],
) -> (f64, f64) {
    debug!(
        "Performing Mann-Whitney U test: group1={}, group2={}",
        group1.len(),
        group2.len()
    );

    if group1.is_empty() || group2.is_empty() {
        warn!("Mann-Whitney U test: one or both groups are empty");
        return (0.0, 1.0);
    }

    let mut observations: Vec<Observation> = to_f64_vec(group1)
        .into_iter()
        .map(|value| {
            Observation {
                value,
                group: 0,
                rank: 0.0,
            }
        })
        .chain(to_f64_vec(group2).into_iter().map(|value| {
            Observation {
                value,
                group: 1,
                rank: 0.0,
            }
        }))
        .collect();

    let n1 = observations
        .iter()
        .filter(|obs| obs.group == 0)
        .count() as f64;
    let n2 = observations.len() as f64 - n1;
    let n_total = n1 + n2;

    observations.sort_by(|a, b| a.value.total_cmp(&b.value));

    let tie_groups = assign_average_ranks(&mut observations);

    let r1: f64 = observations
        .iter()
        .filter(|obs| obs.group == 0)
        .map(|obs| obs.rank)
        .sum();

    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
    let u2 = n1 * n2 - u1;
    let u_stat = u1.min(u2);

    let mean_u = n1 * n2 / 2.0;

    let tie_sum = tie_groups
        .iter()
        .map(|&t| (t * t * t - t) as f64)
        .sum::<f64>();
    let variance_u = n1 * n2 / 12.0
        * ((n_total + 1.0) - tie_sum / (n_total * (n_total - 1.0)));

    let z = if variance_u > 0.0 {
        (u_stat - mean_u + 0.5) / variance_u.sqrt()
    }
    else {
        warn!("Variance is zero in Mann-Whitney U test");
        0.0
    };

    (u_stat, normal_two_sided_p(z))
}

/// Assigns 1-based average ranks to sorted observations and returns the
/// sizes of tie groups.
fn assign_average_ranks(observations: &mut [Observation]) -> Vec<usize> {
    let mut tie_groups: Vec<usize> = Vec::new();
    let mut i = 0;
    while i < observations.len() {
        let start = i;
        let mut end = i + 1;

        while end < observations.len()
            && (observations[end].value - observations[start].value).abs() < 1e-12
        {
            end += 1;
        }

        let count = end - start;
        let avg_rank = (start as f64 + 1.0 + end as f64) / 2.0;
        for obs in observations[start..end].iter_mut() {
            obs.rank = avg_rank;
        }

        if count > 1 {
            tie_groups.push(count);
        }

        i = end;
    }
    tie_groups
}
