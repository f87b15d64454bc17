//! Nonparametric tests on regression residuals.
//!
//! Under a correct decomposition the residuals should behave like an i.i.d.
//! sequence centred at zero. Each test targets one departure: leftover
//! structure (runs, turning points, difference signs, Ljung-Box), leftover
//! trend (Mann-Kendall), bias (Wilcoxon signed-rank) or drift of the noise
//! distribution between the two halves of the series (Mann-Whitney,
//! Kolmogorov-Smirnov).
//!
//! Inputs too short for a test yield `p = 1` with a warning instead of an
//! error, so one degenerate replication does not abort a simulation.

use std::fmt::Display;

use adjustp::Procedure;
use anyhow::{
    ensure,
    Result,
};
use itertools::Itertools;
use log::{
    debug,
    warn,
};
use serde::{
    Deserialize,
    Serialize,
};
use statrs::distribution::{
    ChiSquared,
    ContinuousCDF,
};

use crate::utils::{
    ks_2sample,
    mann_whitney_u,
    median,
    normal_two_sided_p,
    pearson_r,
};
use crate::with_field_fn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualTest {
    Runs,
    TurningPoints,
    DifferenceSign,
    MannKendall,
    WilcoxonSignedRank,
    LjungBox,
    HalvesMannWhitney,
    HalvesKs,
}

impl ResidualTest {
    pub const ALL: [ResidualTest; 8] = [
        ResidualTest::Runs,
        ResidualTest::TurningPoints,
        ResidualTest::DifferenceSign,
        ResidualTest::MannKendall,
        ResidualTest::WilcoxonSignedRank,
        ResidualTest::LjungBox,
        ResidualTest::HalvesMannWhitney,
        ResidualTest::HalvesKs,
    ];
}

impl Display for ResidualTest {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            ResidualTest::Runs => "runs",
            ResidualTest::TurningPoints => "turning_points",
            ResidualTest::DifferenceSign => "difference_sign",
            ResidualTest::MannKendall => "mann_kendall",
            ResidualTest::WilcoxonSignedRank => "wilcoxon_signed_rank",
            ResidualTest::LjungBox => "ljung_box",
            ResidualTest::HalvesMannWhitney => "halves_mann_whitney",
            ResidualTest::HalvesKs => "halves_ks",
        };
        write!(f, "{}", name)
    }
}

/// Statistic and p-value of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value:   f64,
}

impl TestOutcome {
    fn new(
        statistic: f64,
        p_value: f64,
    ) -> Self {
        Self {
            statistic,
            p_value: p_value.clamp(0.0, 1.0),
        }
    }

    fn degenerate(reason: &str) -> Self {
        warn!("Residual test skipped: {}", reason);
        Self {
            statistic: 0.0,
            p_value:   1.0,
        }
    }

    fn from_z(
        statistic: f64,
        expected: f64,
        variance: f64,
    ) -> Self {
        if !(variance > 0.0) {
            return Self::degenerate("zero variance under the null");
        }
        let z = (statistic - expected) / variance.sqrt();
        Self::new(statistic, normal_two_sided_p(z))
    }
}

/// Wald-Wolfowitz runs test above/below the median.
pub fn runs_test(r: &[f64]) -> TestOutcome {
    let center = median(r);
    let signs = r
        .iter()
        .filter(|v| **v != center)
        .map(|v| *v > center)
        .collect_vec();
    let n1 = signs.iter().filter(|s| **s).count() as f64;
    let n2 = signs.len() as f64 - n1;
    if n1 == 0.0 || n2 == 0.0 {
        return TestOutcome::degenerate("runs test needs values on both sides of the median");
    }
    let runs = 1 + signs
        .iter()
        .tuple_windows()
        .filter(|(a, b)| a != b)
        .count();
    let n = n1 + n2;
    let expected = 2.0 * n1 * n2 / n + 1.0;
    let variance = 2.0 * n1 * n2 * (2.0 * n1 * n2 - n) / (n * n * (n - 1.0));
    TestOutcome::from_z(runs as f64, expected, variance)
}

/// Turning point test for randomness.
pub fn turning_point_test(r: &[f64]) -> TestOutcome {
    let n = r.len();
    if n < 4 {
        return TestOutcome::degenerate("turning point test needs at least 4 values");
    }
    let turns = r
        .iter()
        .tuple_windows()
        .filter(|(a, b, c)| (b > a && b > c) || (b < a && b < c))
        .count() as f64;
    let n = n as f64;
    TestOutcome::from_z(turns, 2.0 * (n - 2.0) / 3.0, (16.0 * n - 29.0) / 90.0)
}

/// Difference-sign test: number of increases between consecutive values.
pub fn difference_sign_test(r: &[f64]) -> TestOutcome {
    let n = r.len();
    if n < 3 {
        return TestOutcome::degenerate("difference sign test needs at least 3 values");
    }
    let ups = r
        .iter()
        .tuple_windows()
        .filter(|(a, b)| b > a)
        .count() as f64;
    let n = n as f64;
    TestOutcome::from_z(ups, (n - 1.0) / 2.0, (n + 1.0) / 12.0)
}

/// Sizes of groups of tied values in `values`.
fn tie_sizes(values: &[f64]) -> Vec<usize> {
    values
        .iter()
        .sorted_by(|a, b| a.total_cmp(b))
        .dedup_with_count()
        .map(|(count, _)| count)
        .filter(|count| *count > 1)
        .collect()
}

/// Mann-Kendall rank test for monotone trend with tie correction.
pub fn mann_kendall_test(r: &[f64]) -> TestOutcome {
    let n = r.len();
    if n < 3 {
        return TestOutcome::degenerate("Mann-Kendall test needs at least 3 values");
    }
    let s: i64 = (0..n - 1)
        .map(|i| {
            r[i + 1..]
                .iter()
                .map(|v| {
                    match v.partial_cmp(&r[i]) {
                        Some(std::cmp::Ordering::Greater) => 1i64,
                        Some(std::cmp::Ordering::Less) => -1,
                        _ => 0,
                    }
                })
                .sum::<i64>()
        })
        .sum();

    let nf = n as f64;
    let tie_term: f64 = tie_sizes(r)
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * (t - 1.0) * (2.0 * t + 5.0)
        })
        .sum();
    let variance = (nf * (nf - 1.0) * (2.0 * nf + 5.0) - tie_term) / 18.0;
    if !(variance > 0.0) {
        return TestOutcome::degenerate("Mann-Kendall variance is zero");
    }

    let s = s as f64;
    let z = if s > 0.0 {
        (s - 1.0) / variance.sqrt()
    }
    else if s < 0.0 {
        (s + 1.0) / variance.sqrt()
    }
    else {
        0.0
    };
    TestOutcome::new(s, normal_two_sided_p(z))
}

/// Wilcoxon signed-rank test of a zero median, normal approximation with
/// tie correction. Exact zeros are dropped.
pub fn wilcoxon_signed_rank(r: &[f64]) -> TestOutcome {
    let nonzero = r
        .iter()
        .copied()
        .filter(|v| *v != 0.0)
        .sorted_by(|a, b| a.abs().total_cmp(&b.abs()))
        .collect_vec();
    let n = nonzero.len();
    if n < 2 {
        return TestOutcome::degenerate("signed-rank test needs at least 2 non-zero values");
    }

    let mut w_plus = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && nonzero[j].abs() == nonzero[i].abs() {
            j += 1;
        }
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        w_plus += nonzero[i..j]
            .iter()
            .filter(|v| **v > 0.0)
            .count() as f64
            * avg_rank;
        let t = (j - i) as f64;
        tie_term += t * t * t - t;
        i = j;
    }

    let nf = n as f64;
    let expected = nf * (nf + 1.0) / 4.0;
    let variance = nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0 - tie_term / 48.0;
    TestOutcome::from_z(w_plus, expected, variance)
}

/// Sample autocorrelation at lags `1..=max_lag`.
pub fn autocorrelations(
    r: &[f64],
    max_lag: usize,
) -> Vec<f64> {
    let n = r.len();
    if n == 0 {
        return Vec::new();
    }
    let mean = r.iter().sum::<f64>() / n as f64;
    let centered = r.iter().map(|v| v - mean).collect_vec();
    let denom: f64 = centered.iter().map(|v| v * v).sum();
    (1..=max_lag.min(n.saturating_sub(1)))
        .map(|lag| {
            if denom == 0.0 {
                return 0.0;
            }
            centered[lag..]
                .iter()
                .zip(centered.iter())
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / denom
        })
        .collect()
}

/// Ljung-Box portmanteau test with `lags` autocorrelations.
pub fn ljung_box(
    r: &[f64],
    lags: usize,
) -> TestOutcome {
    let n = r.len();
    if lags == 0 || n <= lags + 1 {
        return TestOutcome::degenerate("Ljung-Box needs more observations than lags");
    }
    let acf = autocorrelations(r, lags);
    let nf = n as f64;
    let q = nf
        * (nf + 2.0)
        * acf
            .iter()
            .enumerate()
            .map(|(idx, rho)| rho * rho / (nf - (idx + 1) as f64))
            .sum::<f64>();
    match ChiSquared::new(lags as f64) {
        Ok(dist) => TestOutcome::new(q, dist.sf(q)),
        Err(e) => TestOutcome::degenerate(&e.to_string()),
    }
}

fn halves(r: &[f64]) -> (&[f64], &[f64]) { r.split_at(r.len() / 2) }

/// Mann-Whitney U between the first and second half of the residuals.
pub fn halves_mann_whitney(r: &[f64]) -> TestOutcome {
    if r.len() < 4 {
        return TestOutcome::degenerate("halves test needs at least 4 values");
    }
    let (first, second) = halves(r);
    let (u, p) = mann_whitney_u(first, second);
    TestOutcome::new(u, p)
}

/// Two-sample Kolmogorov-Smirnov between the halves of the residuals.
pub fn halves_ks(r: &[f64]) -> TestOutcome {
    if r.len() < 4 {
        return TestOutcome::degenerate("halves test needs at least 4 values");
    }
    let (first, second) = halves(r);
    let (d, p) = ks_2sample(first, second);
    TestOutcome::new(d, p)
}

/// Multiple-testing correction applied across the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Correction {
    None,
    BenjaminiHochberg,
    Bonferroni,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub test:             ResidualTest,
    pub statistic:        f64,
    pub p_value:          f64,
    pub adjusted_p_value: f64,
    pub rejected:         bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualReport {
    pub n:                    usize,
    pub tests:                Vec<TestResult>,
    pub lag1_autocorrelation: f64,
}

impl ResidualReport {
    pub fn get(
        &self,
        test: ResidualTest,
    ) -> Option<&TestResult> {
        self.tests.iter().find(|t| t.test == test)
    }

    pub fn any_rejected(&self) -> bool { self.tests.iter().any(|t| t.rejected) }
}

/// Runs the whole residual test battery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualTester {
    pub alpha:      f64,
    /// Ljung-Box lags; `None` selects `min(10, n / 5)`, at least 1.
    pub lags:       Option<usize>,
    pub correction: Correction,
}

impl Default for ResidualTester {
    fn default() -> Self {
        Self {
            alpha:      0.05,
            lags:       None,
            correction: Correction::BenjaminiHochberg,
        }
    }
}

impl ResidualTester {
    with_field_fn!(alpha, f64);

    with_field_fn!(lags, Option<usize>);

    with_field_fn!(correction, Correction);

    pub fn effective_lags(
        &self,
        n: usize,
    ) -> usize {
        self.lags
            .unwrap_or_else(|| (n / 5).min(10))
            .max(1)
    }

    pub fn run_single(
        &self,
        test: ResidualTest,
        residuals: &[f64],
    ) -> TestOutcome {
        match test {
            ResidualTest::Runs => runs_test(residuals),
            ResidualTest::TurningPoints => turning_point_test(residuals),
            ResidualTest::DifferenceSign => difference_sign_test(residuals),
            ResidualTest::MannKendall => mann_kendall_test(residuals),
            ResidualTest::WilcoxonSignedRank => wilcoxon_signed_rank(residuals),
            ResidualTest::LjungBox => {
                ljung_box(residuals, self.effective_lags(residuals.len()))
            },
            ResidualTest::HalvesMannWhitney => halves_mann_whitney(residuals),
            ResidualTest::HalvesKs => halves_ks(residuals),
        }
    }

    pub fn run(
        &self,
        residuals: &[f64],
    ) -> Result<ResidualReport> {
        ensure!(
            self.alpha > 0.0 && self.alpha < 1.0,
            "Significance level must be in (0, 1), got {}",
            self.alpha
        );
        ensure!(
            residuals.iter().all(|v| v.is_finite()),
            "Residuals contain non-finite values"
        );

        let outcomes = ResidualTest::ALL
            .iter()
            .map(|test| (*test, self.run_single(*test, residuals)))
            .collect_vec();
        let p_values = outcomes
            .iter()
            .map(|(_, o)| o.p_value)
            .collect_vec();
        let adjusted = match self.correction {
            Correction::None => p_values.clone(),
            Correction::BenjaminiHochberg => {
                adjustp::adjust(&p_values, Procedure::BenjaminiHochberg)
            },
            Correction::Bonferroni => adjustp::adjust(&p_values, Procedure::Bonferroni),
        };

        let tests = outcomes
            .into_iter()
            .zip(adjusted)
            .map(|((test, outcome), adjusted_p_value)| {
                TestResult {
                    test,
                    statistic: outcome.statistic,
                    p_value: outcome.p_value,
                    adjusted_p_value,
                    rejected: adjusted_p_value < self.alpha,
                }
            })
            .collect_vec();

        let lag1_autocorrelation = if residuals.len() > 2 {
            pearson_r(&residuals[..residuals.len() - 1], &residuals[1..])
        }
        else {
            0.0
        };

        debug!(
            "Residual tests on {} values: {} rejected at alpha={}",
            residuals.len(),
            tests.iter().filter(|t| t.rejected).count(),
            self.alpha
        );

        Ok(ResidualReport {
            n: residuals.len(),
            tests,
            lag1_autocorrelation,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{
        Distribution,
        Normal,
    };

    use super::*;

    fn white_noise(
        n: usize,
        seed: u64,
    ) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn test_runs_alternating_rejects() {
        let r = (0..100)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect_vec();
        let out = runs_test(&r);
        assert_approx_eq!(out.statistic, 100.0);
        assert!(out.p_value < 1e-6);
    }

    #[test]
    fn test_runs_blocks_rejects() {
        let r = (0..100)
            .map(|i| if i < 50 { -1.0 } else { 1.0 })
            .collect_vec();
        let out = runs_test(&r);
        assert_approx_eq!(out.statistic, 2.0);
        assert!(out.p_value < 1e-6);
    }

    #[test]
    fn test_degenerate_inputs_have_unit_p() {
        assert_approx_eq!(runs_test(&[1.0, 1.0, 1.0]).p_value, 1.0);
        assert_approx_eq!(turning_point_test(&[1.0, 2.0]).p_value, 1.0);
        assert_approx_eq!(difference_sign_test(&[1.0]).p_value, 1.0);
        assert_approx_eq!(mann_kendall_test(&[5.0, 5.0, 5.0]).p_value, 1.0);
        assert_approx_eq!(wilcoxon_signed_rank(&[0.0, 0.0, 1.0]).p_value, 1.0);
        assert_approx_eq!(ljung_box(&[1.0, 2.0], 5).p_value, 1.0);
        assert_approx_eq!(halves_ks(&[1.0]).p_value, 1.0);
    }

    #[test]
    fn test_mann_kendall_detects_trend() {
        let r = (0..60).map(|i| i as f64 * 0.1).collect_vec();
        let out = mann_kendall_test(&r);
        assert_approx_eq!(out.statistic, (60 * 59 / 2) as f64);
        assert!(out.p_value < 1e-6);
    }

    #[test]
    fn test_wilcoxon_shifted_rejects() {
        let r = white_noise(200, 7)
            .into_iter()
            .map(|v| v + 1.0)
            .collect_vec();
        assert!(wilcoxon_signed_rank(&r).p_value < 1e-6);
    }

    #[test]
    fn test_ljung_box_ar_process_rejects() {
        let noise = white_noise(400, 11);
        let mut ar = vec![0.0; noise.len()];
        for t in 1..noise.len() {
            ar[t] = 0.8 * ar[t - 1] + noise[t];
        }
        assert!(ljung_box(&ar, 10).p_value < 1e-6);
        assert!(autocorrelations(&ar, 1)[0] > 0.6);
    }

    #[test]
    fn test_turning_points_smooth_rejects() {
        let r = (0..200)
            .map(|i| (i as f64 * 0.05).sin())
            .collect_vec();
        assert!(turning_point_test(&r).p_value < 1e-6);
        let rising = (0..12).map(|i| i as f64).collect_vec();
        assert!(difference_sign_test(&rising).p_value < 0.01);
    }

    #[test]
    fn test_halves_detect_level_shift() {
        let mut r = white_noise(200, 3);
        for v in r[100..].iter_mut() {
            *v += 3.0;
        }
        assert!(halves_mann_whitney(&r).p_value < 1e-6);
        assert!(halves_ks(&r).p_value < 1e-6);
    }

    #[test]
    fn test_white_noise_battery_mostly_accepts() {
        // averaged over seeds to keep the test insensitive to single draws
        let tester = ResidualTester::default();
        let rejections = (0..20u64)
            .map(|seed| {
                let r = white_noise(300, 1000 + seed);
                tester.run(&r).unwrap().any_rejected() as usize
            })
            .sum::<usize>();
        // family-wise rate under BH is at most alpha per run
        assert!(rejections <= 5, "rejections={}", rejections);
    }

    #[test]
    fn test_report_contents() {
        let r = white_noise(120, 5);
        let report = ResidualTester::default()
            .with_correction(Correction::Bonferroni)
            .run(&r)
            .unwrap();
        assert_eq!(report.n, 120);
        assert_eq!(report.tests.len(), ResidualTest::ALL.len());
        for t in report.tests.iter() {
            assert!(t.adjusted_p_value + 1e-12 >= t.p_value);
            assert!((0.0..=1.0).contains(&t.p_value));
        }
        assert!(report.get(ResidualTest::LjungBox).is_some());
        assert!(report.lag1_autocorrelation.abs() < 0.5);
    }

    #[test]
    fn test_invalid_alpha_and_values() {
        let tester = ResidualTester::default().with_alpha(1.5);
        assert!(tester.run(&[0.0, 1.0, -1.0]).is_err());
        assert!(ResidualTester::default()
            .run(&[0.0, f64::NAN])
            .is_err());
    }

    #[test]
    fn test_effective_lags() {
        let tester = ResidualTester::default();
        assert_eq!(tester.effective_lags(3), 1);
        assert_eq!(tester.effective_lags(30), 6);
        assert_eq!(tester.effective_lags(1000), 10);
        assert_eq!(tester.with_lags(Some(4)).effective_lags(1000), 4);
    }
}
