//! Monte Carlo study of the decomposition.
//!
//! Every replication draws a series from [`generate`], segments it with a
//! [`Segmenter`] and scores the fit against the known signal. Each
//! replication owns a ChaCha stream derived from the base seed, the scenario
//! and the replication number, so the results do not depend on the number
//! of threads.

use std::collections::BTreeMap;

use anyhow::{
    ensure,
    Context,
    Result,
};
use itertools::Itertools;
use log::{
    debug,
    info,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use statrs::statistics::Statistics;

use crate::tools::residuals::{
    Correction,
    ResidualTest,
    ResidualTester,
};
use crate::tools::segmentation::{
    SegmentationConfig,
    Segmenter,
};
use crate::tools::simulate::{
    generate,
    Scenario,
    SimulationSpec,
};
use crate::utils::{
    median,
    THREAD_POOL,
};
use crate::with_field_fn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub spec:           SimulationSpec,
    pub scenarios:      Vec<Scenario>,
    /// Replications `M` per scenario.
    pub repetitions:    usize,
    pub seed:           u64,
    pub segmentation:   SegmentationConfig,
    pub residual_alpha: f64,
    /// Index distance within which a detected turning point matches a true
    /// one.
    pub tolerance:      usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            spec:           SimulationSpec::default(),
            scenarios:      Scenario::all(),
            repetitions:    100,
            seed:           0,
            segmentation:   SegmentationConfig::default(),
            residual_alpha: 0.05,
            tolerance:      1,
        }
    }
}

impl SimulationConfig {
    with_field_fn!(spec, SimulationSpec);

    with_field_fn!(scenarios, Vec<Scenario>);

    with_field_fn!(repetitions, usize);

    with_field_fn!(seed, u64);

    with_field_fn!(segmentation, SegmentationConfig);

    with_field_fn!(residual_alpha, f64);

    with_field_fn!(tolerance, usize);

    pub fn new(
        n: usize,
        periods: usize,
        repetitions: usize,
        power: f64,
    ) -> Self {
        Self {
            spec: SimulationSpec::new(n, periods, power),
            repetitions,
            ..Default::default()
        }
    }

    /// Generator of replication `rep` in `scenario`.
    pub fn replication_rng(
        &self,
        scenario: &Scenario,
        rep: usize,
    ) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(((scenario.id as u64) << 32) | rep as u64);
        rng
    }

    fn tester(&self) -> ResidualTester {
        ResidualTester::default()
            .with_alpha(self.residual_alpha)
            .with_correction(Correction::None)
    }
}

/// Scores of a single replication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationMetrics {
    pub scenario:                usize,
    pub replication:             usize,
    pub mse_signal:              f64,
    pub mae_signal:              f64,
    /// Residual variance over the variance of the true noise.
    pub noise_variance_ratio:    f64,
    pub segments:                usize,
    pub detected_turning_points: usize,
    pub true_turning_points:     usize,
    pub turning_point_recall:    f64,
    pub turning_point_precision: f64,
    pub p_values:                BTreeMap<ResidualTest, f64>,
}

/// Fraction of `reference` points with a `candidates` point within
/// `tolerance`. Both inputs must be sorted.
pub fn matched_fraction(
    reference: &[usize],
    candidates: &[usize],
    tolerance: usize,
) -> f64 {
    if reference.is_empty() {
        return 1.0;
    }
    let matched = reference
        .iter()
        .filter(|&&r| {
            let lo = candidates.partition_point(|&c| c + tolerance < r);
            candidates
                .get(lo)
                .is_some_and(|&c| c <= r + tolerance)
        })
        .count();
    matched as f64 / reference.len() as f64
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.variance()
}

pub fn run_replication(
    config: &SimulationConfig,
    segmenter: &Segmenter,
    scenario: Scenario,
    rep: usize,
) -> Result<ReplicationMetrics> {
    let mut rng = config.replication_rng(&scenario, rep);
    let series = generate(&config.spec, scenario, &mut rng)?;
    let decomposition = segmenter
        .fit(&series.observed)
        .with_context(|| {
            format!(
                "Segmentation failed in scenario {} replication {}",
                scenario.id, rep
            )
        })?;

    let n = series.signal.len() as f64;
    let (sq, abs) = decomposition
        .fitted()
        .iter()
        .zip(series.signal.iter())
        .fold((0.0, 0.0), |(sq, abs), (f, s)| {
            (sq + (f - s).powi(2), abs + (f - s).abs())
        });

    let noise_var = sample_variance(&series.noise);
    let noise_variance_ratio = if noise_var > 0.0 {
        sample_variance(decomposition.residuals()) / noise_var
    }
    else {
        f64::NAN
    };

    let detected = decomposition
        .turning_points()
        .into_iter()
        .map(|(idx, _)| idx)
        .collect_vec();
    let report = config
        .tester()
        .run(decomposition.residuals())?;
    let p_values = report
        .tests
        .iter()
        .map(|t| (t.test, t.p_value))
        .collect();

    Ok(ReplicationMetrics {
        scenario: scenario.id,
        replication: rep,
        mse_signal: sq / n,
        mae_signal: abs / n,
        noise_variance_ratio,
        segments: decomposition.segments().len(),
        detected_turning_points: detected.len(),
        true_turning_points: series.turning_points.len(),
        turning_point_recall: matched_fraction(
            &series.turning_points,
            &detected,
            config.tolerance,
        ),
        turning_point_precision: matched_fraction(
            &detected,
            &series.turning_points,
            config.tolerance,
        ),
        p_values,
    })
}

/// Runs every replication of one scenario in parallel.
pub fn run_scenario(
    config: &SimulationConfig,
    scenario: Scenario,
) -> Result<Vec<ReplicationMetrics>> {
    ensure!(config.repetitions >= 1, "Number of repetitions must be at least 1");
    let segmenter = Segmenter::new(config.segmentation.clone())?;
    let metrics = THREAD_POOL.install(|| {
        (0..config.repetitions)
            .into_par_iter()
            .map(|rep| run_replication(config, &segmenter, scenario, rep))
            .collect::<Result<Vec<_>>>()
    })?;
    debug!(
        "Scenario {} finished {} replications",
        scenario.id,
        metrics.len()
    );
    Ok(metrics)
}

/// Rejection rate and mean p-value of one residual test.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TestRates {
    pub rejection_rate: f64,
    pub mean_p_value:   f64,
}

/// Aggregated metrics of one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario:                Scenario,
    pub replications:            usize,
    pub mse_mean:                f64,
    pub mse_std:                 f64,
    pub mae_mean:                f64,
    pub mae_std:                 f64,
    pub noise_variance_ratio:    f64,
    pub segments_mean:           f64,
    pub detected_turning_points: f64,
    pub true_turning_points:     f64,
    pub recall:                  f64,
    pub precision:               f64,
    pub residual_tests:          BTreeMap<ResidualTest, TestRates>,
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    match values.len() {
        0 => (f64::NAN, f64::NAN),
        1 => (values[0], 0.0),
        _ => (values.mean(), values.std_dev()),
    }
}

impl ScenarioSummary {
    pub fn from_replications(
        scenario: Scenario,
        metrics: &[ReplicationMetrics],
        alpha: f64,
    ) -> Self {
        let column = |f: fn(&ReplicationMetrics) -> f64| metrics.iter().map(f).collect_vec();
        let (mse_mean, mse_std) = mean_std(&column(|m| m.mse_signal));
        let (mae_mean, mae_std) = mean_std(&column(|m| m.mae_signal));

        let residual_tests = ResidualTest::ALL
            .iter()
            .map(|test| {
                let p = metrics
                    .iter()
                    .filter_map(|m| m.p_values.get(test).copied())
                    .collect_vec();
                let rejected = p.iter().filter(|&&v| v < alpha).count();
                let rates = TestRates {
                    rejection_rate: rejected as f64 / p.len().max(1) as f64,
                    mean_p_value:   mean_std(&p).0,
                };
                (*test, rates)
            })
            .collect();

        Self {
            scenario,
            replications: metrics.len(),
            mse_mean,
            mse_std,
            mae_mean,
            mae_std,
            noise_variance_ratio: mean_std(&column(|m| m.noise_variance_ratio)).0,
            segments_mean: mean_std(&column(|m| m.segments as f64)).0,
            detected_turning_points: mean_std(&column(|m| m.detected_turning_points as f64)).0,
            true_turning_points: mean_std(&column(|m| m.true_turning_points as f64)).0,
            recall: mean_std(&column(|m| m.turning_point_recall)).0,
            precision: mean_std(&column(|m| m.turning_point_precision)).0,
            residual_tests,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResults {
    pub config:       SimulationConfig,
    pub rows:         Vec<ScenarioSummary>,
    pub replications: Vec<ReplicationMetrics>,
}

/// Runs all configured scenarios and aggregates one row per scenario.
pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationResults> {
    info!(
        "Running {} scenarios x {} replications (n={}, K={}, pow={})",
        config.scenarios.len(),
        config.repetitions,
        config.spec.n,
        config.spec.periods,
        config.spec.power
    );
    config.spec.validate()?;

    let mut rows = Vec::with_capacity(config.scenarios.len());
    let mut replications = Vec::with_capacity(config.scenarios.len() * config.repetitions);
    for scenario in config.scenarios.iter().copied() {
        let metrics = run_scenario(config, scenario)?;
        rows.push(ScenarioSummary::from_replications(
            scenario,
            &metrics,
            config.residual_alpha,
        ));
        replications.extend(metrics);
    }
    Ok(SimulationResults {
        config: config.clone(),
        rows,
        replications,
    })
}

/// One line of the residual test table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualTableRow {
    pub scenario:       usize,
    pub noise:          String,
    pub sigma:          f64,
    pub test:           String,
    pub replications:   usize,
    pub mean_p_value:   f64,
    pub median_p_value: f64,
    pub rejection_rate: f64,
}

pub type ResidualTable = Vec<ResidualTableRow>;

/// Tabulates the residual test p-values stored in `results`, one row per
/// scenario and test.
pub fn run_residual_tests(results: &SimulationResults) -> ResidualTable {
    let alpha = results.config.residual_alpha;
    let by_scenario = results
        .replications
        .iter()
        .into_group_map_by(|m| m.scenario);

    results
        .rows
        .iter()
        .flat_map(|row| {
            let metrics = by_scenario
                .get(&row.scenario.id)
                .cloned()
                .unwrap_or_default();
            ResidualTest::ALL
                .iter()
                .map(move |test| {
                    let p = metrics
                        .iter()
                        .filter_map(|m| m.p_values.get(test).copied())
                        .collect_vec();
                    let rejected = p.iter().filter(|&&v| v < alpha).count();
                    ResidualTableRow {
                        scenario:       row.scenario.id,
                        noise:          row.scenario.family.to_string(),
                        sigma:          row.scenario.sigma(),
                        test:           test.to_string(),
                        replications:   p.len(),
                        mean_p_value:   mean_std(&p).0,
                        median_p_value: median(&p),
                        rejection_rate: rejected as f64 / p.len().max(1) as f64,
                    }
                })
                .collect_vec()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use rstest::rstest;

    use super::*;

    fn small_config() -> SimulationConfig {
        SimulationConfig::new(120, 6, 3, 1.0)
            .with_seed(7)
            .with_scenarios(vec![
                Scenario::from_id(1).unwrap(),
                Scenario::from_id(9).unwrap(),
            ])
    }

    #[rstest]
    #[case(&[10, 20, 30], &[11, 29], 1, 2.0 / 3.0)]
    #[case(&[10, 20, 30], &[11, 29], 0, 0.0)]
    #[case(&[], &[5], 1, 1.0)]
    #[case(&[5], &[], 3, 0.0)]
    #[case(&[4, 8], &[1, 6, 7], 2, 1.0)]
    fn test_matched_fraction(
        #[case] reference: &[usize],
        #[case] candidates: &[usize],
        #[case] tolerance: usize,
        #[case] expected: f64,
    ) {
        assert_approx_eq!(matched_fraction(reference, candidates, tolerance), expected);
    }

    #[test]
    fn test_replication_streams_differ() {
        use rand::RngCore;
        let config = small_config();
        let scenario = Scenario::from_id(1).unwrap();
        let a = config.replication_rng(&scenario, 0).next_u64();
        let b = config.replication_rng(&scenario, 1).next_u64();
        let c = config.replication_rng(&scenario, 0).next_u64();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_run_simulation_shape() {
        let config = small_config();
        let results = run_simulation(&config).unwrap();
        assert_eq!(results.rows.len(), 2);
        assert_eq!(results.replications.len(), 6);
        for row in results.rows.iter() {
            assert_eq!(row.replications, 3);
            assert!(row.mse_mean >= 0.0);
            assert!(row.recall >= 0.0 && row.recall <= 1.0);
            assert_eq!(row.residual_tests.len(), ResidualTest::ALL.len());
        }
        for m in results.replications.iter() {
            assert_eq!(m.p_values.len(), ResidualTest::ALL.len());
            assert_eq!(m.true_turning_points, 11);
        }

        let table = run_residual_tests(&results);
        assert_eq!(table.len(), 2 * ResidualTest::ALL.len());
        assert!(table
            .iter()
            .all(|r| r.replications == 3 && (0.0..=1.0).contains(&r.rejection_rate)));
    }

    #[test]
    fn test_low_noise_beats_high_noise() {
        let config = SimulationConfig::new(200, 5, 4, 1.0)
            .with_seed(11)
            .with_scenarios(vec![
                Scenario::from_id(1).unwrap(),
                Scenario::from_id(3).unwrap(),
            ]);
        let results = run_simulation(&config).unwrap();
        assert!(results.rows[0].mse_mean < results.rows[1].mse_mean);
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let config = small_config();
        let a = run_simulation(&config).unwrap();
        let b = run_simulation(&config).unwrap();
        for (x, y) in a.replications.iter().zip(b.replications.iter()) {
            assert_eq!(x.mse_signal, y.mse_signal);
            assert_eq!(x.p_values, y.p_values);
        }
    }

    #[test]
    fn test_invalid_configs() {
        assert!(run_simulation(&small_config().with_repetitions(0)).is_err());
        assert!(run_simulation(&SimulationConfig::new(10, 6, 1, 1.0)).is_err());
    }
}
