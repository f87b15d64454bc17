use acmr::prelude::*;
use acmr::tools::simulation::matched_fraction;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rstest::{fixture, rstest};

#[fixture]
fn config() -> SimulationConfig {
    SimulationConfig::new(150, 5, 4, 1.0)
        .with_seed(2024)
        .with_scenarios(vec![
            Scenario::from_id(1).unwrap(),
            Scenario::from_id(5).unwrap(),
            Scenario::from_id(9).unwrap(),
        ])
}

#[rstest]
fn simulation_is_reproducible(config: SimulationConfig) -> anyhow::Result<()> {
    let first = run_simulation(&config)?;
    let second = run_simulation(&config)?;
    assert_eq!(first.replications.len(), 12);
    for (a, b) in first
        .replications
        .iter()
        .zip(second.replications.iter())
    {
        assert_eq!(a.scenario, b.scenario);
        assert_eq!(a.replication, b.replication);
        assert_eq!(a.mse_signal, b.mse_signal);
        assert_eq!(a.detected_turning_points, b.detected_turning_points);
    }
    Ok(())
}

#[rstest]
fn seed_changes_the_draws(config: SimulationConfig) -> anyhow::Result<()> {
    let first = run_simulation(&config)?;
    let other = run_simulation(&config.clone().with_seed(2025))?;
    assert!(first
        .replications
        .iter()
        .zip(other.replications.iter())
        .any(|(a, b)| a.mse_signal != b.mse_signal));
    Ok(())
}

#[rstest]
fn summaries_are_consistent(config: SimulationConfig) -> anyhow::Result<()> {
    let results = run_simulation(&config)?;
    assert_eq!(results.rows.len(), 3);
    for row in results.rows.iter() {
        assert_eq!(row.replications, 4);
        assert!(row.mse_mean.is_finite() && row.mse_mean >= 0.0);
        assert!(row.mse_std >= 0.0);
        assert!(row.mae_mean <= row.mse_mean.sqrt() + 1e-12);
        assert!((0.0..=1.0).contains(&row.recall));
        assert!((0.0..=1.0).contains(&row.precision));
        // 5 periods starting at a minimum: 5 maxima and 4 minima
        assert_eq!(row.true_turning_points, 9.0);
        for rates in row.residual_tests.values() {
            assert!((0.0..=1.0).contains(&rates.rejection_rate));
            assert!((0.0..=1.0).contains(&rates.mean_p_value));
        }
    }

    let table = run_residual_tests(&results);
    assert_eq!(table.len(), 3 * ResidualTest::ALL.len());
    Ok(())
}

#[test]
fn generated_turning_points_match_detected_on_low_noise() -> anyhow::Result<()> {
    let spec = SimulationSpec::new(200, 4, 1.0).with_amplitude(3.0);
    let scenario = Scenario::from_id(1)?;
    let series = generate(&spec, scenario, &mut ChaCha8Rng::seed_from_u64(8))?;
    let decomposition = Segmenter::new(
        SegmentationConfig::default().with_stopping(Stopping::KnownSegments(
            series.turning_points.len() + 1,
        )),
    )?
    .fit(&series.observed)?;
    let detected = decomposition
        .turning_points()
        .into_iter()
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    assert!(matched_fraction(&series.turning_points, &detected, 3) >= 0.5);
    Ok(())
}
