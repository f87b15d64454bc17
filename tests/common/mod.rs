use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;

/// Random walk with Gaussian steps, seeded.
pub fn random_walk(
    seed: u64,
    n: usize,
) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let steps = Normal::new(0.0, 1.0).unwrap();
    let mut level = 0.0;
    (0..n)
        .map(|_| {
            level += steps.sample(&mut rng);
            level
        })
        .collect()
}

/// Noiseless trend plus triangle cycle.
#[allow(dead_code)]
pub fn clean_signal(
    n: usize,
    periods: usize,
) -> Vec<f64> {
    let spec = acmr::prelude::SimulationSpec::new(n, periods, 1.0);
    spec.trend()
        .into_iter()
        .zip(spec.cycle())
        .map(|(a, b)| a + b)
        .collect()
}
