//! Synthetic series for the Monte Carlo study.
//!
//! A series is `trend + cycle + noise` where the trend is a power curve, the
//! cycle a triangle wave with `periods` full periods, and the noise one of
//! nine scenarios (three noise families at three noise levels).

use std::fmt::Display;

use anyhow::{
    anyhow,
    bail,
    ensure,
    Result,
};
use log::trace;
use rand::Rng;
use rand_distr::{
    Distribution,
    StandardNormal,
    StudentT,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::tools::extrema::find_extrema;
use crate::with_field_fn;

/// Degrees of freedom of the heavy-tailed scenario.
pub const STUDENT_T_DF: f64 = 3.0;
/// Autoregressive coefficient of the correlated scenario.
pub const AR1_PHI: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseFamily {
    Gaussian,
    /// Student-t, rescaled to the requested standard deviation.
    StudentT,
    /// Stationary AR(1) with the requested marginal standard deviation.
    Ar1,
}

impl Display for NoiseFamily {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            NoiseFamily::Gaussian => write!(f, "gaussian"),
            NoiseFamily::StudentT => write!(f, "student_t{}", STUDENT_T_DF),
            NoiseFamily::Ar1 => write!(f, "ar1({})", AR1_PHI),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseLevel {
    Low,
    Medium,
    High,
}

impl NoiseLevel {
    pub fn sigma(self) -> f64 {
        match self {
            NoiseLevel::Low => 0.25,
            NoiseLevel::Medium => 0.5,
            NoiseLevel::High => 1.0,
        }
    }
}

/// One of the nine simulation scenarios, numbered 1..=9 family-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scenario {
    pub id:     usize,
    pub family: NoiseFamily,
    pub level:  NoiseLevel,
}

impl Scenario {
    pub const COUNT: usize = 9;

    pub fn all() -> Vec<Scenario> {
        (1..=Self::COUNT)
            .filter_map(|id| Self::from_id(id).ok())
            .collect()
    }

    pub fn from_id(id: usize) -> Result<Scenario> {
        ensure!(
            (1..=Self::COUNT).contains(&id),
            "Scenario id must be in 1..={}, got {}",
            Self::COUNT,
            id
        );
        let family = match (id - 1) / 3 {
            0 => NoiseFamily::Gaussian,
            1 => NoiseFamily::StudentT,
            _ => NoiseFamily::Ar1,
        };
        let level = match (id - 1) % 3 {
            0 => NoiseLevel::Low,
            1 => NoiseLevel::Medium,
            _ => NoiseLevel::High,
        };
        Ok(Scenario { id, family, level })
    }

    pub fn sigma(&self) -> f64 { self.level.sigma() }

    /// Draws `n` noise values for this scenario.
    pub fn sample_noise<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let sigma = self.sigma();
        let noise = match self.family {
            NoiseFamily::Gaussian => {
                (0..n)
                    .map(|_| sigma * rng.sample::<f64, _>(StandardNormal))
                    .collect()
            },
            NoiseFamily::StudentT => {
                let dist = StudentT::new(STUDENT_T_DF).map_err(|e| anyhow!("{}", e))?;
                let scale = sigma / (STUDENT_T_DF / (STUDENT_T_DF - 2.0)).sqrt();
                (0..n)
                    .map(|_| scale * dist.sample(rng))
                    .collect()
            },
            NoiseFamily::Ar1 => {
                let innovation = sigma * (1.0 - AR1_PHI * AR1_PHI).sqrt();
                let mut prev = sigma * rng.sample::<f64, _>(StandardNormal);
                let mut values = Vec::with_capacity(n);
                for idx in 0..n {
                    if idx > 0 {
                        prev = AR1_PHI * prev + innovation * rng.sample::<f64, _>(StandardNormal);
                    }
                    values.push(prev);
                }
                values
            },
        };
        Ok(noise)
    }
}

impl Display for Scenario {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "#{} {} sigma={}", self.id, self.family, self.sigma())
    }
}

/// Shape of the noiseless signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationSpec {
    /// Sample size `N`.
    pub n:           usize,
    /// Number of periods `K` of the cyclical component.
    pub periods:     usize,
    /// Trend power, 1 for a linear trend.
    pub power:       f64,
    pub amplitude:   f64,
    pub trend_scale: f64,
}

impl Default for SimulationSpec {
    fn default() -> Self {
        Self {
            n:           1600,
            periods:     266,
            power:       1.0,
            amplitude:   1.0,
            trend_scale: 2.0,
        }
    }
}

impl SimulationSpec {
    with_field_fn!(n, usize);

    with_field_fn!(periods, usize);

    with_field_fn!(power, f64);

    with_field_fn!(amplitude, f64);

    with_field_fn!(trend_scale, f64);

    pub fn new(
        n: usize,
        periods: usize,
        power: f64,
    ) -> Self {
        Self {
            n,
            periods,
            power,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.n >= 3, "Sample size must be at least 3, got {}", self.n);
        ensure!(self.periods >= 1, "Number of periods must be at least 1");
        if 2 * self.periods > self.n {
            bail!(
                "{} periods need at least {} observations, got {}",
                self.periods,
                2 * self.periods,
                self.n
            );
        }
        ensure!(
            self.power.is_finite() && self.power > 0.0,
            "Trend power must be finite and positive, got {}",
            self.power
        );
        ensure!(
            self.amplitude.is_finite() && self.amplitude >= 0.0,
            "Amplitude must be finite and non-negative, got {}",
            self.amplitude
        );
        ensure!(self.trend_scale.is_finite(), "Trend scale must be finite");
        Ok(())
    }

    pub fn trend(&self) -> Vec<f64> {
        let n = self.n as f64;
        (0..self.n)
            .map(|t| self.trend_scale * ((t + 1) as f64 / n).powf(self.power))
            .collect()
    }

    pub fn cycle(&self) -> Vec<f64> {
        let n = self.n as f64;
        let k = self.periods as f64;
        (0..self.n)
            .map(|t| self.amplitude * triangle_wave(k * t as f64 / n))
            .collect()
    }
}

/// Unit triangle wave with period 1, `-1` at integer arguments and `+1` at
/// half-integers.
pub fn triangle_wave(x: f64) -> f64 {
    let phase = x - x.floor();
    if phase < 0.5 {
        -1.0 + 4.0 * phase
    }
    else {
        3.0 - 4.0 * phase
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedSeries {
    pub scenario:       Scenario,
    pub trend:          Vec<f64>,
    pub cycle:          Vec<f64>,
    pub signal:         Vec<f64>,
    pub noise:          Vec<f64>,
    pub observed:       Vec<f64>,
    /// Extrema of the noiseless signal.
    pub turning_points: Vec<usize>,
}

/// Generates one series of `scenario` under `spec`.
pub fn generate<R: Rng + ?Sized>(
    spec: &SimulationSpec,
    scenario: Scenario,
    rng: &mut R,
) -> Result<SimulatedSeries> {
    spec.validate()?;
    let trend = spec.trend();
    let cycle = spec.cycle();
    let signal = trend
        .iter()
        .zip(cycle.iter())
        .map(|(a, b)| a + b)
        .collect::<Vec<_>>();
    let noise = scenario.sample_noise(spec.n, rng)?;
    let observed = signal
        .iter()
        .zip(noise.iter())
        .map(|(s, e)| s + e)
        .collect::<Vec<_>>();
    let turning_points = find_extrema(&signal)?
        .into_iter()
        .map(|e| e.index)
        .collect::<Vec<_>>();

    trace!(
        "Generated {} with n={}, {} true turning points",
        scenario,
        spec.n,
        turning_points.len()
    );

    Ok(SimulatedSeries {
        scenario,
        trend,
        cycle,
        signal,
        noise,
        observed,
        turning_points,
    })
}
