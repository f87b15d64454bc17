use std::fmt::Display;
use std::str::FromStr;

use serde::{
    Deserialize,
    Serialize,
};

/// Monotonicity constraint of a fitted segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increasing,
    Decreasing,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Increasing => Direction::Decreasing,
            Direction::Decreasing => Direction::Increasing,
        }
    }

    /// Sign applied to values so that the fit becomes non-decreasing.
    pub(crate) fn sign(self) -> f64 {
        match self {
            Direction::Increasing => 1.0,
            Direction::Decreasing => -1.0,
        }
    }

    /// Returns `true` if `next` may follow `prev` under this direction.
    pub fn admits(
        self,
        prev: f64,
        next: f64,
    ) -> bool {
        match self {
            Direction::Increasing => next >= prev,
            Direction::Decreasing => next <= prev,
        }
    }
}

impl Display for Direction {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Direction::Increasing => write!(f, "increasing"),
            Direction::Decreasing => write!(f, "decreasing"),
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "increasing" | "inc" | "up" => Ok(Direction::Increasing),
            "decreasing" | "dec" | "down" => Ok(Direction::Decreasing),
            other => anyhow::bail!("Unknown direction: {}", other),
        }
    }
}

/// Kind of a local extremum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremumKind {
    Maximum,
    Minimum,
}

impl ExtremumKind {
    /// Direction of the segment that starts at an extremum of this kind.
    pub fn outgoing(self) -> Direction {
        match self {
            ExtremumKind::Minimum => Direction::Increasing,
            ExtremumKind::Maximum => Direction::Decreasing,
        }
    }

    /// Kind of extremum that terminates a segment of `direction`.
    pub fn terminating(direction: Direction) -> Self {
        match direction {
            Direction::Increasing => ExtremumKind::Maximum,
            Direction::Decreasing => ExtremumKind::Minimum,
        }
    }
}

impl Display for ExtremumKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ExtremumKind::Maximum => write!(f, "max"),
            ExtremumKind::Minimum => write!(f, "min"),
        }
    }
}
