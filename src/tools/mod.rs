//! Solvers and experiment drivers of the acmr crate.
//!
//! Key submodules:
//!
//! - [`extrema`]: local maxima and minima of a series, the candidate
//!   breakpoints of the segmentation.
//! - [`isotonic`]: weighted pool-adjacent-violators regression and its
//!   incremental prefix form.
//! - [`segmentation`]: dynamic programming over extrema producing the
//!   piecewise monotone decomposition.
//! - [`residuals`]: nonparametric tests for leftover structure in the
//!   residuals.
//! - [`simulate`] and [`simulation`]: synthetic data and the Monte Carlo
//!   study built on it.
pub mod extrema;
pub mod isotonic;
pub mod residuals;
pub mod segmentation;
pub mod simulate;
pub mod simulation;
