//! # acmr
//!
//! `acmr` decomposes a time series into a piecewise monotone trend and a
//! noise component by adjacency-constrained monotonic regression. The trend
//! is a sequence of isotonic (non-decreasing or non-increasing) pieces whose
//! breakpoints are restricted to the local extrema of the series, with the
//! breakpoints chosen by dynamic programming.
//!
//! ## Key Features
//!
//! * **Weighted isotonic regression**: pool-adjacent-violators with an
//!   incremental form giving the error of every prefix in linear time
//!   ([`isotonic_regression`], [`prefix_errors`]).
//! * **Extrema-constrained segmentation**: exact dynamic programming over
//!   the extrema, either with a known number of segments or with a BIC, AIC
//!   or manual penalty ([`Segmenter`]).
//! * **Residual diagnostics**: runs, turning point, difference sign,
//!   Mann-Kendall, Wilcoxon, Ljung-Box and two-halves tests with multiple
//!   testing correction ([`ResidualTester`]).
//! * **Simulation study**: nine noise scenarios over a trend plus cycle
//!   signal, replicated in parallel with reproducible seeding
//!   ([`run_simulation`]).
//!
//! Number of threads to be used can be configured with setting
//! `ACMR_NUM_THREADS` environment variable.
//!
//! ## Structure
//!
//! * [`data_structs`]: directions, extrema, segments and the
//!   [`Decomposition`] returned by the segmenter.
//! * [`tools`]: the solvers and the simulation drivers.
//! * [`utils`]: statistical helpers, the global thread pool and builder
//!   macros.
//!
//! ## Usage
//!
//! ```
//! use acmr::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let y = [1.0, 2.5, 2.0, 4.0, 3.0, 1.5, 1.0, 2.0, 3.5];
//!     let segmenter = Segmenter::new(
//!         SegmentationConfig::default().with_stopping(Stopping::Penalized(Penalty::Manual(0.5))),
//!     )?;
//!     let decomposition = segmenter.fit(&y)?;
//!     for segment in decomposition.segments() {
//!         println!("{}..{} {}", segment.start, segment.end, segment.direction);
//!     }
//!     assert_eq!(decomposition.residuals().len(), y.len());
//!     Ok(())
//! }
//! ```

pub mod data_structs;
pub mod exports;
pub mod prelude;
pub mod tools;
pub mod utils;

#[allow(unused_imports)]
use prelude::*;
