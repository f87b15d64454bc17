//! Core value types shared by the solvers: monotonicity directions,
//! extrema, fitted segments and the resulting decomposition.

mod enums;
mod segment;

pub use enums::{
    Direction,
    ExtremumKind,
};
pub use segment::{
    Decomposition,
    Extremum,
    Segment,
};
