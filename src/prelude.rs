pub use crate::data_structs::{
    Decomposition,
    Direction,
    Extremum,
    ExtremumKind,
    Segment,
};
pub use crate::tools::extrema::{
    find_extrema,
    ExtremaFinder,
};
pub use crate::tools::isotonic::{
    isotonic_regression,
    prefix_errors,
    Block,
    IsotonicFit,
};
pub use crate::tools::residuals::{
    Correction,
    ResidualReport,
    ResidualTest,
    ResidualTester,
    TestResult,
};
pub use crate::tools::segmentation::{
    Penalty,
    SegmentationConfig,
    Segmenter,
    Stopping,
};
pub use crate::tools::simulate::{
    generate,
    NoiseFamily,
    NoiseLevel,
    Scenario,
    SimulatedSeries,
    SimulationSpec,
};
pub use crate::tools::simulation::{
    run_residual_tests,
    run_simulation,
    ReplicationMetrics,
    ResidualTable,
    ScenarioSummary,
    SimulationConfig,
    SimulationResults,
};
