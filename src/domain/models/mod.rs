//! Domain models for runs, specifications and backend exchanges.

pub mod backend;
pub mod config;
pub mod curve_config;
pub mod run;
pub mod significance;
pub mod specification;
pub mod status;

pub use backend::{
    EstimateProgress, JobHandle, NodeRequest, OrchestrationStatus, OrchestratorType,
    ProgressReport, Significance, SignificanceProgress, StatusType, StatusUpdate, TestResults,
};
pub use config::Config;
pub use curve_config::SpecificationCurveConfig;
pub use run::{RunHistory, RunParameters, RunStatus, RunTime};
pub use significance::{SignificanceTest, DEFAULT_TOTAL_SIMULATIONS};
pub use specification::{
    coerce_number, row_to_specification, rows_to_specifications, CovariateBalance,
    RawSpecificationRow, Refuter, Specification, REFUTER_FIELDS,
};
pub use status::{CausalityLevel, PhaseStatus, RefutationResult, RefutationType, RuntimeStatus};
