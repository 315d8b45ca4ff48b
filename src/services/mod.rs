pub mod covariate_balance;
pub mod orchestrator;
pub mod outcome_groups;
pub mod run_history_store;
pub mod run_progress;
pub mod significance_tracker;
pub mod specification_curve;
pub mod workbench;

pub use orchestrator::{
    Orchestrator, OrchestratorError, OrchestratorHandler, OrchestratorResult, PollConfig,
};
pub use outcome_groups::build_outcome_groups;
pub use run_history_store::RunHistoryStore;
pub use significance_tracker::SignificanceTestStore;
pub use workbench::{Repositories, Workbench, WorkbenchEvent};
