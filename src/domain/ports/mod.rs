//! Port trait definitions
//!
//! Async trait interfaces implemented by adapters:
//! - OrchestratorBackend: the remote estimation backend
//! - RunRepository / SignificanceTestRepository / WorkspaceRepository: persistence

pub mod orchestrator_backend;
pub mod run_repository;

pub use orchestrator_backend::OrchestratorBackend;
pub use run_repository::{RunRepository, SignificanceTestRepository, WorkspaceRepository};
