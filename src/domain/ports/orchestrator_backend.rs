//! Estimation backend port.

use async_trait::async_trait;

use crate::domain::errors::BackendResult;
use crate::domain::models::{
    JobHandle, NodeRequest, OrchestrationStatus, ProgressReport, RawSpecificationRow, StatusType,
};

/// Remote collaborator that executes estimation and significance jobs.
#[async_trait]
pub trait OrchestratorBackend: Send + Sync {
    /// Submit a node graph; returns the handle used to poll and cancel it.
    async fn execute_node(&self, request: &NodeRequest) -> BackendResult<JobHandle>;

    /// Durable orchestration status behind `statusQueryGetUri`.
    async fn orchestration_status(&self, handle: &JobHandle) -> BackendResult<OrchestrationStatus>;

    /// Progress counters for an orchestration instance.
    async fn progress(
        &self,
        session_id: &str,
        instance_id: &str,
        status_type: StatusType,
    ) -> BackendResult<ProgressReport>;

    /// Ask the backend to stop a job. Best effort.
    async fn terminate(&self, handle: &JobHandle, reason: &str) -> BackendResult<()>;

    /// How many specifications the request would expand to.
    async fn number_of_executions(&self, request: &NodeRequest) -> BackendResult<u64>;

    /// Fetch a result file the backend produced for this session.
    async fn download_results(
        &self,
        session_id: &str,
        file_name: &str,
    ) -> BackendResult<Vec<RawSpecificationRow>>;
}
