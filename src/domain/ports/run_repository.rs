//! Persistence ports for runs, significance tests and workspace state.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{RunHistory, SignificanceTest, SpecificationCurveConfig};

/// Repository interface for run history persistence.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Insert a new run, inactive. Activation goes through `set_active`.
    async fn insert(&self, run: &RunHistory) -> DomainResult<()>;

    /// Update an existing run. Leaves the active flag alone.
    async fn update(&self, run: &RunHistory) -> DomainResult<()>;

    /// Get a run by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<RunHistory>>;

    /// All runs ordered by run number.
    async fn list(&self) -> DomainResult<Vec<RunHistory>>;

    /// Make `id` the only active run, in one statement.
    async fn set_active(&self, id: Uuid) -> DomainResult<()>;
}

/// Repository interface for significance tests, keyed by run.
#[async_trait]
pub trait SignificanceTestRepository: Send + Sync {
    async fn upsert(&self, test: &SignificanceTest) -> DomainResult<()>;

    async fn get(&self, run_id: Uuid) -> DomainResult<Option<SignificanceTest>>;

    async fn list(&self) -> DomainResult<Vec<SignificanceTest>>;

    /// Remove the test for a run. Missing tests are not an error.
    async fn delete(&self, run_id: Uuid) -> DomainResult<()>;
}

/// Workspace-wide singletons: session id and curve selection.
#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    async fn session_id(&self) -> DomainResult<Option<String>>;

    async fn set_session_id(&self, session_id: &str) -> DomainResult<()>;

    async fn curve_config(&self) -> DomainResult<SpecificationCurveConfig>;

    async fn save_curve_config(&self, config: &SpecificationCurveConfig) -> DomainResult<()>;
}
