//! Significance tests, one per run.

use std::collections::HashMap;

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{JobHandle, RuntimeStatus, SignificanceTest, StatusUpdate};
use crate::services::run_progress::percentage;

#[derive(Debug, Clone, Default)]
pub struct SignificanceTestStore {
    tests: HashMap<Uuid, SignificanceTest>,
}

impl SignificanceTestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tests(tests: Vec<SignificanceTest>) -> Self {
        Self {
            tests: tests.into_iter().map(|t| (t.run_id, t)).collect(),
        }
    }

    pub fn get(&self, run_id: Uuid) -> Option<&SignificanceTest> {
        self.tests.get(&run_id)
    }

    fn get_mut(&mut self, run_id: Uuid) -> DomainResult<&mut SignificanceTest> {
        self.tests
            .get_mut(&run_id)
            .ok_or(DomainError::SignificanceTestNotFound(run_id))
    }

    /// Replace any previous test of the run with a fresh pending one.
    pub fn start(&mut self, run_id: Uuid) -> &SignificanceTest {
        info!(run_id = %run_id, "significance test started");
        self.tests.insert(run_id, SignificanceTest::pending(run_id));
        &self.tests[&run_id]
    }

    pub fn attach_job(&mut self, run_id: Uuid, handle: JobHandle) -> DomainResult<&SignificanceTest> {
        let test = self.get_mut(run_id)?;
        test.node_response = Some(handle);
        Ok(&*test)
    }

    /// Fold a poll tick into the run's test.
    ///
    /// Failed or errored ticks only change the status. Otherwise counters,
    /// results and status are taken from the tick and the percentage follows.
    pub fn apply_update(&mut self, run_id: Uuid, update: &StatusUpdate) -> DomainResult<&SignificanceTest> {
        let test = self.get_mut(run_id)?;
        if update.runtime_status.is_failure() {
            test.status = update.runtime_status;
            return Ok(&*test);
        }

        if let Some(progress) = update.significance() {
            if let Some(total) = progress.total_simulations.filter(|t| *t > 0) {
                test.total_simulations = total;
            }
            if let Some(done) = progress.simulation_completed {
                test.simulation_completed = done;
            }
            if progress.test_results.is_some() {
                test.test_results.clone_from(&progress.test_results);
            }
        }
        test.status = update.runtime_status;
        test.percentage = percentage(
            test.simulation_completed as f64,
            test.total_simulations.max(1) as f64,
        );
        debug!(
            run_id = %run_id,
            completed = test.simulation_completed,
            total = test.total_simulations,
            "significance progress"
        );
        Ok(&*test)
    }

    /// Submission was rejected. No retry.
    pub fn mark_failed(&mut self, run_id: Uuid) -> DomainResult<&SignificanceTest> {
        let test = self.get_mut(run_id)?;
        test.status = RuntimeStatus::Failed;
        Ok(&*test)
    }

    /// Flag a cancellation request. The status changes when a poll sees it.
    pub fn mark_canceled(&mut self, run_id: Uuid) -> DomainResult<&SignificanceTest> {
        let test = self.get_mut(run_id)?;
        test.is_canceled = true;
        Ok(&*test)
    }

    /// Drop the run's test, e.g. after the curve selection changed.
    pub fn reset(&mut self, run_id: Uuid) -> Option<SignificanceTest> {
        self.tests.remove(&run_id)
    }
}
