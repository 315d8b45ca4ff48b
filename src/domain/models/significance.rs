//! Significance test sub-run attached to an estimation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::backend::{JobHandle, TestResults};
use super::status::RuntimeStatus;

/// Simulations assumed until the backend reports its own total.
pub const DEFAULT_TOTAL_SIMULATIONS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignificanceTest {
    pub run_id: Uuid,
    pub percentage: f64,
    pub simulation_completed: u64,
    pub total_simulations: u64,
    pub status: RuntimeStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub test_results: Option<TestResults>,
    #[serde(default)]
    pub node_response: Option<JobHandle>,
    #[serde(default)]
    pub is_canceled: bool,
}

impl SignificanceTest {
    pub fn pending(run_id: Uuid) -> Self {
        Self {
            run_id,
            percentage: 0.0,
            simulation_completed: 0,
            total_simulations: DEFAULT_TOTAL_SIMULATIONS,
            status: RuntimeStatus::Pending,
            start_time: Utc::now(),
            test_results: None,
            node_response: None,
            is_canceled: false,
        }
    }

    /// Pending or running and not canceled. A new test for the run waits on it.
    pub fn is_in_flight(&self) -> bool {
        self.status.is_processing() && !self.is_canceled
    }
}
