//! Run history: one estimation run and its progress snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::backend::JobHandle;
use super::specification::{RawSpecificationRow, REFUTER_FIELDS};
use super::status::{PhaseStatus, RefutationType, RuntimeStatus};

/// Start and end of a run as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTime {
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Progress snapshot of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub status: RuntimeStatus,
    /// 0-100, two decimals.
    pub percentage: f64,
    #[serde(default)]
    pub error: Option<String>,
    pub time: RunTime,
    /// `"done/total"`
    #[serde(default)]
    pub estimated_effect_completed: Option<String>,
    #[serde(default)]
    pub confidence_interval_completed: Option<String>,
    #[serde(default)]
    pub refute_completed: Option<String>,
    #[serde(default)]
    pub estimators: PhaseStatus,
    #[serde(default)]
    pub confidence_intervals: PhaseStatus,
    #[serde(default)]
    pub refuters: PhaseStatus,
}

impl RunStatus {
    /// Freshly submitted run with `total` specifications.
    pub fn initial(total: u64, refutation_count: u32, start: DateTime<Utc>) -> Self {
        Self {
            status: RuntimeStatus::Running,
            percentage: 0.0,
            error: None,
            time: RunTime { start, end: None },
            estimated_effect_completed: Some(format!("0/{total}")),
            confidence_interval_completed: Some(format!("0/{total}")),
            refute_completed: Some(format!("0/{}", total * u64::from(refutation_count))),
            estimators: PhaseStatus::Running,
            confidence_intervals: PhaseStatus::Idle,
            refuters: PhaseStatus::Idle,
        }
    }

    /// Fill progress counters this snapshot lacks from `previous`.
    ///
    /// Used when a tick reports no progress at all, so a blank poll never
    /// wipes counters that an earlier tick reported.
    pub fn merged_over(mut self, previous: &RunStatus) -> Self {
        if self.estimated_effect_completed.is_none() {
            self.estimated_effect_completed
                .clone_from(&previous.estimated_effect_completed);
        }
        if self.confidence_interval_completed.is_none() {
            self.confidence_interval_completed
                .clone_from(&previous.confidence_interval_completed);
        }
        if self.refute_completed.is_none() {
            self.refute_completed.clone_from(&previous.refute_completed);
        }
        self
    }
}

/// Everything chosen by the user when a run is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunParameters {
    pub has_confidence_interval: bool,
    pub refutation_type: RefutationType,
    /// Refuters per specification.
    pub refutation_count: u32,
    pub confounder_threshold: Option<f64>,
    pub proportion_threshold: Option<f64>,
    /// Number of specifications the backend said it would execute.
    pub total_executions: u64,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            has_confidence_interval: false,
            refutation_type: RefutationType::default(),
            refutation_count: REFUTER_FIELDS.len() as u32,
            confounder_threshold: None,
            proportion_threshold: None,
            total_executions: 0,
        }
    }
}

/// One estimation run. Runs are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHistory {
    pub id: Uuid,
    pub run_number: u32,
    pub is_active: bool,
    #[serde(default)]
    pub is_canceled: bool,
    pub status: RunStatus,
    #[serde(default)]
    pub session_id: String,
    pub has_confidence_interval: bool,
    pub refutation_type: RefutationType,
    pub refutation_count: u32,
    #[serde(default)]
    pub confounder_threshold: Option<f64>,
    #[serde(default)]
    pub proportion_threshold: Option<f64>,
    #[serde(default)]
    pub result: Vec<RawSpecificationRow>,
    #[serde(default)]
    pub node_response: Option<JobHandle>,
    pub created_at: DateTime<Utc>,
}

impl RunHistory {
    pub fn new(run_number: u32, session_id: impl Into<String>, params: &RunParameters) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            run_number,
            is_active: true,
            is_canceled: false,
            status: RunStatus::initial(params.total_executions, params.refutation_count, now),
            session_id: session_id.into(),
            has_confidence_interval: params.has_confidence_interval,
            refutation_type: params.refutation_type,
            refutation_count: params.refutation_count,
            confounder_threshold: params.confounder_threshold,
            proportion_threshold: params.proportion_threshold,
            result: Vec::new(),
            node_response: None,
            created_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.status.is_terminal()
    }

    pub fn is_processing(&self) -> bool {
        self.status.status.is_processing()
    }

    /// Short id for listings.
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }
}
