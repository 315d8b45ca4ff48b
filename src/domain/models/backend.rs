//! Request and response shapes exchanged with the estimation backend.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::specification::RawSpecificationRow;
use super::status::RuntimeStatus;

/// Handle returned when a job is submitted; everything needed to poll or cancel it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    /// Orchestration instance id.
    pub id: String,
    pub status_query_get_uri: String,
    pub terminate_post_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_event_post_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purge_history_delete_uri: Option<String>,
}

/// Kind of orchestration being submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorType {
    Estimator,
    ConfidenceInterval,
    SignificanceTest,
}

impl OrchestratorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Estimator => "Estimator",
            Self::ConfidenceInterval => "ConfidenceInterval",
            Self::SignificanceTest => "SignificanceTest",
        }
    }

    /// Progress endpoint family used while polling this kind of job.
    pub fn status_type(&self) -> StatusType {
        match self {
            Self::Estimator | Self::ConfidenceInterval => StatusType::Estimate,
            Self::SignificanceTest => StatusType::Significance,
        }
    }
}

/// Which progress endpoint to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusType {
    Estimate,
    Significance,
}

impl StatusType {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Estimate => "checkinferencestatus",
            Self::Significance => "checksignificanceteststatus",
        }
    }
}

/// Node graph submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRequest {
    #[serde(default)]
    pub session_id: String,
    pub nodes: Vec<Value>,
}

impl NodeRequest {
    pub fn new(session_id: impl Into<String>, nodes: Vec<Value>) -> Self {
        Self {
            session_id: session_id.into(),
            nodes,
        }
    }

    /// Significance test over the given specification task ids.
    pub fn significance_test(session_id: impl Into<String>, task_ids: &[String]) -> Self {
        Self::new(
            session_id,
            vec![json!({ "type": "Significance Test", "spec_ids": task_ids })],
        )
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

/// Durable orchestration status from `statusQueryGetUri`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationStatus {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub instance_id: String,
    pub runtime_status: RuntimeStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub last_updated_time: Option<String>,
}

/// Counters reported by the inference status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimateProgress {
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub estimated_effect_completed: Option<u64>,
    #[serde(default)]
    pub confidence_interval_completed: Option<u64>,
    /// Raw count across all refuters of all specifications.
    #[serde(default)]
    pub refute_completed: Option<u64>,
    #[serde(default)]
    pub shap_completed: Option<u64>,
    #[serde(default)]
    pub failed: Option<u64>,
    #[serde(default)]
    pub partial_results: Option<Vec<RawSpecificationRow>>,
}

/// Whether a significance test rejected the null hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "bool")]
pub enum Significance {
    Significant,
    NotSignificant,
}

impl TryFrom<Value> for Significance {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Bool(true) => Ok(Self::Significant),
            Value::Bool(false) => Ok(Self::NotSignificant),
            Value::Number(n) if n.as_f64() == Some(1.0) => Ok(Self::Significant),
            Value::Number(n) if n.as_f64() == Some(0.0) => Ok(Self::NotSignificant),
            _ => Err(format!("invalid significance value: {value}")),
        }
    }
}

impl From<Significance> for bool {
    fn from(value: Significance) -> Self {
        matches!(value, Significance::Significant)
    }
}

/// Result of a finished significance test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResults {
    /// Bucketed p-value label such as `p<0.001` or `p>0.05`.
    pub p_value: String,
    pub significance: Significance,
}

/// Counters reported by the significance status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignificanceProgress {
    #[serde(default)]
    pub simulation_completed: Option<u64>,
    #[serde(default)]
    pub total_simulations: Option<u64>,
    #[serde(default)]
    pub test_results: Option<TestResults>,
}

/// Progress payload, by endpoint family.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressReport {
    Estimate(EstimateProgress),
    Significance(SignificanceProgress),
}

impl ProgressReport {
    pub fn as_estimate(&self) -> Option<&EstimateProgress> {
        match self {
            Self::Estimate(p) => Some(p),
            Self::Significance(_) => None,
        }
    }

    pub fn as_significance(&self) -> Option<&SignificanceProgress> {
        match self {
            Self::Significance(p) => Some(p),
            Self::Estimate(_) => None,
        }
    }
}

/// One poll tick: orchestration status merged with the progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub instance_id: String,
    pub runtime_status: RuntimeStatus,
    pub output: Option<Value>,
    pub progress: Option<ProgressReport>,
}

impl StatusUpdate {
    pub fn estimate(&self) -> Option<&EstimateProgress> {
        self.progress.as_ref().and_then(ProgressReport::as_estimate)
    }

    pub fn significance(&self) -> Option<&SignificanceProgress> {
        self.progress.as_ref().and_then(ProgressReport::as_significance)
    }
}
