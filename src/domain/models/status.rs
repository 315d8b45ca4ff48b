//! Status vocabularies shared by runs, orchestrations and significance tests.

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

/// Runtime status reported by the backend orchestrator.
///
/// Backend strings are matched case-insensitively. `ContinuedAsNew` is folded
/// into `Running` and `Canceled` into `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RuntimeStatus {
    #[default]
    Idle,
    Pending,
    Running,
    Processing,
    InProgress,
    Terminating,
    Completed,
    Failed,
    Error,
    Terminated,
}

impl RuntimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Processing => "Processing",
            Self::InProgress => "InProgress",
            Self::Terminating => "Terminating",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Error => "Error",
            Self::Terminated => "Terminated",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "pending" => Some(Self::Pending),
            "running" | "continuedasnew" => Some(Self::Running),
            "processing" => Some(Self::Processing),
            "inprogress" | "in_progress" => Some(Self::InProgress),
            "terminating" => Some(Self::Terminating),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "error" => Some(Self::Error),
            "terminated" | "canceled" | "cancelled" => Some(Self::Terminated),
            _ => None,
        }
    }

    /// Still moving: the poller keeps ticking while this holds.
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Running | Self::Processing | Self::InProgress | Self::Terminating
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Error | Self::Terminated
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl std::fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for RuntimeStatus {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, DomainError> {
        Self::from_str(&value).ok_or(DomainError::UnknownStatus(value))
    }
}

impl From<RuntimeStatus> for String {
    fn from(status: RuntimeStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Progress of one phase of an estimation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PhaseStatus {
    #[default]
    Idle,
    Running,
    Completed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Completed => "Completed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a population, treatment or outcome is the primary one of the study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CausalityLevel {
    Primary,
    #[default]
    Secondary,
}

impl CausalityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "Primary",
            Self::Secondary => "Secondary",
        }
    }

    /// Anything other than "Primary" counts as secondary.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("primary") {
            Self::Primary
        } else {
            Self::Secondary
        }
    }
}

/// How thoroughly refuters are simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefutationType {
    #[default]
    Quick,
    Full,
}

impl RefutationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Full => "full",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "quick" | "quick_refutation" => Some(Self::Quick),
            "full" | "full_refutation" => Some(Self::Full),
            _ => None,
        }
    }

    /// Number of simulations each refuter runs.
    pub const fn simulations(&self) -> u32 {
        match self {
            Self::Quick => 10,
            Self::Full => 100,
        }
    }
}

/// Combined outcome of all refuters for one specification, as coded by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum RefutationResult {
    /// Not every refuter produced a value.
    Incomplete,
    /// A non-sensitivity refuter failed.
    FailedCritical,
    /// Only sensitivity refuters failed.
    FailedNonCritical,
    PassedAll,
}

impl RefutationResult {
    pub const fn code(&self) -> i8 {
        match self {
            Self::Incomplete => -1,
            Self::FailedCritical => 0,
            Self::FailedNonCritical => 1,
            Self::PassedAll => 2,
        }
    }

    pub fn from_code(code: f64) -> Option<Self> {
        if code == -1.0 {
            Some(Self::Incomplete)
        } else if code == 0.0 {
            Some(Self::FailedCritical)
        } else if code == 1.0 {
            Some(Self::FailedNonCritical)
        } else if code == 2.0 {
            Some(Self::PassedAll)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::FailedCritical => "failed_critical",
            Self::FailedNonCritical => "failed_non_critical",
            Self::PassedAll => "passed_all",
        }
    }
}

impl TryFrom<i8> for RefutationResult {
    type Error = DomainError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        Self::from_code(f64::from(value)).ok_or_else(|| {
            DomainError::ValidationFailed(format!("Unknown refutation result code: {value}"))
        })
    }
}

impl From<RefutationResult> for i8 {
    fn from(result: RefutationResult) -> Self {
        result.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_status_parsing_is_case_insensitive() {
        assert_eq!(RuntimeStatus::from_str("RUNNING"), Some(RuntimeStatus::Running));
        assert_eq!(RuntimeStatus::from_str("completed"), Some(RuntimeStatus::Completed));
        assert_eq!(RuntimeStatus::from_str("in_progress"), Some(RuntimeStatus::InProgress));
        assert_eq!(RuntimeStatus::from_str("ContinuedAsNew"), Some(RuntimeStatus::Running));
        assert_eq!(RuntimeStatus::from_str("Canceled"), Some(RuntimeStatus::Terminated));
        assert_eq!(RuntimeStatus::from_str("exploded"), None);
    }

    #[test]
    fn test_runtime_status_classification() {
        for status in [
            RuntimeStatus::Pending,
            RuntimeStatus::Running,
            RuntimeStatus::Processing,
            RuntimeStatus::InProgress,
            RuntimeStatus::Terminating,
        ] {
            assert!(status.is_processing(), "{status} should be processing");
            assert!(!status.is_terminal());
        }
        for status in [
            RuntimeStatus::Completed,
            RuntimeStatus::Failed,
            RuntimeStatus::Error,
            RuntimeStatus::Terminated,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
            assert!(!status.is_processing());
        }
        assert!(!RuntimeStatus::Idle.is_processing());
        assert!(!RuntimeStatus::Idle.is_terminal());
    }

    #[test]
    fn test_runtime_status_serde() {
        let status: RuntimeStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, RuntimeStatus::Failed);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"Failed\"");
        assert!(serde_json::from_str::<RuntimeStatus>("\"bogus\"").is_err());
    }

    #[test]
    fn test_runtime_status_default_and_try_from() {
        assert_eq!(RuntimeStatus::default(), RuntimeStatus::Idle);
        assert_eq!(
            RuntimeStatus::try_from("Terminating".to_string()).unwrap(),
            RuntimeStatus::Terminating
        );
        let err = RuntimeStatus::try_from("bogus".to_string()).unwrap_err();
        assert!(matches!(err, DomainError::UnknownStatus(s) if s == "bogus"));
    }

    #[test]
    fn test_causality_level_from_label() {
        assert_eq!(CausalityLevel::from_label("Primary"), CausalityLevel::Primary);
        assert_eq!(CausalityLevel::from_label("Secondary"), CausalityLevel::Secondary);
        assert_eq!(CausalityLevel::from_label("Exposure"), CausalityLevel::Secondary);
        assert_eq!(CausalityLevel::from_label(""), CausalityLevel::Secondary);
    }

    #[test]
    fn test_refutation_type_simulations() {
        assert_eq!(RefutationType::Quick.simulations(), 10);
        assert_eq!(RefutationType::Full.simulations(), 100);
        assert_eq!(RefutationType::from_str("FULL"), Some(RefutationType::Full));
    }

    #[test]
    fn test_refutation_result_codes() {
        assert_eq!(RefutationResult::from_code(-1.0), Some(RefutationResult::Incomplete));
        assert_eq!(RefutationResult::from_code(0.0), Some(RefutationResult::FailedCritical));
        assert_eq!(RefutationResult::from_code(2.0), Some(RefutationResult::PassedAll));
        assert_eq!(RefutationResult::from_code(f64::NAN), None);
        assert_eq!(RefutationResult::from_code(3.0), None);
        assert_eq!(serde_json::to_string(&RefutationResult::FailedNonCritical).unwrap(), "1");
    }
}
