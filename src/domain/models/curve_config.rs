//! User selection state of the specification curve.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationCurveConfig {
    /// Specification ids the user rejected. Scoped to the active run.
    #[serde(default)]
    pub inactive_specifications: Vec<String>,
    #[serde(default = "default_true")]
    pub shap_ticks: bool,
    #[serde(default)]
    pub confidence_interval_ticks: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for SpecificationCurveConfig {
    fn default() -> Self {
        Self {
            inactive_specifications: Vec::new(),
            shap_ticks: default_true(),
            confidence_interval_ticks: false,
        }
    }
}
