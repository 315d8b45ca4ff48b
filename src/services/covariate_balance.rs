//! Covariate-balance checks applied on top of backend refutation results.

use crate::domain::models::{RefutationResult, RunHistory, Specification};

/// A threshold of 0 means the check is off.
fn threshold(value: Option<f64>) -> Option<f64> {
    value.filter(|t| *t != 0.0 && !t.is_nan())
}

/// Confounders whose adjusted balance, in percent, exceeds the threshold.
pub fn failed_confounders(spec: &Specification, confounder_threshold: Option<f64>) -> Vec<String> {
    let (Some(balance), Some(limit)) = (&spec.covariate_balance, threshold(confounder_threshold))
    else {
        return Vec::new();
    };
    balance
        .adjusted
        .iter()
        .filter(|(_, adjusted)| limit - *adjusted * 100.0 < 0.0)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Downgrade a specification to `FailedCritical` when too many of its
/// confounders are out of balance.
///
/// Leaves the specification untouched unless both thresholds are set and
/// it carries adjusted balances.
pub fn validate_specification(
    mut spec: Specification,
    confounder_threshold: Option<f64>,
    proportion_threshold: Option<f64>,
) -> Specification {
    let (Some(_), Some(proportion)) = (threshold(confounder_threshold), threshold(proportion_threshold))
    else {
        return spec;
    };
    let confounders = spec
        .covariate_balance
        .as_ref()
        .map_or(0, |b| b.adjusted.len());
    if confounders == 0 {
        return spec;
    }

    let failed = failed_confounders(&spec, confounder_threshold).len();
    let share = failed as f64 / confounders as f64 * 100.0;
    let passed = spec.refutation_result == Some(RefutationResult::PassedAll) && share < proportion;
    spec.refutation_result = Some(if passed {
        RefutationResult::PassedAll
    } else {
        RefutationResult::FailedCritical
    });
    spec
}

/// Validate a run's specifications with the thresholds it was started with.
pub fn validate_specifications(specs: Vec<Specification>, run: &RunHistory) -> Vec<Specification> {
    specs
        .into_iter()
        .map(|s| validate_specification(s, run.confounder_threshold, run.proportion_threshold))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CovariateBalance;

    fn balanced(adjusted: &[(&str, f64)], result: RefutationResult) -> Specification {
        Specification {
            refutation_result: Some(result),
            covariate_balance: Some(CovariateBalance {
                adjusted: adjusted.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
                unadjusted: Default::default(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_failed_confounders_compare_in_percent() {
        let spec = balanced(&[("age", 0.05), ("income", 0.2)], RefutationResult::PassedAll);
        assert_eq!(failed_confounders(&spec, Some(10.0)), vec!["income".to_string()]);
        assert!(failed_confounders(&spec, None).is_empty());
        assert!(failed_confounders(&spec, Some(0.0)).is_empty());
    }

    #[test]
    fn test_share_below_proportion_keeps_passed_all() {
        let spec = balanced(
            &[("a", 0.01), ("b", 0.01), ("c", 0.01), ("d", 0.5)],
            RefutationResult::PassedAll,
        );
        let kept = validate_specification(spec.clone(), Some(10.0), Some(30.0));
        assert_eq!(kept.refutation_result, Some(RefutationResult::PassedAll));

        let rejected = validate_specification(spec, Some(10.0), Some(25.0));
        assert_eq!(rejected.refutation_result, Some(RefutationResult::FailedCritical));
    }

    #[test]
    fn test_non_passing_specification_becomes_failed_critical() {
        let spec = balanced(&[("a", 0.01)], RefutationResult::FailedNonCritical);
        let validated = validate_specification(spec, Some(10.0), Some(50.0));
        assert_eq!(validated.refutation_result, Some(RefutationResult::FailedCritical));
    }

    #[test]
    fn test_missing_thresholds_or_balance_leave_spec_alone() {
        let spec = balanced(&[("a", 0.9)], RefutationResult::PassedAll);
        assert_eq!(validate_specification(spec.clone(), None, Some(10.0)), spec);
        assert_eq!(validate_specification(spec.clone(), Some(10.0), Some(0.0)), spec);

        let plain = Specification {
            refutation_result: Some(RefutationResult::PassedAll),
            ..Default::default()
        };
        assert_eq!(validate_specification(plain.clone(), Some(10.0), Some(10.0)), plain);
    }
}
