//! Read-side helpers for the specification curve.
//!
//! Everything here is a pure function over specifications, the curve
//! selection and the default run.

use chrono::{DateTime, Utc};

use crate::domain::models::{
    RefutationResult, Refuter, RunHistory, RuntimeStatus, Specification,
    SpecificationCurveConfig, REFUTER_FIELDS,
};

/// Ids of specifications that failed a critical refutation.
pub fn failed_refutation_ids(specs: &[Specification]) -> Vec<String> {
    specs
        .iter()
        .filter(|s| s.refutation_result == Some(RefutationResult::FailedCritical))
        .map(|s| s.id.clone())
        .collect()
}

/// Refuters that produced a number for this specification.
pub fn refutation_keys(spec: &Specification) -> Vec<Refuter> {
    REFUTER_FIELDS
        .into_iter()
        .filter(|r| spec.refuter(*r).is_some_and(|v| !v.is_nan()))
        .collect()
}

/// Refuters whose result is 0.
pub fn failed_refutations(spec: &Specification) -> Vec<Refuter> {
    refutation_keys(spec)
        .into_iter()
        .filter(|r| spec.refuter(*r) == Some(0.0))
        .collect()
}

/// `"passed/total"` over the refuters that ran. `"0/0"` without a selection.
pub fn refutation_numbers(spec: Option<&Specification>) -> String {
    let Some(spec) = spec else {
        return "0/0".to_string();
    };
    let total = refutation_keys(spec).len();
    let failed = failed_refutations(spec).len();
    format!("{}/{}", total - failed, total)
}

pub fn is_specification_on(config: &SpecificationCurveConfig, id: &str) -> bool {
    !config.inactive_specifications.iter().any(|x| x == id)
}

/// Flip the rejected state of every specification sharing `id`.
pub fn toggle_reject_estimate(config: &mut SpecificationCurveConfig, id: &str) -> bool {
    let was_on = is_specification_on(config, id);
    config.inactive_specifications.retain(|x| x != id);
    if was_on {
        config.inactive_specifications.push(id.to_string());
    }
    !was_on
}

/// Specifications that count towards the curve: not rejected by the user
/// and not failing a critical refutation.
pub fn active_specifications<'a>(
    specs: &'a [Specification],
    config: &SpecificationCurveConfig,
) -> Vec<&'a Specification> {
    let failed = failed_refutation_ids(specs);
    specs
        .iter()
        .filter(|s| is_specification_on(config, &s.id) && !failed.contains(&s.id))
        .collect()
}

pub fn active_effects(specs: &[Specification], config: &SpecificationCurveConfig) -> Vec<f64> {
    active_specifications(specs, config)
        .into_iter()
        .map(|s| s.estimated_effect)
        .collect()
}

pub fn active_task_ids(specs: &[Specification], config: &SpecificationCurveConfig) -> Vec<String> {
    active_specifications(specs, config)
        .into_iter()
        .map(|s| s.task_id.clone())
        .collect()
}

/// SHAP ticks need a completed default run. No run means nothing to disable.
pub fn is_shap_disabled(run: Option<&RunHistory>) -> bool {
    run.is_some_and(|r| r.status.status != RuntimeStatus::Completed)
}

pub fn is_confidence_interval_disabled(run: Option<&RunHistory>) -> bool {
    run.is_some_and(|r| !r.has_confidence_interval)
}

pub fn set_shap_ticks(config: &mut SpecificationCurveConfig, run: Option<&RunHistory>, checked: bool) {
    config.shap_ticks = !is_shap_disabled(run) && checked;
}

pub fn set_confidence_interval_ticks(
    config: &mut SpecificationCurveConfig,
    run: Option<&RunHistory>,
    checked: bool,
) {
    config.confidence_interval_ticks = !is_confidence_interval_disabled(run) && checked;
}

/// Median, 0 for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let half = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[half]
    } else {
        (sorted[half - 1] + sorted[half]) / 2.0
    }
}

/// `"{minutes}min {seconds:02}s"`
pub fn format_elapsed(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let seconds = (end - start).num_seconds().max(0);
    format!("{}min {:02}s", seconds / 60, seconds % 60)
}
