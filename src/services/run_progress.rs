//! Derives a run's progress snapshot from one poll tick.
//!
//! A run moves through up to three phases: estimators, then confidence
//! intervals (when requested), then refuters. Each phase is complete when its
//! counter reaches the number of specifications. The reported percentage is
//! that of the first phase not yet complete.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::models::{
    EstimateProgress, PhaseStatus, RunHistory, RunStatus, RunTime, RuntimeStatus, StatusUpdate,
};

/// Shown when a failed run left no error text behind.
pub const UNDEFINED_RUN_ERROR: &str = "Undefined error. Please, execute the run again.";

/// Run settings that shape how progress counters are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressContext {
    pub has_confidence_interval: bool,
    /// Refuters per specification; raw refuter counts are divided by this.
    pub refutation_count: u32,
}

impl From<&RunHistory> for ProgressContext {
    fn from(run: &RunHistory) -> Self {
        Self {
            has_confidence_interval: run.has_confidence_interval,
            refutation_count: run.refutation_count,
        }
    }
}

/// `done / total` as a percentage with two decimals, capped at 100.
///
/// A zero total or a NaN ratio yields 0.
pub fn percentage(done: f64, total: f64) -> f64 {
    let ratio = 100.0 * done / total;
    if !ratio.is_finite() {
        return 0.0;
    }
    ((ratio * 100.0).round() / 100.0).clamp(0.0, 100.0)
}

/// Refuter completions counted once per specification.
pub fn normalized_refute_completed(raw: u64, refutation_count: u32) -> u64 {
    if refutation_count == 0 {
        raw
    } else {
        raw / u64::from(refutation_count)
    }
}

fn phase_done(done: u64, total: u64) -> bool {
    done > 0 && done == total
}

/// Phase statuses for the three phases, in order.
pub fn phase_statuses(progress: &EstimateProgress, ctx: ProgressContext) -> [PhaseStatus; 3] {
    let total = progress.total_results.unwrap_or(0);
    let estimated = progress.estimated_effect_completed.unwrap_or(0);
    let ci = progress.confidence_interval_completed.unwrap_or(0);
    let refuted = normalized_refute_completed(
        progress.refute_completed.unwrap_or(0),
        ctx.refutation_count,
    );

    let estimators = if phase_done(estimated, total) {
        PhaseStatus::Completed
    } else {
        PhaseStatus::Running
    };

    let confidence_intervals = if phase_done(ci, total) {
        PhaseStatus::Completed
    } else if estimators.is_completed() {
        PhaseStatus::Running
    } else {
        PhaseStatus::Idle
    };

    let gate = if ctx.has_confidence_interval {
        confidence_intervals
    } else {
        estimators
    };
    let refuters = if phase_done(refuted, total) {
        PhaseStatus::Completed
    } else if gate.is_completed() {
        PhaseStatus::Running
    } else {
        PhaseStatus::Idle
    };

    [estimators, confidence_intervals, refuters]
}

/// Percentage of the first incomplete phase, 100 once all are done.
pub fn run_percentage(progress: &EstimateProgress, ctx: ProgressContext) -> f64 {
    let [estimators, confidence_intervals, refuters] = phase_statuses(progress, ctx);
    let total = progress.total_results.unwrap_or(0) as f64;

    if !estimators.is_completed() {
        percentage(progress.estimated_effect_completed.unwrap_or(0) as f64, total)
    } else if ctx.has_confidence_interval && !confidence_intervals.is_completed() {
        percentage(progress.confidence_interval_completed.unwrap_or(0) as f64, total)
    } else if !refuters.is_completed() {
        let refuted = normalized_refute_completed(
            progress.refute_completed.unwrap_or(0),
            ctx.refutation_count,
        );
        percentage(refuted as f64, total)
    } else {
        100.0
    }
}

fn render_output(output: &Value) -> Option<String> {
    match output {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn row_text(row: &crate::domain::models::RawSpecificationRow, key: &str) -> Option<String> {
    row.get(key).and_then(render_output)
}

/// Best available error text for a failed tick, `None` unless it failed.
///
/// Looks at the first failed partial result (traceback, then error), then the
/// orchestration output, then falls back to a generic message.
pub fn find_run_error(update: &StatusUpdate) -> Option<String> {
    if update.runtime_status != RuntimeStatus::Failed {
        return None;
    }

    let failed_row = update
        .estimate()
        .and_then(|p| p.partial_results.as_ref())
        .and_then(|rows| {
            rows.iter().find(|row| {
                row.get("state")
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.eq_ignore_ascii_case("failed"))
            })
        });

    if let Some(row) = failed_row {
        if let Some(text) = row_text(row, "traceback").or_else(|| row_text(row, "error")) {
            return Some(text);
        }
    }

    Some(
        update
            .output
            .as_ref()
            .and_then(render_output)
            .unwrap_or_else(|| UNDEFINED_RUN_ERROR.to_string()),
    )
}

/// Progress snapshot for one tick. `start` is carried over from the run.
pub fn compute_run_status(
    update: &StatusUpdate,
    ctx: ProgressContext,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> RunStatus {
    let empty = EstimateProgress::default();
    let progress = update.estimate().unwrap_or(&empty);
    let [estimators, confidence_intervals, refuters] = phase_statuses(progress, ctx);

    let counter = |done: Option<u64>, scale: u64| {
        progress
            .total_results
            .filter(|total| *total > 0)
            .map(|total| format!("{}/{}", done.unwrap_or(0), total * scale))
    };

    RunStatus {
        status: update.runtime_status,
        percentage: if update.estimate().is_some() {
            run_percentage(progress, ctx)
        } else {
            0.0
        },
        error: find_run_error(update),
        time: RunTime {
            start,
            end: Some(now),
        },
        estimated_effect_completed: counter(progress.estimated_effect_completed, 1),
        confidence_interval_completed: counter(progress.confidence_interval_completed, 1),
        refute_completed: counter(
            progress.refute_completed,
            u64::from(ctx.refutation_count.max(1)),
        ),
        estimators,
        confidence_intervals,
        refuters,
    }
}
