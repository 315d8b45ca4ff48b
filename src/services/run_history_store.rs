//! In-memory run history with a single active run.
//!
//! The store is the only place that flips `is_active`. Every mutation works on
//! the whole collection so "clear the others, set this one" happens in one step.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{JobHandle, RunHistory, RunParameters, RuntimeStatus, StatusUpdate};
use crate::services::run_progress::{compute_run_status, ProgressContext};

#[derive(Debug, Clone, Default)]
pub struct RunHistoryStore {
    runs: Vec<RunHistory>,
}

impl RunHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted runs.
    ///
    /// Runs are ordered by run number. If more than one is flagged active the
    /// highest run number wins.
    pub fn from_runs(mut runs: Vec<RunHistory>) -> Self {
        runs.sort_by_key(|r| r.run_number);
        let actives = runs.iter().filter(|r| r.is_active).count();
        if actives > 1 {
            warn!(actives, "multiple active runs found, keeping the latest");
            let keep = runs.iter().rev().find(|r| r.is_active).map(|r| r.id);
            for run in &mut runs {
                run.is_active = Some(run.id) == keep;
            }
        }
        Self { runs }
    }

    pub fn runs(&self) -> &[RunHistory] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&RunHistory> {
        self.runs.iter().find(|r| r.id == id)
    }

    pub fn get_by_number(&self, run_number: u32) -> Option<&RunHistory> {
        self.runs.iter().find(|r| r.run_number == run_number)
    }

    fn get_mut(&mut self, id: Uuid) -> DomainResult<&mut RunHistory> {
        self.runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(DomainError::RunNotFound(id))
    }

    /// The run the curve and significance tests operate on.
    pub fn active_run(&self) -> Option<&RunHistory> {
        self.runs.iter().find(|r| r.is_active)
    }

    /// First run still pending, processing or running with no cancel sent.
    pub fn processing_run(&self) -> Option<&RunHistory> {
        self.runs.iter().find(|r| r.is_processing() && !r.is_canceled)
    }

    /// Append a new active run and deactivate the rest.
    pub fn create_run(&mut self, session_id: &str, params: &RunParameters) -> &RunHistory {
        let run_number = self.runs.iter().map(|r| r.run_number).max().unwrap_or(0) + 1;
        let run = RunHistory::new(run_number, session_id, params);
        let id = run.id;
        for existing in &mut self.runs {
            existing.is_active = false;
        }
        self.runs.push(run);
        info!(run_id = %id, run_number, "run created");
        &self.runs[self.runs.len() - 1]
    }

    /// Record the backend job a run is waiting on.
    pub fn attach_job(&mut self, run_id: Uuid, handle: JobHandle) -> DomainResult<&RunHistory> {
        let run = self.get_mut(run_id)?;
        debug!(run_id = %run_id, instance_id = %handle.id, "job attached");
        run.node_response = Some(handle);
        Ok(&*run)
    }

    /// Make `run_id` the only active run.
    pub fn set_run_as_default(&mut self, run_id: Uuid) -> DomainResult<&RunHistory> {
        if self.get(run_id).is_none() {
            return Err(DomainError::RunNotFound(run_id));
        }
        for run in &mut self.runs {
            run.is_active = run.id == run_id;
        }
        info!(run_id = %run_id, "run set as default");
        self.get_mut(run_id).map(|r| &*r)
    }

    /// Fold a poll tick into a run.
    ///
    /// Every tick is applied in arrival order; a tick whose progress check
    /// failed reads as Failed and the next good tick replaces it. The poller
    /// stops at the first terminal orchestration status, so that is the state
    /// a run ends in. A tick with zero progress is merged over the existing
    /// status so counters are not lost. Partial results replace the stored
    /// result unless the tick failed.
    pub fn apply_status(
        &mut self,
        run_id: Uuid,
        update: &StatusUpdate,
        now: DateTime<Utc>,
    ) -> DomainResult<&RunHistory> {
        let run = self.get_mut(run_id)?;
        debug!(
            run_id = %run_id,
            previous = %run.status.status,
            incoming = %update.runtime_status,
            "applying status tick"
        );

        let ctx = ProgressContext::from(&*run);
        let mut status = compute_run_status(update, ctx, run.status.time.start, now);
        if status.percentage == 0.0 {
            status = status.merged_over(&run.status);
        }

        if !update.runtime_status.is_failure() {
            if let Some(rows) = update.estimate().and_then(|p| p.partial_results.clone()) {
                run.result = rows;
            }
        }

        if status.status.is_terminal() {
            info!(run_id = %run_id, status = %status.status, "run finished");
        }
        run.status = status;
        Ok(&*run)
    }

    /// Flag a cancellation request. The state only changes when a poll sees it.
    pub fn mark_canceled(&mut self, run_id: Uuid) -> DomainResult<&RunHistory> {
        let run = self.get_mut(run_id)?;
        run.is_canceled = true;
        Ok(&*run)
    }

    /// Store an error raised before the backend ever accepted the job.
    pub fn fail_submission(
        &mut self,
        run_id: Uuid,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<&RunHistory> {
        let run = self.get_mut(run_id)?;
        run.status.status = RuntimeStatus::Failed;
        run.status.error = Some(message.into());
        run.status.time.end = Some(now);
        Ok(&*run)
    }
}
