//! Workbench: the session-wide state behind every command.
//!
//! Owns the run history, the significance tests and the curve selection,
//! keeps them in sync with the repositories, and drives backend jobs through
//! the [`Orchestrator`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    rows_to_specifications, JobHandle, NodeRequest, OrchestratorType, RunHistory, RunParameters,
    SignificanceTest, Specification, SpecificationCurveConfig, StatusType, StatusUpdate,
};
use crate::domain::ports::{
    OrchestratorBackend, RunRepository, SignificanceTestRepository, WorkspaceRepository,
};
use crate::services::covariate_balance::validate_specifications;
use crate::services::orchestrator::{
    Orchestrator, OrchestratorError, OrchestratorHandler, OrchestratorResult, PollConfig,
};
use crate::services::outcome_groups::build_outcome_groups;
use crate::services::run_history_store::RunHistoryStore;
use crate::services::significance_tracker::SignificanceTestStore;
use crate::services::specification_curve;

const EVENT_CAPACITY: usize = 64;

/// State change published to subscribers such as progress bars.
#[derive(Debug, Clone)]
pub enum WorkbenchEvent {
    RunUpdated(RunHistory),
    SignificanceUpdated(SignificanceTest),
}

/// Persistence ports the workbench writes through.
#[derive(Clone)]
pub struct Repositories {
    pub runs: Arc<dyn RunRepository>,
    pub significance: Arc<dyn SignificanceTestRepository>,
    pub workspace: Arc<dyn WorkspaceRepository>,
}

pub struct Workbench {
    backend: Arc<dyn OrchestratorBackend>,
    repos: Repositories,
    poll: PollConfig,
    session_id: RwLock<String>,
    runs: Arc<RwLock<RunHistoryStore>>,
    tests: Arc<RwLock<SignificanceTestStore>>,
    curve: RwLock<SpecificationCurveConfig>,
    events: broadcast::Sender<WorkbenchEvent>,
}

impl Workbench {
    /// Load persisted state. Creates a session id on first use.
    pub async fn load(
        backend: Arc<dyn OrchestratorBackend>,
        repos: Repositories,
        poll: PollConfig,
    ) -> DomainResult<Self> {
        let session_id = match repos.workspace.session_id().await? {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                repos.workspace.set_session_id(&id).await?;
                info!(session_id = %id, "new session created");
                id
            }
        };
        let (runs, tests, curve) = futures::try_join!(
            repos.runs.list(),
            repos.significance.list(),
            repos.workspace.curve_config(),
        )?;
        let runs = RunHistoryStore::from_runs(runs);
        let tests = SignificanceTestStore::from_tests(tests);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            backend,
            repos,
            poll,
            session_id: RwLock::new(session_id),
            runs: Arc::new(RwLock::new(runs)),
            tests: Arc::new(RwLock::new(tests)),
            curve: RwLock::new(curve),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkbenchEvent> {
        self.events.subscribe()
    }

    pub async fn session_id(&self) -> String {
        self.session_id.read().await.clone()
    }

    /// Start a new session. Existing runs keep their original session id.
    pub async fn reset_session(&self) -> DomainResult<String> {
        let id = Uuid::new_v4().to_string();
        self.repos.workspace.set_session_id(&id).await?;
        *self.session_id.write().await = id.clone();
        info!(session_id = %id, "session reset");
        Ok(id)
    }

    // ---- runs ----

    pub async fn runs(&self) -> Vec<RunHistory> {
        self.runs.read().await.runs().to_vec()
    }

    pub async fn active_run(&self) -> Option<RunHistory> {
        self.runs.read().await.active_run().cloned()
    }

    /// Resolve a user supplied run reference.
    ///
    /// `None` is the active run. Otherwise a run number, a full id or an id
    /// prefix.
    pub async fn resolve_run(&self, selector: Option<&str>) -> DomainResult<RunHistory> {
        let store = self.runs.read().await;
        let Some(selector) = selector.map(str::trim) else {
            return store.active_run().cloned().ok_or(DomainError::NoActiveRun);
        };
        if let Ok(number) = selector.parse::<u32>() {
            return store
                .get_by_number(number)
                .cloned()
                .ok_or(DomainError::RunNumberNotFound(number));
        }
        if let Ok(id) = Uuid::parse_str(selector) {
            return store.get(id).cloned().ok_or(DomainError::RunNotFound(id));
        }
        let mut matches = store
            .runs()
            .iter()
            .filter(|r| r.id.to_string().starts_with(selector));
        match (matches.next(), matches.next()) {
            (Some(run), None) => Ok(run.clone()),
            (Some(_), Some(_)) => Err(DomainError::ValidationFailed(format!(
                "run id prefix '{selector}' is ambiguous"
            ))),
            _ => Err(DomainError::ValidationFailed(format!("unknown run '{selector}'"))),
        }
    }

    /// Number of specifications the backend would execute for `request`.
    pub async fn spec_count(&self, request: &NodeRequest) -> OrchestratorResult<u64> {
        let request = request.clone().with_session(self.session_id().await);
        self.backend
            .number_of_executions(&request)
            .await
            .map_err(OrchestratorError::submit)
    }

    /// Create a run and submit it. Polls to the end unless `detach` is set.
    ///
    /// Refused while another run is still processing and has not been
    /// canceled. A rejected submission is stored on the run as its error
    /// before the error is returned.
    #[instrument(skip(self, request, params))]
    pub async fn run_estimate(
        &self,
        request: &NodeRequest,
        mut params: RunParameters,
        detach: bool,
    ) -> OrchestratorResult<RunHistory> {
        if let Some(running) = self.runs.read().await.processing_run() {
            return Err(DomainError::RunStillProcessing(running.run_number).into());
        }
        if params.total_executions == 0 {
            params.total_executions = self.spec_count(request).await?;
        }
        let session_id = self.session_id().await;
        let run = self.runs.write().await.create_run(&session_id, &params).clone();
        self.repos.runs.insert(&run).await?;
        self.repos.runs.set_active(run.id).await?;
        self.reset_curve().await?;
        self.publish_run(&run);

        let orchestrator = self.run_orchestrator(run.id, &session_id);
        let kind = if params.has_confidence_interval {
            OrchestratorType::ConfidenceInterval
        } else {
            OrchestratorType::Estimator
        };

        let outcome = if detach {
            orchestrator.submit(request).await.map(|_| ())
        } else {
            orchestrator.execute(request, kind).await.map(|_| ())
        };
        if let Err(OrchestratorError::Submit { message, .. }) = &outcome {
            let failed = self
                .runs
                .write()
                .await
                .fail_submission(run.id, message.clone(), Utc::now())?
                .clone();
            self.repos.runs.update(&failed).await?;
            self.publish_run(&failed);
        }
        outcome?;
        Ok(self.run(run.id).await?)
    }

    /// Resume polling a run by its stored job handle. Only the active run is
    /// polled.
    #[instrument(skip(self))]
    pub async fn watch_run(&self, run_id: Uuid) -> OrchestratorResult<RunHistory> {
        let run = self.run(run_id).await?;
        if !run.is_active {
            return Err(DomainError::RunNotActive(run.run_number).into());
        }
        let handle = run
            .node_response
            .clone()
            .ok_or(DomainError::MissingJobHandle(run_id))?;
        let orchestrator = self.run_orchestrator(run_id, &run.session_id);
        orchestrator.resume(handle, StatusType::Estimate).await?;
        Ok(self.run(run_id).await?)
    }

    /// Ask the backend to stop a run. The run ends when a poll sees it.
    pub async fn cancel_run(&self, run_id: Uuid) -> OrchestratorResult<RunHistory> {
        let run = self.run(run_id).await?;
        let handle = run
            .node_response
            .clone()
            .ok_or(DomainError::MissingJobHandle(run_id))?;
        let orchestrator = self.run_orchestrator(run_id, &run.session_id);
        orchestrator.attach(handle).await;
        orchestrator.cancel().await?;
        Ok(self.run(run_id).await?)
    }

    /// Make a run the active one. The curve selection belongs to a single
    /// run, so it is reset.
    pub async fn set_run_as_default(&self, run_id: Uuid) -> DomainResult<RunHistory> {
        let run = self.runs.write().await.set_run_as_default(run_id)?.clone();
        self.repos.runs.set_active(run_id).await?;
        self.reset_curve().await?;
        Ok(run)
    }

    async fn run(&self, run_id: Uuid) -> DomainResult<RunHistory> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or(DomainError::RunNotFound(run_id))
    }

    fn run_orchestrator(&self, run_id: Uuid, session_id: &str) -> Orchestrator {
        let tracker = Arc::new(RunTracker {
            run_id,
            runs: Arc::clone(&self.runs),
            repo: Arc::clone(&self.repos.runs),
            events: self.events.clone(),
        });
        Orchestrator::new(Arc::clone(&self.backend), tracker, self.poll.clone(), session_id)
    }

    fn publish_run(&self, run: &RunHistory) {
        let _ = self.events.send(WorkbenchEvent::RunUpdated(run.clone()));
    }

    // ---- specification curve ----

    /// Specifications of a run, validated and grouped, ready to plot.
    pub async fn specifications(&self, run_id: Uuid) -> DomainResult<Vec<Specification>> {
        let run = self.run(run_id).await?;
        Ok(specifications_of(&run))
    }

    pub async fn curve_config(&self) -> SpecificationCurveConfig {
        self.curve.read().await.clone()
    }

    /// Reject or restore every specification with this id on the active run.
    /// Returns whether the id is now on.
    pub async fn toggle_specification(&self, id: &str) -> DomainResult<bool> {
        let run = self.active_run().await.ok_or(DomainError::NoActiveRun)?;
        if !specifications_of(&run).iter().any(|s| s.id == id) {
            return Err(DomainError::SpecificationNotFound(id.to_string()));
        }
        let mut config = self.curve_config().await;
        let on = specification_curve::toggle_reject_estimate(&mut config, id);
        self.save_curve(config).await?;
        self.clear_significance(run.id).await?;
        Ok(on)
    }

    pub async fn set_shap_ticks(&self, checked: bool) -> DomainResult<SpecificationCurveConfig> {
        let run = self.active_run().await;
        let mut config = self.curve_config().await;
        specification_curve::set_shap_ticks(&mut config, run.as_ref(), checked);
        self.save_curve(config.clone()).await?;
        Ok(config)
    }

    pub async fn set_confidence_interval_ticks(
        &self,
        checked: bool,
    ) -> DomainResult<SpecificationCurveConfig> {
        let run = self.active_run().await;
        let mut config = self.curve_config().await;
        specification_curve::set_confidence_interval_ticks(&mut config, run.as_ref(), checked);
        self.save_curve(config.clone()).await?;
        Ok(config)
    }

    /// Fetch a result file the backend stored for this session.
    pub async fn download_specifications(&self, file_name: &str) -> OrchestratorResult<Vec<Specification>> {
        let session_id = self.session_id().await;
        let rows = self
            .backend
            .download_results(&session_id, file_name)
            .await
            .map_err(OrchestratorError::submit)?;
        Ok(build_outcome_groups(rows_to_specifications(&rows)))
    }

    async fn reset_curve(&self) -> DomainResult<()> {
        self.save_curve(SpecificationCurveConfig::default()).await
    }

    async fn save_curve(&self, config: SpecificationCurveConfig) -> DomainResult<()> {
        self.repos.workspace.save_curve_config(&config).await?;
        *self.curve.write().await = config;
        Ok(())
    }

    // ---- significance ----

    pub async fn significance_test(&self, run_id: Uuid) -> Option<SignificanceTest> {
        self.tests.read().await.get(run_id).cloned()
    }

    /// Test the active specifications of a run against the null distribution.
    ///
    /// The curve selection belongs to the active run, so another run is
    /// tested with every specification on.
    #[instrument(skip(self))]
    pub async fn run_significance(&self, run_id: Uuid) -> OrchestratorResult<SignificanceTest> {
        let run = self.run(run_id).await?;
        if run.result.is_empty() {
            return Err(DomainError::MissingResults(run_id).into());
        }
        if self
            .significance_test(run_id)
            .await
            .is_some_and(|t| t.is_in_flight())
        {
            return Err(DomainError::SignificanceTestInFlight(run_id).into());
        }
        let specs = specifications_of(&run);
        let config = if run.is_active {
            self.curve_config().await
        } else {
            SpecificationCurveConfig::default()
        };
        let task_ids = specification_curve::active_task_ids(&specs, &config);

        let test = self.tests.write().await.start(run_id).clone();
        self.repos.significance.upsert(&test).await?;
        self.publish_test(&test);

        let orchestrator = self.significance_orchestrator(run_id, &run.session_id);
        let request = NodeRequest::significance_test(run.session_id.clone(), &task_ids);
        match orchestrator.execute(&request, OrchestratorType::SignificanceTest).await {
            Ok(_) => {}
            Err(err @ OrchestratorError::Submit { .. }) => {
                warn!(run_id = %run_id, error = %err, "significance test rejected");
                let failed = self.tests.write().await.mark_failed(run_id)?.clone();
                self.repos.significance.upsert(&failed).await?;
                self.publish_test(&failed);
                return Err(err);
            }
            Err(err) => return Err(err),
        }
        Ok(self.stored_test(run_id).await?)
    }

    /// Resume polling a significance test by its stored job handle.
    #[instrument(skip(self))]
    pub async fn watch_significance(&self, run_id: Uuid) -> OrchestratorResult<SignificanceTest> {
        let (run, handle) = self.significance_job(run_id).await?;
        let orchestrator = self.significance_orchestrator(run_id, &run.session_id);
        orchestrator.resume(handle, StatusType::Significance).await?;
        Ok(self.stored_test(run_id).await?)
    }

    /// Ask the backend to stop a significance test. It ends when a poll sees it.
    pub async fn cancel_significance(&self, run_id: Uuid) -> OrchestratorResult<SignificanceTest> {
        let (run, handle) = self.significance_job(run_id).await?;
        let orchestrator = self.significance_orchestrator(run_id, &run.session_id);
        orchestrator.attach(handle).await;
        orchestrator.cancel().await?;
        Ok(self.stored_test(run_id).await?)
    }

    async fn significance_job(&self, run_id: Uuid) -> DomainResult<(RunHistory, JobHandle)> {
        let run = self.run(run_id).await?;
        let handle = self
            .stored_test(run_id)
            .await?
            .node_response
            .ok_or(DomainError::SignificanceJobMissing(run_id))?;
        Ok((run, handle))
    }

    async fn stored_test(&self, run_id: Uuid) -> DomainResult<SignificanceTest> {
        self.significance_test(run_id)
            .await
            .ok_or(DomainError::SignificanceTestNotFound(run_id))
    }

    fn significance_orchestrator(&self, run_id: Uuid, session_id: &str) -> Orchestrator {
        let tracker = Arc::new(SignificanceTracker {
            run_id,
            tests: Arc::clone(&self.tests),
            repo: Arc::clone(&self.repos.significance),
            events: self.events.clone(),
        });
        Orchestrator::new(Arc::clone(&self.backend), tracker, self.poll.clone(), session_id)
    }

    async fn clear_significance(&self, run_id: Uuid) -> DomainResult<()> {
        if self.tests.write().await.reset(run_id).is_some() {
            self.repos.significance.delete(run_id).await?;
            info!(run_id = %run_id, "significance test cleared");
        }
        Ok(())
    }

    fn publish_test(&self, test: &SignificanceTest) {
        let _ = self.events.send(WorkbenchEvent::SignificanceUpdated(test.clone()));
    }
}

/// Map, validate and group a run's raw result rows.
pub fn specifications_of(run: &RunHistory) -> Vec<Specification> {
    build_outcome_groups(validate_specifications(rows_to_specifications(&run.result), run))
}

/// Folds estimate ticks into one run and persists each change.
struct RunTracker {
    run_id: Uuid,
    runs: Arc<RwLock<RunHistoryStore>>,
    repo: Arc<dyn RunRepository>,
    events: broadcast::Sender<WorkbenchEvent>,
}

impl RunTracker {
    async fn save(&self, run: RunHistory) -> DomainResult<()> {
        self.repo.update(&run).await?;
        let _ = self.events.send(WorkbenchEvent::RunUpdated(run));
        Ok(())
    }
}

#[async_trait]
impl OrchestratorHandler for RunTracker {
    async fn on_start(&self, handle: &JobHandle) -> DomainResult<()> {
        let run = self.runs.write().await.attach_job(self.run_id, handle.clone())?.clone();
        self.save(run).await
    }

    async fn on_update(&self, update: &StatusUpdate) -> DomainResult<()> {
        let run = self
            .runs
            .write()
            .await
            .apply_status(self.run_id, update, Utc::now())?
            .clone();
        self.save(run).await
    }

    async fn on_cancel(&self) -> DomainResult<()> {
        let run = self.runs.write().await.mark_canceled(self.run_id)?.clone();
        self.save(run).await
    }
}

/// Folds significance ticks into the run's test and persists each change.
struct SignificanceTracker {
    run_id: Uuid,
    tests: Arc<RwLock<SignificanceTestStore>>,
    repo: Arc<dyn SignificanceTestRepository>,
    events: broadcast::Sender<WorkbenchEvent>,
}

impl SignificanceTracker {
    async fn save(&self, test: SignificanceTest) -> DomainResult<()> {
        self.repo.upsert(&test).await?;
        let _ = self.events.send(WorkbenchEvent::SignificanceUpdated(test));
        Ok(())
    }
}

#[async_trait]
impl OrchestratorHandler for SignificanceTracker {
    async fn on_start(&self, handle: &JobHandle) -> DomainResult<()> {
        let test = self.tests.write().await.attach_job(self.run_id, handle.clone())?.clone();
        self.save(test).await
    }

    async fn on_update(&self, update: &StatusUpdate) -> DomainResult<()> {
        let test = self.tests.write().await.apply_update(self.run_id, update)?.clone();
        self.save(test).await
    }

    async fn on_cancel(&self) -> DomainResult<()> {
        let test = self.tests.write().await.mark_canceled(self.run_id)?.clone();
        self.save(test).await
    }
}
