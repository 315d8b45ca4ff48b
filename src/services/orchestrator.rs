//! Orchestration poller.
//!
//! Submits a node graph to the backend, then polls it on a fixed cadence. Each
//! tick waits for three things together: the durable orchestration status, the
//! progress counters, and the poll interval. Ticks never overlap. The loop ends
//! when the orchestration leaves the processing states.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{BackendError, BackendResult, DomainError, DomainResult};
use crate::domain::models::config::PollingConfig;
use crate::domain::models::{
    JobHandle, NodeRequest, OrchestrationStatus, OrchestratorType, ProgressReport, RuntimeStatus,
    StatusType, StatusUpdate,
};
use crate::domain::ports::OrchestratorBackend;

/// Reason sent to the backend when the user cancels.
pub const CANCEL_REASON: &str = "User canceled the run";

/// Shown when a submission fails without a backend message.
pub const UNKNOWN_SUBMIT_ERROR: &str = "Unknown error, please contact the system admin.";

/// Poll loop settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Minimum time between ticks.
    pub interval: Duration,
    /// Stop with a timeout error after this many ticks.
    pub max_polls: Option<u64>,
    /// Stop with a timeout error after this much wall time.
    pub timeout: Option<Duration>,
    /// Stop after this many failed orchestration status calls in a row.
    pub max_consecutive_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_polls: None,
            timeout: None,
            max_consecutive_failures: 5,
        }
    }
}

impl PollConfig {
    /// Create config with custom interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }
}

impl From<&PollingConfig> for PollConfig {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_polls: config.max_polls,
            timeout: config.timeout_secs.map(Duration::from_secs),
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }
}

/// Errors that end a poll loop.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{message}")]
    Submit {
        message: String,
        #[source]
        source: BackendError,
    },

    #[error("Polling gave up after {polls} polls ({elapsed:?})")]
    PollTimeout { polls: u64, elapsed: Duration },

    #[error("Status check failed {failures} times in a row: {source}")]
    TooManyFailures {
        failures: u32,
        #[source]
        source: BackendError,
    },

    #[error("No job has been submitted")]
    NotStarted,

    #[error("Failed to terminate job: {0}")]
    Terminate(#[source] BackendError),

    #[error(transparent)]
    Handler(#[from] DomainError),
}

impl OrchestratorError {
    /// Wrap a rejected submission, keeping the backend's own message when it sent one.
    pub fn submit(source: BackendError) -> Self {
        let message = source
            .backend_message()
            .map_or_else(|| UNKNOWN_SUBMIT_ERROR.to_string(), str::to_string);
        Self::Submit { message, source }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Callbacks fired by the poller. Handler errors stop the loop.
#[async_trait]
pub trait OrchestratorHandler: Send + Sync {
    /// Job accepted, before the first tick.
    async fn on_start(&self, _handle: &JobHandle) -> DomainResult<()> {
        Ok(())
    }

    /// Every tick, in order.
    async fn on_update(&self, update: &StatusUpdate) -> DomainResult<()>;

    /// Orchestration left the processing states.
    async fn on_complete(&self, _update: &StatusUpdate) -> DomainResult<()> {
        Ok(())
    }

    /// Cancellation sent to the backend.
    async fn on_cancel(&self) -> DomainResult<()> {
        Ok(())
    }
}

/// Drives one backend job from submission to a terminal status.
pub struct Orchestrator {
    backend: Arc<dyn OrchestratorBackend>,
    handler: Arc<dyn OrchestratorHandler>,
    config: PollConfig,
    session_id: String,
    handle: RwLock<Option<JobHandle>>,
    canceled: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn OrchestratorBackend>,
        handler: Arc<dyn OrchestratorHandler>,
        config: PollConfig,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            handler,
            config,
            session_id: session_id.into(),
            handle: RwLock::new(None),
            canceled: AtomicBool::new(false),
        }
    }

    /// Handle of the job being polled, once submitted.
    pub async fn handle(&self) -> Option<JobHandle> {
        self.handle.read().await.clone()
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Submit and poll to completion. Returns the final tick.
    #[instrument(skip(self, request), fields(session = %self.session_id, kind = orchestrator_type.as_str()))]
    pub async fn execute(
        &self,
        request: &NodeRequest,
        orchestrator_type: OrchestratorType,
    ) -> OrchestratorResult<StatusUpdate> {
        let handle = self.submit(request).await?;
        self.poll(&handle, orchestrator_type.status_type()).await
    }

    /// Submit without polling. `on_start` still fires so the handle is kept.
    pub async fn submit(&self, request: &NodeRequest) -> OrchestratorResult<JobHandle> {
        let request = request.clone().with_session(self.session_id.clone());
        let handle = self
            .backend
            .execute_node(&request)
            .await
            .map_err(OrchestratorError::submit)?;
        info!(instance_id = %handle.id, "job submitted");

        *self.handle.write().await = Some(handle.clone());
        self.handler.on_start(&handle).await?;
        Ok(handle)
    }

    /// Adopt a job submitted earlier so it can be canceled.
    pub async fn attach(&self, handle: JobHandle) {
        *self.handle.write().await = Some(handle);
    }

    /// Resume polling a job submitted earlier.
    #[instrument(skip(self, handle), fields(instance_id = %handle.id))]
    pub async fn resume(
        &self,
        handle: JobHandle,
        status_type: StatusType,
    ) -> OrchestratorResult<StatusUpdate> {
        *self.handle.write().await = Some(handle.clone());
        self.poll(&handle, status_type).await
    }

    /// Ask the backend to terminate the job. The run only ends when a tick sees it.
    pub async fn cancel(&self) -> OrchestratorResult<()> {
        let handle = self.handle().await.ok_or(OrchestratorError::NotStarted)?;
        self.canceled.store(true, Ordering::Release);
        info!(instance_id = %handle.id, "canceling job");
        self.backend
            .terminate(&handle, CANCEL_REASON)
            .await
            .map_err(OrchestratorError::Terminate)?;
        self.handler.on_cancel().await?;
        Ok(())
    }

    async fn poll(&self, handle: &JobHandle, status_type: StatusType) -> OrchestratorResult<StatusUpdate> {
        let started = Instant::now();
        let mut polls: u64 = 0;
        let mut failures: u32 = 0;

        loop {
            let over_polls = self.config.max_polls.is_some_and(|max| polls >= max);
            let over_time = self.config.timeout.is_some_and(|t| started.elapsed() >= t);
            if over_polls || over_time {
                warn!(polls, "polling limit reached");
                return Err(OrchestratorError::PollTimeout {
                    polls,
                    elapsed: started.elapsed(),
                });
            }
            polls += 1;

            let (status, progress, ()) = tokio::join!(
                self.backend.orchestration_status(handle),
                self.backend.progress(&self.session_id, &handle.id, status_type),
                sleep(self.config.interval),
            );

            let status = match status {
                Ok(status) => {
                    failures = 0;
                    status
                }
                Err(err) => {
                    failures += 1;
                    warn!(failures, error = %err, "orchestration status check failed");
                    if failures >= self.config.max_consecutive_failures {
                        return Err(OrchestratorError::TooManyFailures { failures, source: err });
                    }
                    continue;
                }
            };

            let processing = status.runtime_status.is_processing();
            let update = merge_tick(status, progress);
            debug!(poll = polls, status = %update.runtime_status, "tick");
            self.handler.on_update(&update).await?;

            if !processing {
                info!(status = %update.runtime_status, polls, "job finished");
                self.handler.on_complete(&update).await?;
                return Ok(update);
            }
        }
    }
}

/// Combine the durable status with the progress call.
///
/// A failed progress call turns the tick into a Failed tick carrying the error
/// text; the loop still follows the durable status.
fn merge_tick(status: OrchestrationStatus, progress: BackendResult<ProgressReport>) -> StatusUpdate {
    match progress {
        Ok(report) => StatusUpdate {
            instance_id: status.instance_id,
            runtime_status: status.runtime_status,
            output: status.output,
            progress: Some(report),
        },
        Err(err) => {
            warn!(error = %err, "progress check failed");
            StatusUpdate {
                instance_id: status.instance_id,
                runtime_status: RuntimeStatus::Failed,
                output: Some(Value::String(err.to_string())),
                progress: None,
            }
        }
    }
}
