//! Common test utilities for integration tests
//!
//! Fixtures for a mocked estimation backend and an in-memory workspace.

use std::sync::Arc;
use std::time::Duration;

use causeway::adapters::sqlite::{create_migrated_test_pool, repositories};
use causeway::domain::models::config::BackendConfig;
use causeway::infrastructure::backend::{HttpBackend, RequestRateLimiter, RetryPolicy};
use causeway::{NodeRequest, PollConfig, Workbench};
use serde_json::{json, Value};
use sqlx::SqlitePool;

pub const EXECUTE_PATH: &str = "/api/orchestrators/ExecuteNodeOrchestrator";
pub const ESTIMATE_STATUS_PATH: &str = "/api/checkinferencestatus";
pub const SIGNIFICANCE_STATUS_PATH: &str = "/api/checksignificanceteststatus";

/// Initializes tracing subscriber for test output.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Backend pointed at a mock server, with fast retries and no throttling.
///
/// `http://functions/` URLs handed out by the mock are routed back to it.
#[allow(dead_code)]
pub fn mock_backend(server_url: &str) -> HttpBackend {
    let config = BackendConfig {
        base_url: server_url.to_string(),
        local_functions_url: Some(server_url.to_string()),
        request_timeout_secs: 5,
        ..Default::default()
    };
    HttpBackend::new(
        config,
        RequestRateLimiter::new(1000.0, 100),
        RetryPolicy::new(3, 1, 2),
    )
    .expect("Failed to build backend client")
}

#[allow(dead_code)]
pub fn fast_polling() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(5),
        max_polls: Some(50),
        timeout: Some(Duration::from_secs(10)),
        max_consecutive_failures: 3,
    }
}

/// Workbench over an in-memory database and a mocked backend.
#[allow(dead_code)]
pub async fn workbench(server_url: &str) -> (Workbench, SqlitePool) {
    let pool = create_migrated_test_pool()
        .await
        .expect("Failed to create test pool");
    let workbench = reload_workbench(server_url, &pool).await;
    (workbench, pool)
}

/// Load a second workbench over the same database, as a new process would.
#[allow(dead_code)]
pub async fn reload_workbench(server_url: &str, pool: &SqlitePool) -> Workbench {
    Workbench::load(
        Arc::new(mock_backend(server_url)),
        repositories(pool),
        fast_polling(),
    )
    .await
    .expect("Failed to load workbench")
}

/// Job handle as the orchestrator returns it, using the internal host name.
#[allow(dead_code)]
pub fn job_handle_body(instance: &str) -> Value {
    json!({
        "id": instance,
        "statusQueryGetUri": format!("http://functions/runtime/instances/{instance}"),
        "terminatePostUri": format!("http://functions/runtime/instances/{instance}/terminate?reason={{text}}"),
        "sendEventPostUri": format!("http://functions/runtime/instances/{instance}/raiseEvent/{{eventName}}"),
    })
}

#[allow(dead_code)]
pub fn status_path(instance: &str) -> String {
    format!("/runtime/instances/{instance}")
}

#[allow(dead_code)]
pub fn orchestration_status_body(instance: &str, runtime_status: &str) -> Value {
    json!({
        "name": "ExecuteNodeOrchestrator",
        "instanceId": instance,
        "runtimeStatus": runtime_status,
        "output": null,
        "createdTime": "2026-10-16T09:00:00Z",
        "lastUpdatedTime": "2026-10-16T09:00:05Z",
    })
}

/// One backend result row that passed every refuter.
#[allow(dead_code)]
pub fn result_row(task_id: &str, outcome: &str, treatment: &str, effect: f64) -> Value {
    json!({
        "task_id": task_id,
        "population_name": "Adults",
        "treatment": treatment,
        "outcome": outcome,
        "causal_model": "Maximum Model",
        "estimator": "Linear Regression",
        "estimated_effect": effect,
        "population_type": "Primary",
        "treatment_type": "Primary",
        "outcome_type": "Primary",
        "refuter_placebo_treatment": 1,
        "refuter_data_subset": 1,
        "refuter_random_common_cause": 1,
        "refuter_bootstrap": 1,
        "refutation_result": 2,
    })
}

/// Inference progress for a finished run of `rows`, four refuters each.
#[allow(dead_code)]
pub fn finished_progress_body(rows: &[Value]) -> Value {
    let total = rows.len() as u64;
    json!({
        "total_results": total,
        "estimated_effect_completed": total,
        "confidence_interval_completed": 0,
        "refute_completed": total * 4,
        "partial_results": rows,
    })
}

/// Node graph submitted for an estimate.
#[allow(dead_code)]
pub fn estimate_request() -> NodeRequest {
    NodeRequest::new(
        "",
        vec![json!({
            "type": "Causal Estimate",
            "dataset": "survey.csv",
            "treatments": ["smoking"],
            "outcomes": ["blood_pressure", "heart_rate"],
        })],
    )
}
