//! End-to-end workbench flows against a mocked backend and in-memory SQLite.

mod common;

use causeway::domain::models::{RunParameters, RuntimeStatus, Significance};
use causeway::services::WorkbenchEvent;
use causeway::{DomainError, OrchestratorError};
use common::{
    estimate_request, finished_progress_body, job_handle_body, orchestration_status_body, reload_workbench,
    result_row, setup_test_logging, status_path, workbench, ESTIMATE_STATUS_PATH, EXECUTE_PATH, SIGNIFICANCE_STATUS_PATH,
};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

fn rows() -> Vec<Value> {
    vec![
        result_row("t1", "blood_pressure", "smoking", 0.4),
        result_row("t2", "heart_rate", "smoking", -0.1),
        result_row("t3", "blood_pressure", "alcohol", 0.2),
    ]
}

fn params() -> RunParameters {
    RunParameters {
        total_executions: 3,
        ..RunParameters::default()
    }
}

/// Submission, status and progress mocks for one estimate job.
async fn mock_estimate_job(server: &mut ServerGuard, instance: &str, runtime_status: &str) -> Vec<Mock> {
    let submit = server
        .mock("POST", EXECUTE_PATH)
        .match_body(Matcher::Regex("Causal Estimate".to_string()))
        .with_status(202)
        .with_body(job_handle_body(instance).to_string())
        .create_async()
        .await;
    let status = server
        .mock("GET", status_path(instance).as_str())
        .with_status(200)
        .with_body(orchestration_status_body(instance, runtime_status).to_string())
        .create_async()
        .await;
    let progress = server
        .mock("GET", ESTIMATE_STATUS_PATH)
        .match_query(Matcher::UrlEncoded("instance".into(), instance.into()))
        .with_status(200)
        .with_body(finished_progress_body(&rows()).to_string())
        .create_async()
        .await;
    vec![submit, status, progress]
}

#[tokio::test]
async fn test_run_estimate_completes_and_persists() {
    setup_test_logging();
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-1", "Completed").await;
    let (workbench, pool) = workbench(&server.url()).await;
    let mut events = workbench.subscribe();

    let run = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();

    assert_eq!(run.run_number, 1);
    assert!(run.is_active);
    assert_eq!(run.status.status, RuntimeStatus::Completed);
    assert!((run.status.percentage - 100.0).abs() < f64::EPSILON);
    assert_eq!(run.result.len(), 3);
    assert_eq!(run.node_response.as_ref().map(|h| h.id.as_str()), Some("inst-1"));
    assert_eq!(run.session_id, workbench.session_id().await);

    let specs = workbench.specifications(run.id).await.unwrap();
    let ids: Vec<&str> = specs.iter().map(|s| s.id.as_str()).collect();
    let tasks: Vec<&str> = specs.iter().map(|s| s.task_id.as_str()).collect();
    assert_eq!(ids, vec!["A1", "B2", "B1"]);
    assert_eq!(tasks, vec!["t2", "t3", "t1"]);

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        if let WorkbenchEvent::RunUpdated(updated) = event {
            last = Some(updated.status.status);
        }
    }
    assert_eq!(last, Some(RuntimeStatus::Completed));

    let reloaded = reload_workbench(&server.url(), &pool).await;
    assert_eq!(reloaded.session_id().await, workbench.session_id().await);
    let active = reloaded.active_run().await.unwrap();
    assert_eq!(active.id, run.id);
    assert_eq!(active.status.status, RuntimeStatus::Completed);
    assert_eq!(active.result.len(), 3);
}

#[tokio::test]
async fn test_only_one_run_is_active() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-2", "Completed").await;
    let (workbench, pool) = workbench(&server.url()).await;

    let first = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();
    let second = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();

    assert_eq!(second.run_number, 2);
    let runs = workbench.runs().await;
    assert_eq!(runs.iter().filter(|r| r.is_active).count(), 1);
    assert_eq!(workbench.active_run().await.unwrap().id, second.id);

    workbench.set_run_as_default(first.id).await.unwrap();
    assert_eq!(workbench.resolve_run(None).await.unwrap().id, first.id);
    assert_eq!(workbench.resolve_run(Some("2")).await.unwrap().id, second.id);
    let prefix = second.id.to_string()[..9].to_string();
    assert_eq!(workbench.resolve_run(Some(&prefix)).await.unwrap().id, second.id);

    let reloaded = reload_workbench(&server.url(), &pool).await;
    let active: Vec<_> = reloaded.runs().await.into_iter().filter(|r| r.is_active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, first.id);
}

#[tokio::test]
async fn test_significance_test_and_toggle() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-3", "Completed").await;
    let submit = server
        .mock("POST", EXECUTE_PATH)
        .match_body(Matcher::Regex(r#""spec_ids":\["t2","t3","t1"\]"#.to_string()))
        .with_status(202)
        .with_body(job_handle_body("sig-3").to_string())
        .create_async()
        .await;
    let _status = server
        .mock("GET", status_path("sig-3").as_str())
        .with_status(200)
        .with_body(orchestration_status_body("sig-3", "Completed").to_string())
        .create_async()
        .await;
    let _progress = server
        .mock("GET", SIGNIFICANCE_STATUS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "simulation_completed": 100,
                "total_simulations": 100,
                "test_results": { "p_value": "p<0.001", "significance": true },
            })
            .to_string(),
        )
        .create_async()
        .await;
    let (workbench, pool) = workbench(&server.url()).await;

    let run = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();
    let test = workbench.run_significance(run.id).await.unwrap();

    submit.assert_async().await;
    assert_eq!(test.status, RuntimeStatus::Completed);
    assert!((test.percentage - 100.0).abs() < f64::EPSILON);
    let results = test.test_results.unwrap();
    assert_eq!(results.p_value, "p<0.001");
    assert_eq!(results.significance, Significance::Significant);
    assert!(workbench.significance_test(run.id).await.is_some());

    // Changing the selection invalidates the test.
    let on = workbench.toggle_specification("A1").await.unwrap();
    assert!(!on);
    assert!(workbench.significance_test(run.id).await.is_none());
    assert_eq!(
        workbench.curve_config().await.inactive_specifications,
        vec!["A1".to_string()]
    );

    let reloaded = reload_workbench(&server.url(), &pool).await;
    assert!(reloaded.significance_test(run.id).await.is_none());
    assert_eq!(
        reloaded.curve_config().await.inactive_specifications,
        vec!["A1".to_string()]
    );

    let err = workbench.toggle_specification("Z9").await.unwrap_err();
    assert!(matches!(err, DomainError::SpecificationNotFound(id) if id == "Z9"));
}

#[tokio::test]
async fn test_new_run_resets_curve_selection() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-4", "Completed").await;
    let (workbench, _pool) = workbench(&server.url()).await;

    workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();
    workbench.toggle_specification("B1").await.unwrap();
    workbench.set_shap_ticks(false).await.unwrap();
    assert!(!workbench.curve_config().await.inactive_specifications.is_empty());

    workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();
    let config = workbench.curve_config().await;
    assert!(config.inactive_specifications.is_empty());
    assert!(config.shap_ticks);
}

#[tokio::test]
async fn test_rejected_submission_is_recorded_on_run() {
    let mut server = Server::new_async().await;
    let _submit = server
        .mock("POST", EXECUTE_PATH)
        .with_status(400)
        .with_body(json!({ "error": "Node graph has no outcome" }).to_string())
        .create_async()
        .await;
    let (workbench, pool) = workbench(&server.url()).await;

    let err = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap_err();
    assert!(matches!(&err, OrchestratorError::Submit { message, .. } if message == "Node graph has no outcome"));

    let reloaded = reload_workbench(&server.url(), &pool).await;
    let run = reloaded.active_run().await.unwrap();
    assert_eq!(run.status.status, RuntimeStatus::Failed);
    assert_eq!(run.status.error.as_deref(), Some("Node graph has no outcome"));
    assert!(run.node_response.is_none());
}

#[tokio::test]
async fn test_spec_count_is_fetched_when_unknown() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-5", "Completed").await;
    let count = server
        .mock("POST", "/api/getnumberofexecutions")
        .with_status(200)
        .with_body(json!({ "total_executions": 3 }).to_string())
        .expect(1)
        .create_async()
        .await;
    let (workbench, _pool) = workbench(&server.url()).await;

    let run = workbench
        .run_estimate(&estimate_request(), RunParameters::default(), false)
        .await
        .unwrap();

    count.assert_async().await;
    assert_eq!(run.status.status, RuntimeStatus::Completed);
}

#[tokio::test]
async fn test_detached_run_can_be_watched_later() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-6", "Completed").await;
    let (workbench, pool) = workbench(&server.url()).await;

    let run = workbench
        .run_estimate(&estimate_request(), params(), true)
        .await
        .unwrap();
    assert!(run.node_response.is_some());
    assert!(!run.is_terminal());

    // A later invocation picks the job up from the stored handle.
    let reloaded = reload_workbench(&server.url(), &pool).await;
    let watched = reloaded.watch_run(run.id).await.unwrap();
    assert_eq!(watched.status.status, RuntimeStatus::Completed);
    assert_eq!(watched.result.len(), 3);
}

#[tokio::test]
async fn test_cancel_then_poll_sees_termination() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-7", "Terminated").await;
    let terminate = server
        .mock("POST", "/runtime/instances/inst-7/terminate")
        .match_query(Matcher::Any)
        .with_status(202)
        .create_async()
        .await;
    let (workbench, _pool) = workbench(&server.url()).await;

    let run = workbench
        .run_estimate(&estimate_request(), params(), true)
        .await
        .unwrap();
    let canceled = workbench.cancel_run(run.id).await.unwrap();
    terminate.assert_async().await;
    assert!(canceled.is_canceled);
    assert!(!canceled.is_terminal());

    let finished = workbench.watch_run(run.id).await.unwrap();
    assert_eq!(finished.status.status, RuntimeStatus::Terminated);
    assert!(finished.is_canceled);
}

#[tokio::test]
async fn test_failed_progress_marks_tick_failed() {
    let mut server = Server::new_async().await;
    let _submit = server
        .mock("POST", EXECUTE_PATH)
        .with_status(202)
        .with_body(job_handle_body("inst-8").to_string())
        .create_async()
        .await;
    let _status = server
        .mock("GET", status_path("inst-8").as_str())
        .with_status(200)
        .with_body(orchestration_status_body("inst-8", "Completed").to_string())
        .create_async()
        .await;
    let _progress = server
        .mock("GET", ESTIMATE_STATUS_PATH)
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body("instance not found")
        .create_async()
        .await;
    let (workbench, _pool) = workbench(&server.url()).await;

    let run = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();

    assert_eq!(run.status.status, RuntimeStatus::Failed);
    assert!(run.status.error.is_some());
    assert!(run.result.is_empty());
}

#[tokio::test]
async fn test_significance_needs_results() {
    let mut server = Server::new_async().await;
    let _submit = server
        .mock("POST", EXECUTE_PATH)
        .with_status(202)
        .with_body(job_handle_body("inst-9").to_string())
        .create_async()
        .await;
    let (workbench, _pool) = workbench(&server.url()).await;

    let run = workbench
        .run_estimate(&estimate_request(), params(), true)
        .await
        .unwrap();
    let err = workbench.run_significance(run.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Handler(DomainError::MissingResults(id)) if id == run.id
    ));
}

#[tokio::test]
async fn test_reset_session_persists_new_id() {
    let server = Server::new_async().await;
    let (workbench, pool) = workbench(&server.url()).await;

    let first = workbench.session_id().await;
    let second = workbench.reset_session().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(workbench.session_id().await, second);

    let reloaded = reload_workbench(&server.url(), &pool).await;
    assert_eq!(reloaded.session_id().await, second);
}

#[tokio::test]
async fn test_activation_survives_another_process_polling() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-10", "Completed").await;
    let (first_process, pool) = workbench(&server.url()).await;

    let first = first_process
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();
    let second = first_process
        .run_estimate(&estimate_request(), params(), true)
        .await
        .unwrap();

    let second_process = reload_workbench(&server.url(), &pool).await;
    second_process.set_run_as_default(first.id).await.unwrap();

    // The first process still believes run 2 is active and keeps polling it.
    let watched = first_process.watch_run(second.id).await.unwrap();
    assert_eq!(watched.status.status, RuntimeStatus::Completed);

    let reloaded = reload_workbench(&server.url(), &pool).await;
    let active: Vec<_> = reloaded.runs().await.into_iter().filter(|r| r.is_active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, first.id);
    let stored_second = reloaded.resolve_run(Some("2")).await.unwrap();
    assert_eq!(stored_second.status.status, RuntimeStatus::Completed);
}

#[tokio::test]
async fn test_new_run_waits_for_processing_run() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-11", "Completed").await;
    let terminate = server
        .mock("POST", "/runtime/instances/inst-11/terminate")
        .match_query(Matcher::Any)
        .with_status(202)
        .create_async()
        .await;
    let (workbench, _pool) = workbench(&server.url()).await;

    let detached = workbench
        .run_estimate(&estimate_request(), params(), true)
        .await
        .unwrap();
    let err = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Handler(DomainError::RunStillProcessing(1))
    ));
    assert_eq!(workbench.runs().await.len(), 1);

    workbench.cancel_run(detached.id).await.unwrap();
    terminate.assert_async().await;
    let next = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();
    assert_eq!(next.run_number, 2);

    // Only the active run is polled.
    let err = workbench.watch_run(detached.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Handler(DomainError::RunNotActive(1))
    ));
}

#[tokio::test]
async fn test_significance_on_inactive_run_tests_every_specification() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-12", "Completed").await;
    let submit = server
        .mock("POST", EXECUTE_PATH)
        .match_body(Matcher::Regex(r#""spec_ids":\["t2","t3","t1"\]"#.to_string()))
        .with_status(202)
        .with_body(job_handle_body("sig-12").to_string())
        .expect(1)
        .create_async()
        .await;
    let _status = server
        .mock("GET", status_path("sig-12").as_str())
        .with_status(200)
        .with_body(orchestration_status_body("sig-12", "Completed").to_string())
        .create_async()
        .await;
    let _progress = server
        .mock("GET", SIGNIFICANCE_STATUS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "simulation_completed": 100,
                "total_simulations": 100,
                "test_results": { "p_value": "0.2", "significance": false },
            })
            .to_string(),
        )
        .create_async()
        .await;
    let (workbench, _pool) = workbench(&server.url()).await;

    let first = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();
    workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();
    // The selection belongs to run 2 and must not leak into run 1's test.
    workbench.toggle_specification("A1").await.unwrap();

    let test = workbench.run_significance(first.id).await.unwrap();
    submit.assert_async().await;
    assert_eq!(test.status, RuntimeStatus::Completed);
    assert_eq!(
        test.test_results.map(|r| r.significance),
        Some(Significance::NotSignificant)
    );
}

#[tokio::test]
async fn test_interrupted_significance_can_be_canceled_and_watched() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-13", "Completed").await;
    let _submit = server
        .mock("POST", EXECUTE_PATH)
        .match_body(Matcher::Regex("Significance Test".to_string()))
        .with_status(202)
        .with_body(job_handle_body("sig-13").to_string())
        .expect(1)
        .create_async()
        .await;
    let running = server
        .mock("GET", status_path("sig-13").as_str())
        .with_status(200)
        .with_body(orchestration_status_body("sig-13", "Running").to_string())
        .create_async()
        .await;
    let _progress = server
        .mock("GET", SIGNIFICANCE_STATUS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({ "simulation_completed": 40, "total_simulations": 100 }).to_string())
        .create_async()
        .await;
    let terminate = server
        .mock("POST", "/runtime/instances/sig-13/terminate")
        .match_query(Matcher::Any)
        .with_status(202)
        .expect(1)
        .create_async()
        .await;
    let (workbench, pool) = workbench(&server.url()).await;

    let run = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();
    let err = workbench.run_significance(run.id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::PollTimeout { .. }));

    let pending = workbench.significance_test(run.id).await.unwrap();
    assert!(pending.is_in_flight());
    assert_eq!(pending.node_response.as_ref().map(|h| h.id.as_str()), Some("sig-13"));
    let err = workbench.run_significance(run.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Handler(DomainError::SignificanceTestInFlight(id)) if id == run.id
    ));

    // Another process cancels from the stored handle, then follows it to the end.
    let other = reload_workbench(&server.url(), &pool).await;
    let canceled = other.cancel_significance(run.id).await.unwrap();
    terminate.assert_async().await;
    assert!(canceled.is_canceled);
    assert_eq!(canceled.status, RuntimeStatus::Running);

    running.remove_async().await;
    let _terminated = server
        .mock("GET", status_path("sig-13").as_str())
        .with_status(200)
        .with_body(orchestration_status_body("sig-13", "Terminated").to_string())
        .create_async()
        .await;
    let finished = other.watch_significance(run.id).await.unwrap();
    assert_eq!(finished.status, RuntimeStatus::Terminated);
    assert!(finished.is_canceled);

    let reloaded = reload_workbench(&server.url(), &pool).await;
    let stored = reloaded.significance_test(run.id).await.unwrap();
    assert_eq!(stored.status, RuntimeStatus::Terminated);
    assert!(!stored.is_in_flight());
}

#[tokio::test]
async fn test_watch_significance_without_test_is_not_found() {
    let mut server = Server::new_async().await;
    let _mocks = mock_estimate_job(&mut server, "inst-14", "Completed").await;
    let (workbench, _pool) = workbench(&server.url()).await;

    let run = workbench
        .run_estimate(&estimate_request(), params(), false)
        .await
        .unwrap();
    let err = workbench.watch_significance(run.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Handler(DomainError::SignificanceTestNotFound(id)) if id == run.id
    ));
}
