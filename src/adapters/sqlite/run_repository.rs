//! SQLite implementation of the RunRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_json_or_default, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{JobHandle, RefutationType, RunHistory, RunStatus};
use crate::domain::ports::RunRepository;

const RUN_COLUMNS: &str = "id, run_number, is_active, is_canceled, status, session_id, \
     has_confidence_interval, refutation_type, refutation_count, confounder_threshold, \
     proportion_threshold, result, node_response, created_at";

#[derive(Clone)]
pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn insert(&self, run: &RunHistory) -> DomainResult<()> {
        let status_json = serde_json::to_string(&run.status)?;
        let result_json = serde_json::to_string(&run.result)?;
        let handle_json = run.node_response.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO runs (id, run_number, is_active, is_canceled, runtime_status, status, session_id,
               has_confidence_interval, refutation_type, refutation_count, confounder_threshold,
               proportion_threshold, result, node_response, created_at, updated_at)
               VALUES (?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(i64::from(run.run_number))
        .bind(run.is_canceled)
        .bind(run.status.status.as_str())
        .bind(&status_json)
        .bind(&run.session_id)
        .bind(run.has_confidence_interval)
        .bind(run.refutation_type.as_str())
        .bind(i64::from(run.refutation_count))
        .bind(run.confounder_threshold)
        .bind(run.proportion_threshold)
        .bind(&result_json)
        .bind(handle_json)
        .bind(run.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, run: &RunHistory) -> DomainResult<()> {
        let status_json = serde_json::to_string(&run.status)?;
        let result_json = serde_json::to_string(&run.result)?;
        let handle_json = run.node_response.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"UPDATE runs SET is_canceled = ?, runtime_status = ?, status = ?,
               result = ?, node_response = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(run.is_canceled)
        .bind(run.status.status.as_str())
        .bind(&status_json)
        .bind(&result_json)
        .bind(handle_json)
        .bind(Utc::now().to_rfc3339())
        .bind(run.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::RunNotFound(run.id));
        }

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<RunHistory>> {
        let row: Option<RunRow> =
            sqlx::query_as(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<RunHistory>> {
        let rows: Vec<RunRow> =
            sqlx::query_as(&format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY run_number ASC"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_active(&self, id: Uuid) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(DomainError::RunNotFound(id));
        }

        sqlx::query("UPDATE runs SET is_active = (id = ?)")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    run_number: i64,
    is_active: bool,
    is_canceled: bool,
    status: String,
    session_id: String,
    has_confidence_interval: bool,
    refutation_type: String,
    refutation_count: i64,
    confounder_threshold: Option<f64>,
    proportion_threshold: Option<f64>,
    result: Option<String>,
    node_response: Option<String>,
    created_at: String,
}

impl TryFrom<RunRow> for RunHistory {
    type Error = DomainError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status: RunStatus = serde_json::from_str(&row.status)?;
        let refutation_type = RefutationType::from_str(&row.refutation_type).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid refutation type: {}", row.refutation_type))
        })?;
        let node_response: Option<JobHandle> = row
            .node_response
            .map(|s| serde_json::from_str(&s))
            .transpose()?;
        let as_u32 = |value: i64, field: &str| {
            u32::try_from(value)
                .map_err(|_| DomainError::SerializationError(format!("Invalid {field}: {value}")))
        };

        Ok(RunHistory {
            id: parse_uuid(&row.id)?,
            run_number: as_u32(row.run_number, "run number")?,
            is_active: row.is_active,
            is_canceled: row.is_canceled,
            status,
            session_id: row.session_id,
            has_confidence_interval: row.has_confidence_interval,
            refutation_type,
            refutation_count: as_u32(row.refutation_count, "refutation count")?,
            confounder_threshold: row.confounder_threshold,
            proportion_threshold: row.proportion_threshold,
            result: parse_json_or_default(row.result)?,
            node_response,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{all_embedded_migrations, create_test_pool, Migrator};
    use crate::domain::models::{RawSpecificationRow, RunParameters, RuntimeStatus};
    use serde_json::json;

    async fn setup_test_repo() -> SqliteRunRepository {
        let pool = create_test_pool().await.unwrap();
        let migrator = Migrator::new(pool.clone());
        migrator.run_embedded_migrations(all_embedded_migrations()).await.unwrap();
        SqliteRunRepository::new(pool)
    }

    fn run(number: u32) -> RunHistory {
        let params = RunParameters {
            total_executions: 4,
            has_confidence_interval: true,
            refutation_type: RefutationType::Full,
            confounder_threshold: Some(10.0),
            ..Default::default()
        };
        RunHistory::new(number, "session-1", &params)
    }

    #[tokio::test]
    async fn test_insert_and_get_run() {
        let repo = setup_test_repo().await;
        let run = run(1);
        repo.insert(&run).await.unwrap();

        let loaded = repo.get(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.run_number, 1);
        assert_eq!(loaded.refutation_type, RefutationType::Full);
        assert_eq!(loaded.confounder_threshold, Some(10.0));
        assert_eq!(loaded.status, run.status);
        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_persists_status_result_and_handle() {
        let repo = setup_test_repo().await;
        let mut run = run(1);
        repo.insert(&run).await.unwrap();

        run.status.status = RuntimeStatus::Completed;
        run.status.percentage = 100.0;
        run.result = vec![RawSpecificationRow::from(json!({"task_id": "t1"}))];
        run.node_response = Some(JobHandle {
            id: "abc".to_string(),
            status_query_get_uri: "http://functions/status".to_string(),
            terminate_post_uri: "http://functions/terminate?reason={text}".to_string(),
            send_event_post_uri: None,
            purge_history_delete_uri: None,
        });
        repo.update(&run).await.unwrap();

        let loaded = repo.get(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status.status, RuntimeStatus::Completed);
        assert_eq!(loaded.result.len(), 1);
        assert_eq!(loaded.node_response.unwrap().id, "abc");
    }

    #[tokio::test]
    async fn test_insert_and_update_never_touch_active_flag() {
        let repo = setup_test_repo().await;
        let first = run(1);
        let mut second = run(2);
        second.is_active = true;
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();
        assert!(!repo.get(second.id).await.unwrap().unwrap().is_active);

        repo.set_active(first.id).await.unwrap();
        second.status.status = RuntimeStatus::Running;
        repo.update(&second).await.unwrap();

        assert!(repo.get(first.id).await.unwrap().unwrap().is_active);
        let reloaded = repo.get(second.id).await.unwrap().unwrap();
        assert!(!reloaded.is_active);
        assert_eq!(reloaded.status.status, RuntimeStatus::Running);
    }

    #[tokio::test]
    async fn test_update_unknown_run_is_not_found() {
        let repo = setup_test_repo().await;
        let err = repo.update(&run(1)).await.unwrap_err();
        assert!(matches!(err, DomainError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn test_set_active_leaves_exactly_one_active() {
        let repo = setup_test_repo().await;
        let first = run(1);
        let second = run(2);
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();

        repo.set_active(first.id).await.unwrap();
        let runs = repo.list().await.unwrap();
        assert_eq!(runs.iter().map(|r| r.run_number).collect::<Vec<_>>(), vec![1, 2]);
        let active: Vec<_> = runs.iter().filter(|r| r.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first.id);

        let err = repo.set_active(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::RunNotFound(_)));
        assert!(repo.get(first.id).await.unwrap().unwrap().is_active);
    }
}
