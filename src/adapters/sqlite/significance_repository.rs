//! SQLite implementation of the SignificanceTestRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{JobHandle, RuntimeStatus, SignificanceTest, TestResults};
use crate::domain::ports::SignificanceTestRepository;

#[derive(Clone)]
pub struct SqliteSignificanceTestRepository {
    pool: SqlitePool,
}

impl SqliteSignificanceTestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignificanceTestRepository for SqliteSignificanceTestRepository {
    async fn upsert(&self, test: &SignificanceTest) -> DomainResult<()> {
        let results_json = test.test_results.as_ref().map(serde_json::to_string).transpose()?;
        let handle_json = test.node_response.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO significance_tests (run_id, status, percentage, simulation_completed,
               total_simulations, start_time, test_results, node_response, is_canceled)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(run_id) DO UPDATE SET
                   status = excluded.status,
                   percentage = excluded.percentage,
                   simulation_completed = excluded.simulation_completed,
                   total_simulations = excluded.total_simulations,
                   start_time = excluded.start_time,
                   test_results = excluded.test_results,
                   node_response = excluded.node_response,
                   is_canceled = excluded.is_canceled"#,
        )
        .bind(test.run_id.to_string())
        .bind(test.status.as_str())
        .bind(test.percentage)
        .bind(i64::try_from(test.simulation_completed).unwrap_or(i64::MAX))
        .bind(i64::try_from(test.total_simulations).unwrap_or(i64::MAX))
        .bind(test.start_time.to_rfc3339())
        .bind(results_json)
        .bind(handle_json)
        .bind(test.is_canceled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, run_id: Uuid) -> DomainResult<Option<SignificanceTest>> {
        let row: Option<SignificanceTestRow> = sqlx::query_as(
            "SELECT run_id, status, percentage, simulation_completed, total_simulations, start_time, test_results, node_response, is_canceled FROM significance_tests WHERE run_id = ?",
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<SignificanceTest>> {
        let rows: Vec<SignificanceTestRow> = sqlx::query_as(
            "SELECT run_id, status, percentage, simulation_completed, total_simulations, start_time, test_results, node_response, is_canceled FROM significance_tests ORDER BY start_time ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete(&self, run_id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM significance_tests WHERE run_id = ?")
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::SignificanceTestNotFound(run_id));
        }

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct SignificanceTestRow {
    run_id: String,
    status: String,
    percentage: f64,
    simulation_completed: i64,
    total_simulations: i64,
    start_time: String,
    test_results: Option<String>,
    node_response: Option<String>,
    is_canceled: bool,
}

impl TryFrom<SignificanceTestRow> for SignificanceTest {
    type Error = DomainError;

    fn try_from(row: SignificanceTestRow) -> Result<Self, Self::Error> {
        let status = RuntimeStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::UnknownStatus(row.status.clone()))?;
        let test_results: Option<TestResults> = row
            .test_results
            .map(|s| serde_json::from_str(&s))
            .transpose()?;
        let node_response: Option<JobHandle> = row
            .node_response
            .map(|s| serde_json::from_str(&s))
            .transpose()?;

        Ok(SignificanceTest {
            run_id: parse_uuid(&row.run_id)?,
            percentage: row.percentage,
            simulation_completed: u64::try_from(row.simulation_completed).unwrap_or(0),
            total_simulations: u64::try_from(row.total_simulations).unwrap_or(0),
            status,
            start_time: parse_datetime(&row.start_time)?,
            test_results,
            node_response,
            is_canceled: row.is_canceled,
        })
    }
}
