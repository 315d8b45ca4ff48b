//! SQLite implementation of the WorkspaceRepository.
//!
//! Workspace settings are stored as JSON values keyed by name.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::models::SpecificationCurveConfig;
use crate::domain::ports::WorkspaceRepository;

const SESSION_KEY: &str = "session_id";
const CURVE_CONFIG_KEY: &str = "curve_config";

#[derive(Clone)]
pub struct SqliteWorkspaceRepository {
    pool: SqlitePool,
}

impl SqliteWorkspaceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn read(&self, key: &str) -> DomainResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM workspace WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn write(&self, key: &str, value: &str) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO workspace (key, value, updated_at) VALUES (?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WorkspaceRepository for SqliteWorkspaceRepository {
    async fn session_id(&self) -> DomainResult<Option<String>> {
        self.read(SESSION_KEY).await
    }

    async fn set_session_id(&self, session_id: &str) -> DomainResult<()> {
        self.write(SESSION_KEY, session_id).await
    }

    async fn curve_config(&self) -> DomainResult<SpecificationCurveConfig> {
        match self.read(CURVE_CONFIG_KEY).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(SpecificationCurveConfig::default()),
        }
    }

    async fn save_curve_config(&self, config: &SpecificationCurveConfig) -> DomainResult<()> {
        let json = serde_json::to_string(config)?;
        self.write(CURVE_CONFIG_KEY, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn test_session_id_round_trip() {
        let repo = SqliteWorkspaceRepository::new(create_migrated_test_pool().await.unwrap());
        assert!(repo.session_id().await.unwrap().is_none());

        repo.set_session_id("first").await.unwrap();
        repo.set_session_id("second").await.unwrap();
        assert_eq!(repo.session_id().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_curve_config_defaults_until_saved() {
        let repo = SqliteWorkspaceRepository::new(create_migrated_test_pool().await.unwrap());
        assert_eq!(repo.curve_config().await.unwrap(), SpecificationCurveConfig::default());

        let config = SpecificationCurveConfig {
            inactive_specifications: vec!["A1".to_string()],
            shap_ticks: false,
            confidence_interval_ticks: true,
        };
        repo.save_curve_config(&config).await.unwrap();
        assert_eq!(repo.curve_config().await.unwrap(), config);
    }
}
