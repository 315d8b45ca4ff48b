//! Wiring shared by the commands that need the workbench.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::adapters::sqlite::{initialize_configured_database, repositories};
use crate::domain::models::Config;
use crate::infrastructure::backend::HttpBackend;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{PollConfig, Workbench};

/// Load config, open the database and restore the workbench.
pub async fn open_workbench() -> Result<(Workbench, Config)> {
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    let workbench = workbench_from_config(&config).await?;
    Ok((workbench, config))
}

pub async fn workbench_from_config(config: &Config) -> Result<Workbench> {
    if !std::path::Path::new(&config.database.path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run 'causeway init' first.",
            config.database.path
        );
    }
    let pool = initialize_configured_database(&config.database)
        .await
        .context("Failed to open database")?;
    let backend = HttpBackend::from_config(config).context("Failed to build backend client")?;
    Workbench::load(
        Arc::new(backend),
        repositories(&pool),
        PollConfig::from(&config.polling),
    )
    .await
    .context("Failed to load workbench state")
}
