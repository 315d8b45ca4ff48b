//! Causeway - run orchestration and specification curves for a causal-inference backend
//!
//! The estimation itself happens on a remote backend. This crate submits jobs,
//! polls them to completion, keeps an append-only run history and turns raw
//! result rows into comparable, grouped specifications.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the port traits
//! - **Service Layer** (`services`): grouping, progress, polling and the [`Workbench`]
//! - **Adapters** (`adapters`): SQLite persistence
//! - **Infrastructure Layer** (`infrastructure`): HTTP backend, config, logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use causeway::{adapters::sqlite, infrastructure::backend::HttpBackend, ConfigLoader, PollConfig, Workbench};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let pool = sqlite::initialize_configured_database(&config.database).await?;
//!     let backend = Arc::new(HttpBackend::from_config(&config)?);
//!     let workbench = Workbench::load(backend, sqlite::repositories(&pool), PollConfig::from(&config.polling)).await?;
//!     println!("{} runs", workbench.runs().await.len());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{BackendError, DomainError, DomainResult};
pub use domain::models::{
    Config, NodeRequest, RunHistory, RunParameters, RuntimeStatus, SignificanceTest,
    Specification, SpecificationCurveConfig,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{build_outcome_groups, Orchestrator, OrchestratorError, PollConfig, Workbench};
