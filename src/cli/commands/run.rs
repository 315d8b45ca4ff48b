//! Run CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::cli::context::open_workbench;
use crate::cli::output::progress::{
    create_percent_bar, create_spinner, finish, follow_first_run, follow_run,
};
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{
    NodeRequest, PhaseStatus, RefutationType, RunHistory, RunParameters, RuntimeStatus,
};
use crate::services::specification_curve::format_elapsed;
use crate::services::{OrchestratorResult, Workbench};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(subcommand)]
    pub command: RunCommands,
}

#[derive(Subcommand, Debug)]
pub enum RunCommands {
    /// Submit a node graph as a new run and follow it
    Start {
        /// JSON file with the node graph (`{"nodes": [...]}` or a bare array)
        #[arg(short, long)]
        request: PathBuf,
        /// Also compute 95% confidence intervals
        #[arg(long)]
        confidence_interval: bool,
        /// Refutation depth (quick, full)
        #[arg(long, default_value = "quick")]
        refutation: String,
        /// Covariate balance limit per confounder, in percent
        #[arg(long)]
        confounder_threshold: Option<f64>,
        /// Share of failed confounders that rejects a specification, in percent
        #[arg(long)]
        proportion_threshold: Option<f64>,
        /// Submit and return without polling
        #[arg(short, long)]
        detach: bool,
    },
    /// Ask the backend how many specifications a node graph expands to
    Count {
        /// JSON file with the node graph
        #[arg(short, long)]
        request: PathBuf,
    },
    /// List all runs
    List,
    /// Show run details
    Show {
        /// Run number, id or id prefix (defaults to the active run)
        run: Option<String>,
    },
    /// Make a run the active one
    Activate {
        /// Run number, id or id prefix
        run: String,
    },
    /// Ask the backend to stop a run
    Cancel {
        /// Run number, id or id prefix (defaults to the active run)
        run: Option<String>,
    },
    /// Resume polling a run that is still processing
    Watch {
        /// Run number, id or id prefix (defaults to the active run)
        run: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    pub id: Uuid,
    pub run_number: u32,
    pub status: RuntimeStatus,
    pub percentage: f64,
    pub is_active: bool,
    pub is_canceled: bool,
    pub estimators: PhaseStatus,
    pub confidence_intervals: PhaseStatus,
    pub refuters: PhaseStatus,
    pub estimated_effect_completed: Option<String>,
    pub confidence_interval_completed: Option<String>,
    pub refute_completed: Option<String>,
    pub has_confidence_interval: bool,
    pub refutation_type: RefutationType,
    pub error: Option<String>,
    pub elapsed: Option<String>,
    pub results: usize,
    pub session_id: String,
}

impl From<&RunHistory> for RunOutput {
    fn from(run: &RunHistory) -> Self {
        let status = &run.status;
        Self {
            id: run.id,
            run_number: run.run_number,
            status: status.status,
            percentage: status.percentage,
            is_active: run.is_active,
            is_canceled: run.is_canceled,
            estimators: status.estimators,
            confidence_intervals: status.confidence_intervals,
            refuters: status.refuters,
            estimated_effect_completed: status.estimated_effect_completed.clone(),
            confidence_interval_completed: status.confidence_interval_completed.clone(),
            refute_completed: status.refute_completed.clone(),
            has_confidence_interval: run.has_confidence_interval,
            refutation_type: run.refutation_type,
            error: status.error.clone(),
            elapsed: status.time.end.map(|end| format_elapsed(status.time.start, end)),
            results: run.result.len(),
            session_id: run.session_id.clone(),
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Run #{} ({})", self.run_number, self.id),
            format!("  Status: {} ({:.2}%)", self.status, self.percentage),
        ];
        if self.is_active {
            lines.push("  Active: yes".to_string());
        }
        if self.is_canceled {
            lines.push("  Cancel requested".to_string());
        }
        lines.push(format!(
            "  Estimators: {} {}",
            self.estimators,
            self.estimated_effect_completed.as_deref().unwrap_or("")
        ));
        if self.has_confidence_interval {
            lines.push(format!(
                "  Confidence intervals: {} {}",
                self.confidence_intervals,
                self.confidence_interval_completed.as_deref().unwrap_or("")
            ));
        }
        lines.push(format!(
            "  Refuters ({}): {} {}",
            self.refutation_type.as_str(),
            self.refuters,
            self.refute_completed.as_deref().unwrap_or("")
        ));
        lines.push(format!("  Results: {}", self.results));
        if let Some(elapsed) = &self.elapsed {
            lines.push(format!("  Elapsed: {elapsed}"));
        }
        if let Some(error) = &self.error {
            lines.push(format!("  Error: {error}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RunListOutput {
    pub runs: Vec<RunOutput>,
    pub total: usize,
    #[serde(skip)]
    table: String,
}

impl CommandOutput for RunListOutput {
    fn to_human(&self) -> String {
        if self.runs.is_empty() {
            return "No runs yet. Start one with 'causeway run start'.".to_string();
        }
        format!("{}\n\n{} run(s)", self.table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CountOutput {
    pub total_executions: u64,
}

impl CommandOutput for CountOutput {
    fn to_human(&self) -> String {
        format!("The request expands to {} specification(s).", self.total_executions)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RunActionOutput {
    pub success: bool,
    pub message: String,
    pub run: RunOutput,
}

impl CommandOutput for RunActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: RunArgs, json_mode: bool) -> Result<()> {
    let (workbench, _config) = open_workbench().await?;

    match args.command {
        RunCommands::Start {
            request,
            confidence_interval,
            refutation,
            confounder_threshold,
            proportion_threshold,
            detach,
        } => {
            let request = load_request(&request)?;
            let params = RunParameters {
                has_confidence_interval: confidence_interval,
                refutation_type: RefutationType::from_str(&refutation)
                    .ok_or_else(|| anyhow::anyhow!("Invalid refutation type: {refutation}"))?,
                confounder_threshold,
                proportion_threshold,
                ..RunParameters::default()
            };

            let run = if detach {
                workbench.run_estimate(&request, params, true).await
            } else {
                follow(&workbench, json_mode, None, |wb| async move {
                    wb.run_estimate(&request, params, false).await
                })
                .await
            }
            .context("Failed to run estimation")?;

            if detach {
                let out = RunActionOutput {
                    success: true,
                    message: format!(
                        "Run #{} submitted. Follow it with 'causeway run watch'.",
                        run.run_number
                    ),
                    run: RunOutput::from(&run),
                };
                output(&out, json_mode);
            } else {
                output(&RunOutput::from(&run), json_mode);
            }
        }

        RunCommands::Count { request } => {
            let request = load_request(&request)?;
            let spinner = (!json_mode).then(|| create_spinner("Counting specifications..."));
            let total = workbench.spec_count(&request).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }
            let out = CountOutput {
                total_executions: total.context("Failed to count executions")?,
            };
            output(&out, json_mode);
        }

        RunCommands::List => {
            let runs = workbench.runs().await;
            let out = RunListOutput {
                total: runs.len(),
                table: TableFormatter::new().format_runs(&runs),
                runs: runs.iter().map(RunOutput::from).collect(),
            };
            output(&out, json_mode);
        }

        RunCommands::Show { run } => {
            let run = workbench.resolve_run(run.as_deref()).await?;
            output(&RunOutput::from(&run), json_mode);
        }

        RunCommands::Activate { run } => {
            let run = workbench.resolve_run(Some(&run)).await?;
            let run = workbench.set_run_as_default(run.id).await?;
            let out = RunActionOutput {
                success: true,
                message: format!("Run #{} is now active.", run.run_number),
                run: RunOutput::from(&run),
            };
            output(&out, json_mode);
        }

        RunCommands::Cancel { run } => {
            let run = workbench.resolve_run(run.as_deref()).await?;
            if run.is_terminal() {
                anyhow::bail!("Run #{} already finished ({})", run.run_number, run.status.status);
            }
            let run = workbench
                .cancel_run(run.id)
                .await
                .context("Failed to cancel run")?;
            let out = RunActionOutput {
                success: true,
                message: format!(
                    "Cancellation sent for run #{}. It stops once the backend confirms.",
                    run.run_number
                ),
                run: RunOutput::from(&run),
            };
            output(&out, json_mode);
        }

        RunCommands::Watch { run } => {
            let run = workbench.resolve_run(run.as_deref()).await?;
            if run.is_terminal() {
                output(&RunOutput::from(&run), json_mode);
                return Ok(());
            }
            let run_id = run.id;
            let run = follow(&workbench, json_mode, Some(run_id), |wb| async move {
                wb.watch_run(run_id).await
            })
            .await
            .context("Failed to watch run")?;
            output(&RunOutput::from(&run), json_mode);
        }
    }

    Ok(())
}

/// Drive `job` with a progress bar, stopping early on Ctrl-C.
///
/// The bar follows `run_id`, or the first run the job publishes.
async fn follow<'a, F, Fut>(
    workbench: &'a Workbench,
    json_mode: bool,
    run_id: Option<Uuid>,
    job: F,
) -> OrchestratorResult<RunHistory>
where
    F: FnOnce(&'a Workbench) -> Fut,
    Fut: Future<Output = OrchestratorResult<RunHistory>> + 'a,
{
    let follower = (!json_mode).then(|| {
        let bar = create_percent_bar();
        let handle = match run_id {
            Some(id) => follow_run(bar.clone(), workbench.subscribe(), id),
            None => follow_first_run(bar.clone(), workbench.subscribe()),
        };
        (bar, handle)
    });

    let result = tokio::select! {
        result = job(workbench) => result,
        _ = tokio::signal::ctrl_c() => {
            if let Some((bar, handle)) = follower {
                finish(&bar, handle).await;
            }
            eprintln!("Stopped watching. The run continues on the backend; resume with 'causeway run watch'.");
            std::process::exit(130);
        }
    };

    if let Some((bar, handle)) = follower {
        finish(&bar, handle).await;
    }
    result
}

/// Read a node graph from disk.
///
/// Accepts `{"nodes": [...]}`, a bare array of nodes, or a single node object.
pub fn load_request(path: &Path) -> Result<NodeRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Request file {} is not valid JSON", path.display()))?;
    parse_request(value)
}

fn parse_request(value: Value) -> Result<NodeRequest> {
    let nodes = match value {
        Value::Array(nodes) => nodes,
        Value::Object(mut map) => match map.remove("nodes") {
            Some(Value::Array(nodes)) => nodes,
            Some(_) => anyhow::bail!("'nodes' must be an array"),
            None => vec![Value::Object(map)],
        },
        _ => anyhow::bail!("Request must be a JSON object or array"),
    };
    if nodes.is_empty() {
        anyhow::bail!("Request has no nodes");
    }
    Ok(NodeRequest::new(String::new(), nodes))
}
