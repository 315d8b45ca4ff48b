//! Significance test CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::context::open_workbench;
use crate::cli::output::progress::{create_percent_bar, finish, follow_run};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{RuntimeStatus, SignificanceTest, TestResults};

#[derive(Args, Debug)]
pub struct SignificanceArgs {
    #[command(subcommand)]
    pub command: SignificanceCommands,
}

#[derive(Subcommand, Debug)]
pub enum SignificanceCommands {
    /// Test the active specifications of a run
    Run {
        /// Run number, id or id prefix (defaults to the active run)
        #[arg(short, long)]
        run: Option<String>,
    },
    /// Resume polling a significance test started earlier
    Watch {
        /// Run number, id or id prefix (defaults to the active run)
        #[arg(short, long)]
        run: Option<String>,
    },
    /// Ask the backend to stop a significance test
    Cancel {
        /// Run number, id or id prefix (defaults to the active run)
        #[arg(short, long)]
        run: Option<String>,
    },
    /// Show the last significance test of a run
    Show {
        /// Run number, id or id prefix (defaults to the active run)
        #[arg(short, long)]
        run: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct SignificanceOutput {
    pub run_id: Uuid,
    pub run_number: u32,
    pub test: Option<SignificanceTest>,
}

impl CommandOutput for SignificanceOutput {
    fn to_human(&self) -> String {
        let Some(test) = &self.test else {
            return format!(
                "Run #{} has no significance test. Start one with 'causeway significance run'.",
                self.run_number
            );
        };
        let mut lines = vec![
            format!("Significance test for run #{}", self.run_number),
            format!("  Status: {} ({:.2}%)", test.status, test.percentage),
            format!(
                "  Simulations: {}/{}",
                test.simulation_completed, test.total_simulations
            ),
            format!("  Started: {}", test.start_time.format("%Y-%m-%d %H:%M:%S UTC")),
        ];
        if test.is_canceled {
            lines.push("  Cancel requested".to_string());
        }
        match (&test.test_results, test.status) {
            (Some(results), _) => lines.push(format!("  Result: {}", describe(results))),
            (None, RuntimeStatus::Failed | RuntimeStatus::Error) => {
                lines.push("  The backend could not complete the test.".to_string());
            }
            (None, _) => {}
        }
        lines.join("\n")
    }
}

fn describe(results: &TestResults) -> String {
    let verdict = if bool::from(results.significance) {
        "significant"
    } else {
        "not significant"
    };
    format!("{verdict} ({})", results.p_value)
}

pub async fn execute(args: SignificanceArgs, json_mode: bool) -> Result<()> {
    let (workbench, _config) = open_workbench().await?;

    match args.command {
        SignificanceCommands::Run { run } => {
            let run = workbench.resolve_run(run.as_deref()).await?;
            let follower = (!json_mode).then(|| {
                let bar = create_percent_bar();
                let handle = follow_run(bar.clone(), workbench.subscribe(), run.id);
                (bar, handle)
            });
            let result = workbench.run_significance(run.id).await;
            if let Some((bar, handle)) = follower {
                finish(&bar, handle).await;
            }
            let test = result.context("Significance test failed")?;
            let out = SignificanceOutput {
                run_id: run.id,
                run_number: run.run_number,
                test: Some(test),
            };
            output(&out, json_mode);
        }

        SignificanceCommands::Watch { run } => {
            let run = workbench.resolve_run(run.as_deref()).await?;
            let follower = (!json_mode).then(|| {
                let bar = create_percent_bar();
                let handle = follow_run(bar.clone(), workbench.subscribe(), run.id);
                (bar, handle)
            });
            let result = workbench.watch_significance(run.id).await;
            if let Some((bar, handle)) = follower {
                finish(&bar, handle).await;
            }
            let test = result.context("Failed to watch significance test")?;
            let out = SignificanceOutput {
                run_id: run.id,
                run_number: run.run_number,
                test: Some(test),
            };
            output(&out, json_mode);
        }

        SignificanceCommands::Cancel { run } => {
            let run = workbench.resolve_run(run.as_deref()).await?;
            let finished = workbench
                .significance_test(run.id)
                .await
                .filter(|t| t.status.is_terminal());
            if let Some(test) = finished {
                anyhow::bail!(
                    "Significance test for run #{} already finished ({})",
                    run.run_number,
                    test.status
                );
            }
            let test = workbench
                .cancel_significance(run.id)
                .await
                .context("Failed to cancel significance test")?;
            if !json_mode {
                println!(
                    "Cancellation sent for the significance test of run #{}. It stops once the backend confirms.",
                    run.run_number
                );
            }
            let out = SignificanceOutput {
                run_id: run.id,
                run_number: run.run_number,
                test: Some(test),
            };
            output(&out, json_mode);
        }

        SignificanceCommands::Show { run } => {
            let run = workbench.resolve_run(run.as_deref()).await?;
            let out = SignificanceOutput {
                run_id: run.id,
                run_number: run.run_number,
                test: workbench.significance_test(run.id).await,
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}
