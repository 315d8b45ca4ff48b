//! Specification curve CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::context::open_workbench;
use crate::cli::output::progress::create_spinner;
use crate::cli::output::{format_number, output, CommandOutput, TableFormatter};
use crate::domain::models::{Specification, SpecificationCurveConfig};
use crate::services::covariate_balance::failed_confounders;
use crate::services::specification_curve::{
    active_effects, active_specifications, failed_refutation_ids, failed_refutations,
    is_confidence_interval_disabled, is_shap_disabled, is_specification_on, median,
    refutation_numbers,
};

#[derive(Args, Debug)]
pub struct SpecArgs {
    #[command(subcommand)]
    pub command: SpecCommands,
}

#[derive(Subcommand, Debug)]
pub enum SpecCommands {
    /// List the specifications of a run
    List {
        /// Run number, id or id prefix (defaults to the active run)
        #[arg(short, long)]
        run: Option<String>,
    },
    /// Show every specification with this id on the active run
    Show {
        /// Specification id such as A1
        id: String,
    },
    /// Reject or restore a specification id on the active run
    Toggle {
        /// Specification id such as A1
        id: String,
    },
    /// Turn SHAP or confidence-interval ticks on or off
    Ticks {
        /// Show SHAP ticks (needs a completed run)
        #[arg(long)]
        shap: Option<bool>,
        /// Show confidence-interval ticks (needs a run with confidence intervals)
        #[arg(long)]
        confidence_interval: Option<bool>,
    },
    /// Download a result file stored for this session and list its specifications
    Download {
        /// File name on the backend
        file_name: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct SpecListOutput {
    pub run_number: Option<u32>,
    pub specifications: Vec<Specification>,
    pub active: usize,
    pub median_effect: f64,
    pub failed_refutations: Vec<String>,
    pub curve: SpecificationCurveConfig,
    #[serde(skip)]
    table: String,
}

impl SpecListOutput {
    fn new(run_number: Option<u32>, specifications: Vec<Specification>, curve: SpecificationCurveConfig) -> Self {
        let mut failed = failed_refutation_ids(&specifications);
        failed.sort_unstable();
        failed.dedup();
        Self {
            run_number,
            active: active_specifications(&specifications, &curve).len(),
            median_effect: median(&active_effects(&specifications, &curve)),
            failed_refutations: failed,
            table: TableFormatter::new().format_specifications(&specifications, &curve),
            specifications,
            curve,
        }
    }
}

impl CommandOutput for SpecListOutput {
    fn to_human(&self) -> String {
        if self.specifications.is_empty() {
            return "No specifications yet.".to_string();
        }
        let mut lines = vec![self.table.clone(), String::new()];
        let scope = self
            .run_number
            .map_or_else(String::new, |n| format!(" in run #{n}"));
        lines.push(format!(
            "{} specification(s){scope}, {} active, median effect {}",
            self.specifications.len(),
            self.active,
            format_number(Some(self.median_effect))
        ));
        if !self.failed_refutations.is_empty() {
            lines.push(format!(
                "Failed critical refutation: {}",
                self.failed_refutations.join(", ")
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct SpecDetail {
    #[serde(flatten)]
    pub specification: Specification,
    pub refutations: String,
    pub failed_refuters: Vec<String>,
    pub failed_confounders: Vec<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct SpecShowOutput {
    pub id: String,
    pub on: bool,
    pub shap_available: bool,
    pub specifications: Vec<SpecDetail>,
}

impl CommandOutput for SpecShowOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Specification {} ({})",
            self.id,
            if self.on { "on" } else { "rejected" }
        )];
        for detail in &self.specifications {
            let spec = &detail.specification;
            lines.push(String::new());
            lines.push(format!("  Task: {}", spec.task_id));
            lines.push(format!("  Population: {} ({})", spec.population, spec.population_type.as_str()));
            lines.push(format!("  Treatment: {} ({})", spec.treatment, spec.treatment_type.as_str()));
            lines.push(format!("  Outcome: {} ({})", spec.outcome, spec.outcome_type.as_str()));
            lines.push(format!("  Model: {} / {} {}", spec.causal_model, spec.estimator, spec.estimator_config));
            lines.push(format!("  Effect: {}", format_number(Some(spec.estimated_effect))));
            if spec.c95_lower.is_some() || spec.c95_upper.is_some() {
                lines.push(format!(
                    "  CI 95%: [{}, {}]",
                    format_number(spec.c95_lower),
                    format_number(spec.c95_upper)
                ));
            }
            if let Some(size) = spec.population_size {
                lines.push(format!("  Population size: {size}"));
            }
            lines.push(format!(
                "  Refutations passed: {} {}",
                detail.refutations,
                spec.refutation_result.map_or("", |r| r.as_str())
            ));
            if !detail.failed_refuters.is_empty() {
                lines.push(format!("  Failed refuters: {}", detail.failed_refuters.join(", ")));
            }
            if !detail.failed_confounders.is_empty() {
                lines.push(format!("  Unbalanced confounders: {}", detail.failed_confounders.join(", ")));
            }
            if self.shap_available {
                lines.push(format!(
                    "  SHAP: population {}, treatment {}, model {}, estimator {}",
                    format_number(Some(spec.population_shap)),
                    format_number(Some(spec.treatment_shap)),
                    format_number(Some(spec.causal_model_shap)),
                    format_number(Some(spec.estimator_shap))
                ));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ToggleOutput {
    pub id: String,
    pub on: bool,
}

impl CommandOutput for ToggleOutput {
    fn to_human(&self) -> String {
        if self.on {
            format!("Specification {} restored.", self.id)
        } else {
            format!("Specification {} rejected. The run's significance test was cleared.", self.id)
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TicksOutput {
    pub curve: SpecificationCurveConfig,
    pub shap_disabled: bool,
    pub confidence_interval_disabled: bool,
}

impl CommandOutput for TicksOutput {
    fn to_human(&self) -> String {
        let state = |on: bool, disabled: bool| match (on, disabled) {
            (_, true) => "unavailable",
            (true, false) => "on",
            (false, false) => "off",
        };
        format!(
            "SHAP ticks: {}\nConfidence-interval ticks: {}",
            state(self.curve.shap_ticks, self.shap_disabled),
            state(self.curve.confidence_interval_ticks, self.confidence_interval_disabled)
        )
    }
}

pub async fn execute(args: SpecArgs, json_mode: bool) -> Result<()> {
    let (workbench, _config) = open_workbench().await?;

    match args.command {
        SpecCommands::List { run } => {
            let run = workbench.resolve_run(run.as_deref()).await?;
            let specifications = workbench.specifications(run.id).await?;
            let out = SpecListOutput::new(
                Some(run.run_number),
                specifications,
                workbench.curve_config().await,
            );
            output(&out, json_mode);
        }

        SpecCommands::Show { id } => {
            let run = workbench.resolve_run(None).await?;
            let matching: Vec<SpecDetail> = workbench
                .specifications(run.id)
                .await?
                .into_iter()
                .filter(|s| s.id == id)
                .map(|spec| SpecDetail {
                    refutations: refutation_numbers(Some(&spec)),
                    failed_refuters: failed_refutations(&spec)
                        .into_iter()
                        .map(|r| r.as_str().to_string())
                        .collect(),
                    failed_confounders: failed_confounders(&spec, run.confounder_threshold),
                    specification: spec,
                })
                .collect();
            if matching.is_empty() {
                anyhow::bail!("Specification {id} not found on run #{}", run.run_number);
            }
            let out = SpecShowOutput {
                on: is_specification_on(&workbench.curve_config().await, &id),
                shap_available: !is_shap_disabled(Some(&run)),
                id,
                specifications: matching,
            };
            output(&out, json_mode);
        }

        SpecCommands::Toggle { id } => {
            let on = workbench
                .toggle_specification(&id)
                .await
                .context("Failed to toggle specification")?;
            output(&ToggleOutput { id, on }, json_mode);
        }

        SpecCommands::Ticks {
            shap,
            confidence_interval,
        } => {
            if let Some(checked) = shap {
                workbench.set_shap_ticks(checked).await?;
            }
            if let Some(checked) = confidence_interval {
                workbench.set_confidence_interval_ticks(checked).await?;
            }
            let run = workbench.active_run().await;
            let out = TicksOutput {
                curve: workbench.curve_config().await,
                shap_disabled: is_shap_disabled(run.as_ref()),
                confidence_interval_disabled: is_confidence_interval_disabled(run.as_ref()),
            };
            output(&out, json_mode);
        }

        SpecCommands::Download { file_name } => {
            let spinner = (!json_mode).then(|| create_spinner(format!("Downloading {file_name}...")));
            let specifications = workbench.download_specifications(&file_name).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }
            let specifications = specifications.context("Failed to download results")?;
            let out = SpecListOutput::new(None, specifications, SpecificationCurveConfig::default());
            output(&out, json_mode);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RefutationResult;

    fn spec(id: &str, effect: f64, result: RefutationResult) -> Specification {
        Specification {
            id: id.to_string(),
            estimated_effect: effect,
            refutation_result: Some(result),
            ..Default::default()
        }
    }

    #[test]
    fn test_list_output_summarises_active_set() {
        let specs = vec![
            spec("A1", 0.1, RefutationResult::PassedAll),
            spec("A2", 0.3, RefutationResult::PassedAll),
            spec("A3", 9.0, RefutationResult::FailedCritical),
            spec("B1", 0.5, RefutationResult::PassedAll),
        ];
        let curve = SpecificationCurveConfig {
            inactive_specifications: vec!["B1".to_string()],
            ..Default::default()
        };

        let out = SpecListOutput::new(Some(1), specs, curve);
        assert_eq!(out.active, 2);
        assert!((out.median_effect - 0.2).abs() < 1e-9);
        assert_eq!(out.failed_refutations, vec!["A3".to_string()]);
        assert!(out.to_human().contains("4 specification(s) in run #1, 2 active"));
    }

    #[test]
    fn test_ticks_output_reports_unavailable() {
        let out = TicksOutput {
            curve: SpecificationCurveConfig::default(),
            shap_disabled: true,
            confidence_interval_disabled: false,
        };
        assert_eq!(
            out.to_human(),
            "SHAP ticks: unavailable\nConfidence-interval ticks: off"
        );
    }
}
