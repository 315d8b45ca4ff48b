//! Table output for runs and specifications using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use super::{format_number, truncate};
use crate::domain::models::{RefutationResult, RunHistory, RuntimeStatus, Specification, SpecificationCurveConfig};
use crate::services::specification_curve::{is_specification_on, refutation_numbers};

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: console::colors_enabled(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    pub fn format_runs(&self, runs: &[RunHistory]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["#", "ID", "Status", "Progress", "CI", "Refutation", "Created", ""]));

        for run in runs {
            table.add_row(vec![
                Cell::new(run.run_number),
                Cell::new(run.short_id()),
                self.status_cell(run.status.status),
                Cell::new(format!("{:.2}%", run.status.percentage)),
                Cell::new(if run.has_confidence_interval { "yes" } else { "no" }),
                Cell::new(run.refutation_type.as_str()),
                Cell::new(run.created_at.format("%Y-%m-%d %H:%M").to_string()),
                Cell::new(run_flags(run)),
            ]);
        }
        table.to_string()
    }

    pub fn format_specifications(
        &self,
        specs: &[Specification],
        config: &SpecificationCurveConfig,
    ) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&[
            "ID", "Outcome", "Treatment", "Model", "Estimator", "Effect", "CI 95%", "Refuters", "Result", "On",
        ]));

        for spec in specs {
            let on = is_specification_on(config, &spec.id);
            let ci = match (spec.c95_lower, spec.c95_upper) {
                (None, None) => "-".to_string(),
                (lower, upper) => format!("[{}, {}]", format_number(lower), format_number(upper)),
            };
            table.add_row(vec![
                Cell::new(&spec.id).add_attribute(Attribute::Bold),
                Cell::new(truncate(&spec.outcome, 24)),
                Cell::new(truncate(&spec.treatment, 24)),
                Cell::new(truncate(&spec.causal_model, 16)),
                Cell::new(truncate(&spec.estimator, 20)),
                Cell::new(format_number(Some(spec.estimated_effect))),
                Cell::new(ci),
                Cell::new(refutation_numbers(Some(spec))),
                self.refutation_cell(spec.refutation_result),
                Cell::new(if on { "yes" } else { "no" }),
            ]);
        }
        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        if !self.use_colors {
            table.force_no_tty();
        }
        table
    }

    fn status_cell(&self, status: RuntimeStatus) -> Cell {
        let cell = Cell::new(status.as_str());
        if !self.use_colors {
            return cell;
        }
        let color = match status {
            RuntimeStatus::Completed => Color::Green,
            RuntimeStatus::Failed | RuntimeStatus::Error => Color::Red,
            RuntimeStatus::Terminated | RuntimeStatus::Terminating => Color::Yellow,
            RuntimeStatus::Idle => Color::Grey,
            _ => Color::Cyan,
        };
        cell.fg(color)
    }

    fn refutation_cell(&self, result: Option<RefutationResult>) -> Cell {
        let Some(result) = result else {
            return Cell::new("-");
        };
        let cell = Cell::new(result.as_str());
        if !self.use_colors {
            return cell;
        }
        match result {
            RefutationResult::PassedAll => cell.fg(Color::Green),
            RefutationResult::FailedNonCritical => cell.fg(Color::Yellow),
            RefutationResult::FailedCritical => cell.fg(Color::Red),
            RefutationResult::Incomplete => cell.fg(Color::Grey),
        }
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn run_flags(run: &RunHistory) -> String {
    let mut flags = Vec::new();
    if run.is_active {
        flags.push("active");
    }
    if run.is_canceled {
        flags.push("canceled");
    }
    flags.join(", ")
}
