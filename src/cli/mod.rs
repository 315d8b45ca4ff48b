//! Command-line interface.

pub mod commands;
pub mod context;
pub mod output;
pub mod types;

pub use output::progress::{create_percent_bar, create_spinner};
pub use types::{Cli, Commands};

use crate::services::OrchestratorError;

/// Print an error the way the selected output mode expects and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let hint = error_hint(&err);
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
            "hint": hint,
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("Error:").red().bold());
        if let Some(hint) = hint {
            eprintln!("{} {hint}", console::style("Hint:").yellow());
        }
    }
    std::process::exit(1)
}

fn error_hint(err: &anyhow::Error) -> Option<&'static str> {
    use crate::domain::errors::DomainError;

    for cause in err.chain() {
        let domain = cause.downcast_ref::<DomainError>().or_else(|| {
            match cause.downcast_ref::<OrchestratorError>() {
                Some(OrchestratorError::Handler(inner)) => Some(inner),
                _ => None,
            }
        });
        if let Some(domain) = domain {
            return match domain {
                DomainError::NoActiveRun => Some("Start a run with 'causeway run start' or pick one with 'causeway run activate'."),
                DomainError::RunNotFound(_) | DomainError::RunNumberNotFound(_) => {
                    Some("Use 'causeway run list' to see available runs.")
                }
                DomainError::SpecificationNotFound(_) => {
                    Some("Use 'causeway spec list' to see specification ids.")
                }
                DomainError::RunStillProcessing(_) => Some(
                    "Follow it with 'causeway run watch' or stop it with 'causeway run cancel'.",
                ),
                DomainError::RunNotActive(_) => {
                    Some("Make it the active run first with 'causeway run activate'.")
                }
                DomainError::SignificanceTestInFlight(_) => Some(
                    "Follow it with 'causeway significance watch' or stop it with 'causeway significance cancel'.",
                ),
                DomainError::DatabaseError(_) => Some("Run 'causeway init' first."),
                _ => None,
            };
        }
        if let Some(OrchestratorError::PollTimeout { .. }) = cause.downcast_ref::<OrchestratorError>() {
            return Some("The run keeps going on the backend. Resume with 'causeway run watch'.");
        }
    }
    None
}
