//! Progress bars for long-running polls, using indicatif.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::models::{RunHistory, SignificanceTest};
use crate::services::WorkbenchEvent;

const PERCENT_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}";
const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";

const PROGRESS_CHARS: &str = "█▓▒░ ";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Bar that counts from 0 to 100 percent.
pub fn create_percent_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar().template(PERCENT_TEMPLATE) {
        pb.set_style(style.progress_chars(PROGRESS_CHARS));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Spinner for calls with no known length.
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
        spinner.set_style(style.tick_chars(SPINNER_CHARS));
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// A bar that draws nothing, for `--json` mode.
pub fn hidden_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_draw_target(ProgressDrawTarget::hidden());
    pb
}

/// Phase summary shown next to the bar.
pub fn run_message(run: &RunHistory) -> String {
    let status = &run.status;
    let mut parts = vec![format!("estimators {}", status.estimators)];
    if run.has_confidence_interval {
        parts.push(format!("CI {}", status.confidence_intervals));
    }
    parts.push(format!("refuters {}", status.refuters));
    format!("run #{} {} ({})", run.run_number, status.status, parts.join(", "))
}

pub fn significance_message(test: &SignificanceTest) -> String {
    format!(
        "{} {}/{} simulations",
        test.status, test.simulation_completed, test.total_simulations
    )
}

/// Mirror workbench events for one run onto `bar` until the channel closes.
pub fn follow_run(
    bar: ProgressBar,
    events: broadcast::Receiver<WorkbenchEvent>,
    run_id: Uuid,
) -> JoinHandle<()> {
    tokio::spawn(track(bar, events, Some(run_id)))
}

/// Follow whichever run the workbench publishes first.
pub fn follow_first_run(
    bar: ProgressBar,
    events: broadcast::Receiver<WorkbenchEvent>,
) -> JoinHandle<()> {
    tokio::spawn(track(bar, events, None))
}

async fn track(
    bar: ProgressBar,
    mut events: broadcast::Receiver<WorkbenchEvent>,
    mut run_id: Option<Uuid>,
) {
    loop {
        match events.recv().await {
            Ok(WorkbenchEvent::RunUpdated(run)) if *run_id.get_or_insert(run.id) == run.id => {
                bar.set_position(run.status.percentage.clamp(0.0, 100.0) as u64);
                bar.set_message(run_message(&run));
            }
            Ok(WorkbenchEvent::SignificanceUpdated(test)) if run_id == Some(test.run_id) => {
                bar.set_position(test.percentage.clamp(0.0, 100.0) as u64);
                bar.set_message(significance_message(&test));
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

/// Tell a follower to stop and clear its bar.
pub async fn finish(bar: &ProgressBar, follower: JoinHandle<()>) {
    follower.abort();
    let _ = follower.await;
    bar.finish_and_clear();
}
