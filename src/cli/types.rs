//! CLI type definitions
//!
//! This module contains the clap structures that define the CLI interface.

use clap::{Parser, Subcommand};

use crate::cli::commands::init::InitArgs;
use crate::cli::commands::run::RunArgs;
use crate::cli::commands::significance::SignificanceArgs;
use crate::cli::commands::spec::SpecArgs;

#[derive(Parser, Debug)]
#[command(name = "causeway")]
#[command(about = "Causeway - causal-inference run orchestration and specification curves", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize causeway configuration and database
    Init(InitArgs),

    /// Estimation runs: start, watch, cancel, activate
    Run(RunArgs),

    /// Specification curve of the active run
    Spec(SpecArgs),

    /// Significance test over the active specifications
    Significance(SignificanceArgs),
}
