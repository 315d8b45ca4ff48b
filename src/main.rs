//! Causeway CLI entry point.

use clap::Parser;

use causeway::cli::{commands, handle_error, Cli, Commands};
use causeway::infrastructure::config::ConfigLoader;
use causeway::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = ConfigLoader::load()
        .map(|config| LogConfig::from(&config.logging))
        .unwrap_or_else(|_| LogConfig::stderr_only("warn"));
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Logging disabled: {err:#}");
            None
        }
    };

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, cli.json).await,
        Commands::Run(args) => commands::run::execute(args, cli.json).await,
        Commands::Spec(args) => commands::spec::execute(args, cli.json).await,
        Commands::Significance(args) => commands::significance::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
