//! Overlap - streaming chat client CLI
//!
#![doc = "Main entry point for the Overlap command-line client."]

use anyhow::Result;

use overlap::cli::{Cli, Commands};
use overlap::commands;
use overlap::config::Config;
use overlap::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_logging(cli.verbose, cli.json_logs)?;

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { resume } => {
            if let Some(r) = &resume {
                tracing::debug!("Resuming conversation: {}", r);
            }
            commands::chat::run_chat(config, resume).await?;
            Ok(())
        }
        Commands::Send {
            message,
            conversation,
        } => {
            tracing::info!("Sending one message");
            commands::send::run_send(config, message, conversation).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            let store = commands::open_store(&config)?;
            commands::history::handle_history(&store, command)?;
            Ok(())
        }
    }
}
