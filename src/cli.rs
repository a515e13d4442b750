//! Command-line interface definition for Overlap
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, one-shot turns and
//! conversation history management.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Overlap - streaming chat client with local conversation history
#[derive(Parser, Debug, Clone)]
#[command(name = "overlap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the conversation history file
    #[arg(long, value_name = "PATH")]
    pub storage_path: Option<PathBuf>,

    /// Override the backend base URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Overlap
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Continue an existing conversation
        #[arg(short, long, value_name = "ID")]
        resume: Option<String>,
    },

    /// Send a single message and print the streamed reply
    Send {
        /// Message text
        message: String,

        /// Conversation to append to (a new one is created otherwise)
        #[arg(short = 'C', long, value_name = "ID")]
        conversation: Option<String>,
    },

    /// Manage stored conversations
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// Conversation history subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List conversations, most recently updated first
    List,

    /// Print every message of a conversation
    Show {
        /// Conversation ID
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation ID
        id: String,
    },

    /// Change the title of a conversation
    Rename {
        /// Conversation ID
        id: String,

        /// New title
        title: String,
    },

    /// Delete every stored conversation
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            storage_path: None,
            base_url: None,
            command: Commands::History {
                command: HistoryCommand::List,
            },
        }
    }
}
