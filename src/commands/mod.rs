/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `chat`    - Interactive chat loop
- `send`    - One-shot turn
- `history` - Stored conversation management

The handlers stay small: turns go through [`crate::chat::ChatSession`] and
history through [`crate::storage::ConversationStore`].
*/

use crate::chat::{ChatSession, TurnOutcome};
use crate::config::Config;
use crate::error::Result;
use crate::storage::ConversationStore;
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;

// Conversation history management
pub mod history;

// Special commands parser for the chat loop
pub mod special_commands;

/// Open the store named by the configuration, or the default location
pub fn open_store(config: &Config) -> Result<ConversationStore> {
    match &config.storage.path {
        Some(path) => {
            tracing::debug!("Using history file {}", path.display());
            ConversationStore::open(path.clone())
        }
        None => ConversationStore::open_default(),
    }
}

/// Print one fragment as soon as it arrives
fn print_fragment(fragment: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(fragment.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Run a turn while Ctrl-C cancels the stream instead of the process
async fn run_turn(session: &ChatSession, conversation_id: &str, text: &str) -> Result<TurnOutcome> {
    let slot = session.slot().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            slot.cancel_current();
        }
    });

    let outcome = session
        .send_turn(conversation_id, text, print_fragment)
        .await;
    interrupt.abort();
    outcome
}

/// Finish the line a turn was printed on
fn print_outcome_marker(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Completed { .. } => println!(),
        TurnOutcome::Stopped { .. } => println!("{}", " [aborted]".yellow()),
        TurnOutcome::Failed { .. } => println!("{}", " [error]".red()),
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Runs a readline loop; every non-command line is one turn. The reply
    //! is printed as it streams and Ctrl-C stops it.

    use super::*;
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::error::OverlapError;
    use crate::storage::{new_conversation_id, Role};
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    const HELP_COMMAND: &str = "/help";
    const EXIT_COMMAND: &str = "/exit";

    /// Start interactive chat
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `resume` - Conversation to continue instead of starting a new one
    ///
    /// # Errors
    ///
    /// Fails when no identity is configured outside mock mode, when the
    /// conversation to resume does not exist, or when storage fails.
    pub async fn run_chat(config: Config, resume: Option<String>) -> Result<()> {
        tracing::info!("Starting interactive chat");

        let store = Arc::new(open_store(&config)?);
        let session = ChatSession::from_config(&config, Arc::clone(&store))?;

        let mut conversation_id = match resume {
            Some(id) => {
                let id = history::resolve_existing(&store, &id)?;
                let conversation = store.get(&id).ok_or_else(|| {
                    OverlapError::Storage(format!("Conversation not found: {}", id))
                })?;
                print_transcript(&conversation);
                id
            }
            None => new_conversation_id(),
        };

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&config, session.is_mock());

        loop {
            match rl.readline(&format!("{} ", ">".green().bold())) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::New) => {
                            conversation_id = new_conversation_id();
                            println!("{}\n", "Started a new conversation.".green());
                            continue;
                        }
                        Ok(SpecialCommand::History) => {
                            let summaries = store.list();
                            if summaries.is_empty() {
                                println!("{}\n", "No conversation history found.".yellow());
                            } else {
                                history::summary_table(&summaries).printstd();
                                println!();
                            }
                            continue;
                        }
                        Ok(SpecialCommand::Rename(title)) => {
                            if store.rename_conversation(&conversation_id, &title)? {
                                println!("{}\n", format!("Renamed to \"{}\"", title).green());
                            } else {
                                println!("{}\n", "Nothing to rename yet.".yellow());
                            }
                            continue;
                        }
                        Ok(SpecialCommand::Help) => {
                            print_help();
                            continue;
                        }
                        Ok(SpecialCommand::Exit) => break,
                        Ok(SpecialCommand::None) => {}
                        Err(e) => {
                            eprintln!("{}\n", e.to_string().red());
                            continue;
                        }
                    }

                    rl.add_history_entry(trimmed)?;

                    let outcome = run_turn(&session, &conversation_id, trimmed).await?;
                    print_outcome_marker(&outcome);
                    if let TurnOutcome::Failed { error, .. } = &outcome {
                        eprintln!("{}", format!("Error: {:#}", error).red());
                    }
                    println!();
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn print_transcript(conversation: &crate::storage::Conversation) {
        println!(
            "\nResuming {} ({} messages)\n",
            conversation.title.bold(),
            conversation.messages.len()
        );
        for message in &conversation.messages {
            match message.role {
                Role::User => println!("{} {}", ">".green().bold(), message.content),
                Role::Assistant => println!("{}\n", message.content),
            }
        }
    }

    fn print_welcome_banner(config: &Config, mock: bool) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                 Overlap Chat - Welcome!                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        if mock {
            println!("Backend: {}\n", "local mock".yellow());
        } else {
            println!(
                "Backend: {} (model {})\n",
                config.server.base_url.cyan(),
                config.chat.model
            );
        }
        println!(
            "Type '{}' for available commands, '{}' to quit\n",
            HELP_COMMAND, EXIT_COMMAND
        );
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_banner_commands_are_recognized() {
            assert_eq!(parse_special_command(HELP_COMMAND).unwrap(), SpecialCommand::Help);
            assert_eq!(parse_special_command(EXIT_COMMAND).unwrap(), SpecialCommand::Exit);
        }
    }
}

// One-shot send handler
pub mod send {
    //! Sends a single message and prints the streamed reply.

    use super::*;
    use crate::storage::new_conversation_id;

    /// Send `message`, appending to `conversation` or a new conversation
    ///
    /// # Errors
    ///
    /// Returns the stream error when the turn fails; a turn stopped with
    /// Ctrl-C is not an error.
    pub async fn run_send(
        config: Config,
        message: String,
        conversation: Option<String>,
    ) -> Result<()> {
        let store = Arc::new(open_store(&config)?);
        let session = ChatSession::from_config(&config, Arc::clone(&store))?;
        let conversation_id = match conversation {
            Some(id) => store.resolve_id(&id)?.unwrap_or(id),
            None => new_conversation_id(),
        };

        let outcome = run_turn(&session, &conversation_id, &message).await?;
        print_outcome_marker(&outcome);
        eprintln!("{}", format!("conversation: {}", conversation_id).dimmed());

        match outcome {
            TurnOutcome::Failed { error, .. } => Err(error),
            _ => Ok(()),
        }
    }
}
