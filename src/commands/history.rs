use crate::cli::HistoryCommand;
use crate::error::{OverlapError, Result};
use crate::storage::{ConversationStore, ConversationSummary, Role};
use colored::Colorize;
use prettytable::{format, Table};
use std::io::Write;

const TITLE_COLUMN_CHARS: usize = 40;

/// Handle history commands
pub fn handle_history(store: &ConversationStore, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List => {
            let summaries = store.list();

            if summaries.is_empty() {
                println!("{}", "No conversation history found.".yellow());
                return Ok(());
            }

            println!("\nConversation History:");
            summary_table(&summaries).printstd();
            println!();
            println!(
                "Use {} to resume a conversation.",
                "overlap chat --resume <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { id } => {
            let id = resolve_existing(store, &id)?;
            let conversation = store
                .get(&id)
                .ok_or_else(|| OverlapError::Storage(format!("Conversation not found: {}", id)))?;

            println!("\n{} {}", conversation.title.bold(), format!("({})", id).dimmed());
            println!(
                "{}\n",
                format!(
                    "created {}, updated {}",
                    conversation.created_at.format("%Y-%m-%d %H:%M"),
                    conversation.updated_at.format("%Y-%m-%d %H:%M")
                )
                .dimmed()
            );
            for message in &conversation.messages {
                let label = match message.role {
                    Role::User => "you".green().bold(),
                    Role::Assistant => "assistant".cyan().bold(),
                };
                println!("{} {}", label, message.timestamp.format("%H:%M:%S").to_string().dimmed());
                println!("{}\n", message.content);
            }
        }
        HistoryCommand::Delete { id } => {
            let id = store.resolve_id(&id)?.unwrap_or(id);
            if store.delete_conversation(&id)? {
                println!("{}", format!("Deleted conversation {}", id).green());
            } else {
                println!("{}", format!("No conversation with id {}", id).yellow());
            }
        }
        HistoryCommand::Rename { id, title } => {
            let id = store.resolve_id(&id)?.unwrap_or(id);
            if store.rename_conversation(&id, &title)? {
                println!("{}", format!("Renamed conversation {} to \"{}\"", id, title).green());
            } else {
                println!("{}", format!("No conversation with id {}", id).yellow());
            }
        }
        HistoryCommand::Clear { yes } => {
            if !yes && !confirm("Delete every stored conversation?")? {
                println!("Aborted.");
                return Ok(());
            }
            store.clear_all()?;
            println!("{}", "Cleared conversation history.".green());
        }
    }

    Ok(())
}

/// Table of conversations as shown by `history list` and `/history`
pub fn summary_table(summaries: &[ConversationSummary]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for summary in summaries {
        let id_short: String = summary.id.chars().take(8).collect();
        let title = shorten(&summary.title, TITLE_COLUMN_CHARS);
        let updated = summary.updated_at.format("%Y-%m-%d %H:%M").to_string();

        table.add_row(prettytable::row![
            id_short.cyan(),
            title,
            summary.message_count,
            updated
        ]);
    }

    table
}

/// Resolve a full id or the short id shown by `history list`
///
/// # Errors
///
/// Fails when no conversation matches or the prefix is ambiguous.
pub fn resolve_existing(store: &ConversationStore, id: &str) -> Result<String> {
    store
        .resolve_id(id)?
        .ok_or_else(|| OverlapError::Storage(format!("Conversation not found: {}", id)).into())
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let kept: String = text.chars().take(max_chars - 3).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
