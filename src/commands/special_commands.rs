//! Special commands parser for interactive chat
//!
//! Commands are prefixed with `/` and are case-insensitive. Anything else
//! (apart from a bare `exit` or `quit`) is sent as a chat message.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a fresh conversation
    New,

    /// List stored conversations
    History,

    /// Retitle the active conversation
    Rename(String),

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; send the input as a message
    None,
}

/// Parse one line of chat input
///
/// # Errors
///
/// Returns `CommandError` for an unknown `/command` or a missing argument.
///
/// # Examples
///
/// ```
/// use overlap::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::New);
/// assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    match lower.as_str() {
        "/new" | "/clear" => Ok(SpecialCommand::New),
        "/history" | "/list" => Ok(SpecialCommand::History),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" | "exit" | "quit" => Ok(SpecialCommand::Exit),

        "/rename" => Err(CommandError::MissingArgument {
            command: "/rename".to_string(),
            usage: "/rename <title>".to_string(),
        }),
        // Keep the title's original casing.
        input if input.starts_with("/rename ") => {
            Ok(SpecialCommand::Rename(trimmed[8..].trim().to_string()))
        }

        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print the list of special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

  /new            - Start a new conversation
  /history        - List stored conversations
  /rename <title> - Rename the current conversation
  /help           - Show this help
  /exit           - Leave the chat (also: exit, quit, Ctrl-D)

While a reply is streaming, press Ctrl-C to stop it.
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(
            parse_special_command("what is rust?").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_commands_are_case_insensitive() {
        assert_eq!(parse_special_command("/NEW").unwrap(), SpecialCommand::New);
        assert_eq!(
            parse_special_command("  /History ").unwrap(),
            SpecialCommand::History
        );
        assert_eq!(parse_special_command("Quit").unwrap(), SpecialCommand::Exit);
    }

    #[test]
    fn test_rename_keeps_title_case() {
        assert_eq!(
            parse_special_command("/rename Trip To Oslo").unwrap(),
            SpecialCommand::Rename("Trip To Oslo".to_string())
        );
    }

    #[test]
    fn test_rename_requires_title() {
        let err = parse_special_command("/rename").unwrap_err();
        assert!(matches!(err, CommandError::MissingArgument { .. }));
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_special_command("/frobnicate").unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("/frobnicate".to_string()));
        assert!(err.to_string().contains("/help"));
    }
}
