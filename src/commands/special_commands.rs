//! Special commands parser for interactive chat mode
//!
//! Special commands are handled by the chat loop instead of being sent to
//! the persona. They are prefixed with `/` and are case-insensitive; the
//! bare words `clear`, `history`, `exit`, `quit` and `q` are accepted too.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Display help information
    Help,

    /// Forget the conversation so far
    Clear,

    /// Print the turns of the current session
    ShowHistory,

    /// Show persona, model and session details
    ShowStatus,

    /// Persist the current session
    Save,

    /// Exit the interactive session
    Exit,

    /// Not a special command; send the input to the persona
    None,
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognised `/command` and
/// `CommandError::UnsupportedArgument` when a command that takes no
/// argument is given one.
///
/// # Examples
///
/// ```
/// use ragpersona::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/clear").unwrap(), SpecialCommand::Clear);
/// assert_eq!(parse_special_command("q").unwrap(), SpecialCommand::Exit);
/// assert_eq!(parse_special_command("hello Rick").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    match lower.as_str() {
        "exit" | "quit" | "q" => return Ok(SpecialCommand::Exit),
        "clear" => return Ok(SpecialCommand::Clear),
        "history" => return Ok(SpecialCommand::ShowHistory),
        _ => {}
    }

    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (command, arg) = match lower.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (lower.as_str(), ""),
    };

    let parsed = match command {
        "/help" | "/?" => SpecialCommand::Help,
        "/clear" | "/reset" => SpecialCommand::Clear,
        "/history" => SpecialCommand::ShowHistory,
        "/status" => SpecialCommand::ShowStatus,
        "/save" => SpecialCommand::Save,
        "/exit" | "/quit" | "/q" => SpecialCommand::Exit,
        _ => return Err(CommandError::UnknownCommand(trimmed.to_string())),
    };

    if !arg.is_empty() {
        return Err(CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        });
    }

    Ok(parsed)
}

/// Print help for the special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

CONVERSATION:
  /clear          - Forget the conversation so far (also: clear)
  /history        - Show the conversation so far (also: history)
  /save           - Save the conversation; resume later with --resume

SESSION INFORMATION:
  /status         - Show persona, model and knowledge base details
  /help           - Show this help message

EXIT:
  /exit           - Leave the chat (also: exit, quit, q, Ctrl-D)

Press Ctrl-C while the persona is answering to stop the reply.
"#
    );
}
