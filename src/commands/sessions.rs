//! Saved chat session commands

use crate::cli::SessionCommand;
use crate::error::{RagPersonaError, Result};
use crate::persona::persona_key;
use crate::storage::SqliteStorage;
use colored::Colorize;
use prettytable::{format, Table};

/// Handle session commands
pub fn handle_sessions(storage: &SqliteStorage, command: SessionCommand) -> Result<()> {
    match command {
        SessionCommand::List => {
            let sessions = storage.list_sessions()?;

            if sessions.is_empty() {
                println!("{}", "No saved chat sessions found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

            table.add_row(prettytable::row![
                "Persona".bold(),
                "Turns".bold(),
                "Started".bold(),
                "Last Updated".bold()
            ]);

            for session in sessions {
                table.add_row(prettytable::row![
                    session.persona_name.cyan(),
                    session.turn_count,
                    session.created_at.format("%Y-%m-%d %H:%M"),
                    session.updated_at.format("%Y-%m-%d %H:%M")
                ]);
            }

            println!("\nSaved chat sessions:");
            table.printstd();
            println!();
            println!(
                "Use {} to continue a session.",
                "ragpersona chat <PERSONA> --resume".cyan()
            );
            println!();
        }
        SessionCommand::Delete { persona } => {
            if !storage.delete_session(&persona_key(&persona))? {
                return Err(RagPersonaError::NotFound {
                    kind: "Session",
                    name: persona,
                    suggestion: None,
                }
                .into());
            }
            println!("{}", format!("Deleted saved session of {}", persona).green());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Turn;
    use tempfile::TempDir;

    #[test]
    fn test_delete_missing_session_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(dir.path()).unwrap();
        let err = handle_sessions(
            &storage,
            SessionCommand::Delete {
                persona: "Rick".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagPersonaError>(),
            Some(RagPersonaError::NotFound { kind: "Session", .. })
        ));
    }

    #[test]
    fn test_delete_session_by_display_name() {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(dir.path()).unwrap();
        storage.save_session("rick", &[Turn::user("hi")]).unwrap();

        handle_sessions(
            &storage,
            SessionCommand::Delete {
                persona: "Rick".to_string(),
            },
        )
        .unwrap();
        assert!(storage.load_session("rick").unwrap().is_none());
    }

    #[test]
    fn test_list_sessions_runs_on_empty_store() {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(dir.path()).unwrap();
        assert!(handle_sessions(&storage, SessionCommand::List).is_ok());
    }
}
