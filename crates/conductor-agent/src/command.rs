use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use conductor_core::{IgnoreLock as _, Result};
use tracing::debug;

use crate::session::AgentSession;

/// Everything a command may read or mutate during one dispatch.
pub struct CommandContext<'a> {
    /// Argument text after the command name, possibly empty.
    pub args: &'a str,
    /// The session the command was issued in.
    pub session: &'a mut AgentSession,
    /// Registered `(name, description)` pairs, sorted by name.
    pub available: &'a [(String, String)],
}

/// A slash command, dispatched without touching model routing.
#[async_trait]
pub trait Command: Send + Sync {
    /// Name without the leading slash.
    fn name(&self) -> &str;

    /// One-line description shown by `/help`.
    fn description(&self) -> &str;

    /// Executes the command, returning its response text.
    ///
    /// # Errors
    ///
    /// Returns an error when the command cannot complete; the registry
    /// renders it as error text rather than propagating it.
    async fn execute(&self, ctx: CommandContext<'_>) -> Result<String>;
}

/// Lists every registered command.
struct HelpCommand;

#[async_trait]
impl Command for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "List available commands"
    }

    async fn execute(&self, ctx: CommandContext<'_>) -> Result<String> {
        let mut listing = String::from("Available commands:\n");
        for (name, description) in ctx.available {
            let _ = writeln!(listing, "  /{name} - {description}");
        }
        Ok(listing.trim_end().to_owned())
    }
}

/// Shows the current session's state.
struct StatusCommand;

#[async_trait]
impl Command for StatusCommand {
    fn name(&self) -> &str {
        "status"
    }

    fn description(&self) -> &str {
        "Show session status"
    }

    async fn execute(&self, ctx: CommandContext<'_>) -> Result<String> {
        Ok(format!(
            "Session: {}\nWorking directory: {}\nHistory entries: {}",
            ctx.session.session_id,
            ctx.session.working_directory.display(),
            ctx.session.conversation_history.len(),
        ))
    }
}

/// Clears the session's conversation history.
struct ClearCommand;

#[async_trait]
impl Command for ClearCommand {
    fn name(&self) -> &str {
        "clear"
    }

    fn description(&self) -> &str {
        "Clear conversation history"
    }

    async fn execute(&self, ctx: CommandContext<'_>) -> Result<String> {
        ctx.session.clear_history();
        Ok("Conversation history cleared.".to_owned())
    }
}

/// Name-keyed command registry with dispatch.
pub struct CommandRegistry {
    /// Registered commands.
    commands: Mutex<HashMap<String, Arc<dyn Command>>>,
}

impl CommandRegistry {
    /// Creates a registry preloaded with `/help`, `/status`, and `/clear`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self {
            commands: Mutex::new(HashMap::new()),
        };
        registry.register(Arc::new(HelpCommand));
        registry.register(Arc::new(StatusCommand));
        registry.register(Arc::new(ClearCommand));
        registry
    }

    /// Registers a command under its own name, replacing any existing one.
    pub fn register(&self, command: Arc<dyn Command>) {
        let mut commands = self.commands.lock_ignore_poison();
        commands.insert(command.name().to_owned(), command);
    }

    /// Registered `(name, description)` pairs, sorted by name.
    #[must_use]
    pub fn descriptions(&self) -> Vec<(String, String)> {
        let commands = self.commands.lock_ignore_poison();
        let mut entries: Vec<(String, String)> = commands
            .values()
            .map(|command| (command.name().to_owned(), command.description().to_owned()))
            .collect();
        entries.sort();
        entries
    }

    /// Dispatches a slash-command line against a session.
    ///
    /// Unknown commands and command errors come back as response text;
    /// dispatch itself never fails.
    pub async fn dispatch(&self, input: &str, session: &mut AgentSession) -> String {
        let stripped = input.trim_start_matches('/');
        let (name, args) = match stripped.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (stripped, ""),
        };

        let command = {
            let commands = self.commands.lock_ignore_poison();
            commands.get(name).map(Arc::clone)
        };
        let Some(command) = command else {
            return format!("Unknown command: /{name}. Try /help.");
        };

        debug!(command = %name, "dispatching command");
        let available = self.descriptions();
        let ctx = CommandContext {
            args,
            session,
            available: &available,
        };
        match command.execute(ctx).await {
            Ok(response) => response,
            Err(error) => format!("Command /{name} failed: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use conductor_core::{ChatMessage, SessionConfig};

    use super::*;

    fn test_session() -> AgentSession {
        AgentSession::new("s", None, &SessionConfig::default())
    }

    #[tokio::test]
    async fn test_help_lists_builtins() {
        let registry = CommandRegistry::with_builtins();
        let mut session = test_session();

        let response = registry.dispatch("/help", &mut session).await;
        assert!(response.contains("/help"));
        assert!(response.contains("/status"));
        assert!(response.contains("/clear"));
    }

    #[tokio::test]
    async fn test_clear_empties_history() {
        let registry = CommandRegistry::with_builtins();
        let mut session = test_session();
        session.push_message(ChatMessage::user("hello"));

        let response = registry.dispatch("/clear", &mut session).await;
        assert!(response.contains("cleared"));
        assert!(session.conversation_history.is_empty());
    }

    #[tokio::test]
    async fn test_status_reports_session() {
        let registry = CommandRegistry::with_builtins();
        let mut session = test_session();
        session.push_message(ChatMessage::user("hello"));

        let response = registry.dispatch("/status", &mut session).await;
        assert!(response.contains("Session: s"));
        assert!(response.contains("History entries: 1"));
    }

    #[tokio::test]
    async fn test_unknown_command_is_soft_error() {
        let registry = CommandRegistry::with_builtins();
        let mut session = test_session();

        let response = registry.dispatch("/nope", &mut session).await;
        assert!(response.contains("Unknown command: /nope"));
    }
}
