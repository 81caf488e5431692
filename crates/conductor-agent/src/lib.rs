//! Task orchestration over sessions, tools, commands, and the router.
//!
//! The [`Agent`] drives the request pipeline: slash commands bypass model
//! routing entirely; everything else is parsed, routed through
//! `execute_with_fallback`, and run through the tool-calling loop until
//! the model stops requesting tools. `process_input` never returns an
//! error to the caller; failures become structured error responses.

/// The orchestrator.
pub mod agent;
/// Slash-command subsystem.
pub mod command;
/// Input parser collaborator interface.
pub mod parser;
/// Sessions and the session store.
pub mod session;
/// Tool contract, registry, and execution coordinator.
pub mod tools;

pub use agent::{Agent, AgentResponse, AgentStats, AgentStatus};
pub use command::{Command, CommandContext, CommandRegistry};
pub use parser::{NullParser, ParseResult, ParseStatus, ParsedCommand, Parser, ToolRequest};
pub use session::{AgentSession, SessionStore};
pub use tools::{
    SyncTool, Tool, ToolContext, ToolExecutionCoordinator, ToolExecutionResult, ToolRegistry,
    ToolStatus,
};
