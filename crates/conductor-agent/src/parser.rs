use std::path::{Path, PathBuf};

use serde_json::Value;

/// Outcome class of one parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// Input fully understood.
    Success,
    /// Some of the input was understood.
    Partial,
    /// Nothing usable was extracted.
    Failed,
}

/// A structured command extracted from free-form input.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    /// Command name.
    pub name: String,
    /// Structured arguments.
    pub args: Value,
}

/// A tool the parser wants executed before the model is consulted.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    /// Registered tool name.
    pub name: String,
    /// Arguments passed through to the tool context.
    pub arguments: Value,
}

/// Result of parsing one piece of user input.
///
/// The orchestrator reads only `tool_requests` and `file_references`;
/// the rest is surfaced for host applications.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Outcome class.
    pub status: ParseStatus,
    /// Extracted commands.
    pub commands: Vec<ParsedCommand>,
    /// Files referenced by the input.
    pub file_references: Vec<PathBuf>,
    /// Tools to execute before generation.
    pub tool_requests: Vec<ToolRequest>,
    /// Parser confidence in `[0, 1]`.
    pub confidence: f64,
}

impl ParseResult {
    /// A successful parse that extracted nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            status: ParseStatus::Success,
            commands: Vec::new(),
            file_references: Vec::new(),
            tool_requests: Vec::new(),
            confidence: 1.0,
        }
    }
}

/// Input parser collaborator consumed by the orchestrator.
///
/// Parsing grammar is entirely up to the implementation; the core only
/// acts on the extracted tool requests and file references.
pub trait Parser: Send + Sync {
    /// Parses user input relative to the session's working directory.
    fn parse(&self, input: &str, working_directory: &Path) -> ParseResult;
}

/// Default parser that extracts nothing.
#[derive(Default)]
pub struct NullParser;

impl Parser for NullParser {
    fn parse(&self, _input: &str, _working_directory: &Path) -> ParseResult {
        ParseResult::empty()
    }
}
