use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use conductor_core::IgnoreLock as _;
use futures::FutureExt as _;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Everything a tool may read during one execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Raw user input for the request.
    pub user_input: String,
    /// Arguments for this specific invocation.
    pub parsed_args: Value,
    /// Session-scoped values.
    pub session_data: HashMap<String, Value>,
    /// Session working directory.
    pub working_directory: PathBuf,
    /// Files the parser associated with the request.
    pub file_list: Vec<PathBuf>,
}

impl ToolContext {
    /// Creates a context with empty arguments and session data.
    #[must_use]
    pub fn new(user_input: impl Into<String>, working_directory: PathBuf) -> Self {
        Self {
            user_input: user_input.into(),
            parsed_args: Value::Null,
            session_data: HashMap::new(),
            working_directory,
            file_list: Vec::new(),
        }
    }

    /// Sets the invocation arguments.
    #[must_use]
    pub fn with_args(mut self, parsed_args: Value) -> Self {
        self.parsed_args = parsed_args;
        self
    }

    /// Attaches session-scoped values.
    #[must_use]
    pub fn with_session_data(mut self, session_data: HashMap<String, Value>) -> Self {
        self.session_data = session_data;
        self
    }

    /// Attaches the files referenced by the request.
    #[must_use]
    pub fn with_file_list(mut self, file_list: Vec<PathBuf>) -> Self {
        self.file_list = file_list;
        self
    }
}

/// Outcome class of one tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    /// The tool completed.
    Success,
    /// The tool failed; the message carries the reason.
    Error,
}

/// Structured outcome of one tool execution.
///
/// Tool failures live inside this type. Nothing at or below the
/// coordinator boundary raises them as errors.
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    /// Name of the executed tool.
    pub tool_name: String,
    /// Outcome class.
    pub status: ToolStatus,
    /// Output payload on success.
    pub data: Option<Value>,
    /// Human-readable summary or error reason.
    pub message: String,
    /// Rich-display hints for host applications.
    pub metadata: Map<String, Value>,
}

impl ToolExecutionResult {
    /// A successful result with an output payload.
    #[must_use]
    pub fn success(
        tool_name: impl Into<String>,
        data: Option<Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Success,
            data,
            message: message.into(),
            metadata: Map::new(),
        }
    }

    /// A failed result carrying the error reason.
    #[must_use]
    pub fn error(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Error,
            data: None,
            message: message.into(),
            metadata: Map::new(),
        }
    }

    /// Whether the tool completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// A named callable exposed to the model and the parser.
///
/// This is the single tool contract: inherently synchronous tools are
/// wrapped once at registration (see [`SyncTool`]) rather than bridged
/// on every call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// One-line description shown by `/help` and model prompts.
    fn description(&self) -> &str;

    /// Executes the tool. Failures are encoded in the result.
    async fn execute(&self, ctx: &ToolContext) -> ToolExecutionResult;
}

/// Adapter wrapping a synchronous closure as a [`Tool`].
pub struct SyncTool<F> {
    /// Registered name.
    name: String,
    /// One-line description.
    description: String,
    /// Wrapped closure.
    function: F,
}

impl<F> SyncTool<F>
where
    F: Fn(&ToolContext) -> ToolExecutionResult + Send + Sync,
{
    /// Wraps a synchronous closure under the given name.
    pub fn new(name: impl Into<String>, description: impl Into<String>, function: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            function,
        }
    }
}

#[async_trait]
impl<F> Tool for SyncTool<F>
where
    F: Fn(&ToolContext) -> ToolExecutionResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, ctx: &ToolContext) -> ToolExecutionResult {
        (self.function)(ctx)
    }
}

/// Name-keyed tool registry.
#[derive(Default)]
pub struct ToolRegistry {
    /// Registered tools.
    tools: Mutex<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its own name, replacing any existing entry.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_owned();
        let mut tools = self.tools.lock_ignore_poison();
        if tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "replacing already-registered tool");
        }
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.lock_ignore_poison();
        tools.get(name).map(Arc::clone)
    }

    /// Registered `(name, description)` pairs, sorted by name.
    #[must_use]
    pub fn descriptions(&self) -> Vec<(String, String)> {
        let tools = self.tools.lock_ignore_poison();
        let mut entries: Vec<(String, String)> = tools
            .values()
            .map(|tool| (tool.name().to_owned(), tool.description().to_owned()))
            .collect();
        entries.sort();
        entries
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        let tools = self.tools.lock_ignore_poison();
        tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Executes tools by name, absorbing every failure mode into a result.
#[derive(Clone)]
pub struct ToolExecutionCoordinator {
    /// Shared tool registry.
    registry: Arc<ToolRegistry>,
}

impl ToolExecutionCoordinator {
    /// Creates a coordinator over a shared registry.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Executes one tool.
    ///
    /// An unknown name and a panicking tool both come back as ERROR
    /// results; nothing escapes this boundary.
    pub async fn execute_tool(&self, name: &str, ctx: &ToolContext) -> ToolExecutionResult {
        let Some(tool) = self.registry.get(name) else {
            return ToolExecutionResult::error(name, format!("Unknown tool: {name}"));
        };

        debug!(tool = %name, "executing tool");
        let outcome = AssertUnwindSafe(tool.execute(ctx)).catch_unwind().await;
        match outcome {
            Ok(result) => result,
            Err(_panic) => {
                warn!(tool = %name, "tool panicked during execution");
                ToolExecutionResult::error(name, format!("Tool panicked: {name}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool() -> Arc<dyn Tool> {
        Arc::new(SyncTool::new("echo", "echoes its arguments", |ctx| {
            ToolExecutionResult::success("echo", Some(ctx.parsed_args.clone()), "echoed")
        }))
    }

    #[tokio::test]
    async fn test_execute_registered_tool() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(echo_tool());
        let coordinator = ToolExecutionCoordinator::new(Arc::clone(&registry));

        let ctx = ToolContext::new("say hi", PathBuf::from("."))
            .with_args(serde_json::json!({"text": "hi"}));
        let result = coordinator.execute_tool("echo", &ctx).await;

        assert!(result.is_success());
        assert_eq!(result.data, Some(serde_json::json!({"text": "hi"})));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let coordinator = ToolExecutionCoordinator::new(Arc::new(ToolRegistry::new()));
        let ctx = ToolContext::new("anything", PathBuf::from("."));

        let result = coordinator.execute_tool("missing", &ctx).await;
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.message.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_panicking_tool_is_error_result() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(SyncTool::new("boom", "always panics", |_ctx| {
            panic!("tool bug")
        })));
        let coordinator = ToolExecutionCoordinator::new(registry);

        let ctx = ToolContext::new("anything", PathBuf::from("."));
        let result = coordinator.execute_tool("boom", &ctx).await;
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.message.contains("panicked"));
    }

    #[test]
    fn test_registry_descriptions_sorted() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(SyncTool::new("zip", "compresses", |_ctx| {
            ToolExecutionResult::success("zip", None, "")
        })));
        registry.register(echo_tool());

        let names: Vec<String> = registry
            .descriptions()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["echo".to_owned(), "zip".to_owned()]);
    }
}
