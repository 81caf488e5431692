use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use conductor_core::{
    ChatMessage, ConductorConfig, IgnoreLock as _, Result, TextStream, provider_key,
};
use conductor_events::{BusStats, Event, EventBus, EventPriority, EventType};
use conductor_routing::{ModelRouter, RouterStats, RoutingContext};
use serde_json::json;
use tracing::{debug, warn};

use crate::command::CommandRegistry;
use crate::parser::{NullParser, Parser};
use crate::session::{AgentSession, SessionStore};
use crate::tools::{Tool, ToolContext, ToolExecutionCoordinator, ToolExecutionResult, ToolRegistry};

/// Cap on model round-trips spent resolving tool calls for one request.
const MAX_TOOL_ITERATIONS: usize = 5;

/// Orchestrator state, transitioning per request and returning to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    /// Waiting for input.
    Idle,
    /// A request is being handled.
    Processing,
    /// A tool is executing.
    ExecutingTool,
    /// The model is generating.
    GeneratingResponse,
    /// The last request failed. Transient, never sticky.
    Error,
}

/// Structured outcome of one `process_input` call.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Response text, empty on failure.
    pub content: String,
    /// `Idle` on success, `Error` on failure.
    pub status: AgentStatus,
    /// Results of every tool executed for this request, failures included.
    pub tool_results: Vec<ToolExecutionResult>,
    /// Wall-clock time spent on the request.
    pub execution_time: Duration,
    /// Error text on failure.
    pub error: Option<String>,
}

/// Snapshot of orchestrator, router, and bus state.
pub struct AgentStats {
    /// Requests seen by `process_input` and `process_stream`.
    pub requests_processed: u64,
    /// Live sessions.
    pub active_sessions: usize,
    /// Router provider snapshot.
    pub router: RouterStats,
    /// Event bus counters.
    pub bus: BusStats,
}

/// The task orchestrator.
///
/// Constructed explicitly from its collaborators; it owns no globals, so
/// hosts can run several agents with independent routers and buses in one
/// process.
pub struct Agent {
    /// System configuration.
    config: ConductorConfig,
    /// Provider selection and fallback.
    router: Arc<ModelRouter>,
    /// Lifecycle event sink. Publishing is fire-and-forget.
    bus: EventBus,
    /// Session store.
    sessions: SessionStore,
    /// Shared tool registry.
    tools: Arc<ToolRegistry>,
    /// Tool execution boundary.
    coordinator: ToolExecutionCoordinator,
    /// Slash-command subsystem.
    commands: CommandRegistry,
    /// Input parser collaborator.
    parser: Arc<dyn Parser>,
    /// System instruction prepended to every generation.
    system_instruction: Option<String>,
    /// Current orchestrator status.
    status: Mutex<AgentStatus>,
    /// Requests seen.
    requests_processed: AtomicU64,
}

impl Agent {
    /// Creates an agent with a null parser, builtin commands, and no tools.
    #[must_use]
    pub fn new(config: ConductorConfig, router: Arc<ModelRouter>, bus: EventBus) -> Self {
        let tools = Arc::new(ToolRegistry::new());
        Self {
            sessions: SessionStore::new(config.session.clone()),
            coordinator: ToolExecutionCoordinator::new(Arc::clone(&tools)),
            tools,
            commands: CommandRegistry::with_builtins(),
            parser: Arc::new(NullParser),
            system_instruction: None,
            status: Mutex::new(AgentStatus::Idle),
            requests_processed: AtomicU64::new(0),
            config,
            router,
            bus,
        }
    }

    /// Replaces the parser collaborator.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = parser;
        self
    }

    /// Sets the system instruction sent with every generation.
    #[must_use]
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Replaces the command registry.
    #[must_use]
    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = commands;
        self
    }

    /// Registers a tool.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.tools.register(tool);
    }

    /// The shared tool registry.
    #[must_use]
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// The session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Current orchestrator status.
    #[must_use]
    pub fn status(&self) -> AgentStatus {
        let status = self.status.lock_ignore_poison();
        *status
    }

    /// Handles one user request end to end.
    ///
    /// Never returns an error: provider exhaustion, tool failures, and
    /// anything else surface inside the returned response. Concurrent
    /// calls against the same session id are serialized by the session's
    /// own lock.
    pub async fn process_input(&self, user_input: &str, session_id: &str) -> AgentResponse {
        let started = Instant::now();
        self.requests_processed.fetch_add(1, Ordering::SeqCst);
        self.set_status(AgentStatus::Processing);

        let root = Event::new(EventType::UserInputReceived, "agent")
            .with_data("session_id", json!(session_id));
        self.bus.publish(root.clone());

        let shared = self.sessions.get_or_create(session_id, None);
        let mut session = shared.lock().await;
        session.push_message(ChatMessage::user(user_input));

        let (outcome, tool_results) = if user_input.trim_start().starts_with('/') {
            // Slash commands bypass routing entirely.
            let content = self.commands.dispatch(user_input.trim(), &mut session).await;
            (Ok(content), Vec::new())
        } else {
            self.bus
                .publish(Event::new(EventType::TaskStarted, "agent").caused_by(&root));
            self.run_model_pipeline(user_input, &mut session, &root).await
        };

        match outcome {
            Ok(content) => {
                session.push_message(ChatMessage::assistant(content.clone()));
                self.bus
                    .publish(Event::new(EventType::ResponseGenerated, "agent").caused_by(&root));
                self.bus
                    .publish(Event::new(EventType::TaskCompleted, "agent").caused_by(&root));
                self.set_status(AgentStatus::Idle);
                AgentResponse {
                    content,
                    status: AgentStatus::Idle,
                    tool_results,
                    execution_time: started.elapsed(),
                    error: None,
                }
            }
            Err(error) => {
                self.set_status(AgentStatus::Error);
                warn!(session = %session_id, "request failed: {error}");
                self.bus.publish(
                    Event::new(EventType::TaskFailed, "agent")
                        .caused_by(&root)
                        .with_priority(EventPriority::High)
                        .with_data("error", json!(error.to_string())),
                );
                self.bus.publish(
                    Event::new(EventType::ErrorOccurred, "agent")
                        .caused_by(&root)
                        .with_data("error", json!(error.to_string())),
                );
                self.set_status(AgentStatus::Idle);
                AgentResponse {
                    content: String::new(),
                    status: AgentStatus::Error,
                    tool_results,
                    execution_time: started.elapsed(),
                    error: Some(error.to_string()),
                }
            }
        }
    }

    /// Streams a response for one request.
    ///
    /// Commands still work and come back as a single chunk. The assistant
    /// turn is not appended to the history, since the streamed content is
    /// only known to the consumer.
    ///
    /// # Errors
    ///
    /// Unlike `process_input`, selection and stream-setup failures are
    /// returned to the caller, which owns rendering for a live stream.
    pub async fn process_stream(&self, user_input: &str, session_id: &str) -> Result<TextStream> {
        use futures::StreamExt as _;

        self.requests_processed.fetch_add(1, Ordering::SeqCst);
        self.set_status(AgentStatus::Processing);

        let shared = self.sessions.get_or_create(session_id, None);
        let mut session = shared.lock().await;
        session.push_message(ChatMessage::user(user_input));

        if user_input.trim_start().starts_with('/') {
            let content = self.commands.dispatch(user_input.trim(), &mut session).await;
            session.push_message(ChatMessage::assistant(content.clone()));
            self.set_status(AgentStatus::Idle);
            return Ok(futures::stream::once(async move { Ok(content) }).boxed());
        }

        let ctx = RoutingContext::new(user_input);
        let adapter = match self.router.select_provider(&ctx).await {
            Ok(adapter) => adapter,
            Err(error) => {
                self.set_status(AgentStatus::Idle);
                return Err(error);
            }
        };
        let key = provider_key(adapter.as_ref());

        self.set_status(AgentStatus::GeneratingResponse);
        let messages = session.history();
        let started = Instant::now();
        let outcome = adapter
            .generate_stream(&messages, self.system_instruction.as_deref())
            .await;
        self.router
            .registry()
            .record_completion(&key, outcome.is_ok(), started.elapsed());
        self.set_status(AgentStatus::Idle);
        outcome
    }

    /// Snapshot of orchestrator, router, and bus state.
    #[must_use]
    pub fn stats(&self) -> AgentStats {
        AgentStats {
            requests_processed: self.requests_processed.load(Ordering::SeqCst),
            active_sessions: self.sessions.len(),
            router: self.router.stats(),
            bus: self.bus.stats(),
        }
    }

    /// Parses the input, runs parser-identified tools, and drives the
    /// tool-calling loop against the router.
    ///
    /// Tool results gathered before a provider failure survive into the
    /// error response.
    async fn run_model_pipeline(
        &self,
        user_input: &str,
        session: &mut AgentSession,
        root: &Event,
    ) -> (Result<String>, Vec<ToolExecutionResult>) {
        let mut tool_results = Vec::new();
        let parse = self.parser.parse(user_input, &session.working_directory);
        let ctx = RoutingContext::new(user_input);

        for request in &parse.tool_requests {
            self.set_status(AgentStatus::ExecutingTool);
            let tool_ctx = ToolContext::new(user_input, session.working_directory.clone())
                .with_args(request.arguments.clone())
                .with_session_data(session.context_data.clone())
                .with_file_list(parse.file_references.clone());
            let result = self.coordinator.execute_tool(&request.name, &tool_ctx).await;
            self.emit_tool_event(root, &result);
            session.push_message(ChatMessage::tool(render_tool_result(&result)));
            tool_results.push(result);
        }

        self.set_status(AgentStatus::GeneratingResponse);
        let mut response = match self
            .router
            .execute_with_fallback(
                &session.history(),
                self.system_instruction.as_deref(),
                &ctx,
                self.config.router.max_retries,
            )
            .await
        {
            Ok(response) => response,
            Err(error) => return (Err(error), tool_results),
        };

        let mut iterations = 0;
        while response.has_tool_calls() && iterations < MAX_TOOL_ITERATIONS {
            iterations += 1;
            self.set_status(AgentStatus::ExecutingTool);
            for call in &response.tool_calls {
                let tool_ctx = ToolContext::new(user_input, session.working_directory.clone())
                    .with_args(call.arguments.clone())
                    .with_session_data(session.context_data.clone());
                let result = self.coordinator.execute_tool(&call.name, &tool_ctx).await;
                self.emit_tool_event(root, &result);
                session.push_message(ChatMessage::tool(render_tool_result(&result)));
                tool_results.push(result);
            }

            self.set_status(AgentStatus::GeneratingResponse);
            response = match self
                .router
                .execute_with_fallback(
                    &session.history(),
                    self.system_instruction.as_deref(),
                    &ctx,
                    self.config.router.max_retries,
                )
                .await
            {
                Ok(response) => response,
                Err(error) => return (Err(error), tool_results),
            };
        }

        if response.has_tool_calls() {
            warn!(
                iterations = MAX_TOOL_ITERATIONS,
                "tool iteration cap reached, returning partial response"
            );
        }
        debug!(tools = tool_results.len(), "request pipeline finished");
        (Ok(response.content), tool_results)
    }

    /// Publishes a tool-executed lifecycle event.
    fn emit_tool_event(&self, root: &Event, result: &ToolExecutionResult) {
        self.bus.publish(
            Event::new(EventType::ToolExecuted, "agent")
                .caused_by(root)
                .with_data("tool", json!(result.tool_name))
                .with_data("success", json!(result.is_success())),
        );
    }

    /// Updates the orchestrator status.
    fn set_status(&self, next: AgentStatus) {
        let mut status = self.status.lock_ignore_poison();
        *status = next;
    }
}

/// Renders a tool result as a history turn for the model.
fn render_tool_result(result: &ToolExecutionResult) -> String {
    json!({
        "tool": result.tool_name,
        "status": if result.is_success() { "success" } else { "error" },
        "message": result.message,
        "data": result.data,
    })
    .to_string()
}
