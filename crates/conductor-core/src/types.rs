use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Result of a tool invocation fed back to the model.
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: Role,
    /// Textual content.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system<T: Into<String>>(content: T) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user<T: Into<String>>(content: T) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant<T: Into<String>>(content: T) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Creates a tool-result message.
    pub fn tool<T: Into<String>>(content: T) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// Token accounting for a single model response.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt portion of the request.
    pub prompt_tokens: u64,
    /// Tokens produced in the completion.
    pub completion_tokens: u64,
    /// Total tokens billed for the request.
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Creates usage from prompt and completion counts.
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A function call requested by the model.
///
/// Adapters translate whatever native shape their backend uses into this
/// explicit form, so the orchestrator never inspects provider-specific
/// response payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments for the invocation.
    pub arguments: Value,
}

/// Response from a model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Generated text content.
    pub content: String,
    /// Model that produced the response.
    pub model: String,
    /// Token accounting.
    pub usage: TokenUsage,
    /// Why generation stopped, when the backend reports it.
    pub finish_reason: Option<String>,
    /// Tool invocations the model requested, empty when none.
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    /// Creates a plain text response with no tool calls.
    pub fn text<T: Into<String>, M: Into<String>>(content: T, model: M) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_owned()),
            tool_calls: Vec::new(),
        }
    }

    /// Whether the model requested tool invocations.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether the response was truncated by the token limit.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.finish_reason.as_deref() != Some("length")
    }
}

/// Size class of a model, used for task-optimized routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    /// Fast models for quick and simple tasks.
    Small,
    /// Balanced models.
    Medium,
    /// Capable models for complex and critical tasks.
    Large,
}

/// Task classification derived from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Reviewing or examining existing code.
    CodeAnalysis,
    /// Producing new code.
    CodeGeneration,
    /// Summarizing or explaining content.
    FileSummary,
    /// Long or explicitly complex requests.
    ComplexReasoning,
    /// Everything else.
    SimpleQuestions,
}

/// Input length above which a request is treated as complex reasoning.
const COMPLEX_INPUT_LEN: usize = 500;

impl TaskType {
    /// Classifies a task from raw user input using keyword heuristics.
    #[must_use]
    pub fn classify(user_input: &str) -> Self {
        let lower = user_input.to_lowercase();
        let contains_any =
            |words: &[&str]| words.iter().any(|word| lower.contains(word));

        if contains_any(&["analyze", "review", "check", "examine"]) {
            Self::CodeAnalysis
        } else if contains_any(&["create", "generate", "write", "implement"]) {
            Self::CodeGeneration
        } else if contains_any(&["summarize", "explain", "what is"]) {
            Self::FileSummary
        } else if user_input.len() > COMPLEX_INPUT_LEN
            || contains_any(&["complex", "detailed", "comprehensive"])
        {
            Self::ComplexReasoning
        } else {
            Self::SimpleQuestions
        }
    }

    /// Preferred model size class for this task type.
    #[must_use]
    pub fn preferred_size(self) -> ModelSize {
        match self {
            Self::CodeAnalysis => ModelSize::Medium,
            Self::CodeGeneration | Self::ComplexReasoning => ModelSize::Large,
            Self::FileSummary | Self::SimpleQuestions => ModelSize::Small,
        }
    }
}

/// Estimates the token count of a text (rough characters-per-token heuristic).
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}
