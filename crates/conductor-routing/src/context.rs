use std::collections::HashMap;

use conductor_core::{TaskType, estimate_tokens};
use serde_json::Value;

/// Urgency of one routed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum RequestPriority {
    /// Background work.
    Low,
    /// Interactive default.
    #[default]
    Normal,
    /// Latency-sensitive.
    High,
}

/// Per-request context consumed by provider selection.
///
/// Ephemeral: built for one request and discarded afterwards.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    /// Raw user input driving the request.
    pub user_input: String,
    /// Token estimate used by cost-based routing.
    pub estimated_tokens: usize,
    /// Pre-classified task type, classified on demand when `None`.
    pub task_type: Option<TaskType>,
    /// Request urgency.
    pub priority: RequestPriority,
    /// Session values available to custom routing functions.
    pub session_data: HashMap<String, Value>,
}

impl RoutingContext {
    /// Creates a context for the given input with a default token estimate.
    #[must_use]
    pub fn new(user_input: impl Into<String>) -> Self {
        let user_input = user_input.into();
        let estimated_tokens = estimate_tokens(&user_input);
        Self {
            user_input,
            estimated_tokens,
            task_type: None,
            priority: RequestPriority::Normal,
            session_data: HashMap::new(),
        }
    }

    /// Overrides the token estimate.
    #[must_use]
    pub fn with_estimated_tokens(mut self, estimated_tokens: usize) -> Self {
        self.estimated_tokens = estimated_tokens;
        self
    }

    /// Pre-classifies the task type, skipping keyword classification.
    #[must_use]
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    /// Sets the request priority.
    #[must_use]
    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches a session value for custom routing functions.
    #[must_use]
    pub fn with_session_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.session_data.insert(key.into(), value);
        self
    }

    /// Resolves the task type, classifying the input when not preset.
    #[must_use]
    pub fn resolved_task_type(&self) -> TaskType {
        self.task_type
            .unwrap_or_else(|| TaskType::classify(&self.user_input))
    }
}
