//! Mock adapter for testing routing and orchestration.
//!
//! Supports canned responses keyed by message content, scripted responses
//! (including tool calls), scripted failures, artificial latency, and a
//! controllable health flag, enabling deterministic tests of fallback and
//! circuit-breaker behavior without real API calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::{
    ChatMessage, Error, IgnoreLock as _, ModelResponse, ModelSize, ProviderAdapter, Result,
    TextStream, TokenUsage,
};
use futures::StreamExt as _;

/// Response storage keyed by message substring.
type ResponseMap = Arc<Mutex<HashMap<String, String>>>;

/// Mock provider adapter returning pre-defined responses.
#[derive(Clone)]
pub struct MockAdapter {
    /// Provider name reported to the router.
    provider: String,
    /// Model name reported to the router.
    model: String,
    /// Size class for task-optimized routing.
    size: ModelSize,
    /// Substring-matched canned responses.
    responses: ResponseMap,
    /// Scripted responses consumed in order before pattern matching.
    scripted: Arc<Mutex<VecDeque<ModelResponse>>>,
    /// Default response when nothing matches.
    default_response: Arc<Mutex<Option<String>>>,
    /// Number of upcoming calls that fail before succeeding.
    failures_remaining: Arc<AtomicUsize>,
    /// When set, every call fails.
    always_fail: Arc<AtomicBool>,
    /// Artificial latency applied to every call.
    latency: Arc<Mutex<Duration>>,
    /// Health flag returned by `health_check`.
    healthy: Arc<AtomicBool>,
    /// History of the last user message per call.
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockAdapter {
    /// Creates a new mock adapter with the given provider and model names.
    #[must_use]
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            size: ModelSize::Medium,
            responses: Arc::new(Mutex::new(HashMap::new())),
            scripted: Arc::new(Mutex::new(VecDeque::new())),
            default_response: Arc::new(Mutex::new(None)),
            failures_remaining: Arc::new(AtomicUsize::new(0)),
            always_fail: Arc::new(AtomicBool::new(false)),
            latency: Arc::new(Mutex::new(Duration::ZERO)),
            healthy: Arc::new(AtomicBool::new(true)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sets the size class.
    #[must_use]
    pub fn with_size(mut self, size: ModelSize) -> Self {
        self.size = size;
        self
    }

    /// Adds a substring-matched canned response.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        {
            let mut responses = self.responses.lock_ignore_poison();
            responses.insert(pattern.into(), response.into());
        }
        self
    }

    /// Sets the default response for unmatched messages.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        {
            let mut default = self.default_response.lock_ignore_poison();
            *default = Some(response.into());
        }
        self
    }

    /// Queues a full scripted response, consumed before pattern matching.
    #[must_use]
    pub fn with_scripted_response(self, response: ModelResponse) -> Self {
        {
            let mut scripted = self.scripted.lock_ignore_poison();
            scripted.push_back(response);
        }
        self
    }

    /// Makes the next `count` calls fail with a provider error.
    #[must_use]
    pub fn with_failures(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Makes every call fail with a provider error.
    #[must_use]
    pub fn always_failing(self) -> Self {
        self.always_fail.store(true, Ordering::SeqCst);
        self
    }

    /// Applies an artificial delay to every call.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        {
            let mut current = self.latency.lock_ignore_poison();
            *current = latency;
        }
        self
    }

    /// Sets the health flag returned by `health_check`.
    #[must_use]
    pub fn with_healthy(self, healthy: bool) -> Self {
        self.healthy.store(healthy, Ordering::SeqCst);
        self
    }

    /// Marks the adapter healthy or unhealthy after construction.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Returns the history of user messages seen by this adapter.
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        let history = self.call_history.lock_ignore_poison();
        history.clone()
    }

    /// Returns the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        let history = self.call_history.lock_ignore_poison();
        history.len()
    }

    /// Finds a canned response matching the given message text.
    fn find_response(&self, text: &str) -> Option<String> {
        let responses = self.responses.lock_ignore_poison();

        if let Some(response) = responses.get(text) {
            return Some(response.clone());
        }

        responses
            .iter()
            .find(|(pattern, _)| text.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
    }

    /// Records the call and consumes one scripted failure if armed.
    fn record_call(&self, text: &str) -> Result<()> {
        {
            let mut history = self.call_history.lock_ignore_poison();
            history.push(text.to_owned());
        }

        if self.always_fail.load(Ordering::SeqCst) {
            return Err(Error::Provider(format!(
                "{}:{} scripted failure",
                self.provider, self.model
            )));
        }

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Provider(format!(
                "{}:{} scripted failure",
                self.provider, self.model
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn model_size(&self) -> ModelSize {
        self.size
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        _system_instruction: Option<&str>,
    ) -> Result<ModelResponse> {
        let latency = {
            let guard = self.latency.lock_ignore_poison();
            *guard
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let text = messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();

        self.record_call(&text)?;

        {
            let mut scripted = self.scripted.lock_ignore_poison();
            if let Some(response) = scripted.pop_front() {
                return Ok(response);
            }
        }

        let content = self.find_response(&text).unwrap_or_else(|| {
            let default = self.default_response.lock_ignore_poison();
            default
                .clone()
                .unwrap_or_else(|| format!("Mock response for: {text}"))
        });

        Ok(ModelResponse {
            content,
            model: self.model.clone(),
            usage: TokenUsage::new(text.len() as u64 / 4, 8),
            finish_reason: Some("stop".to_owned()),
            tool_calls: Vec::new(),
        })
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        system_instruction: Option<&str>,
    ) -> Result<TextStream> {
        let response = self.generate(messages, system_instruction).await?;
        let chunks: Vec<Result<String>> = response
            .content
            .split_inclusive(' ')
            .map(|chunk| Ok(chunk.to_owned()))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
