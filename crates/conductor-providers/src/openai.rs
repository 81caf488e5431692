use std::env;

use async_trait::async_trait;
use conductor_core::{
    ChatMessage, Error, ModelResponse, ModelSize, ProviderAdapter, Result, Role, TextStream,
    TokenUsage, ToolCall,
};
use futures::StreamExt as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Default chat completions endpoint.
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Default model.
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Env var key for the API key.
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Adapter for OpenAI-compatible chat completion APIs.
///
/// The endpoint URL is configurable, so this adapter also covers services
/// that expose the same wire format under a different base URL.
pub struct OpenAiAdapter {
    /// HTTP client for API requests.
    client: Client,
    /// API key sent as a bearer token.
    api_key: String,
    /// Endpoint URL.
    api_url: String,
    /// Provider name reported to the router.
    provider: String,
    /// Model name to use.
    model: String,
    /// Size class for task-optimized routing.
    size: ModelSize,
}

impl OpenAiAdapter {
    /// Creates a new adapter from the `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variable is not set.
    pub fn new() -> Result<Self> {
        let api_key = env::var(ENV_OPENAI_API_KEY)
            .map_err(|_| Error::Config(format!("{ENV_OPENAI_API_KEY} not set")))?;
        Self::with_api_key(api_key)
    }

    /// Creates a new adapter with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided API key is empty.
    pub fn with_api_key(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!("{ENV_OPENAI_API_KEY} is empty")));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            api_url: OPENAI_API_URL.to_owned(),
            provider: "openai".to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            size: ModelSize::Medium,
        })
    }

    /// Sets the model to use for generation.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the endpoint URL (for OpenAI-compatible services).
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Sets the provider name reported to the router.
    #[must_use]
    pub fn with_provider_name(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Sets the size class for task-optimized routing.
    #[must_use]
    pub fn with_size(mut self, size: ModelSize) -> Self {
        self.size = size;
        self
    }

    /// Builds the wire messages, prepending the system instruction.
    fn build_messages(
        messages: &[ChatMessage],
        system_instruction: Option<&str>,
    ) -> Vec<WireMessage> {
        let mut wire = Vec::with_capacity(messages.len() + 1);

        if let Some(system) = system_instruction {
            wire.push(WireMessage {
                role: "system".to_owned(),
                content: system.to_owned(),
            });
        }

        for message in messages {
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            wire.push(WireMessage {
                role: role.to_owned(),
                content: message.content.clone(),
            });
        }

        wire
    }

    /// Translates native function-call payloads into explicit tool calls.
    fn translate_tool_calls(message: &WireResponseMessage) -> Vec<ToolCall> {
        message
            .tool_calls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|call| {
                let arguments = serde_json::from_str::<Value>(&call.function.arguments)
                    .unwrap_or(Value::Null);
                ToolCall {
                    name: call.function.name.clone(),
                    arguments,
                }
            })
            .collect()
    }
}

/// Request payload sent to the chat completion API.
#[derive(Debug, Serialize)]
struct WireRequest {
    /// Model identifier.
    model: String,
    /// Conversation context for the request.
    messages: Vec<WireMessage>,
    /// Sampling temperature.
    temperature: f32,
}

/// Message delivered to the API.
#[derive(Debug, Serialize)]
struct WireMessage {
    /// Role of the message author.
    role: String,
    /// Textual content.
    content: String,
}

/// Response payload returned by the API.
#[derive(Debug, Deserialize)]
struct WireResponse {
    /// Candidate completions.
    choices: Vec<WireChoice>,
    /// Token accounting.
    usage: Option<WireUsage>,
}

/// A single completion choice.
#[derive(Debug, Deserialize)]
struct WireChoice {
    /// Generated message.
    message: WireResponseMessage,
    /// Why generation stopped.
    finish_reason: Option<String>,
}

/// Response message with generated text and any function calls.
#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    /// Generated text content, absent for pure tool-call turns.
    content: Option<String>,
    /// Function calls requested by the model.
    tool_calls: Option<Vec<WireToolCall>>,
}

/// A native function call entry.
#[derive(Debug, Deserialize)]
struct WireToolCall {
    /// Function payload.
    function: WireFunction,
}

/// Function name and serialized arguments.
#[derive(Debug, Deserialize)]
struct WireFunction {
    /// Name of the requested function.
    name: String,
    /// JSON-encoded arguments.
    arguments: String,
}

/// Token usage metrics.
#[derive(Debug, Deserialize)]
struct WireUsage {
    /// Prompt token count.
    prompt_tokens: u64,
    /// Completion token count.
    completion_tokens: u64,
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
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
        system_instruction: Option<&str>,
    ) -> Result<ModelResponse> {
        let request = WireRequest {
            model: self.model.clone(),
            messages: Self::build_messages(messages, system_instruction),
            temperature: 0.7,
        };
        debug!(
            provider = %self.provider,
            model = %self.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            return Err(Error::Provider(format!(
                "{} API error {status}: {error_text}",
                self.provider
            )));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|error| Error::InvalidResponse(error.to_string()))?;

        let choice = wire
            .choices
            .first()
            .ok_or_else(|| Error::InvalidResponse("no choices in response".to_owned()))?;

        let tool_calls = Self::translate_tool_calls(&choice.message);
        let usage = wire
            .usage
            .map_or_else(TokenUsage::default, |usage| {
                TokenUsage::new(usage.prompt_tokens, usage.completion_tokens)
            });

        Ok(ModelResponse {
            content: choice.message.content.clone().unwrap_or_default(),
            model: self.model.clone(),
            usage,
            finish_reason: choice.finish_reason.clone(),
            tool_calls,
        })
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        system_instruction: Option<&str>,
    ) -> Result<TextStream> {
        // Non-streaming fallback: the full completion is yielded as one chunk.
        let response = self.generate(messages, system_instruction).await?;
        Ok(futures::stream::once(async move { Ok(response.content) }).boxed())
    }

    async fn health_check(&self) -> bool {
        !self.api_key.is_empty()
    }
}
