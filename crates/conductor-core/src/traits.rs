use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{ChatMessage, ModelResponse, ModelSize, Result};

/// Stream of text chunks produced by [`ProviderAdapter::generate_stream`].
///
/// The stream is finite and not restartable.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Trait for backend model integrations.
///
/// An adapter wraps exactly one backend model and is identified by the
/// `(provider_name, model_name)` pair. Adapters are registered with the
/// router once and shared behind `Arc` for the life of the process.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Name of the backing service (for example `"openai"`).
    fn provider_name(&self) -> &str;

    /// Name of the wrapped model.
    fn model_name(&self) -> &str;

    /// Size class used by task-optimized routing.
    fn model_size(&self) -> ModelSize;

    /// Generates a response for the given conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable, the request fails,
    /// or the response cannot be parsed.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        system_instruction: Option<&str>,
    ) -> Result<ModelResponse>;

    /// Generates a response as a stream of text chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable or the request fails.
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        system_instruction: Option<&str>,
    ) -> Result<TextStream>;

    /// Checks whether the backend is currently healthy.
    ///
    /// A passing check is the only thing that closes an open circuit
    /// breaker for this adapter.
    async fn health_check(&self) -> bool;
}

/// Renders the registry key for an adapter as `"provider:model"`.
#[must_use]
pub fn provider_key(adapter: &dyn ProviderAdapter) -> String {
    format!("{}:{}", adapter.provider_name(), adapter.model_name())
}
