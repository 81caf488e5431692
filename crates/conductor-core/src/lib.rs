//! Core types and traits for the conductor orchestration system.
//!
//! This crate provides the shared data model (chat messages, model
//! responses, task classification), the error taxonomy, the
//! [`ProviderAdapter`] trait implemented by every backend model
//! integration, and configuration loading.

/// Configuration types and TOML loading.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Synchronization helpers.
pub mod sync;
/// Trait definitions for model provider adapters.
pub mod traits;
/// Core data types for messages, responses, and task classification.
pub mod types;

pub use config::{
    ConductorConfig, EventBusConfig, RouterConfig, RoutingStrategy, SessionConfig,
};
pub use error::{Error, Result};
pub use sync::IgnoreLock;
pub use traits::{ProviderAdapter, TextStream, provider_key};
pub use types::{
    ChatMessage, ModelResponse, ModelSize, Role, TaskType, TokenUsage, ToolCall, estimate_tokens,
};
