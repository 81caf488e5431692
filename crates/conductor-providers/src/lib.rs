//! Provider adapters for the conductor routing core.
//!
//! Each adapter wraps one backend model behind the
//! [`conductor_core::ProviderAdapter`] contract. The [`MockAdapter`] exists
//! for tests and supports scripted responses, failures, and latency.

/// Mock adapter for testing.
pub mod mock;
/// OpenAI-compatible chat completion adapter.
pub mod openai;

pub use mock::MockAdapter;
pub use openai::OpenAiAdapter;
