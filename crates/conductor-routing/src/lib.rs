//! Provider selection and fallback execution.
//!
//! The router keeps per-provider metrics and circuit breakers in a shared
//! registry, selects an adapter per request according to a configurable
//! strategy, and retries failed requests across distinct providers.

/// Routing context built per request.
pub mod context;
/// Per-provider runtime metrics.
pub mod metrics;
/// Registry, router, and fallback execution.
pub mod router;
/// Strategy dispatch.
pub mod strategy;

pub use context::{RequestPriority, RoutingContext};
pub use metrics::ProviderMetrics;
pub use router::{
    CustomRoutingFn, ModelRouter, ProviderRegistry, ProviderSnapshot, ProviderStats, RouterStats,
};
pub use strategy::StrategySelector;
