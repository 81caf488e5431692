//! Asynchronous publish/subscribe event bus.
//!
//! Events carry a priority and are drained by a worker pool that prefers
//! higher priorities opportunistically. Undeliverable events land in a
//! bounded dead-letter queue and can be replayed. The bus never raises to
//! publishers; failures are observable through stats and dead letters.

/// Event bus implementation.
pub mod bus;
/// Event and dead-letter types.
pub mod event;
/// Handler trait and adapters.
pub mod handler;

pub use bus::{BusStats, EventBus};
pub use event::{DeadLetterEntry, Event, EventPriority, EventType};
pub use handler::{EventHandler, FnHandler, LoggingHandler};
