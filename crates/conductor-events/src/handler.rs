use async_trait::async_trait;
use conductor_core::Result;
use futures::future::BoxFuture;
use tracing::debug;

use crate::event::Event;

/// A subscriber invoked for matching events.
///
/// Handlers must be cheap to clone behind an `Arc` and safe to call
/// concurrently. A returned error counts as a delivery failure for that
/// handler only; sibling handlers still run.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable name used for logging and unsubscription.
    fn name(&self) -> &str;

    /// Processes one event.
    ///
    /// # Errors
    ///
    /// Returns an error when the handler cannot process the event. The bus
    /// records the failure but never propagates it to the publisher.
    async fn handle(&self, event: Event) -> Result<()>;
}

/// Boxed async closure type backing [`FnHandler`].
type HandlerFn = dyn Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// Adapter wrapping an async closure as an [`EventHandler`].
pub struct FnHandler {
    /// Stable name for logging and unsubscription.
    name: String,
    /// Wrapped closure.
    callback: Box<HandlerFn>,
}

impl FnHandler {
    /// Wraps an async closure under the given name.
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl EventHandler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Event) -> Result<()> {
        (self.callback)(event).await
    }
}

/// Wildcard handler that traces every event, useful for debugging.
#[derive(Default)]
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, event: Event) -> Result<()> {
        debug!(
            event_id = %event.event_id,
            event_type = ?event.event_type,
            source = %event.source,
            priority = ?event.priority,
            "event observed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt as _;

    use super::*;
    use crate::event::EventType;

    #[tokio::test]
    async fn test_fn_handler_invokes_closure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let handler = FnHandler::new("counter", move |_event| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        });

        assert_eq!(handler.name(), "counter");
        let event = Event::new(EventType::TaskCreated, "test");
        match handler.handle(event).await {
            Ok(()) => {}
            Err(error) => panic!("handle failed: {error}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logging_handler_accepts_any_event() {
        let handler = LoggingHandler;
        let event = Event::new(EventType::ErrorOccurred, "test");
        assert!(handler.handle(event).await.is_ok());
    }
}
