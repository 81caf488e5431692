//! End-to-end behavior tests for the event bus worker pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conductor_core::EventBusConfig;
use conductor_events::{Event, EventBus, EventPriority, EventType, FnHandler};
use futures::FutureExt as _;
use uuid::Uuid;

/// Installs a test subscriber so `RUST_LOG` controls bus tracing output.
fn init_tracing() {
    drop(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init(),
    );
}

/// Handler that records the priority of every event it sees, in order.
fn priority_collector(seen: Arc<Mutex<Vec<EventPriority>>>) -> Arc<FnHandler> {
    Arc::new(FnHandler::new("collector", move |event| {
        let seen = Arc::clone(&seen);
        async move {
            let mut seen = match seen.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            seen.push(event.priority);
            Ok(())
        }
        .boxed()
    }))
}

/// Handler that sleeps, used to keep the single worker busy while the
/// test queues events behind it.
fn blocking_handler(duration: Duration) -> Arc<FnHandler> {
    Arc::new(FnHandler::new("blocker", move |_event| {
        async move {
            tokio::time::sleep(duration).await;
            Ok(())
        }
        .boxed()
    }))
}

/// Polls until the condition holds or the deadline passes.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within deadline");
}

#[tokio::test]
async fn test_higher_priority_drains_first() {
    init_tracing();
    let bus = EventBus::new(EventBusConfig {
        worker_count: 1,
        ..EventBusConfig::default()
    });
    bus.start();

    let seen = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe(EventType::TaskCreated, priority_collector(Arc::clone(&seen)));
    bus.subscribe(EventType::SystemStarted, blocking_handler(Duration::from_millis(300)));

    // Occupy the only worker so the mixed-priority batch queues up behind it.
    assert!(bus.publish(Event::new(EventType::SystemStarted, "test")));
    tokio::time::sleep(Duration::from_millis(100)).await;

    for priority in [
        EventPriority::Low,
        EventPriority::Normal,
        EventPriority::Critical,
        EventPriority::Normal,
        EventPriority::High,
    ] {
        assert!(bus.publish(
            Event::new(EventType::TaskCreated, "test").with_priority(priority)
        ));
    }

    wait_until(|| {
        let seen = match seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.len() == 5
    })
    .await;
    bus.stop().await;

    let seen = match seen.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    assert_eq!(
        *seen,
        vec![
            EventPriority::Critical,
            EventPriority::High,
            EventPriority::Normal,
            EventPriority::Normal,
            EventPriority::Low,
        ]
    );
}

#[tokio::test]
async fn test_failing_handler_does_not_block_siblings() {
    let bus = EventBus::default();
    bus.start();

    let delivered = Arc::new(AtomicU64::new(0));
    let count = Arc::clone(&delivered);
    bus.subscribe(
        EventType::TaskFailed,
        Arc::new(FnHandler::new("throws", |_event| {
            async move { Err(conductor_core::Error::Other("handler exploded".to_owned())) }
                .boxed()
        })),
    );
    bus.subscribe(
        EventType::TaskFailed,
        Arc::new(FnHandler::new("succeeds", move |_event| {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })),
    );

    assert!(bus.publish(Event::new(EventType::TaskFailed, "test")));
    wait_until(|| delivered.load(Ordering::SeqCst) == 1).await;
    bus.stop().await;

    let stats = bus.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.handlers_executed, 2);
}

#[tokio::test]
async fn test_timed_out_handler_is_counted_not_dead_lettered() {
    let bus = EventBus::new(EventBusConfig {
        handler_timeout_secs: 1,
        ..EventBusConfig::default()
    });
    bus.start();

    // This handler never finishes within the timeout.
    bus.subscribe(EventType::TaskStarted, blocking_handler(Duration::from_secs(30)));

    assert!(bus.publish(Event::new(EventType::TaskStarted, "test")));
    wait_until(|| bus.stats().processed == 1).await;
    bus.stop().await;

    // A timeout is a handler failure, same as a returned error: the event
    // still counts as processed and never reaches the dead-letter queue.
    let stats = bus.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.handlers_executed, 1);
    assert!(bus.dead_letters().is_empty());
}

#[tokio::test]
async fn test_event_without_handlers_counts_as_processed() {
    let bus = EventBus::default();
    bus.start();

    assert!(bus.publish(Event::new(EventType::ResponseGenerated, "test")));
    wait_until(|| bus.stats().processed == 1).await;
    bus.stop().await;

    let stats = bus.stats();
    assert_eq!(stats.published, 1);
    assert_eq!(stats.handlers_executed, 0);
}

#[tokio::test]
async fn test_queue_full_dead_letters_and_replay_requeues() {
    init_tracing();
    let bus = EventBus::new(EventBusConfig {
        worker_count: 1,
        queue_capacity: 1,
        ..EventBusConfig::default()
    });
    bus.start();

    let seen = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe(EventType::TaskCreated, priority_collector(Arc::clone(&seen)));
    bus.subscribe(EventType::SystemStarted, blocking_handler(Duration::from_millis(300)));

    // The worker is busy, so the next publish fills the one-slot queue and
    // the one after overflows into the dead-letter queue.
    assert!(bus.publish(Event::new(EventType::SystemStarted, "test")));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(bus.publish(Event::new(EventType::TaskCreated, "test")));
    let overflow = Event::new(EventType::TaskCreated, "test");
    let overflow_id = overflow.event_id;
    assert!(!bus.publish(overflow));

    let dead = bus.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].event.event_id, overflow_id);
    assert_eq!(dead[0].reason, "Queue full");

    // Once the queue drains, replay delivers the dead-lettered event.
    wait_until(|| {
        let seen = match seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.len() == 1
    })
    .await;

    assert!(bus.replay_dead_letter(overflow_id));
    assert!(bus.dead_letters().is_empty());
    assert!(!bus.replay_dead_letter(overflow_id));

    wait_until(|| {
        let seen = match seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.len() == 2
    })
    .await;
    bus.stop().await;
}

#[tokio::test]
async fn test_replay_unknown_id_is_rejected() {
    let bus = EventBus::default();
    bus.start();
    assert!(!bus.replay_dead_letter(Uuid::new_v4()));
    bus.stop().await;
}

#[tokio::test]
async fn test_stop_preserves_unprocessed_events() {
    let bus = EventBus::new(EventBusConfig {
        worker_count: 1,
        ..EventBusConfig::default()
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe(EventType::TaskCreated, priority_collector(Arc::clone(&seen)));

    bus.start();
    bus.subscribe(EventType::SystemStarted, blocking_handler(Duration::from_millis(200)));
    assert!(bus.publish(Event::new(EventType::SystemStarted, "test")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(bus.publish(Event::new(EventType::TaskCreated, "test")));

    // Stop while the queued event is still waiting behind the blocker.
    bus.stop().await;
    let depth_after_stop: usize = bus.stats().queue_depths.iter().sum();
    assert_eq!(depth_after_stop, 1);

    // Restarting drains what was left behind.
    bus.start();
    wait_until(|| {
        let seen = match seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.len() == 1
    })
    .await;
    bus.stop().await;
}
