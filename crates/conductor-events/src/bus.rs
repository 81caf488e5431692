use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use conductor_core::{EventBusConfig, IgnoreLock as _};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::event::{DeadLetterEntry, Event, EventPriority, EventType};
use crate::handler::EventHandler;

/// How long an idle worker sleeps before rescanning the queues.
const IDLE_SLEEP: Duration = Duration::from_millis(100);
/// Bounded sample window for processing-time stats.
const PROCESSING_TIME_SAMPLES: usize = 1000;

/// Snapshot of bus counters and queue depths.
#[derive(Debug, Clone)]
pub struct BusStats {
    /// Whether the worker pool is running.
    pub running: bool,
    /// Number of spawned worker tasks.
    pub worker_count: usize,
    /// Number of registered handlers, wildcard included.
    pub handler_count: usize,
    /// Events accepted by `publish`.
    pub published: u64,
    /// Events fully processed (including zero-handler no-ops).
    pub processed: u64,
    /// Handler invocations that returned an error or timed out.
    pub failed: u64,
    /// Total handler invocations.
    pub handlers_executed: u64,
    /// Current dead-letter queue size.
    pub dead_letters: usize,
    /// Queue depth per priority, highest first.
    pub queue_depths: [usize; 4],
    /// Mean end-to-end processing time over a recent window.
    pub avg_processing_time: Duration,
}

/// Fixed-window rate limit state for one source.
struct RateWindow {
    /// Maximum events accepted per window.
    max_per_minute: u32,
    /// When the current window opened.
    window_start: Instant,
    /// Events accepted in the current window.
    count: u32,
}

/// Shared bus state behind the cloneable handle.
struct BusInner {
    /// Bus configuration.
    config: EventBusConfig,
    /// Whether workers should keep draining.
    running: AtomicBool,
    /// Worker task handles, joined on stop.
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// One bounded queue per priority, indexed by `EventPriority::index`.
    queues: [Mutex<VecDeque<Event>>; 4],
    /// Handlers keyed by event type.
    handlers: Mutex<HashMap<EventType, Vec<Arc<dyn EventHandler>>>>,
    /// Handlers invoked for every event.
    wildcard: Mutex<Vec<Arc<dyn EventHandler>>>,
    /// Undeliverable events, oldest evicted first when full.
    dead_letters: Mutex<VecDeque<DeadLetterEntry>>,
    /// Per-source rate limits, empty unless configured.
    rate_limits: Mutex<HashMap<String, RateWindow>>,
    /// Events accepted by `publish`.
    published: AtomicU64,
    /// Events fully processed.
    processed: AtomicU64,
    /// Handler failures and timeouts.
    failed: AtomicU64,
    /// Total handler invocations.
    handlers_executed: AtomicU64,
    /// Recent processing durations for the stats window.
    processing_times: Mutex<VecDeque<Duration>>,
}

/// Priority-aware publish/subscribe event bus.
///
/// Cloning the bus is cheap and shares all state. Publishing never blocks
/// on handlers: events are queued and drained by a worker pool started with
/// [`EventBus::start`].
#[derive(Clone)]
pub struct EventBus {
    /// Shared state.
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a stopped bus with the given configuration.
    #[must_use]
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                running: AtomicBool::new(false),
                workers: Mutex::new(Vec::new()),
                queues: [
                    Mutex::new(VecDeque::new()),
                    Mutex::new(VecDeque::new()),
                    Mutex::new(VecDeque::new()),
                    Mutex::new(VecDeque::new()),
                ],
                handlers: Mutex::new(HashMap::new()),
                wildcard: Mutex::new(Vec::new()),
                dead_letters: Mutex::new(VecDeque::new()),
                rate_limits: Mutex::new(HashMap::new()),
                published: AtomicU64::new(0),
                processed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                handlers_executed: AtomicU64::new(0),
                processing_times: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Starts the worker pool. Calling this on a running bus is a no-op.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut workers = self.inner.workers.lock_ignore_poison();
        for worker_id in 0..self.inner.config.worker_count {
            let bus = self.clone();
            workers.push(tokio::spawn(async move {
                bus.worker_loop(worker_id).await;
            }));
        }
        debug!(workers = self.inner.config.worker_count, "event bus started");
    }

    /// Stops the worker pool and waits for in-flight events to finish.
    ///
    /// Queued events that were not yet picked up remain queued and are
    /// drained if the bus is started again.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let handles = {
            let mut workers = self.inner.workers.lock_ignore_poison();
            std::mem::take(&mut *workers)
        };
        for handle in handles {
            if let Err(error) = handle.await {
                warn!("event worker panicked: {error}");
            }
        }
        debug!("event bus stopped");
    }

    /// Whether the worker pool is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Subscribes a handler to one event type.
    pub fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.inner.handlers.lock_ignore_poison();
        handlers.entry(event_type).or_default().push(handler);
    }

    /// Subscribes a handler to every event.
    pub fn subscribe_all(&self, handler: Arc<dyn EventHandler>) {
        let mut wildcard = self.inner.wildcard.lock_ignore_poison();
        wildcard.push(handler);
    }

    /// Removes all handlers with the given name from one event type.
    ///
    /// Returns `true` if at least one handler was removed.
    pub fn unsubscribe(&self, event_type: EventType, name: &str) -> bool {
        let mut handlers = self.inner.handlers.lock_ignore_poison();
        let Some(list) = handlers.get_mut(&event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|handler| handler.name() != name);
        list.len() < before
    }

    /// Enables a fixed-window rate limit for one source.
    pub fn set_rate_limit(&self, source: impl Into<String>, max_per_minute: u32) {
        let mut limits = self.inner.rate_limits.lock_ignore_poison();
        limits.insert(
            source.into(),
            RateWindow {
                max_per_minute,
                window_start: Instant::now(),
                count: 0,
            },
        );
    }

    /// Queues an event for delivery.
    ///
    /// Returns `false` without queueing when the bus is stopped, the
    /// source is over its rate limit, or the priority queue is full. A
    /// full queue additionally dead-letters the event.
    pub fn publish(&self, event: Event) -> bool {
        if !self.inner.running.load(Ordering::SeqCst) {
            warn!(event_type = ?event.event_type, "publish on stopped bus dropped");
            return false;
        }

        if self.rate_limited(&event.source) {
            warn!(source = %event.source, "event dropped by rate limit");
            return false;
        }

        let queue_index = event.priority.index();
        let mut queue = self.inner.queues[queue_index].lock_ignore_poison();
        if queue.len() >= self.inner.config.queue_capacity {
            drop(queue);
            warn!(
                priority = ?event.priority,
                capacity = self.inner.config.queue_capacity,
                "queue full, dead-lettering event"
            );
            self.add_dead_letter(event, "Queue full");
            return false;
        }
        queue.push_back(event);
        drop(queue);

        self.inner.published.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Returns a snapshot of the dead-letter queue, oldest first.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        let dead_letters = self.inner.dead_letters.lock_ignore_poison();
        dead_letters.iter().cloned().collect()
    }

    /// Re-queues a dead-lettered event by its event id.
    ///
    /// The entry is removed from the dead-letter queue, so a replayed
    /// event that fails again produces a fresh entry. Returns `false`
    /// when no entry matches or the bus refuses the publish.
    pub fn replay_dead_letter(&self, event_id: Uuid) -> bool {
        let entry = {
            let mut dead_letters = self.inner.dead_letters.lock_ignore_poison();
            let position = dead_letters
                .iter()
                .position(|entry| entry.event.event_id == event_id);
            position.and_then(|index| dead_letters.remove(index))
        };

        entry.is_some_and(|entry| self.publish(entry.event))
    }

    /// Returns a snapshot of counters and queue depths.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let queue_depths = [
            self.queue_depth(EventPriority::Critical),
            self.queue_depth(EventPriority::High),
            self.queue_depth(EventPriority::Normal),
            self.queue_depth(EventPriority::Low),
        ];
        let dead_letters = {
            let dead_letters = self.inner.dead_letters.lock_ignore_poison();
            dead_letters.len()
        };
        let avg_processing_time = {
            let times = self.inner.processing_times.lock_ignore_poison();
            if times.is_empty() {
                Duration::ZERO
            } else {
                times.iter().sum::<Duration>() / times.len() as u32
            }
        };

        let worker_count = {
            let workers = self.inner.workers.lock_ignore_poison();
            workers.len()
        };
        let handler_count = {
            let handlers = self.inner.handlers.lock_ignore_poison();
            let wildcard = self.inner.wildcard.lock_ignore_poison();
            handlers.values().map(Vec::len).sum::<usize>() + wildcard.len()
        };

        BusStats {
            running: self.is_running(),
            worker_count,
            handler_count,
            published: self.inner.published.load(Ordering::SeqCst),
            processed: self.inner.processed.load(Ordering::SeqCst),
            failed: self.inner.failed.load(Ordering::SeqCst),
            handlers_executed: self.inner.handlers_executed.load(Ordering::SeqCst),
            dead_letters,
            queue_depths,
            avg_processing_time,
        }
    }

    /// Current depth of one priority queue.
    fn queue_depth(&self, priority: EventPriority) -> usize {
        let queue = self.inner.queues[priority.index()].lock_ignore_poison();
        queue.len()
    }

    /// Records acceptance against the source's rate window, if one exists.
    fn rate_limited(&self, source: &str) -> bool {
        let mut limits = self.inner.rate_limits.lock_ignore_poison();
        let Some(window) = limits.get_mut(source) else {
            return false;
        };

        if window.window_start.elapsed() >= Duration::from_secs(60) {
            window.window_start = Instant::now();
            window.count = 0;
        }
        if window.count >= window.max_per_minute {
            return true;
        }
        window.count += 1;
        false
    }

    /// Appends a dead letter, evicting the oldest entry when full.
    fn add_dead_letter(&self, event: Event, reason: &str) {
        let mut dead_letters = self.inner.dead_letters.lock_ignore_poison();
        if dead_letters.len() >= self.inner.config.max_dead_letters {
            dead_letters.pop_front();
        }
        dead_letters.push_back(DeadLetterEntry {
            event,
            reason: reason.to_owned(),
            dead_lettered_at: SystemTime::now(),
        });
    }

    /// Pops the highest-priority queued event, if any.
    fn pop_next(&self) -> Option<Event> {
        for priority in EventPriority::DESCENDING {
            let mut queue = self.inner.queues[priority.index()].lock_ignore_poison();
            if let Some(event) = queue.pop_front() {
                return Some(event);
            }
        }
        None
    }

    /// Drains queues until the bus is stopped.
    async fn worker_loop(self, worker_id: usize) {
        debug!(worker_id, "event worker started");
        while self.inner.running.load(Ordering::SeqCst) {
            match self.pop_next() {
                Some(event) => self.process_event(event).await,
                None => tokio::time::sleep(IDLE_SLEEP).await,
            }
        }
        debug!(worker_id, "event worker stopped");
    }

    /// Delivers one event to its exact-type and wildcard handlers.
    ///
    /// Handler errors and timeouts are counted but never interrupt the
    /// sibling handlers of the same event.
    async fn process_event(&self, event: Event) {
        let started = Instant::now();
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let exact = self.inner.handlers.lock_ignore_poison();
            let wildcard = self.inner.wildcard.lock_ignore_poison();
            exact
                .get(&event.event_type)
                .into_iter()
                .flatten()
                .chain(wildcard.iter())
                .map(Arc::clone)
                .collect()
        };

        if handlers.is_empty() {
            self.inner.processed.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let timeout = Duration::from_secs(self.inner.config.handler_timeout_secs);
        let deliveries = handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                let outcome = tokio::time::timeout(timeout, handler.handle(event)).await;
                (handler.name().to_owned(), outcome)
            }
        });

        for (name, outcome) in join_all(deliveries).await {
            self.inner.handlers_executed.fetch_add(1, Ordering::SeqCst);
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(handler_error)) => {
                    self.inner.failed.fetch_add(1, Ordering::SeqCst);
                    error!(
                        handler = %name,
                        event_id = %event.event_id,
                        "handler failed: {handler_error}"
                    );
                }
                Err(_elapsed) => {
                    self.inner.failed.fetch_add(1, Ordering::SeqCst);
                    error!(
                        handler = %name,
                        event_id = %event.event_id,
                        timeout_secs = self.inner.config.handler_timeout_secs,
                        "handler timed out"
                    );
                }
            }
        }

        self.inner.processed.fetch_add(1, Ordering::SeqCst);
        self.record_processing_time(started.elapsed());
    }

    /// Records one processing duration in the bounded stats window.
    fn record_processing_time(&self, elapsed: Duration) {
        let mut times = self.inner.processing_times.lock_ignore_poison();
        if times.len() >= PROCESSING_TIME_SAMPLES {
            times.pop_front();
        }
        times.push_back(elapsed);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}
