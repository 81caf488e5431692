use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use conductor_core::{
    ChatMessage, Error, IgnoreLock as _, ModelResponse, ModelSize, ProviderAdapter, Result,
    RouterConfig, TaskType, provider_key,
};
use tracing::{debug, info, warn};

use crate::context::RoutingContext;
use crate::metrics::ProviderMetrics;
use crate::strategy::StrategySelector;

/// Custom routing function, consulted before strategy dispatch.
///
/// Returns the key of the provider to use, or `None` to defer.
pub type CustomRoutingFn =
    Box<dyn Fn(&RoutingContext, &[ProviderSnapshot]) -> Option<String> + Send + Sync>;

/// One registered provider with its runtime state.
struct ProviderEntry {
    /// The adapter itself.
    adapter: Arc<dyn ProviderAdapter>,
    /// Registration priority, surfaced in stats.
    priority: u32,
    /// Runtime metrics.
    metrics: ProviderMetrics,
    /// Circuit breaker state, `true` blocks selection.
    breaker_open: bool,
}

/// Point-in-time view of one provider, taken without holding the registry
/// lock across selection and execution.
#[derive(Clone)]
pub struct ProviderSnapshot {
    /// Provider key, `"provider:model"`.
    pub key: String,
    /// The adapter.
    pub adapter: Arc<dyn ProviderAdapter>,
    /// Metrics at snapshot time.
    pub metrics: ProviderMetrics,
    /// Registration priority.
    pub priority: u32,
    /// Breaker state at snapshot time.
    pub breaker_open: bool,
}

/// Shared store of providers, metrics, and circuit breakers.
///
/// The registry is the single owner of mutable provider state; the router
/// reads snapshots and writes back through the recording methods, so
/// selection and execution observe relaxed but never torn state.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Entries keyed by `"provider:model"`.
    providers: Mutex<HashMap<String, ProviderEntry>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any existing entry for its key.
    ///
    /// Replacement resets metrics and closes the breaker. Returns the key.
    pub fn register(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        priority: u32,
        cost_per_token: f64,
    ) -> String {
        let key = provider_key(adapter.as_ref());
        let mut providers = self.providers.lock_ignore_poison();
        if providers.contains_key(&key) {
            warn!(provider = %key, "replacing already-registered provider");
        }
        providers.insert(
            key.clone(),
            ProviderEntry {
                adapter,
                priority,
                metrics: ProviderMetrics::new(cost_per_token),
                breaker_open: false,
            },
        );
        key
    }

    /// Removes a provider. Returns `false` when the key is unknown.
    pub fn unregister(&self, key: &str) -> bool {
        let mut providers = self.providers.lock_ignore_poison();
        providers.remove(key).is_some()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        let providers = self.providers.lock_ignore_poison();
        providers.len()
    }

    /// Whether no providers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every provider, ordered by key for deterministic
    /// tie-breaking.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProviderSnapshot> {
        let providers = self.providers.lock_ignore_poison();
        let mut snapshots: Vec<ProviderSnapshot> = providers
            .iter()
            .map(|(key, entry)| ProviderSnapshot {
                key: key.clone(),
                adapter: Arc::clone(&entry.adapter),
                metrics: entry.metrics.clone(),
                priority: entry.priority,
                breaker_open: entry.breaker_open,
            })
            .collect();
        snapshots.sort_by(|left, right| left.key.cmp(&right.key));
        snapshots
    }

    /// Metrics for one provider.
    #[must_use]
    pub fn metrics(&self, key: &str) -> Option<ProviderMetrics> {
        let providers = self.providers.lock_ignore_poison();
        providers.get(key).map(|entry| entry.metrics.clone())
    }

    /// Records a request being routed to a provider.
    pub fn record_request(&self, key: &str) {
        let mut providers = self.providers.lock_ignore_poison();
        if let Some(entry) = providers.get_mut(key) {
            entry.metrics.record_request();
        }
    }

    /// Records a request finishing. Returns the updated metrics so callers
    /// can evaluate breaker thresholds against the post-completion state.
    pub fn record_completion(
        &self,
        key: &str,
        success: bool,
        elapsed: Duration,
    ) -> Option<ProviderMetrics> {
        let mut providers = self.providers.lock_ignore_poison();
        providers.get_mut(key).map(|entry| {
            entry.metrics.record_completion(success, elapsed);
            entry.metrics.clone()
        })
    }

    /// Opens a provider's circuit breaker, blocking it from selection.
    pub fn open_breaker(&self, key: &str) {
        let mut providers = self.providers.lock_ignore_poison();
        if let Some(entry) = providers.get_mut(key) {
            entry.breaker_open = true;
        }
    }

    /// Closes a provider's circuit breaker.
    pub fn close_breaker(&self, key: &str) {
        let mut providers = self.providers.lock_ignore_poison();
        if let Some(entry) = providers.get_mut(key) {
            entry.breaker_open = false;
        }
    }

    /// Whether a provider's breaker is open. Unknown keys read as closed.
    #[must_use]
    pub fn is_breaker_open(&self, key: &str) -> bool {
        let providers = self.providers.lock_ignore_poison();
        providers
            .get(key)
            .is_some_and(|entry| entry.breaker_open)
    }
}

/// Per-provider entry in a [`RouterStats`] snapshot.
#[derive(Clone)]
pub struct ProviderStats {
    /// Provider key.
    pub key: String,
    /// Registration priority.
    pub priority: u32,
    /// Breaker state.
    pub breaker_open: bool,
    /// Metrics at snapshot time.
    pub metrics: ProviderMetrics,
}

/// Snapshot of router-wide provider state.
#[derive(Clone)]
pub struct RouterStats {
    /// Every registered provider, ordered by key.
    pub providers: Vec<ProviderStats>,
}

/// Strategy-driven provider selection with fallback execution.
pub struct ModelRouter {
    /// Shared provider state.
    registry: Arc<ProviderRegistry>,
    /// Router configuration.
    config: RouterConfig,
    /// Strategy dispatch.
    selector: StrategySelector,
    /// Task-type to size-class overrides.
    task_mapping: Mutex<HashMap<TaskType, ModelSize>>,
    /// Custom routing functions, consulted in registration order.
    custom_fns: Mutex<Vec<CustomRoutingFn>>,
    /// When the last health check pass ran.
    last_health_check: Mutex<Option<Instant>>,
}

impl ModelRouter {
    /// Creates a router with its own empty registry.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self::with_registry(config, Arc::new(ProviderRegistry::new()))
    }

    /// Creates a router over an existing shared registry.
    #[must_use]
    pub fn with_registry(config: RouterConfig, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            config,
            selector: StrategySelector::new(),
            task_mapping: Mutex::new(HashMap::new()),
            custom_fns: Mutex::new(Vec::new()),
            last_health_check: Mutex::new(None),
        }
    }

    /// The shared registry backing this router.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Registers a provider adapter. Returns its key.
    pub fn register_provider(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        priority: u32,
        cost_per_token: f64,
    ) -> String {
        let key = self.registry.register(adapter, priority, cost_per_token);
        debug!(provider = %key, priority, "provider registered");
        key
    }

    /// Removes a provider. Returns `false` when the key is unknown.
    pub fn unregister_provider(&self, key: &str) -> bool {
        self.registry.unregister(key)
    }

    /// Adds a custom routing function consulted before strategy dispatch.
    pub fn add_custom_routing_function(&self, function: CustomRoutingFn) {
        let mut custom_fns = self.custom_fns.lock_ignore_poison();
        custom_fns.push(function);
    }

    /// Overrides the preferred size class for a task type.
    pub fn set_task_mapping(&self, task: TaskType, size: ModelSize) {
        let mut task_mapping = self.task_mapping.lock_ignore_poison();
        task_mapping.insert(task, size);
    }

    /// Selects a provider for the given context and records the request
    /// against it.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoProvidersAvailable` when no provider is
    /// registered or every registered provider is blocked by an open
    /// circuit breaker.
    pub async fn select_provider(&self, ctx: &RoutingContext) -> Result<Arc<dyn ProviderAdapter>> {
        self.select_excluding(ctx, &HashSet::new()).await
    }

    /// Executes a generation request with fallback across providers.
    ///
    /// Each retry selects among providers not yet tried for this request.
    /// A failed attempt records completion metrics and may open the
    /// provider's circuit breaker when its error rate crosses the
    /// configured threshold.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoProvidersAvailable` when nothing is selectable up
    /// front, or `Error::AllProvidersFailed` when every attempt failed.
    pub async fn execute_with_fallback(
        &self,
        messages: &[ChatMessage],
        system_instruction: Option<&str>,
        ctx: &RoutingContext,
        max_retries: usize,
    ) -> Result<ModelResponse> {
        let mut tried: HashSet<String> = HashSet::new();
        let mut last_error = String::new();

        for _ in 0..max_retries {
            let adapter = match self.select_excluding(ctx, &tried).await {
                Ok(adapter) => adapter,
                Err(error) => {
                    if tried.is_empty() {
                        return Err(error);
                    }
                    // Every remaining provider is excluded or blocked.
                    break;
                }
            };
            let key = provider_key(adapter.as_ref());
            tried.insert(key.clone());

            let started = Instant::now();
            match adapter.generate(messages, system_instruction).await {
                Ok(response) => {
                    self.registry.record_completion(&key, true, started.elapsed());
                    debug!(provider = %key, "generation succeeded");
                    return Ok(response);
                }
                Err(error) => {
                    let metrics =
                        self.registry.record_completion(&key, false, started.elapsed());
                    warn!(provider = %key, "generation failed: {error}");

                    if let Some(metrics) = metrics
                        && metrics.error_rate() >= self.config.circuit_breaker_threshold
                    {
                        self.registry.open_breaker(&key);
                        warn!(
                            provider = %key,
                            error_rate = metrics.error_rate(),
                            "circuit breaker opened"
                        );
                    }
                    last_error = error.to_string();
                }
            }
        }

        Err(Error::AllProvidersFailed {
            attempts: tried.len(),
            last_error,
        })
    }

    /// Snapshot of per-provider metrics and breaker state.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        let providers = self
            .registry
            .snapshot()
            .into_iter()
            .map(|snapshot| ProviderStats {
                key: snapshot.key,
                priority: snapshot.priority,
                breaker_open: snapshot.breaker_open,
                metrics: snapshot.metrics,
            })
            .collect();
        RouterStats { providers }
    }

    /// Selects among providers whose keys are not excluded.
    async fn select_excluding(
        &self,
        ctx: &RoutingContext,
        excluded: &HashSet<String>,
    ) -> Result<Arc<dyn ProviderAdapter>> {
        self.run_due_health_checks().await;

        let all = self.registry.snapshot();
        let registered = all.len();
        let available: Vec<ProviderSnapshot> = all
            .into_iter()
            .filter(|snapshot| !snapshot.breaker_open && !excluded.contains(&snapshot.key))
            .collect();

        if available.is_empty() {
            return Err(Error::NoProvidersAvailable { registered });
        }

        if let Some(snapshot) = self.apply_custom_functions(ctx, &available) {
            self.registry.record_request(&snapshot.key);
            debug!(provider = %snapshot.key, "provider selected by custom function");
            return Ok(snapshot.adapter);
        }

        let task_mapping = {
            let task_mapping = self.task_mapping.lock_ignore_poison();
            task_mapping.clone()
        };
        let chosen = self
            .selector
            .select(self.config.strategy, ctx, &available, &task_mapping)
            .ok_or(Error::NoProvidersAvailable { registered })?;

        self.registry.record_request(&chosen.key);
        debug!(
            provider = %chosen.key,
            strategy = ?self.config.strategy,
            "provider selected"
        );
        Ok(Arc::clone(&chosen.adapter))
    }

    /// Consults custom routing functions in order; the first that names an
    /// available provider wins. Panicking functions and unknown keys are
    /// skipped.
    fn apply_custom_functions(
        &self,
        ctx: &RoutingContext,
        available: &[ProviderSnapshot],
    ) -> Option<ProviderSnapshot> {
        let custom_fns = self.custom_fns.lock_ignore_poison();
        for function in custom_fns.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| function(ctx, available)));
            match outcome {
                Ok(Some(key)) => {
                    if let Some(snapshot) =
                        available.iter().find(|snapshot| snapshot.key == key)
                    {
                        return Some(snapshot.clone());
                    }
                    warn!(provider = %key, "custom routing chose an unavailable provider");
                }
                Ok(None) => {}
                Err(_panic) => {
                    warn!("custom routing function panicked, skipping");
                }
            }
        }
        None
    }

    /// Runs a health check pass when the configured interval has elapsed.
    ///
    /// A passing check closes the provider's breaker; a failing check
    /// leaves breaker state untouched.
    async fn run_due_health_checks(&self) {
        let due = {
            let mut last = self.last_health_check.lock_ignore_poison();
            let interval = Duration::from_secs(self.config.health_check_interval_secs);
            match *last {
                Some(at) if at.elapsed() < interval => false,
                _ => {
                    *last = Some(Instant::now());
                    true
                }
            }
        };
        if !due {
            return;
        }

        for snapshot in self.registry.snapshot() {
            let healthy = snapshot.adapter.health_check().await;
            if healthy {
                if snapshot.breaker_open {
                    self.registry.close_breaker(&snapshot.key);
                    info!(provider = %snapshot.key, "health check passed, breaker closed");
                }
            } else {
                warn!(provider = %snapshot.key, "health check failed");
            }
        }
    }
}
