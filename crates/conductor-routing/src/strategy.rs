use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use conductor_core::{ModelSize, RoutingStrategy, TaskType};

use crate::context::RoutingContext;
use crate::router::ProviderSnapshot;

/// Dispatches a routing strategy over a snapshot of available providers.
///
/// Snapshots are ordered by provider key, so score ties resolve
/// deterministically by key order.
#[derive(Default)]
pub struct StrategySelector {
    /// Cyclic index for round-robin selection.
    round_robin: AtomicUsize,
}

impl StrategySelector {
    /// Creates a selector with a fresh round-robin index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks a provider from the available snapshot, `None` when empty.
    #[must_use]
    pub fn select<'a>(
        &self,
        strategy: RoutingStrategy,
        ctx: &RoutingContext,
        available: &'a [ProviderSnapshot],
        task_mapping: &HashMap<TaskType, ModelSize>,
    ) -> Option<&'a ProviderSnapshot> {
        if available.is_empty() {
            return None;
        }

        match strategy {
            RoutingStrategy::RoundRobin => {
                let index = self.round_robin.fetch_add(1, AtomicOrdering::SeqCst);
                available.get(index % available.len())
            }
            RoutingStrategy::LeastBusy => available
                .iter()
                .min_by_key(|snapshot| snapshot.metrics.active_requests),
            RoutingStrategy::TaskOptimized => {
                Some(Self::select_task_optimized(ctx, available, task_mapping))
            }
            RoutingStrategy::CostOptimized => {
                min_by_score(available, |snapshot| cost_score(snapshot, ctx))
            }
            RoutingStrategy::PerformanceOptimized => {
                max_by_score(available, performance_score)
            }
            RoutingStrategy::LoadBalanced => min_by_score(available, load_score),
        }
    }

    /// Prefers the best success rate within the task's size class, falling
    /// back to the global best when no provider matches the class.
    fn select_task_optimized<'a>(
        ctx: &RoutingContext,
        available: &'a [ProviderSnapshot],
        task_mapping: &HashMap<TaskType, ModelSize>,
    ) -> &'a ProviderSnapshot {
        let task = ctx.resolved_task_type();
        let preferred = task_mapping
            .get(&task)
            .copied()
            .unwrap_or_else(|| task.preferred_size());

        let sized: Vec<&ProviderSnapshot> = available
            .iter()
            .filter(|snapshot| snapshot.adapter.model_size() == preferred)
            .collect();

        let pool = if sized.is_empty() {
            available.iter().collect::<Vec<_>>()
        } else {
            sized
        };

        pool.into_iter()
            .max_by(|left, right| {
                float_order(left.metrics.success_rate, right.metrics.success_rate)
            })
            .unwrap_or(&available[0])
    }
}

/// Estimated request cost, infinite when the provider never succeeds.
fn cost_score(snapshot: &ProviderSnapshot, ctx: &RoutingContext) -> f64 {
    let success_rate = snapshot.metrics.success_rate;
    if success_rate <= 0.0 {
        return f64::INFINITY;
    }
    snapshot.metrics.cost_per_token * ctx.estimated_tokens as f64 / success_rate
}

/// Successes per second of latency, zero when latency is unknown.
fn performance_score(snapshot: &ProviderSnapshot) -> f64 {
    let avg = snapshot.metrics.avg_response_time;
    if avg <= 0.0 {
        return 0.0;
    }
    snapshot.metrics.success_rate / avg
}

/// Expected wait: in-flight load weighted by latency and reliability.
fn load_score(snapshot: &ProviderSnapshot) -> f64 {
    let metrics = &snapshot.metrics;
    (metrics.active_requests + 1) as f64 * metrics.avg_response_time
        / metrics.success_rate.max(0.1)
}

/// Total order for scores, treating NaN as equal.
fn float_order(left: f64, right: f64) -> Ordering {
    left.partial_cmp(&right).unwrap_or(Ordering::Equal)
}

/// First snapshot with the minimal score.
fn min_by_score(
    available: &[ProviderSnapshot],
    score: impl Fn(&ProviderSnapshot) -> f64,
) -> Option<&ProviderSnapshot> {
    available
        .iter()
        .min_by(|left, right| float_order(score(left), score(right)))
}

/// First snapshot with the maximal score.
fn max_by_score(
    available: &[ProviderSnapshot],
    score: impl Fn(&ProviderSnapshot) -> f64,
) -> Option<&ProviderSnapshot> {
    available
        .iter()
        .max_by(|left, right| float_order(score(left), score(right)))
}
