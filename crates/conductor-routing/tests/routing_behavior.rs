//! Strategy selection and fallback behavior over seeded metrics.

use std::sync::Arc;
use std::time::Duration;

use conductor_core::{
    ChatMessage, Error, ModelSize, RouterConfig, RoutingStrategy, TaskType, provider_key,
};
use conductor_providers::MockAdapter;
use conductor_routing::{ModelRouter, RoutingContext};

fn router_with(strategy: RoutingStrategy) -> ModelRouter {
    ModelRouter::new(RouterConfig {
        strategy,
        ..RouterConfig::default()
    })
}

/// Seeds a provider's metrics with a fixed success/failure history.
fn seed_history(router: &ModelRouter, key: &str, outcomes: &[(bool, Duration)]) {
    for (success, elapsed) in outcomes {
        router.registry().record_request(key);
        router.registry().record_completion(key, *success, *elapsed);
    }
}

/// Seeds `total` completions with the given success count at a fixed
/// response time, yielding an exact success rate.
fn seed_rate(router: &ModelRouter, key: &str, successes: u64, total: u64, elapsed: Duration) {
    for round in 0..total {
        router.registry().record_request(key);
        router
            .registry()
            .record_completion(key, round < successes, elapsed);
    }
}

#[tokio::test]
async fn test_performance_optimized_prefers_highest_rate_per_second() {
    let router = router_with(RoutingStrategy::PerformanceOptimized);
    let good = router.register_provider(Arc::new(MockAdapter::new("mock", "good")), 1, 0.0);
    let poor = router.register_provider(Arc::new(MockAdapter::new("mock", "poor")), 1, 0.0);
    let best = router.register_provider(Arc::new(MockAdapter::new("mock", "best")), 1, 0.0);

    // Equal response times, so the highest success rate must win.
    let second = Duration::from_secs(1);
    seed_rate(&router, &good, 9, 10, second);
    seed_rate(&router, &poor, 5, 10, second);
    seed_rate(&router, &best, 99, 100, second);

    let ctx = RoutingContext::new("hello");
    let chosen = match router.select_provider(&ctx).await {
        Ok(chosen) => chosen,
        Err(error) => panic!("selection failed: {error}"),
    };
    assert_eq!(provider_key(chosen.as_ref()), "mock:best");
}

#[tokio::test]
async fn test_performance_optimized_penalizes_slow_provider() {
    let router = router_with(RoutingStrategy::PerformanceOptimized);
    let fast = router.register_provider(Arc::new(MockAdapter::new("mock", "fast")), 1, 0.0);
    let slow = router.register_provider(Arc::new(MockAdapter::new("mock", "slow")), 1, 0.0);

    // A perfect but slow provider loses to a slightly flaky fast one.
    seed_rate(&router, &fast, 9, 10, Duration::from_secs(1));
    seed_rate(&router, &slow, 10, 10, Duration::from_secs(4));

    let ctx = RoutingContext::new("hello");
    let chosen = match router.select_provider(&ctx).await {
        Ok(chosen) => chosen,
        Err(error) => panic!("selection failed: {error}"),
    };
    assert_eq!(provider_key(chosen.as_ref()), "mock:fast");
}

#[tokio::test]
async fn test_cost_optimized_avoids_never_succeeding_provider() {
    let router = router_with(RoutingStrategy::CostOptimized);
    let broken = router.register_provider(Arc::new(MockAdapter::new("mock", "broken")), 1, 0.0);
    router.register_provider(Arc::new(MockAdapter::new("mock", "cheap")), 1, 0.001);
    router.register_provider(Arc::new(MockAdapter::new("mock", "pricey")), 1, 0.01);

    // A free provider that never succeeds costs infinity, not zero.
    seed_history(&router, &broken, &[(false, Duration::from_secs(1))]);

    let ctx = RoutingContext::new("hello");
    let chosen = match router.select_provider(&ctx).await {
        Ok(chosen) => chosen,
        Err(error) => panic!("selection failed: {error}"),
    };
    assert_eq!(provider_key(chosen.as_ref()), "mock:cheap");
}

#[tokio::test]
async fn test_round_robin_cycles_in_key_order() {
    let router = router_with(RoutingStrategy::RoundRobin);
    router.register_provider(Arc::new(MockAdapter::new("mock", "a")), 1, 0.0);
    router.register_provider(Arc::new(MockAdapter::new("mock", "b")), 1, 0.0);
    router.register_provider(Arc::new(MockAdapter::new("mock", "c")), 1, 0.0);

    let ctx = RoutingContext::new("hello");
    let mut seen = Vec::new();
    for _ in 0..6 {
        let chosen = match router.select_provider(&ctx).await {
            Ok(chosen) => chosen,
            Err(error) => panic!("selection failed: {error}"),
        };
        seen.push(provider_key(chosen.as_ref()));
    }

    assert_eq!(
        seen,
        vec!["mock:a", "mock:b", "mock:c", "mock:a", "mock:b", "mock:c"]
    );
}

#[tokio::test]
async fn test_least_busy_prefers_idle_provider() {
    let router = router_with(RoutingStrategy::LeastBusy);
    let busy = router.register_provider(Arc::new(MockAdapter::new("mock", "busy")), 1, 0.0);
    router.register_provider(Arc::new(MockAdapter::new("mock", "idle")), 1, 0.0);

    // Two requests in flight on the busy provider.
    router.registry().record_request(&busy);
    router.registry().record_request(&busy);

    let ctx = RoutingContext::new("hello");
    let chosen = match router.select_provider(&ctx).await {
        Ok(chosen) => chosen,
        Err(error) => panic!("selection failed: {error}"),
    };
    assert_eq!(provider_key(chosen.as_ref()), "mock:idle");
}

#[tokio::test]
async fn test_task_optimized_honors_size_class_and_mapping_override() {
    let router = router_with(RoutingStrategy::TaskOptimized);
    router.register_provider(
        Arc::new(MockAdapter::new("mock", "small").with_size(ModelSize::Small)),
        1,
        0.0,
    );
    router.register_provider(
        Arc::new(MockAdapter::new("mock", "large").with_size(ModelSize::Large)),
        1,
        0.0,
    );

    // "summarize" classifies as a file summary, preferring small models.
    let ctx = RoutingContext::new("summarize this file");
    assert_eq!(ctx.resolved_task_type(), TaskType::FileSummary);
    let chosen = match router.select_provider(&ctx).await {
        Ok(chosen) => chosen,
        Err(error) => panic!("selection failed: {error}"),
    };
    assert_eq!(provider_key(chosen.as_ref()), "mock:small");

    router.set_task_mapping(TaskType::FileSummary, ModelSize::Large);
    let chosen = match router.select_provider(&ctx).await {
        Ok(chosen) => chosen,
        Err(error) => panic!("selection failed: {error}"),
    };
    assert_eq!(provider_key(chosen.as_ref()), "mock:large");
}

#[tokio::test]
async fn test_fallback_tries_distinct_providers_and_opens_breaker() {
    let router = router_with(RoutingStrategy::TaskOptimized);
    let failing = MockAdapter::new("mock", "failing").always_failing();
    let stable = MockAdapter::new("mock", "stable").with_default_response("recovered");
    let failing_key = router.register_provider(Arc::new(failing.clone()), 1, 0.0);
    router.register_provider(Arc::new(stable.clone()), 1, 0.0);

    // Force the failing provider to be tried first.
    router.add_custom_routing_function(Box::new(move |_ctx, _available| {
        Some("mock:failing".to_owned())
    }));

    let ctx = RoutingContext::new("hello");
    let messages = vec![ChatMessage::user("hello")];
    let response = match router.execute_with_fallback(&messages, None, &ctx, 3).await {
        Ok(response) => response,
        Err(error) => panic!("fallback failed: {error}"),
    };

    assert_eq!(response.content, "recovered");
    assert_eq!(failing.call_count(), 1);
    assert_eq!(stable.call_count(), 1);
    // One failure out of one request crosses the 0.8 error-rate threshold.
    assert!(router.registry().is_breaker_open(&failing_key));
}

#[tokio::test]
async fn test_breaker_holds_below_error_rate_threshold() {
    let router = router_with(RoutingStrategy::RoundRobin);
    let flaky = MockAdapter::new("mock", "flaky").always_failing();
    let key = router.register_provider(Arc::new(flaky.clone()), 1, 0.0);

    // A provider with a track record: four successes before it starts
    // failing, so a single failure is far from the 0.8 threshold.
    seed_rate(&router, &key, 4, 4, Duration::from_millis(100));

    let ctx = RoutingContext::new("hello");
    let messages = vec![ChatMessage::user("hello")];

    // One failure out of five requests is an error rate of 0.2.
    assert!(router.execute_with_fallback(&messages, None, &ctx, 1).await.is_err());
    let metrics = match router.registry().metrics(&key) {
        Some(metrics) => metrics,
        None => panic!("metrics missing"),
    };
    assert!((metrics.error_rate() - 0.2).abs() < 1e-9);
    assert!(!router.registry().is_breaker_open(&key));

    // Fourteen more failures bring the error rate to 15/19, still under
    // the threshold, and the breaker must hold through every one of them.
    for _ in 0..14 {
        assert!(router.execute_with_fallback(&messages, None, &ctx, 1).await.is_err());
        assert!(!router.registry().is_breaker_open(&key));
    }
    let metrics = match router.registry().metrics(&key) {
        Some(metrics) => metrics,
        None => panic!("metrics missing"),
    };
    assert!(metrics.error_rate() < 0.8);

    // A couple more failures push the rate past 0.8 and open the breaker.
    for _ in 0..2 {
        assert!(router.execute_with_fallback(&messages, None, &ctx, 1).await.is_err());
    }
    assert!(router.registry().is_breaker_open(&key));
}

#[tokio::test]
async fn test_fallback_exhaustion_reports_attempts_and_last_error() {
    let router = router_with(RoutingStrategy::RoundRobin);
    let first = MockAdapter::new("mock", "a").always_failing();
    let second = MockAdapter::new("mock", "b").always_failing();
    let third = MockAdapter::new("mock", "c").always_failing();
    router.register_provider(Arc::new(first.clone()), 1, 0.0);
    router.register_provider(Arc::new(second.clone()), 1, 0.0);
    router.register_provider(Arc::new(third.clone()), 1, 0.0);

    let ctx = RoutingContext::new("hello");
    let messages = vec![ChatMessage::user("hello")];
    match router.execute_with_fallback(&messages, None, &ctx, 3).await {
        Err(Error::AllProvidersFailed {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("scripted failure"));
        }
        Err(error) => panic!("unexpected error: {error}"),
        Ok(_) => panic!("fallback should exhaust all providers"),
    }
    // Each provider is tried exactly once per request.
    assert_eq!(first.call_count(), 1);
    assert_eq!(second.call_count(), 1);
    assert_eq!(third.call_count(), 1);

    // Every breaker opened, so a fresh selection finds nothing.
    match router.select_provider(&ctx).await {
        Err(Error::NoProvidersAvailable { registered }) => assert_eq!(registered, 3),
        Err(error) => panic!("unexpected error: {error}"),
        Ok(_) => panic!("selection should fail with all breakers open"),
    }
}

#[tokio::test]
async fn test_active_requests_return_to_zero_after_fallback() {
    let router = router_with(RoutingStrategy::TaskOptimized);
    let key = router.register_provider(
        Arc::new(MockAdapter::new("mock", "only").with_default_response("ok")),
        1,
        0.0,
    );

    let ctx = RoutingContext::new("hello");
    let messages = vec![ChatMessage::user("hello")];
    if let Err(error) = router.execute_with_fallback(&messages, None, &ctx, 3).await {
        panic!("fallback failed: {error}");
    }

    let metrics = match router.registry().metrics(&key) {
        Some(metrics) => metrics,
        None => panic!("metrics missing"),
    };
    assert_eq!(metrics.active_requests, 0);
    assert_eq!(metrics.total_requests, 1);
    assert!((metrics.success_rate - 1.0).abs() < f64::EPSILON);
}
