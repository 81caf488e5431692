use std::time::{Duration, SystemTime};

/// Runtime metrics for one registered provider.
///
/// Rates and the response-time average are running averages over the
/// provider's lifetime. A fresh provider is optimistic: its success rate
/// starts at 1.0 so new providers are not starved by score-based
/// strategies before their first request.
#[derive(Debug, Clone)]
pub struct ProviderMetrics {
    /// Requests routed to this provider since registration.
    pub total_requests: u64,
    /// In-flight requests. Never goes negative.
    pub active_requests: u64,
    /// Running average response time in seconds.
    pub avg_response_time: f64,
    /// Running success rate in `[0, 1]`.
    pub success_rate: f64,
    /// Cost per token used by cost-based routing.
    pub cost_per_token: f64,
    /// When this provider was last selected.
    pub last_used: Option<SystemTime>,
}

impl ProviderMetrics {
    /// Creates fresh metrics with the given per-token cost.
    #[must_use]
    pub fn new(cost_per_token: f64) -> Self {
        Self {
            total_requests: 0,
            active_requests: 0,
            avg_response_time: 0.0,
            success_rate: 1.0,
            cost_per_token,
            last_used: None,
        }
    }

    /// Running error rate, the complement of the success rate.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        1.0 - self.success_rate
    }

    /// Records a request being routed to this provider.
    pub fn record_request(&mut self) {
        self.total_requests += 1;
        self.active_requests += 1;
        self.last_used = Some(SystemTime::now());
    }

    /// Records a request finishing, folding the outcome into the running
    /// averages.
    pub fn record_completion(&mut self, success: bool, elapsed: Duration) {
        self.active_requests = self.active_requests.saturating_sub(1);

        // A completion with no recorded request still counts as one sample.
        let total = self.total_requests.max(1) as f64;
        let outcome = if success { 1.0 } else { 0.0 };
        let elapsed_secs = elapsed.as_secs_f64();

        self.avg_response_time =
            (self.avg_response_time * (total - 1.0) + elapsed_secs) / total;
        self.success_rate = (self.success_rate * (total - 1.0) + outcome) / total;
    }
}
