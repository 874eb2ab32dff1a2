// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};

// Re-export for public API
pub use server::{configure, start_metrics_server};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Status transitions (accepted, rejected, lost to a concurrent writer)
// - Sweep promotions and per-order sweep failures
// - Checkout outcomes and payment gateway latency
// - Outbox dispatch, failures and dead-lettering
// - Retry attempts and circuit breaker state
// - Component health
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the engine
pub struct Metrics {
    registry: Registry,

    // Transition Metrics
    pub order_transitions: IntCounterVec,
    pub order_transition_conflicts: IntCounter,
    pub order_transition_rejections: IntCounterVec,

    // Sweep Metrics
    pub sweep_promotions: IntCounterVec,
    pub sweep_failures: IntCounter,

    // Checkout / Payment Metrics
    pub checkout_total: IntCounterVec,
    pub payment_gateway_duration: HistogramVec,

    // Outbox Metrics
    pub outbox_dispatched: IntCounterVec,
    pub outbox_failures: IntCounter,
    pub outbox_dead_lettered: IntCounterVec,

    // Inventory Metrics
    pub inventory_restore_failures: IntCounter,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGaugeVec,
    pub circuit_breaker_transitions: IntCounterVec,

    // Health Metrics
    pub component_health_status: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Transition Metrics
        let order_transitions = IntCounterVec::new(
            Opts::new("order_transitions_total", "Accepted order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(order_transitions.clone()))?;

        let order_transition_conflicts = IntCounter::new(
            "order_transition_conflicts_total",
            "Transitions whose status guard failed because another writer moved the order first",
        )?;
        registry.register(Box::new(order_transition_conflicts.clone()))?;

        let order_transition_rejections = IntCounterVec::new(
            Opts::new("order_transition_rejections_total", "Rejected transition requests"),
            &["reason"],
        )?;
        registry.register(Box::new(order_transition_rejections.clone()))?;

        // Sweep Metrics
        let sweep_promotions = IntCounterVec::new(
            Opts::new("sweep_promotions_total", "Orders promoted by the automated sweep"),
            &["rule"],
        )?;
        registry.register(Box::new(sweep_promotions.clone()))?;

        let sweep_failures = IntCounter::new(
            "sweep_failures_total",
            "Orders the sweep failed to promote",
        )?;
        registry.register(Box::new(sweep_failures.clone()))?;

        // Checkout / Payment Metrics
        let checkout_total = IntCounterVec::new(
            Opts::new("checkout_total", "Checkout attempts by payment method and outcome"),
            &["payment_method", "outcome"],
        )?;
        registry.register(Box::new(checkout_total.clone()))?;

        let payment_gateway_duration = HistogramVec::new(
            HistogramOpts::new("payment_gateway_duration_seconds", "Payment gateway call duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["operation"],
        )?;
        registry.register(Box::new(payment_gateway_duration.clone()))?;

        // Outbox Metrics
        let outbox_dispatched = IntCounterVec::new(
            Opts::new("outbox_dispatched_total", "Outbox notifications delivered"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_dispatched.clone()))?;

        let outbox_failures = IntCounter::new(
            "outbox_failures_total",
            "Failed outbox delivery passes",
        )?;
        registry.register(Box::new(outbox_failures.clone()))?;

        let outbox_dead_lettered = IntCounterVec::new(
            Opts::new("outbox_dead_lettered_total", "Outbox notifications moved to dead letters"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_dead_lettered.clone()))?;

        // Inventory Metrics
        let inventory_restore_failures = IntCounter::new(
            "inventory_restore_failures_total",
            "Line items whose stock could not be restored on cancellation",
        )?;
        registry.register(Box::new(inventory_restore_failures.clone()))?;

        // Retry Metrics
        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Total successful retries"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Total failed retries after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        // Circuit Breaker Metrics
        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new("circuit_breaker_state", "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)"),
            &["breaker"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["breaker", "from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        // Health Metrics
        let component_health_status = IntGaugeVec::new(
            Opts::new("component_health_status", "Component health (0=Unhealthy, 1=Degraded, 2=Healthy)"),
            &["component"],
        )?;
        registry.register(Box::new(component_health_status.clone()))?;

        Ok(Self {
            registry,
            order_transitions,
            order_transition_conflicts,
            order_transition_rejections,
            sweep_promotions,
            sweep_failures,
            checkout_total,
            payment_gateway_duration,
            outbox_dispatched,
            outbox_failures,
            outbox_dead_lettered,
            inventory_restore_failures,
            retry_attempts_total,
            retry_success,
            retry_failure,
            circuit_breaker_state,
            circuit_breaker_transitions,
            component_health_status,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.order_transitions.with_label_values(&[from, to]).inc();
    }

    pub fn record_transition_conflict(&self) {
        self.order_transition_conflicts.inc();
    }

    pub fn record_transition_rejection(&self, reason: &str) {
        self.order_transition_rejections.with_label_values(&[reason]).inc();
    }

    pub fn record_sweep_promotion(&self, rule: &str) {
        self.sweep_promotions.with_label_values(&[rule]).inc();
    }

    pub fn record_sweep_failure(&self) {
        self.sweep_failures.inc();
    }

    pub fn record_checkout(&self, payment_method: &str, outcome: &str) {
        self.checkout_total.with_label_values(&[payment_method, outcome]).inc();
    }

    pub fn observe_gateway_call(&self, operation: &str, duration_secs: f64) {
        self.payment_gateway_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_outbox_dispatched(&self, event_type: &str) {
        self.outbox_dispatched.with_label_values(&[event_type]).inc();
    }

    pub fn record_outbox_failure(&self) {
        self.outbox_failures.inc();
    }

    pub fn record_dead_letter(&self, event_type: &str) {
        self.outbox_dead_lettered.with_label_values(&[event_type]).inc();
    }

    pub fn record_inventory_restore_failure(&self) {
        self.inventory_restore_failures.inc();
    }

    /// Helper to record retry attempt
    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total
            .with_label_values(&[operation, &attempt.to_string()])
            .inc();
    }

    /// Helper to record retry outcome
    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    pub fn update_circuit_breaker_state(&self, breaker: &str, state: u8) {
        self.circuit_breaker_state
            .with_label_values(&[breaker])
            .set(state as i64);
    }

    pub fn record_circuit_breaker_transition(&self, breaker: &str, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions
            .with_label_values(&[breaker, from_state, to_state])
            .inc();
    }

    pub fn set_component_health(&self, component: &str, level: u8) {
        self.component_health_status
            .with_label_values(&[component])
            .set(level as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transition_conflict();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_transition() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transition("pending", "confirmed");
        metrics.record_transition("pending", "confirmed");
        metrics.record_transition("confirmed", "processing");

        let gathered = metrics.registry.gather();
        let transitions = gathered
            .iter()
            .find(|m| m.name() == "order_transitions_total")
            .unwrap();
        assert_eq!(transitions.metric.len(), 2);
    }

    #[test]
    fn test_record_retry() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retry_attempt("notify", 1);
        metrics.record_retry_attempt("notify", 2);
        metrics.record_retry_outcome("notify", true);

        let gathered = metrics.registry.gather();
        let attempts = gathered.iter().find(|m| m.name() == "retry_attempts_total").unwrap();
        assert_eq!(attempts.metric.len(), 2); // Two different attempt labels
    }

    #[test]
    fn test_record_dead_letter() {
        let metrics = Metrics::new().unwrap();
        metrics.record_dead_letter("OrderStatusChanged");
        metrics.record_dead_letter("OrderStatusChanged");

        let gathered = metrics.registry.gather();
        let dead = gathered
            .iter()
            .find(|m| m.name() == "outbox_dead_lettered_total")
            .unwrap();
        assert_eq!(dead.metric[0].counter.value, Some(2.0));
    }

    #[test]
    fn test_circuit_breaker_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state("payment_gateway", 0);
        metrics.record_circuit_breaker_transition("payment_gateway", "Closed", "Open");
        metrics.update_circuit_breaker_state("payment_gateway", 1);

        let gathered = metrics.registry.gather();
        let state = gathered.iter().find(|m| m.name() == "circuit_breaker_state").unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
    }
}
