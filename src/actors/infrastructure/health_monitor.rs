use kameo::Actor;
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::reply::{Reply, ReplyError};
use chrono::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::actors::core::{ComponentHealth, HealthBoard, HealthStatus, SystemHealth};
use crate::clock::Clock;
use crate::messaging::GuardedPaymentClient;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitState};

// ============================================================================
// Health Monitor Actor - Monitors system health
// ============================================================================
//
// Responsibilities:
// - Poll the payment gateway and notifier circuit breakers
// - Collect component reports (the sweep scheduler reports after each pass)
// - Downgrade a component whose last report is older than `stale_after`
// - Publish the aggregate to the HealthBoard and the health gauge
//
// ============================================================================

pub const PAYMENT_GATEWAY_COMPONENT: &str = "payment_gateway";
pub const NOTIFIER_COMPONENT: &str = "notifier";
pub const SWEEP_COMPONENT: &str = "sweep_scheduler";

// ============================================================================
// Messages
// ============================================================================

pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

/// Poll the breakers once
pub struct CheckDependencies;

pub struct GetSystemHealth;

// SystemHealth is the reply to GetSystemHealth
impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: BTreeMap<String, ComponentHealth>,
    board: HealthBoard,
    payments: Option<Arc<GuardedPaymentClient>>,
    notifier_breaker: Option<CircuitBreaker>,
    check_interval: std::time::Duration,
    stale_after: Duration,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl HealthMonitorActor {
    pub fn new(
        board: HealthBoard,
        check_interval: std::time::Duration,
        stale_after: Duration,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            components: BTreeMap::new(),
            board,
            payments: None,
            notifier_breaker: None,
            check_interval,
            stale_after,
            clock,
            metrics,
        }
    }

    pub fn with_payment_client(mut self, payments: Arc<GuardedPaymentClient>) -> Self {
        self.payments = Some(payments);
        self
    }

    pub fn with_notifier_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.notifier_breaker = Some(breaker);
        self
    }

    fn record(&mut self, component: String, status: HealthStatus, details: Option<String>) {
        self.metrics.set_component_health(&component, status.code());

        let mut health = ComponentHealth::new(component.clone(), status, self.clock.now());
        health.details = details;
        self.components.insert(component, health);

        self.publish();
    }

    fn current(&self) -> SystemHealth {
        let now = self.clock.now();
        let components = self
            .components
            .iter()
            .map(|(name, health)| {
                let mut health = health.clone();
                if health.status.is_healthy() && now - health.last_check > self.stale_after {
                    health.status = HealthStatus::Degraded(format!(
                        "no report since {}",
                        health.last_check.to_rfc3339()
                    ));
                }
                (name.clone(), health)
            })
            .collect();

        SystemHealth::aggregate(components, now)
    }

    fn publish(&self) {
        let health = self.current();
        match &health.overall_status {
            HealthStatus::Healthy => tracing::debug!("System health check: Healthy"),
            HealthStatus::Degraded(msg) => tracing::warn!("System health check: Degraded - {}", msg),
            HealthStatus::Unhealthy(msg) => tracing::error!("System health check: Unhealthy - {}", msg),
        }
        self.board.publish(health);
    }
}

fn breaker_status(state: CircuitState) -> HealthStatus {
    match state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
        CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!("HealthMonitorActor started");

        let weak = actor_ref.downgrade();
        let period = state.check_interval;

        // Periodic dependency checks; ends once the actor is gone
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(actor_ref) = weak.upgrade() else {
                    break;
                };
                if actor_ref.tell(CheckDependencies).send().await.is_err() {
                    break;
                }
            }
        });

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        tracing::debug!(
            component = %msg.component,
            status = ?msg.status,
            "Updated component health"
        );
        self.record(msg.component, msg.status, msg.details);
    }
}

impl Message<CheckDependencies> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, _msg: CheckDependencies, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if let Some(payments) = &self.payments {
            let status = breaker_status(payments.circuit_state().await);
            self.record(PAYMENT_GATEWAY_COMPONENT.to_string(), status, None);
        }

        if let Some(breaker) = &self.notifier_breaker {
            let state = breaker.get_state().await;
            let failures = breaker.get_failure_count().await;
            self.record(
                NOTIFIER_COMPONENT.to_string(),
                breaker_status(state),
                Some(format!("{} consecutive failures", failures)),
            );
        }
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.current()
    }
}
