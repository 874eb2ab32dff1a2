use kameo::Actor;
use kameo::actor::ActorRef;
use std::sync::Arc;
use std::time::Duration;

use super::health_monitor::{HealthMonitorActor, UpdateHealth};
use super::outbox_relay::{OutboxRelay, OutboxRelayActor, RelayConfig};
use super::sweep_scheduler::{RunSweep, SweepSchedulerActor};
use crate::actors::core::{HealthBoard, HealthStatus};
use crate::clock::Clock;
use crate::domain::order::{OrderError, OrderSweeper, SweepReport};
use crate::messaging::{GuardedPaymentClient, Notifier};
use crate::metrics::Metrics;
use crate::store::OrderStore;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig};

// ============================================================================
// Coordinator - Starts and stops the background actors
// ============================================================================
//
// Actor layout:
//   Coordinator
//   ├── HealthMonitorActor   (breaker polling, component freshness)
//   ├── SweepSchedulerActor  (periodic order sweep, reports to the monitor)
//   └── OutboxRelayActor     (notification delivery, dead-lettering)
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct BackgroundConfig {
    pub sweep_interval: Duration,
    pub health_check_interval: Duration,
    pub outbox_poll_interval: Duration,
    pub relay: RelayConfig,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(30),
            outbox_poll_interval: Duration::from_millis(2000),
            relay: RelayConfig::default(),
        }
    }
}

/// Shared collaborators the background actors run against
pub struct BackgroundDeps {
    pub store: Arc<dyn OrderStore>,
    pub sweeper: Arc<OrderSweeper>,
    pub notifier: Arc<dyn Notifier>,
    pub payments: Arc<GuardedPaymentClient>,
    pub board: HealthBoard,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
}

pub struct Coordinator {
    health_monitor: ActorRef<HealthMonitorActor>,
    sweep_scheduler: ActorRef<SweepSchedulerActor>,
    outbox_relay: ActorRef<OutboxRelayActor>,
}

impl Coordinator {
    pub async fn start(deps: BackgroundDeps, config: BackgroundConfig) -> Self {
        tracing::info!("🎯 Starting background actors");

        let notifier_breaker = CircuitBreaker::new("notifier", CircuitBreakerConfig::default())
            .with_metrics(deps.metrics.clone());

        // A sweep that has not reported for two periods counts as stale
        let stale_after = chrono::Duration::from_std(config.sweep_interval * 2)
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let health_monitor = HealthMonitorActor::spawn(
            HealthMonitorActor::new(
                deps.board.clone(),
                config.health_check_interval,
                stale_after,
                deps.clock.clone(),
                deps.metrics.clone(),
            )
            .with_payment_client(deps.payments.clone())
            .with_notifier_breaker(notifier_breaker.clone()),
        );

        let sweep_scheduler = SweepSchedulerActor::spawn(
            SweepSchedulerActor::new(deps.sweeper.clone(), config.sweep_interval)
                .with_health_monitor(health_monitor.clone()),
        );

        let relay = OutboxRelay::new(
            deps.store.clone(),
            deps.notifier.clone(),
            notifier_breaker,
            config.relay.clone(),
            deps.clock.clone(),
            deps.metrics.clone(),
        );
        let outbox_relay = OutboxRelayActor::spawn(OutboxRelayActor::new(relay, config.outbox_poll_interval));

        // The scheduler has not run yet; seed it so the board does not read stale at boot
        let _ = health_monitor
            .tell(UpdateHealth {
                component: super::health_monitor::SWEEP_COMPONENT.to_string(),
                status: HealthStatus::Healthy,
                details: Some("scheduler started".to_string()),
            })
            .send()
            .await;

        tracing::info!("✅ All background actors started successfully");

        Self {
            health_monitor,
            sweep_scheduler,
            outbox_relay,
        }
    }

    /// Run one sweep pass now, serialized with the scheduled passes
    pub async fn run_sweep(&self) -> Result<SweepReport, OrderError> {
        match self.sweep_scheduler.ask(RunSweep).await {
            Ok(report) => Ok(report),
            Err(kameo::error::SendError::HandlerError(e)) => Err(e),
            Err(e) => Err(OrderError::ExternalService {
                service: "sweep_scheduler",
                message: e.to_string(),
            }),
        }
    }

    pub fn health_monitor(&self) -> &ActorRef<HealthMonitorActor> {
        &self.health_monitor
    }

    pub async fn shutdown(&self) {
        tracing::info!("🛑 Coordinator stopping - initiating graceful shutdown");

        if let Err(e) = self.sweep_scheduler.stop_gracefully().await {
            tracing::warn!(error = %e, "Failed to stop sweep scheduler");
        }
        if let Err(e) = self.outbox_relay.stop_gracefully().await {
            tracing::warn!(error = %e, "Failed to stop outbox relay");
        }
        if let Err(e) = self.health_monitor.stop_gracefully().await {
            tracing::warn!(error = %e, "Failed to stop health monitor");
        }

        tracing::info!("🛑 Coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::infrastructure::health_monitor::{GetSystemHealth, SWEEP_COMPONENT};
    use crate::domain::order::{OrderStatus, SweepRules};
    use crate::messaging::{RecordingNotifier, SimulatedGateway};
    use crate::test_support::Harness;

    #[tokio::test]
    async fn test_start_sweep_and_shutdown() {
        let h = Harness::new().await;
        let order = h.place_order(OrderStatus::Pending, 1).await;

        let deps = BackgroundDeps {
            store: h.store.clone(),
            sweeper: Arc::new(OrderSweeper::new(
                h.engine.clone(),
                SweepRules::default(),
                h.metrics.clone(),
            )),
            notifier: Arc::new(RecordingNotifier::new()),
            payments: Arc::new(GuardedPaymentClient::new(
                Arc::new(SimulatedGateway::new()),
                Duration::from_secs(5),
                h.metrics.clone(),
            )),
            board: HealthBoard::new(),
            clock: h.clock.clone(),
            metrics: h.metrics.clone(),
        };
        let config = BackgroundConfig {
            sweep_interval: Duration::from_secs(3600),
            health_check_interval: Duration::from_secs(3600),
            outbox_poll_interval: Duration::from_secs(3600),
            relay: RelayConfig::default(),
        };

        let coordinator = Coordinator::start(deps, config).await;

        // Fresh unpaid order: nothing to promote
        let report = coordinator.run_sweep().await.unwrap();
        assert_eq!(report.promoted(), 0);
        assert_eq!(h.store.get(order.id).await.unwrap().unwrap().status, OrderStatus::Pending);

        let health = coordinator.health_monitor().ask(GetSystemHealth).await.unwrap();
        assert!(health.components[SWEEP_COMPONENT].status.is_healthy());

        coordinator.shutdown().await;
    }
}
