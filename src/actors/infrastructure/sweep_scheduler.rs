use kameo::Actor;
use kameo::actor::ActorRef;
use kameo::error::{Infallible, SendError};
use kameo::message::{Context, Message};
use std::sync::Arc;
use std::time::Duration;

use super::health_monitor::{HealthMonitorActor, UpdateHealth, SWEEP_COMPONENT};
use crate::actors::core::HealthStatus;
use crate::domain::order::{OrderError, OrderSweeper, SweepReport};

// ============================================================================
// Sweep Scheduler Actor - Runs the order sweep on a fixed period
// ============================================================================
//
// The sweep itself lives in the domain (`OrderSweeper`); this actor only owns
// the timer and serializes passes, so a slow pass is never overlapped by the
// next tick. `RunSweep` also serves manual triggers.
//
// ============================================================================

pub struct RunSweep;

pub struct SweepSchedulerActor {
    sweeper: Arc<OrderSweeper>,
    interval: Duration,
    health: Option<ActorRef<HealthMonitorActor>>,
}

impl SweepSchedulerActor {
    pub fn new(sweeper: Arc<OrderSweeper>, interval: Duration) -> Self {
        Self {
            sweeper,
            interval,
            health: None,
        }
    }

    pub fn with_health_monitor(mut self, health: ActorRef<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }

    async fn report(&self, status: HealthStatus, details: Option<String>) {
        let Some(health) = &self.health else {
            return;
        };
        let update = UpdateHealth {
            component: SWEEP_COMPONENT.to_string(),
            status,
            details,
        };
        if let Err(e) = health.tell(update).send().await {
            tracing::warn!(error = %e, "Failed to report sweep health");
        }
    }
}

impl Actor for SweepSchedulerActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(interval_secs = state.interval.as_secs(), "SweepSchedulerActor started");

        let weak = actor_ref.downgrade();
        let period = state.interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately; the first sweep waits a full period
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(actor_ref) = weak.upgrade() else {
                    break;
                };
                // ask, not tell: a told message whose handler errors stops the actor
                match actor_ref.ask(RunSweep).await {
                    Ok(_) | Err(SendError::HandlerError(_)) => {}
                    Err(_) => break,
                }
            }
        });

        Ok(state)
    }
}

impl Message<RunSweep> for SweepSchedulerActor {
    type Reply = Result<SweepReport, OrderError>;

    async fn handle(&mut self, _msg: RunSweep, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match self.sweeper.run().await {
            Ok(report) => {
                let status = if report.failures.is_empty() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded(format!("{} orders failed to promote", report.failures.len()))
                };
                self.report(status, Some(format!("{} orders moved", report.changed())))
                    .await;
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "❌ Order sweep failed");
                self.report(HealthStatus::Unhealthy(e.to_string()), None).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::core::HealthBoard;
    use crate::clock::Clock;
    use crate::actors::infrastructure::health_monitor::GetSystemHealth;
    use crate::domain::order::{OrderStatus, SweepRules};
    use crate::test_support::Harness;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_manual_sweep_promotes_and_reports_health() {
        let h = Harness::new().await;
        let order = h
            .place_order_at(OrderStatus::Confirmed, 1, h.clock.now() - ChronoDuration::hours(30))
            .await;

        let monitor = HealthMonitorActor::spawn(HealthMonitorActor::new(
            HealthBoard::new(),
            Duration::from_secs(3600),
            ChronoDuration::minutes(15),
            h.clock.clone(),
            h.metrics.clone(),
        ));
        let sweeper = Arc::new(OrderSweeper::new(
            h.engine.clone(),
            SweepRules::default(),
            h.metrics.clone(),
        ));
        let scheduler = SweepSchedulerActor::spawn(
            SweepSchedulerActor::new(sweeper, Duration::from_secs(3600))
                .with_health_monitor(monitor.clone()),
        );

        let report = scheduler.ask(RunSweep).await.unwrap();
        assert_eq!(report.processing, vec![order.id]);

        let health = monitor.ask(GetSystemHealth).await.unwrap();
        assert!(health.components[SWEEP_COMPONENT].status.is_healthy());
    }

    #[tokio::test]
    async fn test_empty_sweep_is_a_no_op() {
        let h = Harness::new().await;
        let sweeper = Arc::new(OrderSweeper::new(
            h.engine.clone(),
            SweepRules::default(),
            h.metrics.clone(),
        ));
        let scheduler = SweepSchedulerActor::spawn(SweepSchedulerActor::new(
            sweeper,
            Duration::from_secs(3600),
        ));

        let report = scheduler.ask(RunSweep).await.unwrap();
        assert_eq!(report.promoted(), 0);
        assert!(report.failures.is_empty());
    }
}
