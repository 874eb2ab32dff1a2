// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// Background actors for system concerns:
// - Order sweep scheduling
// - Outbox relay and dead-lettering
// - Health monitoring
// - Coordination and shutdown
//
// ============================================================================

mod health_monitor;
mod sweep_scheduler;
mod outbox_relay;
mod coordinator;

pub use health_monitor::{
    CheckDependencies, GetSystemHealth, HealthMonitorActor, UpdateHealth, NOTIFIER_COMPONENT,
    PAYMENT_GATEWAY_COMPONENT, SWEEP_COMPONENT,
};
pub use sweep_scheduler::{RunSweep, SweepSchedulerActor};
pub use outbox_relay::{OutboxRelay, OutboxRelayActor, RelayConfig, RelayOutbox, RelayReport};
pub use coordinator::{BackgroundConfig, BackgroundDeps, Coordinator};
