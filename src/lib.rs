// ============================================================================
// Order Fulfillment Engine
// ============================================================================
//
// Owns the lifecycle of a purchase from checkout through delivery or
// cancellation:
// - domain/    order state machine, inventory reconciliation, checkout
// - store/     order persistence with status-guarded writes and an outbox
// - messaging/ notifier and payment gateway collaborators
// - actors/    sweep scheduler, outbox relay, health monitor
// - api/       actix-web HTTP surface
// - metrics/   Prometheus registry, /metrics and /health
//
// ============================================================================

pub mod clock;
pub mod config;
pub mod domain;
pub mod store;
pub mod messaging;
pub mod metrics;
pub mod utils;
pub mod actors;
pub mod api;

#[cfg(test)]
mod test_support;
