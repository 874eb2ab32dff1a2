// ============================================================================
// Order Domain - Lifecycle and Fulfillment
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (Money, OrderStatus, TrackingInfo, Principal)
// - Aggregate (Order with pricing invariants)
// - Transition table and the engine that applies it under a status guard
// - Tracking numbers, carriers and delivery estimates
// - Sweep rules, delivery metrics and shipment simulation
// - Outbox events
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod transitions;
pub mod tracking;
pub mod shipping;
pub mod transition_engine;
pub mod sweep;
pub mod delivery_metrics;
pub mod simulation;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use transitions::{rule_for, is_legal, successors, Effect, TransitionRule, TRANSITIONS};
pub use tracking::*;
pub use shipping::*;
pub use transition_engine::*;
pub use sweep::*;
pub use delivery_metrics::*;
pub use simulation::*;
