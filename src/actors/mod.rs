// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for periodic and asynchronous work.
//
// Structure:
// - core/           - Health types (HealthStatus, SystemHealth, HealthBoard)
// - infrastructure/ - Sweep scheduler, outbox relay, health monitor, coordinator
//
// Note: Order logic lives in the domain (TransitionEngine, CheckoutService),
//       NOT in actors. Actors only own timers and serialize background passes.
//
// ============================================================================

mod core;
mod infrastructure;

pub use self::core::{ComponentHealth, HealthBoard, HealthStatus, SystemHealth};
pub use self::infrastructure::*;
