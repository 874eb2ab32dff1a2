// ============================================================================
// Core Actor Abstractions
// ============================================================================
//
// Health types shared by the infrastructure actors and the HTTP layer.
//
// ============================================================================

pub mod health;

pub use health::*;
