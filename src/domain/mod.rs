// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - order:     lifecycle, transition table and engine, tracking, metrics
// - inventory: stock counters and cancellation reconciliation
// - checkout:  cart snapshot, stock reservation and payment orchestration
//
// Storage and outbound services are reached only through traits.
//
// ============================================================================

pub mod order;
pub mod inventory;
pub mod checkout;
