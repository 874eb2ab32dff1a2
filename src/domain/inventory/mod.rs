// ============================================================================
// Inventory Domain - Stock counters owned by the catalog
// ============================================================================
//
// The engine never owns products. It reads and adjusts stock through the
// narrow `InventoryStore` interface:
// - checkout reserves (decrements) stock per line item
// - cancellation restores (increments) it through the reconciler
//
// ============================================================================

pub mod store;
pub mod reconciler;

pub use store::*;
pub use reconciler::*;
