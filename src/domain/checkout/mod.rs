// ============================================================================
// Checkout Domain - Turning carts into orders and collecting payment
// ============================================================================

pub mod cart;
pub mod service;
pub mod callback;

pub use cart::*;
pub use service::*;
pub use callback::*;
