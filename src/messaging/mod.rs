// ============================================================================
// Messaging - External collaborators behind narrow interfaces
// ============================================================================
//
// - `Notifier`: delivers outbox messages (email/SMS live behind it)
// - `PaymentGateway`: mobile-money push and card capture
// - `GuardedPaymentClient`: timeout + circuit breaker around the gateway
//
// ============================================================================

pub mod notifier;
pub mod payment_gateway;

pub use notifier::{LogNotifier, NotifyError, Notifier, RecordingNotifier};
pub use payment_gateway::{
    CaptureOutcome, CaptureRequest, GatewayError, GuardedPaymentClient, PaymentGateway,
    PushAccepted, PushRequest, Scripted, SimulatedGateway,
};
