use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::value_objects::{OrderStatus, PaymentReceipt, Principal};

// ============================================================================
// Transition Commands - Represent caller intent
// ============================================================================

/// Who asked for a transition and the optional details that go with it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionContext {
    pub updated_by: String,
    pub note: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub payment: Option<PaymentReceipt>,
}

impl TransitionContext {
    pub fn by(principal: &Principal) -> Self {
        Self {
            updated_by: principal.label(),
            ..Self::default()
        }
    }

    /// Transitions raised by the engine itself (sweep, payment callbacks)
    pub fn system(component: &str) -> Self {
        Self {
            updated_by: format!("system:{}", component),
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_carrier(mut self, carrier: impl Into<String>) -> Self {
        self.carrier = Some(carrier.into());
        self
    }

    pub fn with_estimated_delivery(mut self, at: DateTime<Utc>) -> Self {
        self.estimated_delivery = Some(at);
        self
    }

    pub fn with_delivered_at(mut self, at: DateTime<Utc>) -> Self {
        self.delivered_at = Some(at);
        self
    }

    pub fn with_payment(mut self, receipt: PaymentReceipt) -> Self {
        self.payment = Some(receipt);
        self
    }
}

/// Staff/admin request to move many orders to the same status
#[derive(Debug, Clone)]
pub struct BulkStatusUpdate {
    pub order_ids: Vec<Uuid>,
    pub status: OrderStatus,
    pub context: TransitionContext,
}
