use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::service::CheckoutService;
use crate::domain::order::{
    Order, OrderError, OrderStatus, PaymentReceipt, PaymentStatus, TransitionContext,
};

// ============================================================================
// Payment Callbacks - Gateway → Engine
// ============================================================================
//
// A callback is matched to its order by the payment reference recorded at
// push time (or the transaction id). Delivery is at-least-once, so every
// branch is idempotent:
// - success on a pending order confirms it with the receipt
// - success on an already-paid order is a no-op
// - failure on a payment that is no longer pending is a no-op; a completed
//   payment is never downgraded
//
// ============================================================================

pub const CALLBACK_ACTOR: &str = "payment_callback";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCallback {
    pub reference: String,
    pub success: bool,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackOutcome {
    pub order: Order,
    /// False when the callback was a duplicate or arrived too late to matter
    pub applied: bool,
}

impl CheckoutService {
    pub async fn handle_payment_callback(&self, callback: PaymentCallback) -> Result<CallbackOutcome, OrderError> {
        let order = self
            .engine
            .store()
            .find_by_payment_reference(&callback.reference)
            .await?
            .ok_or_else(|| OrderError::NotFound {
                entity: "payment reference",
                id: callback.reference.clone(),
            })?;

        if callback.success {
            self.payment_succeeded(order, callback).await
        } else {
            self.payment_failed(order, callback).await
        }
    }

    async fn payment_succeeded(&self, order: Order, callback: PaymentCallback) -> Result<CallbackOutcome, OrderError> {
        let transaction_id = callback.transaction_id.ok_or_else(|| {
            OrderError::Validation("successful payment callbacks must carry a transaction id".to_string())
        })?;

        if order.payment.status == PaymentStatus::Completed {
            tracing::debug!(
                order_id = %order.id,
                transaction_id = %transaction_id,
                "Duplicate payment confirmation ignored"
            );
            return Ok(CallbackOutcome { order, applied: false });
        }

        let receipt = PaymentReceipt {
            transaction_id,
            paid_at: callback.paid_at.unwrap_or_else(|| self.engine.clock().now()),
        };

        if order.status == OrderStatus::Pending {
            let ctx = TransitionContext::system(CALLBACK_ACTOR)
                .with_note(format!("Payment confirmed ({})", receipt.transaction_id))
                .with_payment(receipt);
            let outcome = self.engine.apply(order, OrderStatus::Confirmed, ctx).await?;
            return Ok(CallbackOutcome {
                applied: outcome.applied(),
                order: outcome.order,
            });
        }

        // Money arrived for an order that already left `pending` (typically
        // cancelled); record the payment without touching the status
        tracing::warn!(
            order_id = %order.id,
            status = %order.status,
            transaction_id = %receipt.transaction_id,
            "Payment completed for an order that is no longer pending"
        );
        let mut next = order.clone();
        next.payment.status = PaymentStatus::Completed;
        next.payment.failure_reason = None;
        next.payment.transaction_id = Some(receipt.transaction_id);
        next.payment.paid_at = Some(receipt.paid_at);
        next.updated_at = self.engine.clock().now();

        let (order, applied) = self.write_payment(&order, &next, vec![]).await?;
        Ok(CallbackOutcome { order, applied })
    }

    async fn payment_failed(&self, order: Order, callback: PaymentCallback) -> Result<CallbackOutcome, OrderError> {
        if order.payment.status != PaymentStatus::Pending {
            tracing::debug!(
                order_id = %order.id,
                payment_status = %order.payment.status,
                "Payment failure callback ignored"
            );
            return Ok(CallbackOutcome { order, applied: false });
        }

        let reason = callback
            .failure_reason
            .unwrap_or_else(|| "payment was not completed".to_string());
        let order = self
            .mark_payment_failed(order, &reason, callback.transaction_id)
            .await?;
        self.metrics.record_checkout(order.payment.method.as_str(), "payment_failed");

        Ok(CallbackOutcome { order, applied: true })
    }
}
