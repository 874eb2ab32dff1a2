use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::aggregate::Order;
use super::commands::{BulkStatusUpdate, TransitionContext};
use super::errors::OrderError;
use super::events::{OrderEvent, OutboxMessage};
use super::shipping::ShippingPolicy;
use super::tracking::{CarrierRegistry, TrackingNumberGenerator};
use super::transitions::{self, Effect};
use super::value_objects::{OrderStatus, PaymentStatus, StatusHistoryEntry};
use crate::clock::Clock;
use crate::domain::inventory::{InventoryReconciler, InventoryStore, ReconciliationReport};
use crate::metrics::Metrics;
use crate::store::OrderStore;

// ============================================================================
// Status Transition Engine
// ============================================================================
//
// Orchestrates: Request → Transition Table → Effects → Conditioned Write
//
// 1. Same status requested again: no-op success, nothing written
// 2. Edge not in the table: InvalidTransition, nothing written
// 3. Apply the row's pre-commit effects to a copy of the order and append
//    exactly one history entry
// 4. Write the copy plus a status-change outbox message, guarded on the
//    status the copy was made from
// 5. Guard lost: another writer moved the order first; report Superseded
// 6. Guard won: run post-commit effects (inventory restore on cancel)
//
// No lock is held across steps; the store's guard is the only critical
// section.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Status written by this request
    Applied,
    /// Order was already in the requested status
    AlreadyInStatus,
    /// Another writer changed the status first; `order` is the current state
    Superseded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub order: Order,
    pub disposition: Disposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationReport>,
}

impl TransitionOutcome {
    pub fn applied(&self) -> bool {
        self.disposition == Disposition::Applied
    }

    fn unchanged(order: Order, disposition: Disposition) -> Self {
        Self {
            order,
            disposition,
            reconciliation: None,
        }
    }
}

/// Per-order result of a bulk update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTransitionResult {
    pub order_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TransitionEngine {
    store: Arc<dyn OrderStore>,
    tracking: TrackingNumberGenerator,
    carriers: Arc<CarrierRegistry>,
    shipping: ShippingPolicy,
    reconciler: InventoryReconciler,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl TransitionEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryStore>,
        carriers: Arc<CarrierRegistry>,
        shipping: ShippingPolicy,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            tracking: TrackingNumberGenerator::new(carriers.clone(), clock.clone()),
            reconciler: InventoryReconciler::new(inventory, metrics.clone()),
            store,
            carriers,
            shipping,
            clock,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn carriers(&self) -> &CarrierRegistry {
        &self.carriers
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Load the order and transition it
    pub async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        ctx: TransitionContext,
    ) -> Result<TransitionOutcome, OrderError> {
        let order = self
            .store
            .get(order_id)
            .await?
            .ok_or_else(|| OrderError::order_not_found(order_id))?;

        self.apply(order, target, ctx).await
    }

    /// Transition an order snapshot; the write is guarded on `current.status`
    pub async fn apply(
        &self,
        current: Order,
        target: OrderStatus,
        ctx: TransitionContext,
    ) -> Result<TransitionOutcome, OrderError> {
        let from = current.status;

        if from == target {
            tracing::debug!(order_id = %current.id, status = %target, "Order already in requested status");
            return Ok(TransitionOutcome::unchanged(current, Disposition::AlreadyInStatus));
        }

        let rule = match transitions::rule_for(from, target) {
            Some(rule) => rule,
            None => {
                self.metrics.record_transition_rejection("invalid_transition");
                tracing::warn!(
                    order_id = %current.id,
                    from = %from,
                    to = %target,
                    "Rejected illegal status transition"
                );
                return Err(OrderError::InvalidTransition { from, to: target });
            }
        };

        let now = self.clock.now();
        let mut next = current.clone();

        for effect in rule.effects.iter().filter(|effect| !effect.is_post_commit()) {
            self.apply_effect(*effect, &mut next, &ctx, now).await?;
        }

        next.status = target;
        next.append_history(StatusHistoryEntry {
            status: target,
            timestamp: now,
            note: ctx.note.clone(),
            updated_by: ctx.updated_by.clone(),
        });

        let notification = OutboxMessage::new(
            next.id,
            OrderEvent::status_changed(from, &next, ctx.note.clone()),
            now,
        );

        if !self.store.compare_and_set(&next, from, vec![notification]).await? {
            self.metrics.record_transition_conflict();
            let latest = self.store.get(current.id).await?.unwrap_or(current);
            tracing::warn!(
                order_id = %latest.id,
                expected = %from,
                current = %latest.status,
                requested = %target,
                "Status changed concurrently, transition superseded"
            );
            return Ok(TransitionOutcome::unchanged(latest, Disposition::Superseded));
        }

        self.metrics.record_transition(from.as_str(), target.as_str());
        tracing::info!(
            order_id = %next.id,
            order_number = %next.order_number,
            from = %from,
            to = %target,
            updated_by = %ctx.updated_by,
            "✅ Order status updated"
        );

        let reconciliation = if rule.effects.contains(&Effect::RestoreInventory) {
            let report = self.reconciler.restore(&next).await;
            if !report.is_complete() {
                tracing::warn!(
                    order_id = %next.id,
                    failures = report.failures.len(),
                    "Order cancelled with partial inventory restoration"
                );
            }
            Some(report)
        } else {
            None
        };

        Ok(TransitionOutcome {
            order: next,
            disposition: Disposition::Applied,
            reconciliation,
        })
    }

    async fn apply_effect(
        &self,
        effect: Effect,
        order: &mut Order,
        ctx: &TransitionContext,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        match effect {
            Effect::CompletePayment => {
                if order.payment.status != PaymentStatus::Completed {
                    order.payment.status = PaymentStatus::Completed;
                    order.payment.failure_reason = None;
                    match &ctx.payment {
                        Some(receipt) => {
                            order.payment.transaction_id = Some(receipt.transaction_id.clone());
                            order.payment.paid_at = Some(receipt.paid_at);
                        }
                        None => order.payment.paid_at = Some(now),
                    }
                }
            }
            Effect::AssignTracking => {
                if order.tracking_info.tracking_number.is_none() {
                    let carrier = self.carrier_for(order, ctx)?;
                    let number = self.tracking.allocate(&carrier, self.store.as_ref()).await?;
                    tracing::debug!(order_id = %order.id, tracking_number = %number, "Assigned tracking number");
                    order.tracking_info.tracking_number = Some(number);
                    order.tracking_info.carrier = Some(carrier);
                }
            }
            Effect::PrepareShipment => {
                let carrier = self.carrier_for(order, ctx)?;
                let estimated = ctx.estimated_delivery.unwrap_or_else(|| {
                    self.shipping
                        .estimate_delivery(now, order.shipping_method, &order.shipping_address)
                });
                if estimated < now {
                    return Err(OrderError::Validation(
                        "estimated delivery cannot precede the shipment date".to_string(),
                    ));
                }

                let tracking_url = order
                    .tracking_info
                    .tracking_number
                    .as_deref()
                    .map(|number| self.carriers.tracking_url(&carrier, number));

                order.tracking_info.carrier = Some(carrier);
                order.tracking_info.shipped_date = Some(now);
                order.tracking_info.estimated_delivery = Some(estimated);
                order.tracking_info.tracking_url = tracking_url;
            }
            Effect::RecordDelivery => {
                let delivered_at = ctx.delivered_at.unwrap_or(now);
                if let Some(shipped) = order.tracking_info.shipped_date {
                    if delivered_at < shipped {
                        return Err(OrderError::Validation(
                            "delivery time cannot precede the shipment date".to_string(),
                        ));
                    }
                }
                order.tracking_info.actual_delivery = Some(delivered_at);
            }
            Effect::RecordCancellation => {
                order.cancellation_reason = ctx.note.clone();
            }
            Effect::RestoreInventory => {}
        }
        Ok(())
    }

    /// A tracking number binds the order to the carrier that issued it
    fn carrier_for(&self, order: &Order, ctx: &TransitionContext) -> Result<String, OrderError> {
        let requested = ctx.carrier.as_deref().map(|name| self.carriers.canonical_name(name));
        let info = &order.tracking_info;

        match (info.tracking_number.as_deref(), info.carrier.as_deref()) {
            (Some(number), Some(issuer)) => match requested {
                Some(carrier) if carrier != issuer => Err(OrderError::Validation(format!(
                    "tracking number {} was issued by {}, cannot hand over to {}",
                    number, issuer, carrier
                ))),
                _ => Ok(issuer.to_string()),
            },
            _ => Ok(requested.unwrap_or_else(|| {
                let fallback = info.carrier.as_deref().unwrap_or(self.carriers.default_carrier());
                self.carriers.canonical_name(fallback)
            })),
        }
    }

    /// Apply the same transition to many orders. Each order succeeds or fails
    /// on its own.
    pub async fn bulk_transition(&self, update: BulkStatusUpdate) -> Vec<BulkTransitionResult> {
        let BulkStatusUpdate {
            order_ids,
            status,
            context,
        } = update;

        let attempts = order_ids.iter().map(|order_id| {
            let ctx = context.clone();
            async move {
                match self.transition(*order_id, status, ctx).await {
                    Ok(outcome) => BulkTransitionResult {
                        order_id: *order_id,
                        success: true,
                        status: Some(outcome.order.status),
                        disposition: Some(outcome.disposition),
                        error: None,
                    },
                    Err(e) => BulkTransitionResult {
                        order_id: *order_id,
                        success: false,
                        status: None,
                        disposition: None,
                        error: Some(e.to_string()),
                    },
                }
            }
        });

        let results = join_all(attempts).await;
        tracing::info!(
            requested = results.len(),
            succeeded = results.iter().filter(|r| r.success).count(),
            status = %status,
            "Bulk status update finished"
        );
        results
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
