use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregate::Order;
use super::value_objects::{Money, OrderStatus, PaymentMethod};

// ============================================================================
// Order Events - Notifications recorded in the outbox
// ============================================================================
//
// Each event is written atomically with the order write that produced it and
// delivered later by the outbox relay.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    StatusChanged(OrderStatusChanged),
    PaymentFailed(OrderPaymentFailed),
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::PaymentFailed(_) => "OrderPaymentFailed",
        }
    }

    pub fn placed(order: &Order) -> Self {
        OrderEvent::Placed(OrderPlaced {
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            status: order.status,
            payment_method: order.payment.method,
            total_amount: order.pricing.total_amount,
        })
    }

    pub fn status_changed(from: OrderStatus, order: &Order, note: Option<String>) -> Self {
        OrderEvent::StatusChanged(OrderStatusChanged {
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            from,
            to: order.status,
            note,
            tracking_number: order.tracking_info.tracking_number.clone(),
            carrier: order.tracking_info.carrier.clone(),
            tracking_url: order.tracking_info.tracking_url.clone(),
        })
    }

    pub fn payment_failed(order: &Order, reason: impl Into<String>) -> Self {
        OrderEvent::PaymentFailed(OrderPaymentFailed {
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            reason: reason.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub total_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_number: String,
    pub user_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub note: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub tracking_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaymentFailed {
    pub order_number: String,
    pub user_id: Uuid,
    pub reason: String,
}

// ============================================================================
// Outbox Envelope
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Time-ordered id (UUIDv7) so relays deliver in write order
    pub id: Uuid,
    pub order_id: Uuid,
    pub event: OrderEvent,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn new(order_id: Uuid, event: OrderEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id,
            event,
            created_at,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

/// Message the relay gave up on after exhausting its attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message: OutboxMessage,
    pub error_message: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}
