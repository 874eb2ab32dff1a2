use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::aggregate::Order;
use super::errors::OrderError;
use super::value_objects::{OrderStatus, StatusHistoryEntry};

// ============================================================================
// Shipment Simulation - Deterministic progress events for shipped orders
// ============================================================================
//
// No carrier integration exists, so progress is derived from the order's own
// dates:
//   picked_up         shipped + 2h
//   in_transit        shipped + 1d
//   out_for_delivery  estimated - 4h (never before in_transit)
//   delivered         actual delivery, or the estimate while still in flight
//
// An event is `completed` once its timestamp is at or before `now`.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStage {
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentEvent {
    pub stage: ShipmentStage,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub completed: bool,
}

pub fn simulate_shipment(order: &Order, now: DateTime<Utc>) -> Result<Vec<ShipmentEvent>, OrderError> {
    if !matches!(order.status, OrderStatus::Shipped | OrderStatus::Delivered) {
        return Err(OrderError::Validation(format!(
            "order {} is {} and has no shipment to simulate",
            order.order_number, order.status
        )));
    }

    let tracking = &order.tracking_info;
    let (Some(shipped), Some(estimated)) = (tracking.shipped_date, tracking.estimated_delivery) else {
        return Err(OrderError::Validation(format!(
            "order {} is missing shipment dates",
            order.order_number
        )));
    };
    let carrier = tracking.carrier.as_deref().unwrap_or("the carrier");

    let picked_up = shipped + Duration::hours(2);
    let in_transit = shipped + Duration::days(1);
    let out_for_delivery = (estimated - Duration::hours(4)).max(in_transit);
    let arrival = tracking.actual_delivery.unwrap_or(estimated);

    let event = |stage, timestamp: DateTime<Utc>, description: String| ShipmentEvent {
        stage,
        timestamp,
        description,
        completed: timestamp <= now,
    };

    Ok(vec![
        event(
            ShipmentStage::PickedUp,
            picked_up,
            format!("Package picked up by {}", carrier),
        ),
        event(
            ShipmentStage::InTransit,
            in_transit,
            "Package in transit to destination".to_string(),
        ),
        event(
            ShipmentStage::OutForDelivery,
            out_for_delivery,
            format!("Out for delivery in {}", order.shipping_address.city),
        ),
        event(
            ShipmentStage::Delivered,
            arrival,
            if tracking.actual_delivery.is_some() {
                "Package delivered".to_string()
            } else {
                "Estimated delivery".to_string()
            },
        ),
    ])
}

/// Public view served for a tracking number. Carries no customer data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub tracking_number: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub carrier: Option<String>,
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub events: Vec<ShipmentEvent>,
}

impl TrackingView {
    pub fn of(order: &Order, now: DateTime<Utc>) -> Result<Self, OrderError> {
        let tracking_number = order
            .tracking_number()
            .ok_or_else(|| OrderError::NotFound {
                entity: "tracking number",
                id: order.order_number.clone(),
            })?
            .to_string();

        Ok(Self {
            tracking_number,
            order_number: order.order_number.clone(),
            status: order.status,
            carrier: order.tracking_info.carrier.clone(),
            tracking_url: order.tracking_info.tracking_url.clone(),
            estimated_delivery: order.tracking_info.estimated_delivery,
            events: simulate_shipment(order, now).unwrap_or_default(),
        })
    }
}

/// Owner/staff view: the public view plus the full status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTimeline {
    pub order_id: uuid::Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub shipped_date: Option<DateTime<Utc>>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub history: Vec<StatusHistoryEntry>,
    pub events: Vec<ShipmentEvent>,
}

impl OrderTimeline {
    pub fn of(order: &Order, now: DateTime<Utc>) -> Self {
        let tracking = &order.tracking_info;
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            tracking_number: tracking.tracking_number.clone(),
            carrier: tracking.carrier.clone(),
            shipped_date: tracking.shipped_date,
            estimated_delivery: tracking.estimated_delivery,
            actual_delivery: tracking.actual_delivery,
            history: order.status_history.clone(),
            events: simulate_shipment(order, now).unwrap_or_default(),
        }
    }
}
