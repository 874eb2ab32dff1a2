use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::aggregate::Order;
use super::errors::OrderError;
use super::value_objects::OrderStatus;
use crate::store::OrderStore;

// ============================================================================
// Delivery Metrics - Read-side summary over a closed date range
// ============================================================================
//
// Orders are selected by `created_at` in [start, end]. Delivery time is
// `actual_delivery - created_at` in days. Orders without an actual delivery
// date are left out of the delivery-time mean, and orders without both actual
// and estimated dates are left out of the on-time denominator.
//
// ============================================================================

const UNASSIGNED_CARRIER: &str = "unassigned";
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierPerformance {
    pub carrier: String,
    pub delivered: usize,
    pub average_delivery_days: Option<f64>,
    pub on_time_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMetrics {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_orders: usize,
    pub status_counts: BTreeMap<OrderStatus, usize>,
    pub delivered: usize,
    pub average_delivery_days: Option<f64>,
    /// Fraction in [0, 1]; `None` when no delivered order has both dates
    pub on_time_rate: Option<f64>,
    pub carriers: Vec<CarrierPerformance>,
}

/// Running totals for one group of delivered orders
#[derive(Debug, Default)]
struct Tally {
    delivered: usize,
    timed: usize,
    total_days: f64,
    rated: usize,
    on_time: usize,
}

impl Tally {
    fn add(&mut self, order: &Order) {
        self.delivered += 1;

        let tracking = &order.tracking_info;
        if let Some(actual) = tracking.actual_delivery {
            self.timed += 1;
            self.total_days += (actual - order.created_at).num_seconds() as f64 / SECONDS_PER_DAY;

            if let Some(estimated) = tracking.estimated_delivery {
                self.rated += 1;
                if actual <= estimated {
                    self.on_time += 1;
                }
            }
        }
    }

    fn average_days(&self) -> Option<f64> {
        (self.timed > 0).then(|| self.total_days / self.timed as f64)
    }

    fn on_time_rate(&self) -> Option<f64> {
        (self.rated > 0).then(|| self.on_time as f64 / self.rated as f64)
    }
}

/// Summarize `orders`, ignoring any created outside `[start, end]`
pub fn summarize(orders: &[Order], start: DateTime<Utc>, end: DateTime<Utc>) -> DeliveryMetrics {
    let mut status_counts: BTreeMap<OrderStatus, usize> =
        OrderStatus::ALL.iter().map(|status| (*status, 0)).collect();
    let mut overall = Tally::default();
    let mut by_carrier: BTreeMap<String, Tally> = BTreeMap::new();
    let mut total_orders = 0;

    for order in orders
        .iter()
        .filter(|order| order.created_at >= start && order.created_at <= end)
    {
        total_orders += 1;
        *status_counts.entry(order.status).or_default() += 1;

        if order.status != OrderStatus::Delivered {
            continue;
        }

        overall.add(order);
        let carrier = order
            .tracking_info
            .carrier
            .clone()
            .unwrap_or_else(|| UNASSIGNED_CARRIER.to_string());
        by_carrier.entry(carrier).or_default().add(order);
    }

    let carriers = by_carrier
        .into_iter()
        .map(|(carrier, tally)| CarrierPerformance {
            carrier,
            delivered: tally.delivered,
            average_delivery_days: tally.average_days(),
            on_time_rate: tally.on_time_rate(),
        })
        .collect();

    DeliveryMetrics {
        start,
        end,
        total_orders,
        status_counts,
        delivered: overall.delivered,
        average_delivery_days: overall.average_days(),
        on_time_rate: overall.on_time_rate(),
        carriers,
    }
}

/// Load the orders created in `[start, end]` and summarize them
pub async fn compute_delivery_metrics(
    store: &dyn OrderStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<DeliveryMetrics, OrderError> {
    if start > end {
        return Err(OrderError::Validation(format!(
            "start {} is after end {}",
            start.to_rfc3339(),
            end.to_rfc3339()
        )));
    }

    let orders = store.list_created_between(start, end).await?;
    let metrics = summarize(&orders, start, end);

    tracing::debug!(
        start = %start,
        end = %end,
        orders = metrics.total_orders,
        delivered = metrics.delivered,
        "Computed delivery metrics"
    );

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::test_support::Harness;
    use chrono::Duration;

    async fn delivered(h: &Harness, carrier: &str, actual_days: i64, estimated_days: Option<i64>) -> Order {
        let mut order = h.place_order(OrderStatus::Confirmed, 1).await;
        order.status = OrderStatus::Delivered;
        order.tracking_info.carrier = Some(carrier.to_string());
        order.tracking_info.actual_delivery = Some(order.created_at + Duration::days(actual_days));
        order.tracking_info.estimated_delivery = estimated_days.map(|d| order.created_at + Duration::days(d));
        order
    }

    #[tokio::test]
    async fn test_on_time_rate_is_half_for_one_early_one_late() {
        let h = Harness::new().await;
        let orders = vec![
            delivered(&h, "G4S", 3, Some(5)).await,
            delivered(&h, "G4S", 6, Some(5)).await,
        ];
        let now = h.clock.now();

        let metrics = summarize(&orders, now - Duration::days(1), now + Duration::days(1));

        assert_eq!(metrics.delivered, 2);
        assert_eq!(metrics.on_time_rate, Some(0.5));
        assert_eq!(metrics.average_delivery_days, Some(4.5));
        assert_eq!(metrics.status_counts[&OrderStatus::Delivered], 2);
        assert_eq!(metrics.status_counts[&OrderStatus::Cancelled], 0);
    }

    #[tokio::test]
    async fn test_missing_dates_are_excluded_from_denominators() {
        let h = Harness::new().await;
        let mut no_actual = delivered(&h, "DHL", 0, Some(2)).await;
        no_actual.tracking_info.actual_delivery = None;
        let orders = vec![
            delivered(&h, "DHL", 2, Some(3)).await,
            delivered(&h, "DHL", 4, None).await,
            no_actual,
        ];
        let now = h.clock.now();

        let metrics = summarize(&orders, now, now);

        assert_eq!(metrics.delivered, 3);
        assert_eq!(metrics.on_time_rate, Some(1.0));
        assert_eq!(metrics.average_delivery_days, Some(3.0));
    }

    #[tokio::test]
    async fn test_carrier_breakdown() {
        let h = Harness::new().await;
        let orders = vec![
            delivered(&h, "G4S", 2, Some(5)).await,
            delivered(&h, "Sendy", 1, Some(1)).await,
            delivered(&h, "Sendy", 3, Some(2)).await,
        ];
        let now = h.clock.now();

        let metrics = summarize(&orders, now, now);

        assert_eq!(metrics.carriers.len(), 2);
        let sendy = metrics.carriers.iter().find(|c| c.carrier == "Sendy").unwrap();
        assert_eq!(sendy.delivered, 2);
        assert_eq!(sendy.average_delivery_days, Some(2.0));
        assert_eq!(sendy.on_time_rate, Some(0.5));
    }

    #[tokio::test]
    async fn test_store_range_is_closed_and_validated() {
        let h = Harness::new().await;
        let start = h.clock.now() - Duration::days(7);
        h.place_order_at(OrderStatus::Pending, 1, start).await;
        h.place_order_at(OrderStatus::Pending, 1, h.clock.now()).await;
        h.place_order_at(OrderStatus::Pending, 1, start - Duration::seconds(1)).await;

        let metrics = compute_delivery_metrics(h.store.as_ref(), start, h.clock.now()).await.unwrap();
        assert_eq!(metrics.total_orders, 2);
        assert_eq!(metrics.status_counts[&OrderStatus::Pending], 2);
        assert_eq!(metrics.on_time_rate, None);

        let inverted = compute_delivery_metrics(h.store.as_ref(), h.clock.now(), start).await;
        assert!(matches!(inverted, Err(OrderError::Validation(_))));
    }
}
