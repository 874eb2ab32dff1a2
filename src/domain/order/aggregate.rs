use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::errors::OrderError;
use super::value_objects::{
    Address, Money, OrderItem, OrderStatus, PaymentDetails, PaymentMethod, PaymentStatus,
    Pricing, Principal, ShippingMethod, StatusHistoryEntry, TrackingInfo,
};

// ============================================================================
// Pricing Policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tax_rate_percent: u32,
    pub flat_shipping: Money,
    /// Subtotals at or above this amount ship free
    pub free_shipping_threshold: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_percent: 16,
            flat_shipping: Money::from_units(300),
            free_shipping_threshold: Money::from_units(5000),
        }
    }
}

impl PricingPolicy {
    pub fn tax_for(&self, subtotal: Money) -> Money {
        subtotal.percent(self.tax_rate_percent)
    }

    pub fn shipping_for(&self, subtotal: Money) -> Money {
        if subtotal >= self.free_shipping_threshold {
            Money::ZERO
        } else {
            self.flat_shipping
        }
    }
}

// ============================================================================
// Order Aggregate
// ============================================================================

/// Everything checkout knows when it asks for a new order
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    pub discount: Money,
    /// `pending` for prepaid methods, `confirmed` for cash on delivery
    pub initial_status: OrderStatus,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub pricing: Pricing,
    pub status: OrderStatus,
    pub payment: PaymentDetails,
    pub shipping_method: ShippingMethod,
    pub status_history: Vec<StatusHistoryEntry>,
    pub tracking_info: TrackingInfo,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a new order from a checkout snapshot.
    ///
    /// Fails with `Validation` on an empty item list, a zero quantity, an
    /// incomplete shipping address, or an initial status other than
    /// `pending`/`confirmed`.
    pub fn create(draft: OrderDraft, policy: &PricingPolicy, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if draft.items.is_empty() {
            return Err(OrderError::Validation("order must contain at least one item".to_string()));
        }
        if let Some(item) = draft.items.iter().find(|item| item.quantity == 0) {
            return Err(OrderError::Validation(format!(
                "item {} has zero quantity",
                item.product_id
            )));
        }
        let missing = draft.shipping_address.missing_fields();
        if !missing.is_empty() {
            return Err(OrderError::Validation(format!(
                "shipping address is missing: {}",
                missing.join(", ")
            )));
        }
        if !matches!(draft.initial_status, OrderStatus::Pending | OrderStatus::Confirmed) {
            return Err(OrderError::Validation(format!(
                "orders cannot be created in status {}",
                draft.initial_status
            )));
        }
        if draft.discount < Money::ZERO {
            return Err(OrderError::Validation("discount cannot be negative".to_string()));
        }

        let billing_address = draft
            .billing_address
            .unwrap_or_else(|| draft.shipping_address.clone());

        let mut order = Self {
            id: Uuid::new_v4(),
            order_number: generate_order_number(now),
            user_id: draft.user_id,
            items: draft.items,
            pricing: Pricing {
                discount_amount: draft.discount,
                ..Pricing::default()
            },
            status: draft.initial_status,
            payment: PaymentDetails::new(draft.payment_method),
            shipping_method: draft.shipping_method,
            status_history: Vec::new(),
            tracking_info: TrackingInfo::default(),
            shipping_address: draft.shipping_address,
            billing_address,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        order.recompute_totals(policy);
        order.append_history(StatusHistoryEntry {
            status: draft.initial_status,
            timestamp: now,
            note: Some(format!("Order placed ({})", draft.payment_method)),
            updated_by: draft.created_by,
        });

        Ok(order)
    }

    /// Append-only; the history is never truncated or reordered
    pub fn append_history(&mut self, entry: StatusHistoryEntry) {
        self.updated_at = entry.timestamp;
        self.status_history.push(entry);
    }

    /// Recompute subtotal, tax, shipping and total from the item snapshots.
    /// The discount is preserved.
    pub fn recompute_totals(&mut self, policy: &PricingPolicy) {
        let subtotal: Money = self.items.iter().map(OrderItem::line_total).sum();
        let tax_amount = policy.tax_for(subtotal);
        let shipping_amount = policy.shipping_for(subtotal);
        let discount_amount = self.pricing.discount_amount;

        self.pricing = Pricing {
            subtotal,
            tax_amount,
            shipping_amount,
            discount_amount,
            total_amount: subtotal + tax_amount + shipping_amount - discount_amount,
        };
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment.status
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_info.tracking_number.as_deref()
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    /// Owners see their own orders; staff and admins see everything
    pub fn ensure_visible_to(&self, principal: &Principal) -> Result<(), OrderError> {
        if principal.is_staff() || self.is_owned_by(principal.user_id) {
            Ok(())
        } else {
            Err(OrderError::Unauthorized(format!(
                "{} may not access order {}",
                principal.label(),
                self.order_number
            )))
        }
    }
}

fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::value_objects::Role;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 14, 10, 30, 0).unwrap()
    }

    fn address() -> Address {
        Address {
            full_name: "Brian Otieno".to_string(),
            phone: "+254711000222".to_string(),
            street: "Kenyatta Avenue 4".to_string(),
            city: "Kisumu".to_string(),
            region: "Kisumu".to_string(),
            postal_code: None,
            country: "KE".to_string(),
        }
    }

    fn item(units: i64, quantity: u32) -> OrderItem {
        OrderItem {
            product_id: Uuid::new_v4(),
            name: "Maasai shuka".to_string(),
            unit_price: Money::from_units(units),
            quantity,
            sku: "SHK-RED".to_string(),
            seller_id: Some(Uuid::new_v4()),
            variant: None,
        }
    }

    fn draft(items: Vec<OrderItem>) -> OrderDraft {
        OrderDraft {
            user_id: Uuid::new_v4(),
            items,
            shipping_address: address(),
            billing_address: None,
            payment_method: PaymentMethod::MobileMoney,
            shipping_method: ShippingMethod::Standard,
            discount: Money::ZERO,
            initial_status: OrderStatus::Pending,
            created_by: "customer:test".to_string(),
        }
    }

    #[test]
    fn test_create_below_threshold_charges_shipping() {
        let order = Order::create(draft(vec![item(2000, 2)]), &PricingPolicy::default(), now()).unwrap();

        assert_eq!(order.pricing.subtotal, Money::from_units(4000));
        assert_eq!(order.pricing.shipping_amount, Money::from_units(300));
        assert_eq!(order.pricing.tax_amount, Money::from_units(640));
        assert_eq!(order.pricing.total_amount, Money::from_units(4940));
        assert!(order.pricing.is_balanced());
    }

    #[test]
    fn test_create_at_or_above_threshold_ships_free() {
        let policy = PricingPolicy::default();
        let above = Order::create(draft(vec![item(3000, 2)]), &policy, now()).unwrap();
        let exact = Order::create(draft(vec![item(5000, 1)]), &policy, now()).unwrap();

        assert_eq!(above.pricing.subtotal, Money::from_units(6000));
        assert_eq!(above.pricing.shipping_amount, Money::ZERO);
        assert_eq!(exact.pricing.shipping_amount, Money::ZERO);
    }

    #[test]
    fn test_discount_is_kept_balanced() {
        let mut d = draft(vec![item(1000, 1)]);
        d.discount = Money::from_units(100);
        let mut order = Order::create(d, &PricingPolicy::default(), now()).unwrap();

        assert_eq!(order.pricing.total_amount, Money::from_units(1000 + 160 + 300 - 100));

        order.recompute_totals(&PricingPolicy::default());
        assert_eq!(order.pricing.discount_amount, Money::from_units(100));
        assert!(order.pricing.is_balanced());
    }

    #[test]
    fn test_create_rejects_empty_items() {
        let result = Order::create(draft(vec![]), &PricingPolicy::default(), now());
        assert!(matches!(result, Err(OrderError::Validation(_))));
    }

    #[test]
    fn test_create_rejects_incomplete_address() {
        let mut d = draft(vec![item(100, 1)]);
        d.shipping_address.city = String::new();

        let err = Order::create(d, &PricingPolicy::default(), now()).unwrap_err();
        assert!(err.to_string().contains("city"));
    }

    #[test]
    fn test_create_rejects_shipped_initial_status() {
        let mut d = draft(vec![item(100, 1)]);
        d.initial_status = OrderStatus::Shipped;
        assert!(Order::create(d, &PricingPolicy::default(), now()).is_err());
    }

    #[test]
    fn test_create_seeds_history_and_billing() {
        let order = Order::create(draft(vec![item(100, 1)]), &PricingPolicy::default(), now()).unwrap();

        assert_eq!(order.status_history.len(), 1);
        assert_eq!(order.status_history[0].status, OrderStatus::Pending);
        assert_eq!(order.billing_address, order.shipping_address);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert!(order.order_number.starts_with("ORD-20240514-"));
        assert_eq!(order.order_number.len(), "ORD-20240514-".len() + 8);
    }

    #[test]
    fn test_append_history_moves_updated_at() {
        let mut order = Order::create(draft(vec![item(100, 1)]), &PricingPolicy::default(), now()).unwrap();
        let later = now() + chrono::Duration::hours(1);

        order.append_history(StatusHistoryEntry {
            status: OrderStatus::Confirmed,
            timestamp: later,
            note: None,
            updated_by: "system:test".to_string(),
        });

        assert_eq!(order.status_history.len(), 2);
        assert_eq!(order.updated_at, later);
    }

    #[test]
    fn test_visibility() {
        let order = Order::create(draft(vec![item(100, 1)]), &PricingPolicy::default(), now()).unwrap();
        let owner = Principal::new(order.user_id, Role::Customer);
        let stranger = Principal::new(Uuid::new_v4(), Role::Customer);
        let staff = Principal::new(Uuid::new_v4(), Role::Staff);

        assert!(order.ensure_visible_to(&owner).is_ok());
        assert!(order.ensure_visible_to(&staff).is_ok());
        assert!(matches!(order.ensure_visible_to(&stranger), Err(OrderError::Unauthorized(_))));
    }
}
