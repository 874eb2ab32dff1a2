use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::cart::{CartLine, CartStore};
use crate::domain::inventory::{InventoryError, InventoryStore, ProductStatus};
use crate::domain::order::{
    Address, Money, Order, OrderDraft, OrderError, OrderEvent, OrderItem, OrderStatus, OutboxMessage,
    PaymentMethod, PaymentReceipt, PaymentStatus, PricingPolicy, Principal, ShippingMethod,
    TransitionContext, TransitionEngine, VariantSnapshot,
};
use crate::messaging::{CaptureOutcome, CaptureRequest, GatewayError, GuardedPaymentClient, PushRequest};
use crate::metrics::Metrics;

// ============================================================================
// Checkout Service - Cart → Order → Payment
// ============================================================================
//
// 1. Resolve the cart (request body, else the stored cart); empty → Validation
// 2. Snapshot name, SKU and current price of every line from the catalog
// 3. Reserve stock per line; short stock → Validation, nothing reserved
// 4. Persist the order with its OrderPlaced outbox message; on failure the
//    reservation is released and the cart is left alone
// 5. Branch on payment method:
//      cash_on_delivery  confirmed on creation, cart cleared
//      mobile_money      pending, cart cleared, push sent; push errors are
//                        logged and the callback drives the rest
//      card              captured synchronously; approval confirms the order
//                        and clears the cart, a decline marks payment failed
//                        and surfaces the error, a timeout changes nothing
//
// No gateway call happens while anything is locked.
//
// ============================================================================

pub const PAYMENT_GATEWAY: &str = "payment_gateway";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Lines to buy; when empty the customer's stored cart is used
    #[serde(default)]
    pub items: Vec<CartLine>,
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub shipping_method: ShippingMethod,
    #[serde(default)]
    pub payer_phone: Option<String>,
    #[serde(default)]
    pub card_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaymentProgress {
    /// Cash on delivery
    NotRequired,
    /// Mobile-money push sent (or attempted); the callback completes payment
    AwaitingCallback { reference: Option<String> },
    Captured { transaction_id: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub order: Order,
    pub payment: PaymentProgress,
}

/// A stock reservation held for one line item
#[derive(Debug, Clone, Copy)]
struct Reservation {
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: u32,
}

pub struct CheckoutService {
    pub(super) engine: Arc<TransitionEngine>,
    inventory: Arc<dyn InventoryStore>,
    carts: Arc<dyn CartStore>,
    payments: Arc<GuardedPaymentClient>,
    pricing: PricingPolicy,
    pub(super) metrics: Arc<Metrics>,
}

impl CheckoutService {
    pub fn new(
        engine: Arc<TransitionEngine>,
        inventory: Arc<dyn InventoryStore>,
        carts: Arc<dyn CartStore>,
        payments: Arc<GuardedPaymentClient>,
        pricing: PricingPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            engine,
            inventory,
            carts,
            payments,
            pricing,
            metrics,
        }
    }

    pub fn payments(&self) -> &GuardedPaymentClient {
        &self.payments
    }

    pub async fn checkout(
        &self,
        principal: &Principal,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, OrderError> {
        let method = request.payment_method;
        let result = self.place_and_pay(principal, request).await;

        match &result {
            Ok(outcome) => {
                let label = match &outcome.payment {
                    PaymentProgress::NotRequired => "placed",
                    PaymentProgress::AwaitingCallback { reference: Some(_) } => "push_requested",
                    PaymentProgress::AwaitingCallback { reference: None } => "push_failed",
                    PaymentProgress::Captured { .. } => "captured",
                };
                self.metrics.record_checkout(method.as_str(), label);
            }
            Err(e) => self.metrics.record_checkout(method.as_str(), e.kind()),
        }

        result
    }

    async fn place_and_pay(
        &self,
        principal: &Principal,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, OrderError> {
        let user_id = principal.user_id;
        let lines = if request.items.is_empty() {
            self.carts.get_cart(user_id).await?
        } else {
            request.items.clone()
        };

        validate_request(&request, &lines)?;

        let items = self.snapshot_lines(&lines).await?;
        let reservations = self.reserve(&items).await?;

        let now = self.engine.clock().now();
        let draft = OrderDraft {
            user_id,
            items: items.into_iter().map(|(item, _)| item).collect(),
            shipping_address: request.shipping_address.clone(),
            billing_address: request.billing_address.clone(),
            payment_method: request.payment_method,
            shipping_method: request.shipping_method,
            discount: Money::ZERO,
            initial_status: match request.payment_method {
                PaymentMethod::CashOnDelivery => OrderStatus::Confirmed,
                PaymentMethod::MobileMoney | PaymentMethod::Card => OrderStatus::Pending,
            },
            created_by: principal.label(),
        };

        let order = match Order::create(draft, &self.pricing, now) {
            Ok(order) => order,
            Err(e) => {
                self.release(&reservations).await;
                return Err(e);
            }
        };

        let placed = OutboxMessage::new(order.id, OrderEvent::placed(&order), now);
        if let Err(e) = self.engine.store().insert(&order, vec![placed]).await {
            tracing::error!(user_id = %user_id, error = %e, "Failed to persist order, releasing stock");
            self.release(&reservations).await;
            return Err(e.into());
        }

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            user_id = %user_id,
            payment_method = %order.payment.method,
            total = %order.pricing.total_amount,
            "🛒 Order placed"
        );

        match request.payment_method {
            PaymentMethod::CashOnDelivery => {
                self.clear_cart(user_id).await;
                Ok(CheckoutOutcome {
                    order,
                    payment: PaymentProgress::NotRequired,
                })
            }
            PaymentMethod::MobileMoney => {
                self.clear_cart(user_id).await;
                let phone = request
                    .payer_phone
                    .clone()
                    .unwrap_or_else(|| order.shipping_address.phone.clone());
                Ok(self.request_push(order, phone).await)
            }
            PaymentMethod::Card => {
                let card_token = request.card_token.clone().unwrap_or_default();
                let outcome = self.capture_card(principal, order, card_token).await?;
                self.clear_cart(user_id).await;
                Ok(outcome)
            }
        }
    }

    async fn snapshot_lines(&self, lines: &[CartLine]) -> Result<Vec<(OrderItem, Option<Uuid>)>, OrderError> {
        let mut items = Vec::with_capacity(lines.len());

        for line in lines {
            let product = self
                .inventory
                .get_product(line.product_id)
                .await
                .map_err(inventory_error)?
                .ok_or_else(|| OrderError::NotFound {
                    entity: "product",
                    id: line.product_id.to_string(),
                })?;

            if product.status == ProductStatus::Inactive {
                return Err(OrderError::Validation(format!(
                    "product {} is not available",
                    product.name
                )));
            }

            let variant = match line.variant_id {
                Some(variant_id) => Some(product.variant(variant_id).ok_or_else(|| OrderError::NotFound {
                    entity: "variant",
                    id: variant_id.to_string(),
                })?),
                None => None,
            };

            let item = OrderItem {
                product_id: product.id,
                name: product.name.clone(),
                unit_price: product.price_for(line.variant_id),
                quantity: line.quantity,
                sku: variant
                    .map(|v| v.sku.clone())
                    .unwrap_or_else(|| product.sku.clone()),
                seller_id: product.seller_id,
                variant: variant.map(|v| VariantSnapshot {
                    sku: v.sku.clone(),
                    attributes: v.attributes.clone(),
                }),
            };
            items.push((item, line.variant_id));
        }

        Ok(items)
    }

    /// All-or-nothing: a failed line releases the lines reserved before it
    async fn reserve(&self, items: &[(OrderItem, Option<Uuid>)]) -> Result<Vec<Reservation>, OrderError> {
        let mut reserved = Vec::with_capacity(items.len());

        for (item, variant_id) in items {
            let reservation = Reservation {
                product_id: item.product_id,
                variant_id: *variant_id,
                quantity: item.quantity,
            };

            if let Err(e) = self
                .inventory
                .decrement_stock(item.product_id, *variant_id, item.quantity)
                .await
            {
                tracing::warn!(product_id = %item.product_id, sku = %item.sku, error = %e, "Stock reservation failed");
                self.release(&reserved).await;
                return Err(inventory_error(e));
            }
            reserved.push(reservation);
        }

        Ok(reserved)
    }

    async fn release(&self, reservations: &[Reservation]) {
        for r in reservations {
            if let Err(e) = self
                .inventory
                .increment_stock(r.product_id, r.variant_id, r.quantity)
                .await
            {
                tracing::error!(product_id = %r.product_id, quantity = r.quantity, error = %e, "Failed to release reserved stock");
            }
        }
    }

    async fn clear_cart(&self, user_id: Uuid) {
        if let Err(e) = self.carts.clear_cart(user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "Order placed but cart could not be cleared");
        }
    }

    async fn request_push(&self, order: Order, phone: String) -> CheckoutOutcome {
        let push = PushRequest {
            order_id: order.id,
            order_number: order.order_number.clone(),
            phone,
            amount: order.pricing.total_amount,
        };

        match self.payments.request_push(&push).await {
            Ok(accepted) => {
                tracing::info!(order_id = %order.id, reference = %accepted.reference, "📲 Mobile money push sent");
                let order = self.record_reference(order, accepted.reference.clone()).await;
                CheckoutOutcome {
                    order,
                    payment: PaymentProgress::AwaitingCallback {
                        reference: Some(accepted.reference),
                    },
                }
            }
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    error = %e,
                    "Mobile money push failed, order left pending"
                );
                CheckoutOutcome {
                    order,
                    payment: PaymentProgress::AwaitingCallback { reference: None },
                }
            }
        }
    }

    async fn record_reference(&self, order: Order, reference: String) -> Order {
        let mut next = order.clone();
        next.payment.reference = Some(reference);
        next.updated_at = self.engine.clock().now();

        match self.write_payment(&order, &next, vec![]).await {
            Ok((current, _)) => current,
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Failed to record payment reference");
                order
            }
        }
    }

    async fn capture_card(
        &self,
        principal: &Principal,
        order: Order,
        card_token: String,
    ) -> Result<CheckoutOutcome, OrderError> {
        let capture = CaptureRequest {
            order_id: order.id,
            order_number: order.order_number.clone(),
            amount: order.pricing.total_amount,
            card_token,
        };

        match self.payments.capture(&capture).await {
            Ok(CaptureOutcome::Approved { transaction_id }) => {
                let receipt = PaymentReceipt {
                    transaction_id: transaction_id.clone(),
                    paid_at: self.engine.clock().now(),
                };
                let ctx = TransitionContext::by(principal)
                    .with_note("Card payment captured")
                    .with_payment(receipt);
                let outcome = self.engine.apply(order, OrderStatus::Confirmed, ctx).await?;

                tracing::info!(order_id = %outcome.order.id, transaction_id = %transaction_id, "💳 Card payment captured");
                Ok(CheckoutOutcome {
                    order: outcome.order,
                    payment: PaymentProgress::Captured { transaction_id },
                })
            }
            Ok(CaptureOutcome::Declined { reason }) | Err(GatewayError::Rejected(reason)) => {
                self.mark_payment_failed(order, &reason, None).await?;
                Err(OrderError::ExternalService {
                    service: PAYMENT_GATEWAY,
                    message: format!("card payment declined: {}", reason),
                })
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "Card capture not completed, payment left pending");
                Err(OrderError::ExternalService {
                    service: PAYMENT_GATEWAY,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Record a failed payment without changing the order status
    pub(super) async fn mark_payment_failed(
        &self,
        order: Order,
        reason: &str,
        transaction_id: Option<String>,
    ) -> Result<Order, OrderError> {
        let now = self.engine.clock().now();
        let mut next = order.clone();
        next.payment.status = PaymentStatus::Failed;
        next.payment.failure_reason = Some(reason.to_string());
        if transaction_id.is_some() {
            next.payment.transaction_id = transaction_id;
        }
        next.updated_at = now;

        let message = OutboxMessage::new(next.id, OrderEvent::payment_failed(&next, reason), now);
        let (current, written) = self.write_payment(&order, &next, vec![message]).await?;
        if written {
            tracing::warn!(order_id = %next.id, reason = %reason, "Payment failed");
        }
        Ok(current)
    }

    /// Write payment fields guarded on the status they were read with.
    /// Returns the current order and whether this write landed.
    pub(super) async fn write_payment(
        &self,
        current: &Order,
        next: &Order,
        outbox: Vec<OutboxMessage>,
    ) -> Result<(Order, bool), OrderError> {
        let store = self.engine.store();
        if store.compare_and_set(next, current.status, outbox).await? {
            return Ok((next.clone(), true));
        }

        tracing::warn!(order_id = %current.id, "Order changed during payment update, keeping current state");
        let latest = store
            .get(current.id)
            .await?
            .ok_or_else(|| OrderError::order_not_found(current.id))?;
        Ok((latest, false))
    }
}

fn validate_request(request: &CheckoutRequest, lines: &[CartLine]) -> Result<(), OrderError> {
    if lines.is_empty() {
        return Err(OrderError::Validation("cart is empty".to_string()));
    }
    if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
        return Err(OrderError::Validation(format!(
            "cart line for product {} has zero quantity",
            line.product_id
        )));
    }

    let missing = request.shipping_address.missing_fields();
    if !missing.is_empty() {
        return Err(OrderError::Validation(format!(
            "shipping address is missing: {}",
            missing.join(", ")
        )));
    }

    if request.payment_method == PaymentMethod::Card
        && request.card_token.as_deref().map_or(true, |t| t.trim().is_empty())
    {
        return Err(OrderError::Validation("card payments require a card token".to_string()));
    }

    Ok(())
}

fn inventory_error(err: InventoryError) -> OrderError {
    match err {
        InventoryError::ProductNotFound(id) => OrderError::NotFound {
            entity: "product",
            id: id.to_string(),
        },
        InventoryError::VariantNotFound { variant, .. } => OrderError::NotFound {
            entity: "variant",
            id: variant,
        },
        InventoryError::InsufficientStock { .. } => OrderError::Validation(err.to_string()),
        InventoryError::Backend(message) => OrderError::ExternalService {
            service: "inventory",
            message,
        },
    }
}
