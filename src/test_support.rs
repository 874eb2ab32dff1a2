use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::{Clock, FixedClock};
use crate::domain::inventory::{InMemoryInventory, InventoryStore, ProductRecord, ProductStatus};
use crate::domain::order::{
    Address, CarrierRegistry, Money, Order, OrderDraft, OrderEvent, OrderItem, OrderStatus,
    OutboxMessage, PaymentMethod, PricingPolicy, Principal, Role, ShippingMethod, ShippingPolicy,
    TransitionContext, TransitionEngine,
};
use crate::metrics::Metrics;
use crate::store::{InMemoryOrderStore, OrderStore};

// ============================================================================
// Shared fixtures for unit tests
// ============================================================================

/// Monday 2024-06-03 09:00 UTC
pub fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

pub fn nairobi_address() -> Address {
    Address {
        full_name: "Achieng Odhiambo".to_string(),
        phone: "+254700123456".to_string(),
        street: "Tom Mboya Street 21".to_string(),
        city: "Nairobi".to_string(),
        region: "Nairobi".to_string(),
        postal_code: Some("00100".to_string()),
        country: "KE".to_string(),
    }
}

pub struct Harness {
    pub store: Arc<InMemoryOrderStore>,
    pub inventory: Arc<InMemoryInventory>,
    pub clock: Arc<FixedClock>,
    pub metrics: Arc<Metrics>,
    pub engine: Arc<TransitionEngine>,
    pub product_id: Uuid,
    pub customer: Principal,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let inventory = Arc::new(InMemoryInventory::new());
        let clock = Arc::new(FixedClock::new(monday_morning()));
        let metrics = Arc::new(Metrics::new().unwrap());

        let product_id = Uuid::new_v4();
        inventory
            .upsert_product(ProductRecord {
                id: product_id,
                name: "Soapstone chess set".to_string(),
                sku: "SSC-01".to_string(),
                price: Money::from_units(2000),
                stock: 10,
                status: ProductStatus::Active,
                seller_id: Some(Uuid::new_v4()),
                variants: vec![],
            })
            .await;

        let engine = Arc::new(TransitionEngine::new(
            store.clone(),
            inventory.clone(),
            Arc::new(CarrierRegistry::default()),
            ShippingPolicy::default(),
            clock.clone(),
            metrics.clone(),
        ));

        Self {
            store,
            inventory,
            clock,
            metrics,
            engine,
            product_id,
            customer: Principal::new(Uuid::new_v4(), Role::Customer),
        }
    }

    pub fn staff_context(&self) -> TransitionContext {
        TransitionContext::by(&Principal::new(Uuid::nil(), Role::Staff))
    }

    pub async fn product_stock(&self) -> u32 {
        self.inventory
            .get_product(self.product_id)
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    /// Reserve `quantity` units and persist an order placed "now"
    pub async fn place_order(&self, status: OrderStatus, quantity: u32) -> Order {
        self.place_order_at(status, quantity, self.clock.now()).await
    }

    pub async fn place_order_at(&self, status: OrderStatus, quantity: u32, created_at: DateTime<Utc>) -> Order {
        self.inventory
            .decrement_stock(self.product_id, None, quantity)
            .await
            .unwrap();

        let draft = OrderDraft {
            user_id: self.customer.user_id,
            items: vec![OrderItem {
                product_id: self.product_id,
                name: "Soapstone chess set".to_string(),
                unit_price: Money::from_units(2000),
                quantity,
                sku: "SSC-01".to_string(),
                seller_id: None,
                variant: None,
            }],
            shipping_address: nairobi_address(),
            billing_address: None,
            payment_method: PaymentMethod::CashOnDelivery,
            shipping_method: ShippingMethod::Standard,
            discount: Money::ZERO,
            initial_status: status,
            created_by: self.customer.label(),
        };

        let order = Order::create(draft, &PricingPolicy::default(), created_at).unwrap();
        let placed = OutboxMessage::new(order.id, OrderEvent::placed(&order), created_at);
        self.store.insert(&order, vec![placed]).await.unwrap();
        order
    }
}
