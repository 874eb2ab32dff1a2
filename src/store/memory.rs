use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderStore, StoreError, StoreResult};
use crate::domain::order::{DeadLetter, Order, OrderStatus, OutboxMessage};

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Single-process store used by tests and by the binary when no ScyllaDB node
// is configured. The write lock makes each compare-and-set atomic with its
// outbox append.
//
// ============================================================================

#[derive(Debug, Clone)]
struct StoredOrder {
    order: Order,
    outbox: Vec<OutboxMessage>,
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<Uuid, StoredOrder>>,
    dead_letters: RwLock<Vec<DeadLetter>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order, outbox: Vec<OutboxMessage>) -> StoreResult<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(order.id));
        }
        orders.insert(
            order.id,
            StoredOrder {
                order: order.clone(),
                outbox,
            },
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).map(|stored| stored.order.clone()))
    }

    async fn find_by_tracking_number(&self, tracking_number: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|stored| stored.order.tracking_number() == Some(tracking_number))
            .map(|stored| stored.order.clone()))
    }

    async fn find_by_payment_reference(&self, reference: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|stored| {
                let payment = &stored.order.payment;
                payment.reference.as_deref() == Some(reference)
                    || payment.transaction_id.as_deref() == Some(reference)
            })
            .map(|stored| stored.order.clone()))
    }

    async fn compare_and_set(
        &self,
        order: &Order,
        expected: OrderStatus,
        outbox: Vec<OutboxMessage>,
    ) -> StoreResult<bool> {
        let mut orders = self.orders.write().await;
        let Some(stored) = orders.get_mut(&order.id) else {
            return Ok(false);
        };
        if stored.order.status != expected {
            return Ok(false);
        }
        stored.order = order.clone();
        stored.outbox.extend(outbox);
        Ok(true)
    }

    async fn list_by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>> {
        let mut matching: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|stored| stored.order.status == status)
            .map(|stored| stored.order.clone())
            .collect();
        matching.sort_by_key(|order| order.created_at);
        Ok(matching)
    }

    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Order>> {
        let mut matching: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|stored| stored.order.created_at >= start && stored.order.created_at <= end)
            .map(|stored| stored.order.clone())
            .collect();
        matching.sort_by_key(|order| order.created_at);
        Ok(matching)
    }

    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxMessage>> {
        let mut pending: Vec<OutboxMessage> = self
            .orders
            .read()
            .await
            .values()
            .flat_map(|stored| stored.outbox.iter().cloned())
            .collect();
        pending.sort_by_key(|message| message.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn ack_outbox(&self, message: &OutboxMessage) -> StoreResult<()> {
        if let Some(stored) = self.orders.write().await.get_mut(&message.order_id) {
            stored.outbox.retain(|pending| pending.id != message.id);
        }
        Ok(())
    }

    async fn dead_letter(&self, letter: DeadLetter) -> StoreResult<()> {
        self.ack_outbox(&letter.message).await?;
        self.dead_letters.write().await.push(letter);
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> StoreResult<Vec<DeadLetter>> {
        let letters = self.dead_letters.read().await;
        Ok(letters.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{
        Address, Money, OrderDraft, OrderEvent, OrderItem, PaymentMethod, PricingPolicy,
        ShippingMethod,
    };

    fn order(status: OrderStatus) -> Order {
        let draft = OrderDraft {
            user_id: Uuid::new_v4(),
            items: vec![OrderItem {
                product_id: Uuid::new_v4(),
                name: "Sisal basket".to_string(),
                unit_price: Money::from_units(800),
                quantity: 1,
                sku: "BSK-1".to_string(),
                seller_id: None,
                variant: None,
            }],
            shipping_address: Address {
                full_name: "Wanjiru Kamau".to_string(),
                phone: "+254722000111".to_string(),
                street: "Ngong Road 9".to_string(),
                city: "Nairobi".to_string(),
                region: "Nairobi".to_string(),
                postal_code: None,
                country: "KE".to_string(),
            },
            billing_address: None,
            payment_method: PaymentMethod::CashOnDelivery,
            shipping_method: ShippingMethod::Standard,
            discount: Money::ZERO,
            initial_status: status,
            created_by: "customer:test".to_string(),
        };
        Order::create(draft, &PricingPolicy::default(), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_compare_and_set_guards_on_status() {
        let store = InMemoryOrderStore::new();
        let original = order(OrderStatus::Pending);
        store.insert(&original, vec![]).await.unwrap();

        let mut confirmed = original.clone();
        confirmed.status = OrderStatus::Confirmed;
        let message = OutboxMessage::new(original.id, OrderEvent::placed(&confirmed), Utc::now());

        assert!(store
            .compare_and_set(&confirmed, OrderStatus::Pending, vec![message.clone()])
            .await
            .unwrap());

        // Second writer still believes the order is pending
        let mut cancelled = original.clone();
        cancelled.status = OrderStatus::Cancelled;
        assert!(!store
            .compare_and_set(&cancelled, OrderStatus::Pending, vec![message])
            .await
            .unwrap());

        let stored = store.get(original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert_eq!(store.pending_outbox(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = InMemoryOrderStore::new();
        let o = order(OrderStatus::Pending);
        store.insert(&o, vec![]).await.unwrap();

        assert!(matches!(store.insert(&o, vec![]).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_outbox_ack_and_dead_letter() {
        let store = InMemoryOrderStore::new();
        let o = order(OrderStatus::Confirmed);
        let first = OutboxMessage::new(o.id, OrderEvent::placed(&o), Utc::now());
        let second = OutboxMessage::new(o.id, OrderEvent::placed(&o), Utc::now());
        store.insert(&o, vec![first.clone(), second.clone()]).await.unwrap();

        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending, vec![first.clone(), second.clone()]);

        store.ack_outbox(&first).await.unwrap();
        store
            .dead_letter(DeadLetter {
                message: second.clone(),
                error_message: "smtp down".to_string(),
                attempts: 5,
                failed_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(store.pending_outbox(10).await.unwrap().is_empty());
        let letters = store.dead_letters(10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].message.id, second.id);
    }

    #[tokio::test]
    async fn test_list_by_status_reads_current_state() {
        let store = InMemoryOrderStore::new();
        let pending = order(OrderStatus::Pending);
        let confirmed = order(OrderStatus::Confirmed);
        store.insert(&pending, vec![]).await.unwrap();
        store.insert(&confirmed, vec![]).await.unwrap();

        let listed = store.list_by_status(OrderStatus::Pending).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, pending.id);
    }
}
