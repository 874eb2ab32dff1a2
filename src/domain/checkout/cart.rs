use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::StoreResult;

// ============================================================================
// Cart - What the customer intends to buy
// ============================================================================
//
// Lines reference live products; prices are resolved only when checkout
// snapshots them into the order.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    #[serde(default)]
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get_cart(&self, user_id: Uuid) -> StoreResult<Vec<CartLine>>;

    async fn put_cart(&self, user_id: Uuid, lines: Vec<CartLine>) -> StoreResult<()>;

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryCartStore {
    carts: RwLock<HashMap<Uuid, Vec<CartLine>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get_cart(&self, user_id: Uuid) -> StoreResult<Vec<CartLine>> {
        Ok(self
            .carts
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_cart(&self, user_id: Uuid, lines: Vec<CartLine>) -> StoreResult<()> {
        self.carts.write().await.insert(user_id, lines);
        Ok(())
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<()> {
        self.carts.write().await.remove(&user_id);
        Ok(())
    }
}
