use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::order::Money;

// ============================================================================
// Product Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    OutOfStock,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRecord {
    pub id: Uuid,
    pub sku: String,
    pub attributes: BTreeMap<String, String>,
    pub stock: u32,
    /// Overrides the product price when set
    pub price: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub price: Money,
    pub stock: u32,
    pub status: ProductStatus,
    pub seller_id: Option<Uuid>,
    #[serde(default)]
    pub variants: Vec<VariantRecord>,
}

impl ProductRecord {
    /// Variant stock when the product has variants, otherwise the bare counter
    pub fn total_stock(&self) -> u32 {
        if self.variants.is_empty() {
            self.stock
        } else {
            self.variants.iter().map(|variant| variant.stock).sum()
        }
    }

    pub fn variant(&self, id: Uuid) -> Option<&VariantRecord> {
        self.variants.iter().find(|variant| variant.id == id)
    }

    pub fn variant_by_sku(&self, sku: &str) -> Option<&VariantRecord> {
        self.variants.iter().find(|variant| variant.sku == sku)
    }

    pub fn variant_by_attributes(&self, attributes: &BTreeMap<String, String>) -> Option<&VariantRecord> {
        self.variants
            .iter()
            .find(|variant| !attributes.is_empty() && &variant.attributes == attributes)
    }

    pub fn price_for(&self, variant_id: Option<Uuid>) -> Money {
        variant_id
            .and_then(|id| self.variant(id))
            .and_then(|variant| variant.price)
            .unwrap_or(self.price)
    }
}

// ============================================================================
// Inventory Store Interface
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Variant {variant} not found on product {product_id}")]
    VariantNotFound { product_id: Uuid, variant: String },

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("Inventory backend error: {0}")]
    Backend(String),
}

/// Stock level after an adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    /// Counter that was adjusted (variant or bare product)
    pub stock: u32,
    /// Product total across variants
    pub total_stock: u32,
    pub status: ProductStatus,
    /// The adjustment moved the product from out-of-stock back to active
    pub reactivated: bool,
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductRecord>, InventoryError>;

    /// Atomically add `quantity` to the variant counter, or to the product
    /// counter when `variant_id` is `None`. An out-of-stock product with
    /// stock again becomes active in the same step.
    async fn increment_stock(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError>;

    /// Atomically subtract `quantity`; fails without change when stock is short
    async fn decrement_stock(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError>;
}

// ============================================================================
// In-Memory Inventory
// ============================================================================
//
// One mutex per product: adjustments to different products never contend,
// and there is no global lock.
//
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryInventory {
    products: RwLock<HashMap<Uuid, Arc<Mutex<ProductRecord>>>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_product(&self, product: ProductRecord) {
        self.products
            .write()
            .await
            .insert(product.id, Arc::new(Mutex::new(product)));
    }

    /// Remove a product, as when it is deleted from the catalog
    pub async fn remove_product(&self, product_id: Uuid) {
        self.products.write().await.remove(&product_id);
    }

    async fn entry(&self, product_id: Uuid) -> Result<Arc<Mutex<ProductRecord>>, InventoryError> {
        self.products
            .read()
            .await
            .get(&product_id)
            .cloned()
            .ok_or(InventoryError::ProductNotFound(product_id))
    }
}

fn counter_mut(product: &mut ProductRecord, variant_id: Option<Uuid>) -> Result<&mut u32, InventoryError> {
    match variant_id {
        None => Ok(&mut product.stock),
        Some(id) => {
            let product_id = product.id;
            product
                .variants
                .iter_mut()
                .find(|variant| variant.id == id)
                .map(|variant| &mut variant.stock)
                .ok_or(InventoryError::VariantNotFound {
                    product_id,
                    variant: id.to_string(),
                })
        }
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventory {
    async fn get_product(&self, product_id: Uuid) -> Result<Option<ProductRecord>, InventoryError> {
        let entry = self.products.read().await.get(&product_id).cloned();
        match entry {
            Some(product) => Ok(Some(product.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn increment_stock(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError> {
        let entry = self.entry(product_id).await?;
        let mut product = entry.lock().await;

        let counter = counter_mut(&mut product, variant_id)?;
        *counter = counter.saturating_add(quantity);
        let stock = *counter;

        let reactivated = product.total_stock() > 0 && product.status == ProductStatus::OutOfStock;
        if reactivated {
            product.status = ProductStatus::Active;
        }

        Ok(StockLevel {
            stock,
            total_stock: product.total_stock(),
            status: product.status,
            reactivated,
        })
    }

    async fn decrement_stock(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError> {
        let entry = self.entry(product_id).await?;
        let mut product = entry.lock().await;

        let counter = counter_mut(&mut product, variant_id)?;
        if *counter < quantity {
            return Err(InventoryError::InsufficientStock {
                product_id,
                requested: quantity,
                available: *counter,
            });
        }
        *counter -= quantity;
        let stock = *counter;

        if product.total_stock() == 0 && product.status == ProductStatus::Active {
            product.status = ProductStatus::OutOfStock;
        }

        Ok(StockLevel {
            stock,
            total_stock: product.total_stock(),
            status: product.status,
            reactivated: false,
        })
    }
}
