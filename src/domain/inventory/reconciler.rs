use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::store::{InventoryError, InventoryStore, ProductRecord};
use crate::domain::order::{Order, OrderItem};
use crate::metrics::Metrics;

// ============================================================================
// Inventory Reconciler - Return stock of a cancelled order
// ============================================================================
//
// Runs once per cancellation, after the cancelled status is committed. Each
// line item is restored independently: a deleted product or variant is
// reported and the remaining lines are still restored.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
    pub stock: u32,
    pub reactivated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationFailure {
    pub product_id: Uuid,
    pub sku: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub restored: Vec<RestoredLine>,
    pub failures: Vec<ReconciliationFailure>,
}

impl ReconciliationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct InventoryReconciler {
    inventory: Arc<dyn InventoryStore>,
    metrics: Arc<Metrics>,
}

impl InventoryReconciler {
    pub fn new(inventory: Arc<dyn InventoryStore>, metrics: Arc<Metrics>) -> Self {
        Self { inventory, metrics }
    }

    pub async fn restore(&self, order: &Order) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();

        for item in &order.items {
            match self.restore_item(item).await {
                Ok(line) => report.restored.push(line),
                Err(e) => {
                    tracing::warn!(
                        order_id = %order.id,
                        product_id = %item.product_id,
                        sku = %item.sku,
                        error = %e,
                        "Failed to restore stock for line item"
                    );
                    self.metrics.record_inventory_restore_failure();
                    report.failures.push(ReconciliationFailure {
                        product_id: item.product_id,
                        sku: item.sku.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            order_id = %order.id,
            restored = report.restored.len(),
            failed = report.failures.len(),
            "Inventory reconciliation finished"
        );

        report
    }

    async fn restore_item(&self, item: &OrderItem) -> Result<RestoredLine, InventoryError> {
        let product = self
            .inventory
            .get_product(item.product_id)
            .await?
            .ok_or(InventoryError::ProductNotFound(item.product_id))?;

        let variant_id = resolve_variant(&product, item)?;
        let level = self
            .inventory
            .increment_stock(product.id, variant_id, item.quantity)
            .await?;

        tracing::debug!(
            product_id = %product.id,
            variant_id = ?variant_id,
            quantity = item.quantity,
            stock = level.stock,
            reactivated = level.reactivated,
            "Restored stock"
        );

        Ok(RestoredLine {
            product_id: product.id,
            variant_id,
            quantity: item.quantity,
            stock: level.stock,
            reactivated: level.reactivated,
        })
    }
}

/// Match a line item to a live variant: snapshot SKU first, then snapshot
/// attributes. Items without a snapshot use the bare product counter unless
/// their SKU names one of the variants.
pub fn resolve_variant(product: &ProductRecord, item: &OrderItem) -> Result<Option<Uuid>, InventoryError> {
    match &item.variant {
        Some(snapshot) => product
            .variant_by_sku(&snapshot.sku)
            .or_else(|| product.variant_by_attributes(&snapshot.attributes))
            .map(|variant| Some(variant.id))
            .ok_or_else(|| InventoryError::VariantNotFound {
                product_id: product.id,
                variant: snapshot.sku.clone(),
            }),
        None => Ok(product.variant_by_sku(&item.sku).map(|variant| variant.id)),
    }
}
