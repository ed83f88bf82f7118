//! Inventory ledger: every stock change is one immutable log row

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::traits::StoreTransaction;
use crate::types::*;

/// Manual stock movement requested through `adjust_stock`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAdjustment {
    /// Signed quantity; positive adds stock
    pub delta: BigDecimal,
    pub reason: InventoryTransactionType,
    pub notes: Option<String>,
}

impl StockAdjustment {
    pub fn new(delta: BigDecimal, reason: InventoryTransactionType) -> Self {
        Self {
            delta,
            reason,
            notes: None,
        }
    }

    pub fn validate(&self) -> BillingResult<()> {
        if self.delta == BigDecimal::from(0) {
            return Err(BillingError::Validation(
                "Stock adjustment delta cannot be zero".to_string(),
            ));
        }

        match self.reason {
            InventoryTransactionType::Sale | InventoryTransactionType::Opening => {
                Err(BillingError::Validation(format!(
                    "{:?} movements are recorded by documents, not manual adjustments",
                    self.reason
                )))
            }
            InventoryTransactionType::Purchase if self.delta < BigDecimal::from(0) => Err(
                BillingError::Validation("Purchase adjustments must add stock".to_string()),
            ),
            InventoryTransactionType::Damage if self.delta > BigDecimal::from(0) => Err(
                BillingError::Validation("Damage adjustments must remove stock".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Apply a signed stock change to a product and log it.
///
/// Runs inside the caller's transaction: the product row is locked, the new
/// stock is written and the log row appended together, or not at all.
pub async fn apply_delta<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    product_id: ProductId,
    quantity_change: &BigDecimal,
    transaction_type: InventoryTransactionType,
    reference: Option<DocumentReference>,
    notes: Option<String>,
) -> BillingResult<(Product, InventoryLogEntry)> {
    let mut product = tx
        .lock_product(tenant_id, product_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Product", product_id))?;

    let previous_stock = product.stock_quantity.clone();
    let new_stock = &previous_stock + quantity_change;

    if new_stock < BigDecimal::from(0) {
        warn!(
            product_id = %product_id,
            current = %previous_stock,
            change = %quantity_change,
            "Rejected stock change below zero"
        );
        return Err(BillingError::InvalidStockState {
            product_id,
            current: previous_stock,
            change: quantity_change.clone(),
        });
    }

    let now = chrono::Utc::now().naive_utc();
    product.stock_quantity = new_stock.clone();
    product.updated_at = now;

    let entry = InventoryLogEntry {
        id: InventoryLogId::new(),
        tenant_id,
        product_id,
        transaction_type,
        quantity_change: quantity_change.clone(),
        previous_stock,
        new_stock,
        reference,
        notes,
        created_at: now,
    };

    tx.save_product(&product).await?;
    tx.append_inventory_log(&entry).await?;

    debug!(
        product_id = %product_id,
        ?transaction_type,
        change = %entry.quantity_change,
        new_stock = %entry.new_stock,
        "Stock updated"
    );

    Ok((product, entry))
}

/// Result of replaying a product's inventory log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockChainReport {
    pub product_id: ProductId,
    pub opening_stock: BigDecimal,
    pub logged_change: BigDecimal,
    pub reconstructed_stock: BigDecimal,
    pub recorded_stock: BigDecimal,
    pub entries: usize,
    pub issues: Vec<String>,
}

impl StockChainReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Rebuild a product's stock from its log and compare with the stored value
pub async fn verify_stock_chain<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    product_id: ProductId,
) -> BillingResult<StockChainReport> {
    let product = tx
        .get_products(tenant_id, &[product_id])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| BillingError::not_found("Product", product_id))?;
    let entries = tx.inventory_log(tenant_id, product_id).await?;

    let mut issues = Vec::new();
    let mut running = product.opening_stock.clone();

    for entry in &entries {
        if entry.previous_stock != running {
            issues.push(format!(
                "entry {} starts at {} but the chain is at {}",
                entry.id, entry.previous_stock, running
            ));
        }
        if &entry.previous_stock + &entry.quantity_change != entry.new_stock {
            issues.push(format!(
                "entry {}: {} + {} != {}",
                entry.id, entry.previous_stock, entry.quantity_change, entry.new_stock
            ));
        }
        running = &running + &entry.quantity_change;
    }

    if running != product.stock_quantity {
        issues.push(format!(
            "log reconstructs {} but product records {}",
            running, product.stock_quantity
        ));
    }

    let logged_change: BigDecimal = entries.iter().map(|e| &e.quantity_change).sum();

    Ok(StockChainReport {
        product_id,
        opening_stock: product.opening_stock,
        logged_change,
        reconstructed_stock: running,
        recorded_stock: product.stock_quantity,
        entries: entries.len(),
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemoryStore;
    use crate::LedgerStore;

    async fn seeded(stock: i32) -> (MemoryStore, TenantId, ProductId) {
        let store = MemoryStore::new();
        let tenant_id = TenantId::new();
        let mut product = Product::new(tenant_id, "Widget".to_string(), BigDecimal::from(10));
        product.track_inventory = true;
        product.opening_stock = BigDecimal::from(stock);
        product.stock_quantity = BigDecimal::from(stock);

        let mut tx = store.begin().await.unwrap();
        tx.save_product(&product).await.unwrap();
        tx.commit().await.unwrap();
        (store, tenant_id, product.id)
    }

    #[tokio::test]
    async fn test_delta_writes_stock_and_log() {
        let (store, tenant_id, product_id) = seeded(5).await;
        let mut tx = store.begin().await.unwrap();

        let (product, entry) = apply_delta(
            &mut tx,
            tenant_id,
            product_id,
            &BigDecimal::from(-3),
            InventoryTransactionType::Sale,
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(product.stock_quantity, BigDecimal::from(2));
        assert_eq!(entry.previous_stock, BigDecimal::from(5));
        assert_eq!(entry.new_stock, BigDecimal::from(2));

        let report = verify_stock_chain(&mut tx, tenant_id, product_id)
            .await
            .unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.logged_change, BigDecimal::from(-3));
    }

    #[tokio::test]
    async fn test_negative_result_is_rejected() {
        let (store, tenant_id, product_id) = seeded(1).await;
        let mut tx = store.begin().await.unwrap();

        let result = apply_delta(
            &mut tx,
            tenant_id,
            product_id,
            &BigDecimal::from(-2),
            InventoryTransactionType::Adjustment,
            None,
            None,
        )
        .await;

        assert!(matches!(
            result,
            Err(BillingError::InvalidStockState { .. })
        ));
        assert!(tx.inventory_log(tenant_id, product_id).await.unwrap().is_empty());
    }

    #[test]
    fn test_adjustment_rules() {
        assert!(StockAdjustment::new(BigDecimal::from(0), InventoryTransactionType::Adjustment)
            .validate()
            .is_err());
        assert!(StockAdjustment::new(BigDecimal::from(-1), InventoryTransactionType::Purchase)
            .validate()
            .is_err());
        assert!(StockAdjustment::new(BigDecimal::from(1), InventoryTransactionType::Sale)
            .validate()
            .is_err());
        assert!(StockAdjustment::new(BigDecimal::from(-4), InventoryTransactionType::Damage)
            .validate()
            .is_ok());
    }
}
