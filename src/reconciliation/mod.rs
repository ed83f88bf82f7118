//! Customer balance reconciliation
//!
//! `current_balance` on a customer is a cache. It is always rebuilt from the
//! invoices rather than adjusted incrementally, so running it again with no
//! intervening mutation writes the same value.

use bigdecimal::BigDecimal;
use tracing::debug;

use crate::traits::StoreTransaction;
use crate::types::*;

/// Rebuilds customer balances from outstanding invoices
pub struct BalanceReconciler;

impl BalanceReconciler {
    /// Outstanding amount owed by the customer: opening balance plus the
    /// balance due of every sent, unvoided, not fully paid invoice.
    pub fn outstanding(opening_balance: &BigDecimal, invoices: &[Document]) -> BigDecimal {
        let open: BigDecimal = invoices
            .iter()
            .filter(|invoice| invoice.counts_toward_balance())
            .map(|invoice| &invoice.balance_due)
            .sum();
        opening_balance + open
    }

    /// Recompute and store the customer's balance inside `tx`
    pub async fn recompute<T: StoreTransaction>(
        tx: &mut T,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> BillingResult<BigDecimal> {
        let mut customer = tx
            .get_customer(tenant_id, customer_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Customer", customer_id))?;

        let invoices = tx.customer_invoices(tenant_id, customer_id).await?;
        let balance = Self::outstanding(&customer.opening_balance, &invoices);

        if customer.current_balance != balance {
            customer.current_balance = balance.clone();
            customer.updated_at = chrono::Utc::now().naive_utc();
            tx.save_customer(&customer).await?;
        }

        debug!(
            customer_id = %customer_id,
            balance = %balance,
            invoices = invoices.len(),
            "Customer balance recomputed"
        );

        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::gst::{Discount, DocumentTotals};
    use crate::utils::MemoryStore;
    use crate::LedgerStore;
    use chrono::NaiveDate;

    fn invoice(
        tenant_id: TenantId,
        customer_id: CustomerId,
        balance_due: i32,
        status: DocumentStatus,
        payment_status: PaymentStatus,
    ) -> Document {
        let now = chrono::Utc::now().naive_utc();
        let totals = DocumentTotals::calculate(
            std::iter::empty(),
            &Discount::none(),
            &BigDecimal::from(0),
            &BigDecimal::from(0),
        )
        .unwrap();
        Document {
            id: DocumentId::new(),
            tenant_id,
            document_type: DocumentType::Invoice,
            number: format!("INV-2024-{}", balance_due),
            financial_year: 2024,
            customer_id: Some(customer_id),
            walk_in: None,
            place_of_supply: "KA".to_string(),
            place_of_supply_explicit: false,
            is_inter_state: false,
            issue_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            due_date: None,
            line_items: Vec::new(),
            document_discount: Discount::none(),
            totals,
            balance_due: BigDecimal::from(balance_due),
            status,
            payment_status,
            credit_note: None,
            converted_from: None,
            notes: None,
            terms: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_only_open_sent_invoices_count() {
        let store = MemoryStore::new();
        let tenant_id = TenantId::new();
        let customer = Customer::new(tenant_id, "Ravi".to_string(), BigDecimal::from(25));

        let mut tx = store.begin().await.unwrap();
        tx.save_customer(&customer).await.unwrap();
        for document in [
            invoice(tenant_id, customer.id, 100, DocumentStatus::Sent, PaymentStatus::Unpaid),
            invoice(tenant_id, customer.id, 40, DocumentStatus::Viewed, PaymentStatus::PartiallyPaid),
            invoice(tenant_id, customer.id, 70, DocumentStatus::Draft, PaymentStatus::Unpaid),
            invoice(tenant_id, customer.id, 0, DocumentStatus::Void, PaymentStatus::Unpaid),
            invoice(tenant_id, customer.id, 0, DocumentStatus::Sent, PaymentStatus::Paid),
        ] {
            tx.save_document(&document).await.unwrap();
        }

        let first = BalanceReconciler::recompute(&mut tx, tenant_id, customer.id)
            .await
            .unwrap();
        let second = BalanceReconciler::recompute(&mut tx, tenant_id, customer.id)
            .await
            .unwrap();

        assert_eq!(first, BigDecimal::from(165));
        assert_eq!(first, second);
        let stored = tx.get_customer(tenant_id, customer.id).await.unwrap().unwrap();
        assert_eq!(stored.current_balance, BigDecimal::from(165));
    }

    #[tokio::test]
    async fn test_missing_customer() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = BalanceReconciler::recompute(&mut tx, TenantId::new(), CustomerId::new()).await;
        assert!(matches!(result, Err(BillingError::NotFound { .. })));
    }
}
