//! In-memory storage implementation for testing and development

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone, Default)]
struct StoreState {
    tenants: HashMap<TenantId, Tenant>,
    customers: HashMap<CustomerId, Customer>,
    tax_rates: HashMap<TaxRateId, TaxRate>,
    products: HashMap<ProductId, Product>,
    inventory_log: Vec<InventoryLogEntry>,
    documents: HashMap<DocumentId, Document>,
    payments: HashMap<PaymentId, Payment>,
}

/// In-memory store with serializable transactions.
///
/// A transaction holds the store lock for its whole lifetime and works on a
/// private copy of the state; commit swaps the copy in, rollback or drop
/// throws it away. Writers are therefore fully serialized, which gives the
/// row-lock guarantees [`StoreTransaction::lock_product`] asks for.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> BillingResult<MemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTransaction { guard, working })
    }

    async fn health_check(&self) -> BillingResult<()> {
        Ok(())
    }
}

/// Open transaction on a [`MemoryStore`]
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
}

fn sequence_entries<'a>(
    state: &'a StoreState,
    tenant_id: TenantId,
    kind: SequenceKind,
) -> Box<dyn Iterator<Item = (&'a str, i32)> + 'a> {
    match kind {
        SequenceKind::Payment => Box::new(
            state
                .payments
                .values()
                .filter(move |p| p.tenant_id == tenant_id)
                .map(|p| (p.number.as_str(), p.financial_year)),
        ),
        _ => Box::new(
            state
                .documents
                .values()
                .filter(move |d| {
                    d.tenant_id == tenant_id && SequenceKind::from(d.document_type) == kind
                })
                .map(|d| (d.number.as_str(), d.financial_year)),
        ),
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get_tenant(&mut self, tenant_id: TenantId) -> BillingResult<Option<Tenant>> {
        Ok(self.working.tenants.get(&tenant_id).cloned())
    }

    async fn save_tenant(&mut self, tenant: &Tenant) -> BillingResult<()> {
        self.working.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn get_customer(
        &mut self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> BillingResult<Option<Customer>> {
        Ok(self
            .working
            .customers
            .get(&customer_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn save_customer(&mut self, customer: &Customer) -> BillingResult<()> {
        self.working.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn get_tax_rates(
        &mut self,
        tenant_id: TenantId,
        tax_rate_ids: &[TaxRateId],
    ) -> BillingResult<Vec<TaxRate>> {
        Ok(tax_rate_ids
            .iter()
            .filter_map(|id| self.working.tax_rates.get(id))
            .filter(|rate| rate.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn save_tax_rate(&mut self, tax_rate: &TaxRate) -> BillingResult<()> {
        self.working.tax_rates.insert(tax_rate.id, tax_rate.clone());
        Ok(())
    }

    async fn get_products(
        &mut self,
        tenant_id: TenantId,
        product_ids: &[ProductId],
    ) -> BillingResult<Vec<Product>> {
        Ok(product_ids
            .iter()
            .filter_map(|id| self.working.products.get(id))
            .filter(|product| product.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn lock_product(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> BillingResult<Option<Product>> {
        // The transaction already owns the store lock.
        Ok(self
            .working
            .products
            .get(&product_id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn save_product(&mut self, product: &Product) -> BillingResult<()> {
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn append_inventory_log(&mut self, entry: &InventoryLogEntry) -> BillingResult<()> {
        self.working.inventory_log.push(entry.clone());
        Ok(())
    }

    async fn inventory_log(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> BillingResult<Vec<InventoryLogEntry>> {
        Ok(self
            .working
            .inventory_log
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn count_in_sequence(
        &mut self,
        tenant_id: TenantId,
        kind: SequenceKind,
        financial_year: i32,
    ) -> BillingResult<u64> {
        let count = sequence_entries(&self.working, tenant_id, kind)
            .filter(|(_, fy)| *fy == financial_year)
            .count();
        Ok(count as u64)
    }

    async fn sequence_number_taken(
        &mut self,
        tenant_id: TenantId,
        kind: SequenceKind,
        number: &str,
    ) -> BillingResult<bool> {
        Ok(sequence_entries(&self.working, tenant_id, kind).any(|(n, _)| n == number))
    }

    async fn get_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> BillingResult<Option<Document>> {
        Ok(self
            .working
            .documents
            .get(&document_id)
            .filter(|d| d.tenant_id == tenant_id)
            .cloned())
    }

    async fn save_document(&mut self, document: &Document) -> BillingResult<()> {
        self.working.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn delete_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> BillingResult<()> {
        let owned = self
            .working
            .documents
            .get(&document_id)
            .is_some_and(|d| d.tenant_id == tenant_id);
        if !owned {
            return Err(BillingError::not_found("Document", document_id));
        }
        self.working.documents.remove(&document_id);
        Ok(())
    }

    async fn customer_invoices(
        &mut self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> BillingResult<Vec<Document>> {
        Ok(self
            .working
            .documents
            .values()
            .filter(|d| {
                d.tenant_id == tenant_id
                    && d.document_type == DocumentType::Invoice
                    && d.customer_id == Some(customer_id)
            })
            .cloned()
            .collect())
    }

    async fn get_payment(
        &mut self,
        tenant_id: TenantId,
        payment_id: PaymentId,
    ) -> BillingResult<Option<Payment>> {
        Ok(self
            .working
            .payments
            .get(&payment_id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn save_payment(&mut self, payment: &Payment) -> BillingResult<()> {
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn delete_payment(
        &mut self,
        tenant_id: TenantId,
        payment_id: PaymentId,
    ) -> BillingResult<()> {
        let owned = self
            .working
            .payments
            .get(&payment_id)
            .is_some_and(|p| p.tenant_id == tenant_id);
        if !owned {
            return Err(BillingError::not_found("Payment", payment_id));
        }
        self.working.payments.remove(&payment_id);
        Ok(())
    }

    async fn invoice_payments(
        &mut self,
        tenant_id: TenantId,
        invoice_id: DocumentId,
    ) -> BillingResult<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .working
            .payments
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.invoice_id == Some(invoice_id))
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.number.cmp(&b.number))
        });
        Ok(payments)
    }

    async fn child_payments(
        &mut self,
        tenant_id: TenantId,
        parent_payment_id: PaymentId,
    ) -> BillingResult<Vec<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.parent_payment_id == Some(parent_payment_id))
            .cloned()
            .collect())
    }

    async fn commit(self) -> BillingResult<()> {
        let MemoryTransaction { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> BillingResult<()> {
        Ok(())
    }
}
