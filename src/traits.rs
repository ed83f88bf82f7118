//! Traits for storage abstraction
//!
//! The engine never talks to a database directly. A [`LedgerStore`] hands out
//! [`StoreTransaction`]s; every ledger mutation happens through one of them
//! and becomes visible to other callers only on [`StoreTransaction::commit`].

use async_trait::async_trait;

use crate::types::*;

/// Store handle, constructed by the host process and injected into the engine
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Transaction: StoreTransaction;

    /// Start a transaction with at least read-committed isolation
    async fn begin(&self) -> BillingResult<Self::Transaction>;

    /// Cheap liveness probe for the host process
    async fn health_check(&self) -> BillingResult<()>;
}

/// Unit of work against the store.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get_tenant(&mut self, tenant_id: TenantId) -> BillingResult<Option<Tenant>>;

    async fn save_tenant(&mut self, tenant: &Tenant) -> BillingResult<()>;

    async fn get_customer(
        &mut self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> BillingResult<Option<Customer>>;

    async fn save_customer(&mut self, customer: &Customer) -> BillingResult<()>;

    /// Load several tax rates at once; unknown ids are skipped
    async fn get_tax_rates(
        &mut self,
        tenant_id: TenantId,
        tax_rate_ids: &[TaxRateId],
    ) -> BillingResult<Vec<TaxRate>>;

    async fn save_tax_rate(&mut self, tax_rate: &TaxRate) -> BillingResult<()>;

    /// Load several products at once; unknown ids are skipped
    async fn get_products(
        &mut self,
        tenant_id: TenantId,
        product_ids: &[ProductId],
    ) -> BillingResult<Vec<Product>>;

    /// Load a product for update. Backends must hold a row lock
    /// (`SELECT ... FOR UPDATE`) until the transaction ends.
    async fn lock_product(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> BillingResult<Option<Product>>;

    async fn save_product(&mut self, product: &Product) -> BillingResult<()>;

    async fn append_inventory_log(&mut self, entry: &InventoryLogEntry) -> BillingResult<()>;

    /// Inventory log for one product in insertion order
    async fn inventory_log(
        &mut self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> BillingResult<Vec<InventoryLogEntry>>;

    /// Number of records already issued in a number series for a financial year
    async fn count_in_sequence(
        &mut self,
        tenant_id: TenantId,
        kind: SequenceKind,
        financial_year: i32,
    ) -> BillingResult<u64>;

    async fn sequence_number_taken(
        &mut self,
        tenant_id: TenantId,
        kind: SequenceKind,
        number: &str,
    ) -> BillingResult<bool>;

    async fn get_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> BillingResult<Option<Document>>;

    /// Insert or replace a document together with its line items
    async fn save_document(&mut self, document: &Document) -> BillingResult<()>;

    async fn delete_document(
        &mut self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> BillingResult<()>;

    async fn customer_invoices(
        &mut self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> BillingResult<Vec<Document>>;

    async fn get_payment(
        &mut self,
        tenant_id: TenantId,
        payment_id: PaymentId,
    ) -> BillingResult<Option<Payment>>;

    async fn save_payment(&mut self, payment: &Payment) -> BillingResult<()>;

    async fn delete_payment(&mut self, tenant_id: TenantId, payment_id: PaymentId)
        -> BillingResult<()>;

    /// Payments linked to one invoice, oldest first
    async fn invoice_payments(
        &mut self,
        tenant_id: TenantId,
        invoice_id: DocumentId,
    ) -> BillingResult<Vec<Payment>>;

    /// Allocations recorded under an umbrella payment
    async fn child_payments(
        &mut self,
        tenant_id: TenantId,
        parent_payment_id: PaymentId,
    ) -> BillingResult<Vec<Payment>>;

    async fn commit(self) -> BillingResult<()>;

    async fn rollback(self) -> BillingResult<()>;
}
