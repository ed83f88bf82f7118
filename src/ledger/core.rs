//! Billing engine that coordinates documents, stock, payments and balances

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::{BalanceRefresh, EngineConfig};
use crate::input::{
    BulkPaymentRequest, DocumentDraft, DocumentPatch, DocumentPayload, PaymentMeta, PaymentUpdate,
};
use crate::ledger::inventory::{self, StockAdjustment, StockChainReport};
use crate::ledger::{documents, payments};
use crate::reconciliation::BalanceReconciler;
use crate::traits::*;
use crate::types::*;
use crate::utils::{
    validate_name, validate_non_negative, validate_state_code, validate_tenant,
};

/// Time budget shared by every step of one ledger transaction
struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    async fn run<F, R>(&self, work: F) -> BillingResult<R>
    where
        F: Future<Output = BillingResult<R>>,
    {
        match tokio::time::timeout_at(self.at, work).await {
            Ok(result) => result,
            Err(_) => Err(BillingError::Timeout(self.limit)),
        }
    }
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Main billing system.
///
/// Owns the injected store handle. Every mutating operation runs in one store
/// transaction bounded by the configured timeout; it commits on success and
/// rolls back on any error.
pub struct BillingEngine<S: LedgerStore> {
    store: S,
    config: EngineConfig,
}

impl<S: LedgerStore> BillingEngine<S> {
    /// Create an engine over `store`
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Create an engine with the default configuration
    pub fn with_defaults(store: S) -> Self {
        Self::new(store, EngineConfig::default())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Liveness probe for the backing store
    pub async fn health_check(&self) -> BillingResult<()> {
        self.store.health_check().await
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.config.transaction_timeout())
    }

    /// Commit on success, roll back on failure
    async fn settle<R>(&self, tx: S::Transaction, outcome: BillingResult<R>) -> BillingResult<R> {
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                warn!(error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }

    /// Close a read-only transaction
    async fn release<R>(&self, tx: S::Transaction, outcome: BillingResult<R>) -> BillingResult<R> {
        tx.rollback().await?;
        outcome
    }

    /// Balance refresh inside the triggering transaction, when configured
    async fn refresh_within(
        &self,
        tx: &mut S::Transaction,
        tenant_id: TenantId,
        customer_id: Option<CustomerId>,
    ) -> BillingResult<()> {
        if let (BalanceRefresh::InTransaction, Some(customer_id)) =
            (self.config.balance_refresh, customer_id)
        {
            BalanceReconciler::recompute(tx, tenant_id, customer_id).await?;
        }
        Ok(())
    }

    /// Follow-up balance refresh after the triggering transaction committed.
    ///
    /// The mutation is already durable, so a failure here is logged and the
    /// cache stays stale until the next refresh.
    async fn refresh_after(&self, tenant_id: TenantId, customer_id: Option<CustomerId>) {
        if let (BalanceRefresh::AfterCommit, Some(customer_id)) =
            (self.config.balance_refresh, customer_id)
        {
            if let Err(err) = self.recompute_customer_balance(tenant_id, customer_id).await {
                warn!(
                    customer_id = %customer_id,
                    error = %err,
                    "Customer balance refresh failed"
                );
            }
        }
    }

    // Seeding
    /// Register a tenant and its number series
    #[instrument(skip_all, fields(tenant_id = %tenant.id))]
    pub async fn register_tenant(&self, tenant: Tenant) -> BillingResult<Tenant> {
        validate_tenant(&tenant)?;

        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline.run(tx.save_tenant(&tenant)).await;
        self.settle(tx, outcome).await?;

        info!(name = %tenant.name, "Tenant registered");
        Ok(tenant)
    }

    /// Register a customer; its balance starts at the opening balance
    #[instrument(skip_all, fields(tenant_id = %customer.tenant_id, customer_id = %customer.id))]
    pub async fn register_customer(&self, mut customer: Customer) -> BillingResult<Customer> {
        validate_name("Customer name", &customer.name)?;
        if let Some(state_code) = &customer.state_code {
            validate_state_code(state_code)?;
        }
        customer.current_balance = customer.opening_balance.clone();

        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                require_tenant(&mut tx, customer.tenant_id).await?;
                tx.save_customer(&customer).await
            })
            .await;
        self.settle(tx, outcome).await?;

        Ok(customer)
    }

    #[instrument(skip_all, fields(tenant_id = %tax_rate.tenant_id, tax_rate_id = %tax_rate.id))]
    pub async fn register_tax_rate(&self, tax_rate: TaxRate) -> BillingResult<TaxRate> {
        validate_name("Tax rate name", &tax_rate.name)?;
        tax_rate.descriptor.validate()?;

        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                require_tenant(&mut tx, tax_rate.tenant_id).await?;
                tx.save_tax_rate(&tax_rate).await
            })
            .await;
        self.settle(tx, outcome).await?;

        Ok(tax_rate)
    }

    /// Register a product. Its stock starts at `opening_stock`, which is also
    /// where its inventory log chain starts.
    #[instrument(skip_all, fields(tenant_id = %product.tenant_id, product_id = %product.id))]
    pub async fn register_product(&self, mut product: Product) -> BillingResult<Product> {
        validate_name("Product name", &product.name)?;
        validate_non_negative("Selling price", &product.selling_price)?;
        validate_non_negative("Opening stock", &product.opening_stock)?;
        product.stock_quantity = product.opening_stock.clone();

        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                require_tenant(&mut tx, product.tenant_id).await?;
                if let Some(tax_rate_id) = product.tax_rate_id {
                    if tx.get_tax_rates(product.tenant_id, &[tax_rate_id]).await?.is_empty() {
                        return Err(BillingError::not_found("Tax rate", tax_rate_id));
                    }
                }
                tx.save_product(&product).await
            })
            .await;
        self.settle(tx, outcome).await?;

        Ok(product)
    }

    // Documents
    /// Create a document from a client payload
    pub async fn create_document(
        &self,
        document_type: DocumentType,
        tenant_id: TenantId,
        payload: DocumentPayload,
    ) -> BillingResult<Document> {
        let draft = payload.normalize(document_type)?;
        self.create_from_draft(document_type, tenant_id, draft).await
    }

    /// Create a document from an already normalized request
    #[instrument(skip_all, fields(tenant_id = %tenant_id, document_type = %document_type))]
    pub async fn create_from_draft(
        &self,
        document_type: DocumentType,
        tenant_id: TenantId,
        draft: DocumentDraft,
    ) -> BillingResult<Document> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let document =
                    documents::create(&mut tx, tenant_id, document_type, draft, None, today())
                        .await?;
                self.refresh_within(&mut tx, tenant_id, document.customer_id)
                    .await?;
                Ok(document)
            })
            .await;
        let document = self.settle(tx, outcome).await?;

        self.refresh_after(tenant_id, document.customer_id).await;
        Ok(document)
    }

    /// Edit a draft by re-creating it with the same id and number
    #[instrument(skip_all, fields(tenant_id = %tenant_id, document_id = %document_id))]
    pub async fn update_document(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        patch: DocumentPatch,
    ) -> BillingResult<Document> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let document =
                    documents::update(&mut tx, tenant_id, document_id, patch, today()).await?;
                self.refresh_within(&mut tx, tenant_id, document.customer_id)
                    .await?;
                Ok(document)
            })
            .await;
        let document = self.settle(tx, outcome).await?;

        self.refresh_after(tenant_id, document.customer_id).await;
        Ok(document)
    }

    /// Delete a draft document, restoring its stock
    #[instrument(skip_all, fields(tenant_id = %tenant_id, document_id = %document_id))]
    pub async fn delete_draft(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> BillingResult<Document> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let document = documents::delete_draft(&mut tx, tenant_id, document_id).await?;
                self.refresh_within(&mut tx, tenant_id, document.customer_id)
                    .await?;
                Ok(document)
            })
            .await;
        let document = self.settle(tx, outcome).await?;

        self.refresh_after(tenant_id, document.customer_id).await;
        Ok(document)
    }

    /// Void a document, restoring stock and clearing its balance
    #[instrument(skip_all, fields(tenant_id = %tenant_id, document_id = %document_id))]
    pub async fn void_document(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> BillingResult<Document> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let document = documents::void(&mut tx, tenant_id, document_id).await?;
                self.refresh_within(&mut tx, tenant_id, document.customer_id)
                    .await?;
                Ok(document)
            })
            .await;
        let document = self.settle(tx, outcome).await?;

        self.refresh_after(tenant_id, document.customer_id).await;
        Ok(document)
    }

    async fn transition(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        to: DocumentStatus,
    ) -> BillingResult<Document> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let document = documents::transition(&mut tx, tenant_id, document_id, to).await?;
                self.refresh_within(&mut tx, tenant_id, document.customer_id)
                    .await?;
                Ok(document)
            })
            .await;
        let document = self.settle(tx, outcome).await?;

        // A draft invoice starts counting toward the balance once sent.
        if to == DocumentStatus::Sent {
            self.refresh_after(tenant_id, document.customer_id).await;
        }
        Ok(document)
    }

    #[instrument(skip(self))]
    pub async fn mark_sent(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> BillingResult<Document> {
        self.transition(tenant_id, document_id, DocumentStatus::Sent)
            .await
    }

    #[instrument(skip(self))]
    pub async fn mark_viewed(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> BillingResult<Document> {
        self.transition(tenant_id, document_id, DocumentStatus::Viewed)
            .await
    }

    #[instrument(skip(self))]
    pub async fn accept_estimate(
        &self,
        tenant_id: TenantId,
        estimate_id: DocumentId,
    ) -> BillingResult<Document> {
        self.transition(tenant_id, estimate_id, DocumentStatus::Accepted)
            .await
    }

    #[instrument(skip(self))]
    pub async fn decline_estimate(
        &self,
        tenant_id: TenantId,
        estimate_id: DocumentId,
    ) -> BillingResult<Document> {
        self.transition(tenant_id, estimate_id, DocumentStatus::Declined)
            .await
    }

    /// Turn an estimate into a draft invoice; returns the invoice
    #[instrument(skip(self))]
    pub async fn convert_estimate(
        &self,
        tenant_id: TenantId,
        estimate_id: DocumentId,
    ) -> BillingResult<Document> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let (_, invoice) =
                    documents::convert_estimate(&mut tx, tenant_id, estimate_id, today()).await?;
                self.refresh_within(&mut tx, tenant_id, invoice.customer_id)
                    .await?;
                Ok(invoice)
            })
            .await;
        let invoice = self.settle(tx, outcome).await?;

        self.refresh_after(tenant_id, invoice.customer_id).await;
        Ok(invoice)
    }

    pub async fn get_document(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
    ) -> BillingResult<Document> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                tx.get_document(tenant_id, document_id)
                    .await?
                    .ok_or_else(|| BillingError::not_found("Document", document_id))
            })
            .await;
        self.release(tx, outcome).await
    }

    /// Payments recorded against an invoice, oldest first
    pub async fn document_payments(
        &self,
        tenant_id: TenantId,
        invoice_id: DocumentId,
    ) -> BillingResult<Vec<Payment>> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(tx.invoice_payments(tenant_id, invoice_id))
            .await;
        self.release(tx, outcome).await
    }

    // Payments
    /// Record a payment against an invoice
    #[instrument(skip_all, fields(tenant_id = %tenant_id, invoice_id = %invoice_id, amount = %amount))]
    pub async fn record_payment(
        &self,
        tenant_id: TenantId,
        invoice_id: DocumentId,
        amount: BigDecimal,
        mode: PaymentMode,
        meta: PaymentMeta,
    ) -> BillingResult<Payment> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let payment = payments::record_payment(
                    &mut tx, tenant_id, invoice_id, &amount, mode, &meta, today(),
                )
                .await?;
                self.refresh_within(&mut tx, tenant_id, payment.customer_id)
                    .await?;
                Ok(payment)
            })
            .await;
        let payment = self.settle(tx, outcome).await?;

        self.refresh_after(tenant_id, payment.customer_id).await;
        Ok(payment)
    }

    /// Record one payment spread over several invoices of a customer
    #[instrument(skip_all, fields(tenant_id = %tenant_id, customer_id = %customer_id))]
    pub async fn record_bulk_payment(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
        request: BulkPaymentRequest,
    ) -> BillingResult<Payment> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let payment = payments::record_bulk_payment(
                    &mut tx,
                    tenant_id,
                    customer_id,
                    &request,
                    today(),
                )
                .await?;
                self.refresh_within(&mut tx, tenant_id, Some(customer_id))
                    .await?;
                Ok(payment)
            })
            .await;
        let payment = self.settle(tx, outcome).await?;

        self.refresh_after(tenant_id, Some(customer_id)).await;
        Ok(payment)
    }

    /// Apply an open credit note to an invoice of the same customer
    #[instrument(skip_all, fields(tenant_id = %tenant_id, credit_note_id = %credit_note_id, invoice_id = %invoice_id))]
    pub async fn apply_credit_note(
        &self,
        tenant_id: TenantId,
        credit_note_id: DocumentId,
        invoice_id: DocumentId,
        amount: Option<BigDecimal>,
    ) -> BillingResult<Payment> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let payment = payments::apply_credit_note(
                    &mut tx,
                    tenant_id,
                    credit_note_id,
                    invoice_id,
                    amount.as_ref(),
                    today(),
                )
                .await?;
                self.refresh_within(&mut tx, tenant_id, payment.customer_id)
                    .await?;
                Ok(payment)
            })
            .await;
        let payment = self.settle(tx, outcome).await?;

        self.refresh_after(tenant_id, payment.customer_id).await;
        Ok(payment)
    }

    /// Delete a payment, reversing its effect on invoices and credit notes
    #[instrument(skip_all, fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn delete_payment(
        &self,
        tenant_id: TenantId,
        payment_id: PaymentId,
    ) -> BillingResult<Payment> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let payment = payments::delete_payment(&mut tx, tenant_id, payment_id).await?;
                self.refresh_within(&mut tx, tenant_id, payment.customer_id)
                    .await?;
                Ok(payment)
            })
            .await;
        let payment = self.settle(tx, outcome).await?;

        self.refresh_after(tenant_id, payment.customer_id).await;
        Ok(payment)
    }

    /// Change a payment's date, reference or notes
    #[instrument(skip_all, fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn update_payment(
        &self,
        tenant_id: TenantId,
        payment_id: PaymentId,
        update: PaymentUpdate,
    ) -> BillingResult<Payment> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(payments::update_payment(&mut tx, tenant_id, payment_id, update))
            .await;
        self.settle(tx, outcome).await
    }

    // Inventory
    /// Manual stock movement for a tracked product
    #[instrument(skip_all, fields(tenant_id = %tenant_id, product_id = %product_id, delta = %adjustment.delta))]
    pub async fn adjust_stock(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        adjustment: StockAdjustment,
    ) -> BillingResult<Product> {
        adjustment.validate()?;

        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                let product = tx
                    .lock_product(tenant_id, product_id)
                    .await?
                    .ok_or_else(|| BillingError::not_found("Product", product_id))?;
                if !product.is_stock_tracked() {
                    return Err(BillingError::Validation(format!(
                        "Product '{}' does not track inventory",
                        product.name
                    )));
                }

                let (product, _) = inventory::apply_delta(
                    &mut tx,
                    tenant_id,
                    product_id,
                    &adjustment.delta,
                    adjustment.reason,
                    None,
                    adjustment.notes.clone(),
                )
                .await?;
                Ok(product)
            })
            .await;
        let product = self.settle(tx, outcome).await?;

        info!(stock = %product.stock_quantity, "Stock adjusted");
        Ok(product)
    }

    /// Inventory log for one product, oldest first
    pub async fn inventory_log(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> BillingResult<Vec<InventoryLogEntry>> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(tx.inventory_log(tenant_id, product_id))
            .await;
        self.release(tx, outcome).await
    }

    /// Replay a product's inventory log against its recorded stock
    #[instrument(skip(self))]
    pub async fn verify_stock_chain(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> BillingResult<StockChainReport> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(inventory::verify_stock_chain(&mut tx, tenant_id, product_id))
            .await;
        let report = self.release(tx, outcome).await?;

        if !report.is_consistent() {
            warn!(issues = ?report.issues, "Inventory chain drift detected");
        }
        Ok(report)
    }

    // Balances
    /// Cached outstanding balance of a customer
    pub async fn get_customer_balance(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> BillingResult<BigDecimal> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(async {
                tx.get_customer(tenant_id, customer_id)
                    .await?
                    .map(|customer| customer.current_balance)
                    .ok_or_else(|| BillingError::not_found("Customer", customer_id))
            })
            .await;
        self.release(tx, outcome).await
    }

    /// Rebuild a customer's cached balance from their invoices
    #[instrument(skip(self))]
    pub async fn recompute_customer_balance(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
    ) -> BillingResult<BigDecimal> {
        let deadline = self.deadline();
        let mut tx = deadline.run(self.store.begin()).await?;
        let outcome = deadline
            .run(BalanceReconciler::recompute(&mut tx, tenant_id, customer_id))
            .await;
        self.settle(tx, outcome).await
    }
}

async fn require_tenant<T: StoreTransaction>(tx: &mut T, tenant_id: TenantId) -> BillingResult<()> {
    tx.get_tenant(tenant_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| BillingError::not_found("Tenant", tenant_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::LineItemInput;
    use crate::utils::MemoryStore;

    async fn engine() -> (BillingEngine<MemoryStore>, TenantId, CustomerId) {
        let engine = BillingEngine::with_defaults(MemoryStore::new());
        let tenant = engine
            .register_tenant(Tenant::new("Acme".to_string(), "KA".to_string()))
            .await
            .unwrap();
        let customer = engine
            .register_customer(Customer::new(tenant.id, "Ravi".to_string(), BigDecimal::from(10)))
            .await
            .unwrap();
        (engine, tenant.id, customer.id)
    }

    #[tokio::test]
    async fn test_failed_operation_leaves_no_trace() {
        let (engine, tenant_id, customer_id) = engine().await;
        let missing = ProductId::new();
        let draft = DocumentDraft::for_customer(
            customer_id,
            vec![
                LineItemInput::custom("Setup", BigDecimal::from(1), BigDecimal::from(100)),
                LineItemInput::product(missing, BigDecimal::from(1)),
            ],
        );

        let result = engine
            .create_from_draft(DocumentType::Invoice, tenant_id, draft)
            .await;
        assert!(matches!(result, Err(BillingError::NotFound { .. })));

        let draft = DocumentDraft::for_customer(
            customer_id,
            vec![LineItemInput::custom("Setup", BigDecimal::from(1), BigDecimal::from(100))],
        );
        let invoice = engine
            .create_from_draft(DocumentType::Invoice, tenant_id, draft)
            .await
            .unwrap();
        assert!(invoice.number.ends_with("-0001"));
    }

    #[tokio::test]
    async fn test_balance_follows_sent_invoices() {
        let (engine, tenant_id, customer_id) = engine().await;
        let draft = DocumentDraft::for_customer(
            customer_id,
            vec![LineItemInput::custom("Setup", BigDecimal::from(1), BigDecimal::from(100))],
        );
        let invoice = engine
            .create_from_draft(DocumentType::Invoice, tenant_id, draft)
            .await
            .unwrap();
        assert_eq!(
            engine.get_customer_balance(tenant_id, customer_id).await.unwrap(),
            BigDecimal::from(10)
        );

        engine.mark_sent(tenant_id, invoice.id).await.unwrap();
        assert_eq!(
            engine.get_customer_balance(tenant_id, customer_id).await.unwrap(),
            BigDecimal::from(110)
        );
    }

    #[tokio::test]
    async fn test_in_transaction_refresh() {
        let config = EngineConfig {
            balance_refresh: BalanceRefresh::InTransaction,
            ..EngineConfig::default()
        };
        let engine = BillingEngine::new(MemoryStore::new(), config);
        let tenant = engine
            .register_tenant(Tenant::new("Acme".to_string(), "KA".to_string()))
            .await
            .unwrap();
        let customer = engine
            .register_customer(Customer::new(tenant.id, "Ravi".to_string(), BigDecimal::from(0)))
            .await
            .unwrap();

        let draft = DocumentDraft::for_customer(
            customer.id,
            vec![LineItemInput::custom("Setup", BigDecimal::from(2), BigDecimal::from(50))],
        )
        .with_status(DocumentStatus::Sent);
        engine
            .create_from_draft(DocumentType::Invoice, tenant.id, draft)
            .await
            .unwrap();

        assert_eq!(
            engine.get_customer_balance(tenant.id, customer.id).await.unwrap(),
            BigDecimal::from(100)
        );
    }

    #[tokio::test]
    async fn test_unknown_tenant_cannot_register_customers() {
        let engine = BillingEngine::with_defaults(MemoryStore::new());
        let result = engine
            .register_customer(Customer::new(TenantId::new(), "Ravi".to_string(), BigDecimal::from(0)))
            .await;
        assert!(matches!(result, Err(BillingError::NotFound { .. })));
    }
}
