//! Document engine: invoices, estimates and credit notes
//!
//! Every function here runs inside a transaction owned by the caller. Tax
//! calculation, number allocation, the document write and the stock
//! movements it causes either all land on commit or none of them do.

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::input::{CustomerRef, DocumentDraft, DocumentPatch, LineItemInput};
use crate::ledger::{inventory, sequence};
use crate::tax::gst::{DocumentTotals, LineCalculation};
use crate::traits::StoreTransaction;
use crate::types::*;
use crate::utils::{same_state, validate_non_negative};

/// Identity carried over when a draft is re-created by an update
#[derive(Debug, Clone)]
pub struct DocumentIdentity {
    pub id: DocumentId,
    pub number: String,
    pub financial_year: i32,
    pub created_at: NaiveDateTime,
}

impl DocumentIdentity {
    fn of(document: &Document) -> Self {
        Self {
            id: document.id,
            number: document.number.clone(),
            financial_year: document.financial_year,
            created_at: document.created_at,
        }
    }
}

async fn load<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    document_id: DocumentId,
) -> BillingResult<Document> {
    tx.get_document(tenant_id, document_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Document", document_id))
}

/// Load a document and check its type
pub async fn load_typed<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    document_id: DocumentId,
    expected: DocumentType,
) -> BillingResult<Document> {
    let document = load(tx, tenant_id, document_id).await?;
    if document.document_type != expected {
        return Err(BillingError::InvalidState(format!(
            "{} {} is not an {}",
            document.document_type, document.number, expected
        )));
    }
    Ok(document)
}

/// Whether a line of this document moves tracked stock
fn moves_stock(
    document_type: DocumentType,
    credit_note: Option<&crate::input::CreditNoteInput>,
    product: &Product,
) -> bool {
    if !product.is_stock_tracked() {
        return false;
    }
    match document_type {
        DocumentType::Invoice => true,
        DocumentType::CreditNote => {
            credit_note.is_some_and(|details| details.reason == CreditNoteReason::Return)
        }
        DocumentType::Estimate => false,
    }
}

/// Create and persist a document.
///
/// With `identity` set the document keeps an existing id and number instead
/// of allocating a new one.
pub async fn create<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    document_type: DocumentType,
    draft: DocumentDraft,
    identity: Option<DocumentIdentity>,
    today: NaiveDate,
) -> BillingResult<Document> {
    if draft.line_items.is_empty() {
        return Err(BillingError::Validation(
            "A document needs at least one line item".to_string(),
        ));
    }
    if !matches!(draft.status, DocumentStatus::Draft | DocumentStatus::Sent) {
        return Err(BillingError::Validation(format!(
            "Documents are created as DRAFT or SENT, not {}",
            draft.status
        )));
    }
    validate_non_negative("Shipping charge", &draft.shipping_charge)?;

    let tenant = tx
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Tenant", tenant_id))?;

    let (customer, walk_in) = match &draft.customer {
        CustomerRef::Existing(customer_id) => {
            let customer = tx
                .get_customer(tenant_id, *customer_id)
                .await?
                .ok_or_else(|| BillingError::not_found("Customer", customer_id))?;
            (Some(customer), None)
        }
        CustomerRef::WalkIn(walk_in) => (None, Some(walk_in.clone())),
    };

    let place_of_supply_explicit = draft.place_of_supply.is_some();
    let place_of_supply = draft
        .place_of_supply
        .clone()
        .or_else(|| customer.as_ref().and_then(|c| c.state_code.clone()))
        .unwrap_or_else(|| tenant.state_code.clone());
    let is_inter_state = !same_state(&place_of_supply, &tenant.state_code);

    if let Some(details) = &draft.credit_note {
        if let Some(invoice_id) = details.original_invoice_id {
            let invoice = load_typed(tx, tenant_id, invoice_id, DocumentType::Invoice).await?;
            if invoice.customer_id != customer.as_ref().map(|c| c.id) {
                return Err(BillingError::Validation(format!(
                    "Invoice {} belongs to a different customer",
                    invoice.number
                )));
            }
        }
    }

    // Bulk-load everything the lines refer to.
    let mut product_ids: Vec<ProductId> =
        draft.line_items.iter().filter_map(|line| line.product_id).collect();
    product_ids.sort();
    product_ids.dedup();

    let products: HashMap<ProductId, Product> = tx
        .get_products(tenant_id, &product_ids)
        .await?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();

    for product_id in &product_ids {
        match products.get(product_id) {
            None => return Err(BillingError::not_found("Product", product_id)),
            Some(product) if !product.is_active => {
                return Err(BillingError::Validation(format!(
                    "Product '{}' is inactive",
                    product.name
                )))
            }
            Some(_) => {}
        }
    }

    let line_tax_rate = |line: &LineItemInput| {
        line.tax_rate_id.or_else(|| {
            line.product_id
                .and_then(|id| products.get(&id))
                .and_then(|product| product.tax_rate_id)
        })
    };

    let mut tax_rate_ids: Vec<TaxRateId> = draft.line_items.iter().filter_map(line_tax_rate).collect();
    tax_rate_ids.sort();
    tax_rate_ids.dedup();

    let tax_rates: HashMap<TaxRateId, TaxRate> = tx
        .get_tax_rates(tenant_id, &tax_rate_ids)
        .await?
        .into_iter()
        .map(|rate| (rate.id, rate))
        .collect();

    if let Some(missing) = tax_rate_ids.iter().find(|id| !tax_rates.contains_key(id)) {
        return Err(BillingError::not_found("Tax rate", missing));
    }

    // Stock check before any write. Tracked rows are locked in id order.
    if document_type == DocumentType::Invoice {
        let mut requested: BTreeMap<ProductId, BigDecimal> = BTreeMap::new();
        for line in &draft.line_items {
            if let Some(product) = line.product_id.and_then(|id| products.get(&id)) {
                if product.is_stock_tracked() {
                    *requested.entry(product.id).or_default() += &line.quantity;
                }
            }
        }

        for (product_id, quantity) in &requested {
            let product = tx
                .lock_product(tenant_id, *product_id)
                .await?
                .ok_or_else(|| BillingError::not_found("Product", product_id))?;
            if product.stock_quantity < *quantity {
                return Err(BillingError::InsufficientStock {
                    product: product.name,
                    available: product.stock_quantity,
                    requested: quantity.clone(),
                });
            }
        }
    }

    let identity = match identity {
        Some(identity) => identity,
        None => {
            let allocated =
                sequence::allocate(tx, tenant_id, document_type.into(), today).await?;
            DocumentIdentity {
                id: DocumentId::new(),
                number: allocated.number,
                financial_year: allocated.financial_year,
                created_at: chrono::Utc::now().naive_utc(),
            }
        }
    };

    let mut line_items = Vec::with_capacity(draft.line_items.len());
    for (index, line) in draft.line_items.iter().enumerate() {
        let product = line.product_id.and_then(|id| products.get(&id));
        let tax_rate_id = line_tax_rate(line);
        let tax = tax_rate_id
            .and_then(|id| tax_rates.get(&id))
            .map(|rate| rate.descriptor.clone());

        let rate = line
            .rate
            .clone()
            .or_else(|| product.map(|p| p.selling_price.clone()))
            .ok_or_else(|| {
                BillingError::Validation(format!("Line {} has no rate", index + 1))
            })?;
        let name = line
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| product.map(|p| p.name.clone()))
            .ok_or_else(|| {
                BillingError::Validation(format!("Line {} has no name", index + 1))
            })?;

        let amounts = LineCalculation::calculate(
            &line.quantity,
            &rate,
            &line.discount,
            tax.as_ref(),
            is_inter_state,
        )?;

        line_items.push(LineItem {
            id: LineItemId::new(),
            document_id: identity.id,
            position: index as u32 + 1,
            product_id: line.product_id,
            name,
            description: line.description.clone(),
            hsn_code: line.hsn_code.clone().or_else(|| product.and_then(|p| p.hsn_code.clone())),
            sac_code: line.sac_code.clone().or_else(|| product.and_then(|p| p.sac_code.clone())),
            unit: line.unit.clone().or_else(|| product.and_then(|p| p.unit.clone())),
            quantity: line.quantity.clone(),
            rate,
            discount: line.discount.clone(),
            tax_rate_id,
            tax,
            stock_tracked: product
                .is_some_and(|p| moves_stock(document_type, draft.credit_note.as_ref(), p)),
            amounts,
        });
    }

    let totals = DocumentTotals::calculate(
        line_items.iter().map(|line| &line.amounts),
        &draft.document_discount,
        &draft.shipping_charge,
        &draft.adjustment_amount,
    )?;

    let (status, balance_due, credit_note) = match document_type {
        DocumentType::Invoice => (draft.status, totals.total_amount.clone(), None),
        DocumentType::Estimate => (draft.status, BigDecimal::from(0), None),
        DocumentType::CreditNote => {
            let details = draft.credit_note.clone().unwrap_or(crate::input::CreditNoteInput {
                reason: CreditNoteReason::Other,
                original_invoice_id: None,
            });
            (
                DocumentStatus::Open,
                BigDecimal::from(0),
                Some(CreditNoteDetails {
                    reason: details.reason,
                    original_invoice_id: details.original_invoice_id,
                    balance_amount: totals.total_amount.clone(),
                }),
            )
        }
    };

    let document = Document {
        id: identity.id,
        tenant_id,
        document_type,
        number: identity.number,
        financial_year: identity.financial_year,
        customer_id: customer.as_ref().map(|c| c.id),
        walk_in,
        place_of_supply,
        place_of_supply_explicit,
        is_inter_state,
        issue_date: draft.issue_date.unwrap_or(today),
        due_date: draft.due_date,
        line_items,
        document_discount: draft.document_discount,
        totals,
        balance_due,
        status,
        payment_status: PaymentStatus::Unpaid,
        credit_note,
        converted_from: draft.converted_from,
        notes: draft.notes,
        terms: draft.terms,
        created_at: identity.created_at,
        updated_at: chrono::Utc::now().naive_utc(),
    };

    tx.save_document(&document).await?;

    let (direction, transaction_type) = match document_type {
        DocumentType::CreditNote => (BigDecimal::from(1), InventoryTransactionType::Return),
        _ => (BigDecimal::from(-1), InventoryTransactionType::Sale),
    };
    for line in document.line_items.iter().filter(|line| line.stock_tracked) {
        if let Some(product_id) = line.product_id {
            inventory::apply_delta(
                tx,
                tenant_id,
                product_id,
                &(&line.quantity * &direction),
                transaction_type,
                Some(document.reference()),
                None,
            )
            .await?;
        }
    }

    info!(
        document_id = %document.id,
        number = %document.number,
        document_type = %document.document_type,
        total = %document.totals.total_amount,
        "Document created"
    );

    Ok(document)
}

/// Undo the stock movements a document made, logging them as adjustments
async fn restore_stock<T: StoreTransaction>(
    tx: &mut T,
    document: &Document,
    note: &str,
) -> BillingResult<()> {
    let direction = match document.document_type {
        DocumentType::CreditNote => BigDecimal::from(-1),
        _ => BigDecimal::from(1),
    };

    for line in document.line_items.iter().filter(|line| line.stock_tracked) {
        if let Some(product_id) = line.product_id {
            inventory::apply_delta(
                tx,
                document.tenant_id,
                product_id,
                &(&line.quantity * &direction),
                InventoryTransactionType::Adjustment,
                Some(document.reference()),
                Some(format!("{} {}", note, document.number)),
            )
            .await?;
        }
    }
    Ok(())
}

/// Delete a draft, giving back any stock it took
pub async fn delete_draft<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    document_id: DocumentId,
) -> BillingResult<Document> {
    let document = load(tx, tenant_id, document_id).await?;
    if document.status != DocumentStatus::Draft {
        return Err(BillingError::InvalidState(format!(
            "Only draft documents can be deleted; {} is {}",
            document.number, document.status
        )));
    }

    restore_stock(tx, &document, "Deleted draft").await?;
    tx.delete_document(tenant_id, document_id).await?;

    info!(document_id = %document.id, number = %document.number, "Draft deleted");
    Ok(document)
}

/// Replace a draft's content, keeping its id and number.
///
/// The stored document is restocked and deleted, then the merged request
/// goes through [`create`] again.
pub async fn update<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    document_id: DocumentId,
    patch: DocumentPatch,
    today: NaiveDate,
) -> BillingResult<Document> {
    let existing = load(tx, tenant_id, document_id).await?;
    if existing.status != DocumentStatus::Draft {
        return Err(BillingError::InvalidState(format!(
            "Only draft documents can be edited; {} is {}",
            existing.number, existing.status
        )));
    }

    let draft = patch.merge_into(DocumentDraft::from_document(&existing))?;

    restore_stock(tx, &existing, "Edited draft").await?;
    tx.delete_document(tenant_id, document_id).await?;

    debug!(document_id = %document_id, "Re-creating edited draft");
    create(
        tx,
        tenant_id,
        existing.document_type,
        draft,
        Some(DocumentIdentity::of(&existing)),
        today,
    )
    .await
}

/// Void a document. Invoices must be unpaid; credit notes unapplied.
pub async fn void<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    document_id: DocumentId,
) -> BillingResult<Document> {
    let mut document = load(tx, tenant_id, document_id).await?;

    match (document.document_type, document.status) {
        (_, DocumentStatus::Void) => {
            return Err(BillingError::InvalidState(format!(
                "{} is already void",
                document.number
            )))
        }
        (DocumentType::Estimate, DocumentStatus::Converted) => {
            return Err(BillingError::InvalidState(format!(
                "Estimate {} has been converted",
                document.number
            )))
        }
        _ => {}
    }

    match document.document_type {
        DocumentType::Invoice => {
            let payments = tx.invoice_payments(tenant_id, document_id).await?;
            if document.payment_status != PaymentStatus::Unpaid || !payments.is_empty() {
                return Err(BillingError::InvalidState(format!(
                    "Invoice {} has payments recorded and cannot be voided",
                    document.number
                )));
            }
            document.balance_due = BigDecimal::from(0);
        }
        DocumentType::CreditNote => {
            if let Some(details) = document.credit_note.as_mut() {
                if details.balance_amount != document.totals.total_amount {
                    return Err(BillingError::InvalidState(format!(
                        "Credit note {} has been applied and cannot be voided",
                        document.number
                    )));
                }
                details.balance_amount = BigDecimal::from(0);
            }
        }
        DocumentType::Estimate => {}
    }

    restore_stock(tx, &document, "Voided").await?;

    document.status = DocumentStatus::Void;
    document.updated_at = chrono::Utc::now().naive_utc();
    tx.save_document(&document).await?;

    info!(document_id = %document.id, number = %document.number, "Document voided");
    Ok(document)
}

/// Manual status change validated against the per-type state machine
pub async fn transition<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    document_id: DocumentId,
    to: DocumentStatus,
) -> BillingResult<Document> {
    let mut document = load(tx, tenant_id, document_id).await?;

    if !document.status.can_transition(document.document_type, to) {
        return Err(BillingError::InvalidState(format!(
            "{} {} cannot move from {} to {}",
            document.document_type, document.number, document.status, to
        )));
    }

    document.status = to;
    document.updated_at = chrono::Utc::now().naive_utc();
    tx.save_document(&document).await?;

    debug!(document_id = %document.id, status = %to, "Document status changed");
    Ok(document)
}

/// Turn an estimate into a draft invoice through the normal creation path
pub async fn convert_estimate<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    estimate_id: DocumentId,
    today: NaiveDate,
) -> BillingResult<(Document, Document)> {
    let mut estimate = load_typed(tx, tenant_id, estimate_id, DocumentType::Estimate).await?;

    if matches!(
        estimate.status,
        DocumentStatus::Declined | DocumentStatus::Converted | DocumentStatus::Void
    ) {
        return Err(BillingError::InvalidState(format!(
            "Estimate {} is {} and cannot be converted",
            estimate.number, estimate.status
        )));
    }

    let mut draft = DocumentDraft::from_document(&estimate);
    draft.status = DocumentStatus::Draft;
    draft.issue_date = None;
    draft.due_date = None;
    draft.converted_from = Some(estimate.id);

    let invoice = create(tx, tenant_id, DocumentType::Invoice, draft, None, today).await?;

    estimate.status = DocumentStatus::Converted;
    estimate.updated_at = chrono::Utc::now().naive_utc();
    tx.save_document(&estimate).await?;

    info!(
        estimate_id = %estimate.id,
        invoice_id = %invoice.id,
        number = %invoice.number,
        "Estimate converted"
    );
    Ok((estimate, invoice))
}
