//! Payment and credit allocation against invoices

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::input::{BulkPaymentRequest, PaymentMeta, PaymentUpdate};
use crate::ledger::documents::load_typed;
use crate::ledger::sequence;
use crate::tax::gst::round_money;
use crate::traits::StoreTransaction;
use crate::types::*;
use crate::utils::validate_positive_amount;

/// Check that `amount` can be paid against `invoice` right now
fn check_payable(invoice: &Document, amount: &BigDecimal) -> BillingResult<()> {
    match (invoice.status, invoice.payment_status) {
        (DocumentStatus::Void, _) => Err(BillingError::InvalidState(format!(
            "Invoice {} is void",
            invoice.number
        ))),
        (_, PaymentStatus::Paid) => Err(BillingError::InvalidState(format!(
            "Invoice {} is already paid",
            invoice.number
        ))),
        _ if *amount > invoice.balance_due => Err(BillingError::InvalidAmount(format!(
            "{} exceeds the balance due on {} ({})",
            amount, invoice.number, invoice.balance_due
        ))),
        _ => Ok(()),
    }
}

/// Take `amount` off the invoice balance and re-derive its payment status
fn settle(invoice: &mut Document, amount: &BigDecimal) {
    invoice.balance_due = &invoice.balance_due - amount;
    invoice.payment_status = PaymentStatus::derive(&invoice.balance_due, &invoice.totals.total_amount);
    if invoice.status == DocumentStatus::Draft {
        invoice.status = DocumentStatus::Sent;
    }
    invoice.updated_at = chrono::Utc::now().naive_utc();
}

/// Put `amount` back on the invoice balance
fn unsettle(invoice: &mut Document, amount: &BigDecimal) {
    invoice.balance_due = &invoice.balance_due + amount;
    invoice.payment_status = PaymentStatus::derive(&invoice.balance_due, &invoice.totals.total_amount);
    invoice.updated_at = chrono::Utc::now().naive_utc();
}

#[allow(clippy::too_many_arguments)]
async fn new_payment<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    customer_id: Option<CustomerId>,
    invoice_id: Option<DocumentId>,
    amount: BigDecimal,
    mode: PaymentMode,
    meta: &PaymentMeta,
    today: NaiveDate,
) -> BillingResult<Payment> {
    let allocated = sequence::allocate(tx, tenant_id, SequenceKind::Payment, today).await?;
    let now = chrono::Utc::now().naive_utc();

    let payment = Payment {
        id: PaymentId::new(),
        tenant_id,
        customer_id,
        invoice_id,
        number: allocated.number,
        financial_year: allocated.financial_year,
        amount,
        mode,
        payment_date: meta.payment_date.unwrap_or(today),
        reference: meta.reference.clone(),
        notes: meta.notes.clone(),
        parent_payment_id: None,
        credit_note_id: None,
        created_at: now,
        updated_at: now,
    };
    tx.save_payment(&payment).await?;
    Ok(payment)
}

/// Record a payment against one invoice
pub async fn record_payment<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    invoice_id: DocumentId,
    amount: &BigDecimal,
    mode: PaymentMode,
    meta: &PaymentMeta,
    today: NaiveDate,
) -> BillingResult<Payment> {
    let amount = round_money(amount);
    validate_positive_amount(&amount)?;

    let mut invoice = load_typed(tx, tenant_id, invoice_id, DocumentType::Invoice).await?;
    check_payable(&invoice, &amount)?;

    let payment = new_payment(
        tx,
        tenant_id,
        invoice.customer_id,
        Some(invoice.id),
        amount.clone(),
        mode,
        meta,
        today,
    )
    .await?;

    settle(&mut invoice, &amount);
    tx.save_document(&invoice).await?;

    info!(
        payment_id = %payment.id,
        invoice = %invoice.number,
        amount = %amount,
        balance_due = %invoice.balance_due,
        "Payment recorded"
    );
    Ok(payment)
}

/// Record one customer payment split across several invoices.
///
/// Returns the umbrella payment; each allocation is stored as a child
/// payment pointing at it through `parent_payment_id`.
pub async fn record_bulk_payment<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    customer_id: CustomerId,
    request: &BulkPaymentRequest,
    today: NaiveDate,
) -> BillingResult<Payment> {
    if request.allocations.is_empty() {
        return Err(BillingError::Validation(
            "A bulk payment needs at least one allocation".to_string(),
        ));
    }
    let total = round_money(&request.total_amount);
    validate_positive_amount(&total)?;

    let mut seen = HashSet::new();
    for allocation in &request.allocations {
        validate_positive_amount(&round_money(&allocation.amount))?;
        if !seen.insert(allocation.invoice_id) {
            return Err(BillingError::Validation(format!(
                "Invoice {} appears more than once",
                allocation.invoice_id
            )));
        }
    }

    let allocated: BigDecimal = request
        .allocations
        .iter()
        .map(|allocation| round_money(&allocation.amount))
        .sum();
    if allocated != total {
        return Err(BillingError::InvalidAmount(format!(
            "Allocations add up to {} but the payment is {}",
            allocated, total
        )));
    }

    tx.get_customer(tenant_id, customer_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Customer", customer_id))?;

    // Validate every invoice before writing anything.
    let mut invoices = Vec::with_capacity(request.allocations.len());
    for allocation in &request.allocations {
        let amount = round_money(&allocation.amount);
        let invoice =
            load_typed(tx, tenant_id, allocation.invoice_id, DocumentType::Invoice).await?;
        if invoice.customer_id != Some(customer_id) {
            return Err(BillingError::Validation(format!(
                "Invoice {} belongs to a different customer",
                invoice.number
            )));
        }
        check_payable(&invoice, &amount)?;
        invoices.push((invoice, amount));
    }

    let umbrella = new_payment(
        tx,
        tenant_id,
        Some(customer_id),
        None,
        total,
        request.mode,
        &request.meta,
        today,
    )
    .await?;

    for (mut invoice, amount) in invoices {
        let mut child = new_payment(
            tx,
            tenant_id,
            Some(customer_id),
            Some(invoice.id),
            amount.clone(),
            request.mode,
            &request.meta,
            today,
        )
        .await?;
        child.parent_payment_id = Some(umbrella.id);
        tx.save_payment(&child).await?;

        settle(&mut invoice, &amount);
        tx.save_document(&invoice).await?;
        debug!(
            parent = %umbrella.number,
            invoice = %invoice.number,
            amount = %amount,
            "Bulk allocation applied"
        );
    }

    info!(
        payment_id = %umbrella.id,
        number = %umbrella.number,
        allocations = request.allocations.len(),
        "Bulk payment recorded"
    );
    Ok(umbrella)
}

/// Apply an open credit note against an invoice of the same customer.
///
/// Without an explicit amount the smaller of the two outstanding balances is
/// applied. The invoice side is recorded as a `CreditNote`-mode payment.
pub async fn apply_credit_note<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    credit_note_id: DocumentId,
    invoice_id: DocumentId,
    amount: Option<&BigDecimal>,
    today: NaiveDate,
) -> BillingResult<Payment> {
    let mut credit_note =
        load_typed(tx, tenant_id, credit_note_id, DocumentType::CreditNote).await?;
    if credit_note.status != DocumentStatus::Open {
        return Err(BillingError::InvalidState(format!(
            "Credit note {} is {}, not OPEN",
            credit_note.number, credit_note.status
        )));
    }

    let mut invoice = load_typed(tx, tenant_id, invoice_id, DocumentType::Invoice).await?;
    if credit_note.customer_id.is_none() || credit_note.customer_id != invoice.customer_id {
        return Err(BillingError::Validation(format!(
            "Credit note {} and invoice {} belong to different customers",
            credit_note.number, invoice.number
        )));
    }

    let available = credit_note
        .credit_note
        .as_ref()
        .map(|details| details.balance_amount.clone())
        .unwrap_or_default();

    let amount = match amount {
        Some(amount) => {
            let amount = round_money(amount);
            validate_positive_amount(&amount)?;
            amount
        }
        None => available.clone().min(invoice.balance_due.clone()),
    };

    if amount <= BigDecimal::from(0) {
        return Err(BillingError::InvalidAmount(
            "Nothing left to apply".to_string(),
        ));
    }
    if amount > available {
        return Err(BillingError::InvalidAmount(format!(
            "{} exceeds the credit note balance ({})",
            amount, available
        )));
    }
    check_payable(&invoice, &amount)?;

    if let Some(details) = credit_note.credit_note.as_mut() {
        details.balance_amount = &details.balance_amount - &amount;
        if details.balance_amount == BigDecimal::from(0) {
            credit_note.status = DocumentStatus::Closed;
        }
    }
    credit_note.updated_at = chrono::Utc::now().naive_utc();
    tx.save_document(&credit_note).await?;

    let meta = PaymentMeta {
        payment_date: None,
        reference: Some(credit_note.number.clone()),
        notes: None,
    };
    let mut payment = new_payment(
        tx,
        tenant_id,
        invoice.customer_id,
        Some(invoice.id),
        amount.clone(),
        PaymentMode::CreditNote,
        &meta,
        today,
    )
    .await?;
    payment.credit_note_id = Some(credit_note.id);
    tx.save_payment(&payment).await?;

    settle(&mut invoice, &amount);
    tx.save_document(&invoice).await?;

    info!(
        credit_note = %credit_note.number,
        invoice = %invoice.number,
        amount = %amount,
        "Credit note applied"
    );
    Ok(payment)
}

/// Undo one payment's effect on its invoice and credit note, then delete it
async fn reverse<T: StoreTransaction>(tx: &mut T, payment: &Payment) -> BillingResult<()> {
    if let Some(invoice_id) = payment.invoice_id {
        let mut invoice =
            load_typed(tx, payment.tenant_id, invoice_id, DocumentType::Invoice).await?;
        unsettle(&mut invoice, &payment.amount);
        tx.save_document(&invoice).await?;
    }

    if let Some(credit_note_id) = payment.credit_note_id {
        let mut credit_note =
            load_typed(tx, payment.tenant_id, credit_note_id, DocumentType::CreditNote).await?;
        if let Some(details) = credit_note.credit_note.as_mut() {
            details.balance_amount = &details.balance_amount + &payment.amount;
        }
        if credit_note.status == DocumentStatus::Closed {
            credit_note.status = DocumentStatus::Open;
        }
        credit_note.updated_at = chrono::Utc::now().naive_utc();
        tx.save_document(&credit_note).await?;
    }

    tx.delete_payment(payment.tenant_id, payment.id).await
}

/// Delete a payment and reverse everything it did.
///
/// Deleting a bulk umbrella removes its allocations too; an allocation cannot
/// be deleted on its own.
pub async fn delete_payment<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    payment_id: PaymentId,
) -> BillingResult<Payment> {
    let payment = tx
        .get_payment(tenant_id, payment_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Payment", payment_id))?;

    if payment.parent_payment_id.is_some() {
        return Err(BillingError::InvalidState(format!(
            "Payment {} is part of a bulk payment; delete the bulk payment instead",
            payment.number
        )));
    }

    for child in tx.child_payments(tenant_id, payment_id).await? {
        reverse(tx, &child).await?;
    }
    reverse(tx, &payment).await?;

    info!(payment_id = %payment.id, number = %payment.number, "Payment deleted");
    Ok(payment)
}

/// Change the editable details of a payment
pub async fn update_payment<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    payment_id: PaymentId,
    update: PaymentUpdate,
) -> BillingResult<Payment> {
    let mut payment = tx
        .get_payment(tenant_id, payment_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Payment", payment_id))?;

    if let Some(payment_date) = update.payment_date {
        payment.payment_date = payment_date;
    }
    if update.reference.is_some() {
        payment.reference = update.reference;
    }
    if update.notes.is_some() {
        payment.notes = update.notes;
    }
    payment.updated_at = chrono::Utc::now().naive_utc();

    tx.save_payment(&payment).await?;
    Ok(payment)
}
