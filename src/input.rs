//! Boundary input types
//!
//! Clients of different vintages send the same field under different names
//! (`rate`/`price`, `discountValue`/`discount`). The payload types accept all
//! of them; [`DocumentPayload::normalize`] resolves them once into a
//! [`DocumentDraft`], which is the only shape the document engine sees.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::tax::gst::{Discount, DiscountType};
use crate::types::*;

/// Who a document is issued to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustomerRef {
    Existing(CustomerId),
    WalkIn(WalkInCustomer),
}

/// Normalized line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub product_id: Option<ProductId>,
    /// Falls back to the product name
    pub name: Option<String>,
    pub description: Option<String>,
    pub hsn_code: Option<String>,
    pub sac_code: Option<String>,
    pub unit: Option<String>,
    pub quantity: BigDecimal,
    /// Falls back to the product's selling price
    pub rate: Option<BigDecimal>,
    pub discount: Discount,
    /// Overrides the product's tax rate
    pub tax_rate_id: Option<TaxRateId>,
}

impl LineItemInput {
    /// Line for a catalogue product at its own price and tax rate
    pub fn product(product_id: ProductId, quantity: BigDecimal) -> Self {
        Self {
            product_id: Some(product_id),
            name: None,
            description: None,
            hsn_code: None,
            sac_code: None,
            unit: None,
            quantity,
            rate: None,
            discount: Discount::none(),
            tax_rate_id: None,
        }
    }

    /// Free-text line without a product
    pub fn custom(name: impl Into<String>, quantity: BigDecimal, rate: BigDecimal) -> Self {
        Self {
            product_id: None,
            name: Some(name.into()),
            description: None,
            hsn_code: None,
            sac_code: None,
            unit: None,
            quantity,
            rate: Some(rate),
            discount: Discount::none(),
            tax_rate_id: None,
        }
    }

    pub fn with_rate(mut self, rate: BigDecimal) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_tax_rate(mut self, tax_rate_id: TaxRateId) -> Self {
        self.tax_rate_id = Some(tax_rate_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditNoteInput {
    pub reason: CreditNoteReason,
    pub original_invoice_id: Option<DocumentId>,
}

/// Normalized request to create a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub customer: CustomerRef,
    /// Defaults to the customer's state, then the tenant's
    pub place_of_supply: Option<String>,
    /// Defaults to the creation date
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub line_items: Vec<LineItemInput>,
    pub document_discount: Discount,
    pub shipping_charge: BigDecimal,
    pub adjustment_amount: BigDecimal,
    /// `Draft` or `Sent`; credit notes always start `Open`
    pub status: DocumentStatus,
    pub credit_note: Option<CreditNoteInput>,
    pub converted_from: Option<DocumentId>,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

impl DocumentDraft {
    pub fn new(customer: CustomerRef, line_items: Vec<LineItemInput>) -> Self {
        Self {
            customer,
            place_of_supply: None,
            issue_date: None,
            due_date: None,
            line_items,
            document_discount: Discount::none(),
            shipping_charge: BigDecimal::from(0),
            adjustment_amount: BigDecimal::from(0),
            status: DocumentStatus::Draft,
            credit_note: None,
            converted_from: None,
            notes: None,
            terms: None,
        }
    }

    pub fn for_customer(customer_id: CustomerId, line_items: Vec<LineItemInput>) -> Self {
        Self::new(CustomerRef::Existing(customer_id), line_items)
    }

    pub fn walk_in(walk_in: WalkInCustomer, line_items: Vec<LineItemInput>) -> Self {
        Self::new(CustomerRef::WalkIn(walk_in), line_items)
    }

    pub fn with_place_of_supply(mut self, state_code: impl Into<String>) -> Self {
        self.place_of_supply = Some(state_code.into());
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_credit_note(
        mut self,
        reason: CreditNoteReason,
        original_invoice_id: Option<DocumentId>,
    ) -> Self {
        self.credit_note = Some(CreditNoteInput {
            reason,
            original_invoice_id,
        });
        self
    }

    /// Rebuild the request a stored document was created from.
    ///
    /// Lines keep their snapshotted name, codes, rate and tax rate, so a
    /// re-run does not pick up catalogue changes made since.
    pub fn from_document(document: &Document) -> Self {
        let customer = match document.customer_id {
            Some(customer_id) => CustomerRef::Existing(customer_id),
            None => CustomerRef::WalkIn(document.walk_in.clone().unwrap_or_default()),
        };

        let line_items = document
            .line_items
            .iter()
            .map(|line| LineItemInput {
                product_id: line.product_id,
                name: Some(line.name.clone()),
                description: line.description.clone(),
                hsn_code: line.hsn_code.clone(),
                sac_code: line.sac_code.clone(),
                unit: line.unit.clone(),
                quantity: line.quantity.clone(),
                rate: Some(line.rate.clone()),
                discount: line.discount.clone(),
                tax_rate_id: line.tax_rate_id,
            })
            .collect();

        Self {
            customer,
            place_of_supply: document
                .place_of_supply_explicit
                .then(|| document.place_of_supply.clone()),
            issue_date: Some(document.issue_date),
            due_date: document.due_date,
            line_items,
            document_discount: document.document_discount.clone(),
            shipping_charge: document.totals.shipping_charge.clone(),
            adjustment_amount: document.totals.adjustment_amount.clone(),
            status: document.status,
            credit_note: document.credit_note.as_ref().map(|details| CreditNoteInput {
                reason: details.reason,
                original_invoice_id: details.original_invoice_id,
            }),
            converted_from: document.converted_from,
            notes: document.notes.clone(),
            terms: document.terms.clone(),
        }
    }
}

/// Pick one value out of two alias fields; both present must agree
fn resolve_alias<T: PartialEq + std::fmt::Display>(
    field: &str,
    alias: &str,
    primary: Option<T>,
    secondary: Option<T>,
) -> BillingResult<Option<T>> {
    match (primary, secondary) {
        (Some(a), Some(b)) if a != b => Err(BillingError::Validation(format!(
            "'{}' ({}) and '{}' ({}) disagree",
            field, a, alias, b
        ))),
        (Some(a), _) => Ok(Some(a)),
        (None, b) => Ok(b),
    }
}

fn resolve_discount(
    discount_type: Option<DiscountType>,
    discount_value: Option<BigDecimal>,
    discount: Option<BigDecimal>,
) -> BillingResult<Option<Discount>> {
    let value = resolve_alias("discountValue", "discount", discount_value, discount)?;
    Ok(match (discount_type, value) {
        (_, None) => None,
        (discount_type, Some(value)) => Some(Discount {
            discount_type: discount_type.unwrap_or(DiscountType::Fixed),
            value,
        }),
    })
}

/// Line item as sent by clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemPayload {
    pub product_id: Option<ProductId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub hsn_code: Option<String>,
    pub sac_code: Option<String>,
    pub unit: Option<String>,
    pub quantity: BigDecimal,
    pub rate: Option<BigDecimal>,
    pub price: Option<BigDecimal>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<BigDecimal>,
    pub discount: Option<BigDecimal>,
    pub tax_rate_id: Option<TaxRateId>,
}

impl LineItemPayload {
    pub fn normalize(self) -> BillingResult<LineItemInput> {
        if self.quantity <= BigDecimal::from(0) {
            return Err(BillingError::Validation(format!(
                "Line quantity must be positive: {}",
                self.quantity
            )));
        }
        if self.product_id.is_none() && self.name.as_deref().map_or(true, str::is_empty) {
            return Err(BillingError::Validation(
                "Line items without a product need a name".to_string(),
            ));
        }

        let rate = resolve_alias("rate", "price", self.rate, self.price)?;
        let discount = resolve_discount(self.discount_type, self.discount_value, self.discount)?;

        Ok(LineItemInput {
            product_id: self.product_id,
            name: self.name,
            description: self.description,
            hsn_code: self.hsn_code,
            sac_code: self.sac_code,
            unit: self.unit,
            quantity: self.quantity,
            rate,
            discount: discount.unwrap_or_default(),
            tax_rate_id: self.tax_rate_id,
        })
    }
}

/// Document creation request as sent by clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub customer_id: Option<CustomerId>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub place_of_supply: Option<String>,
    #[serde(alias = "invoiceDate", alias = "date")]
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[serde(default, alias = "items")]
    pub line_items: Vec<LineItemPayload>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<BigDecimal>,
    pub discount: Option<BigDecimal>,
    pub shipping_charge: Option<BigDecimal>,
    #[serde(alias = "adjustment")]
    pub adjustment_amount: Option<BigDecimal>,
    pub status: Option<DocumentStatus>,
    #[serde(alias = "creditNoteReason")]
    pub reason: Option<CreditNoteReason>,
    pub original_invoice_id: Option<DocumentId>,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

impl DocumentPayload {
    /// Resolve aliases and defaults for a document of `document_type`
    pub fn normalize(self, document_type: DocumentType) -> BillingResult<DocumentDraft> {
        if self.line_items.is_empty() {
            return Err(BillingError::Validation(
                "A document needs at least one line item".to_string(),
            ));
        }

        let status = self.status.unwrap_or(DocumentStatus::Draft);
        if !matches!(status, DocumentStatus::Draft | DocumentStatus::Sent) {
            return Err(BillingError::Validation(format!(
                "Documents are created as DRAFT or SENT, not {}",
                status
            )));
        }

        let customer = match self.customer_id {
            Some(customer_id) => CustomerRef::Existing(customer_id),
            None => CustomerRef::WalkIn(WalkInCustomer {
                name: self.customer_name,
                phone: self.customer_phone,
                email: self.customer_email,
            }),
        };

        let line_items = self
            .line_items
            .into_iter()
            .map(LineItemPayload::normalize)
            .collect::<BillingResult<Vec<_>>>()?;

        let document_discount =
            resolve_discount(self.discount_type, self.discount_value, self.discount)?
                .unwrap_or_default();

        let credit_note = match document_type {
            DocumentType::CreditNote => Some(CreditNoteInput {
                reason: self.reason.unwrap_or(CreditNoteReason::Other),
                original_invoice_id: self.original_invoice_id,
            }),
            _ => None,
        };

        Ok(DocumentDraft {
            customer,
            place_of_supply: self.place_of_supply,
            issue_date: self.issue_date,
            due_date: self.due_date,
            line_items,
            document_discount,
            shipping_charge: self.shipping_charge.unwrap_or_else(|| BigDecimal::from(0)),
            adjustment_amount: self.adjustment_amount.unwrap_or_else(|| BigDecimal::from(0)),
            status,
            credit_note,
            converted_from: None,
            notes: self.notes,
            terms: self.terms,
        })
    }
}

/// Changes to a draft document; absent fields keep their stored value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    pub customer_id: Option<CustomerId>,
    /// Detach the customer record and bill these details instead
    pub walk_in: Option<WalkInCustomer>,
    pub place_of_supply: Option<String>,
    #[serde(alias = "invoiceDate", alias = "date")]
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[serde(alias = "items")]
    pub line_items: Option<Vec<LineItemPayload>>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<BigDecimal>,
    pub discount: Option<BigDecimal>,
    pub shipping_charge: Option<BigDecimal>,
    #[serde(alias = "adjustment")]
    pub adjustment_amount: Option<BigDecimal>,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

impl DocumentPatch {
    /// Overlay the patch on a draft rebuilt from the stored document
    pub fn merge_into(self, mut draft: DocumentDraft) -> BillingResult<DocumentDraft> {
        match (self.customer_id, self.walk_in) {
            (Some(_), Some(_)) => {
                return Err(BillingError::Validation(
                    "Give either a customer or walk-in details, not both".to_string(),
                ))
            }
            (Some(customer_id), None) => draft.customer = CustomerRef::Existing(customer_id),
            (None, Some(walk_in)) => draft.customer = CustomerRef::WalkIn(walk_in),
            (None, None) => {}
        }
        if let Some(place_of_supply) = self.place_of_supply {
            draft.place_of_supply = Some(place_of_supply);
        }
        if let Some(issue_date) = self.issue_date {
            draft.issue_date = Some(issue_date);
        }
        if let Some(due_date) = self.due_date {
            draft.due_date = Some(due_date);
        }
        if let Some(line_items) = self.line_items {
            if line_items.is_empty() {
                return Err(BillingError::Validation(
                    "A document needs at least one line item".to_string(),
                ));
            }
            draft.line_items = line_items
                .into_iter()
                .map(LineItemPayload::normalize)
                .collect::<BillingResult<Vec<_>>>()?;
        }
        if let Some(discount) =
            resolve_discount(self.discount_type, self.discount_value, self.discount)?
        {
            draft.document_discount = discount;
        }
        if let Some(shipping_charge) = self.shipping_charge {
            draft.shipping_charge = shipping_charge;
        }
        if let Some(adjustment_amount) = self.adjustment_amount {
            draft.adjustment_amount = adjustment_amount;
        }
        if self.notes.is_some() {
            draft.notes = self.notes;
        }
        if self.terms.is_some() {
            draft.terms = self.terms;
        }
        Ok(draft)
    }
}

/// Optional details recorded with a payment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMeta {
    /// Defaults to the recording date
    pub payment_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAllocation {
    pub invoice_id: DocumentId,
    pub amount: BigDecimal,
}

/// One customer payment spread over several invoices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPaymentRequest {
    pub total_amount: BigDecimal,
    pub mode: PaymentMode,
    pub allocations: Vec<BulkAllocation>,
    #[serde(flatten)]
    pub meta: PaymentMeta,
}

/// The only payment fields that can change after recording
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdate {
    pub payment_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}
