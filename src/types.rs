//! Core types and data structures for the billing engine

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::tax::gst::{Discount, DocumentTotals, LineCalculation, TaxDescriptor};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_type!(
    /// Tenant (organization) identifier; every other record is scoped by it
    TenantId
);
id_type!(CustomerId);
id_type!(ProductId);
id_type!(TaxRateId);
id_type!(DocumentId);
id_type!(LineItemId);
id_type!(PaymentId);
id_type!(InventoryLogId);

/// Kinds of financial documents produced by the document engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Invoice,
    Estimate,
    CreditNote,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Estimate => "estimate",
            DocumentType::CreditNote => "credit note",
        };
        f.write_str(label)
    }
}

/// Independent number series kept per tenant and financial year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequenceKind {
    Invoice,
    Estimate,
    CreditNote,
    Payment,
}

impl SequenceKind {
    /// Prefix used when the tenant has not configured one
    pub fn default_prefix(&self) -> &'static str {
        match self {
            SequenceKind::Invoice => "INV",
            SequenceKind::Estimate => "EST",
            SequenceKind::CreditNote => "CN",
            SequenceKind::Payment => "PAY",
        }
    }
}

impl From<DocumentType> for SequenceKind {
    fn from(document_type: DocumentType) -> Self {
        match document_type {
            DocumentType::Invoice => SequenceKind::Invoice,
            DocumentType::Estimate => SequenceKind::Estimate,
            DocumentType::CreditNote => SequenceKind::CreditNote,
        }
    }
}

/// Lifecycle state of a document.
///
/// Invoices use `Draft`, `Sent`, `Viewed` and `Void`; how much has been paid
/// lives on [`PaymentStatus`]. Estimates add `Accepted`, `Declined` and
/// `Converted`. Credit notes are `Open` until fully applied (`Closed`) or
/// voided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Draft,
    Sent,
    Viewed,
    Accepted,
    Declined,
    Converted,
    Open,
    Closed,
    Void,
}

impl DocumentStatus {
    /// Whether a manual status change from `self` to `to` is allowed.
    ///
    /// Voiding, conversion and payment-driven changes have their own entry
    /// points and are not covered here.
    pub fn can_transition(&self, document_type: DocumentType, to: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match document_type {
            DocumentType::Invoice => matches!((*self, to), (Draft, Sent) | (Sent, Viewed)),
            DocumentType::Estimate => matches!(
                (*self, to),
                (Draft, Sent)
                    | (Sent, Viewed)
                    | (Sent | Viewed, Accepted)
                    | (Sent | Viewed, Declined)
            ),
            DocumentType::CreditNote => false,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How much of an invoice has been settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    /// Derive the payment status from what is still owed against the total
    pub fn derive(balance_due: &BigDecimal, total_amount: &BigDecimal) -> Self {
        if *balance_due <= BigDecimal::from(0) {
            PaymentStatus::Paid
        } else if balance_due >= total_amount {
            PaymentStatus::Unpaid
        } else {
            PaymentStatus::PartiallyPaid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    Goods,
    Service,
}

/// Cause of a stock movement recorded in the inventory log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryTransactionType {
    Sale,
    Return,
    Adjustment,
    Purchase,
    Opening,
    Damage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditNoteReason {
    /// Goods came back; tracked stock is replenished
    Return,
    PriceAdjustment,
    Cancellation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Cash,
    Upi,
    Card,
    BankTransfer,
    Cheque,
    /// Synthetic payment written when a credit note is applied
    CreditNote,
    Other,
}

/// Number series configuration for one [`SequenceKind`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub prefix: String,
    pub start_number: u64,
}

/// Tenant settings the engine depends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Home state used for place-of-supply comparison
    pub state_code: String,
    /// Month (1-12) the financial year starts in
    pub fiscal_year_start_month: u32,
    pub sequences: HashMap<SequenceKind, SequenceConfig>,
    pub created_at: NaiveDateTime,
}

impl Tenant {
    pub fn new(name: String, state_code: String) -> Self {
        Self {
            id: TenantId::new(),
            name,
            state_code,
            fiscal_year_start_month: 4,
            sequences: HashMap::new(),
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Configured series for `kind`, falling back to the default prefix starting at 1
    pub fn sequence_config(&self, kind: SequenceKind) -> SequenceConfig {
        self.sequences
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| SequenceConfig {
                prefix: kind.default_prefix().to_string(),
                start_number: 1,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub tenant_id: TenantId,
    pub name: String,
    pub state_code: Option<String>,
    pub gstin: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub opening_balance: BigDecimal,
    /// Cache maintained by the balance reconciler; never authoritative
    pub current_balance: BigDecimal,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Customer {
    pub fn new(tenant_id: TenantId, name: String, opening_balance: BigDecimal) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: CustomerId::new(),
            tenant_id,
            name,
            state_code: None,
            gstin: None,
            email: None,
            phone: None,
            current_balance: opening_balance.clone(),
            opening_balance,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Tenant-defined tax slab that products and lines refer to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRate {
    pub id: TaxRateId,
    pub tenant_id: TenantId,
    pub name: String,
    pub descriptor: TaxDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub hsn_code: Option<String>,
    pub sac_code: Option<String>,
    pub unit: Option<String>,
    pub product_type: ProductType,
    /// Rate used when a line item does not carry its own
    pub selling_price: BigDecimal,
    pub tax_rate_id: Option<TaxRateId>,
    pub track_inventory: bool,
    pub opening_stock: BigDecimal,
    /// Only mutated through the inventory ledger
    pub stock_quantity: BigDecimal,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Product {
    pub fn new(tenant_id: TenantId, name: String, selling_price: BigDecimal) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: ProductId::new(),
            tenant_id,
            name,
            hsn_code: None,
            sac_code: None,
            unit: None,
            product_type: ProductType::Goods,
            selling_price,
            tax_rate_id: None,
            track_inventory: false,
            opening_stock: BigDecimal::from(0),
            stock_quantity: BigDecimal::from(0),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Goods with inventory tracking turned on
    pub fn is_stock_tracked(&self) -> bool {
        self.product_type == ProductType::Goods && self.track_inventory
    }
}

/// Free-text customer details for documents without a customer record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkInCustomer {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// One line of a document. Product details are copied at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub document_id: DocumentId,
    pub position: u32,
    pub product_id: Option<ProductId>,
    pub name: String,
    pub description: Option<String>,
    pub hsn_code: Option<String>,
    pub sac_code: Option<String>,
    pub unit: Option<String>,
    pub quantity: BigDecimal,
    pub rate: BigDecimal,
    pub discount: Discount,
    pub tax_rate_id: Option<TaxRateId>,
    pub tax: Option<TaxDescriptor>,
    /// Whether this line moved tracked stock when the document was written
    pub stock_tracked: bool,
    #[serde(flatten)]
    pub amounts: LineCalculation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditNoteDetails {
    pub reason: CreditNoteReason,
    pub original_invoice_id: Option<DocumentId>,
    /// Amount not yet applied to invoices
    pub balance_amount: BigDecimal,
}

/// Invoice, estimate or credit note with computed totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub document_type: DocumentType,
    pub number: String,
    pub financial_year: i32,
    pub customer_id: Option<CustomerId>,
    pub walk_in: Option<WalkInCustomer>,
    pub place_of_supply: String,
    /// Set when the place of supply was given rather than derived from the
    /// customer or tenant state
    #[serde(default)]
    pub place_of_supply_explicit: bool,
    pub is_inter_state: bool,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub line_items: Vec<LineItem>,
    pub document_discount: Discount,
    #[serde(flatten)]
    pub totals: DocumentTotals,
    pub balance_due: BigDecimal,
    pub status: DocumentStatus,
    pub payment_status: PaymentStatus,
    pub credit_note: Option<CreditNoteDetails>,
    pub converted_from: Option<DocumentId>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Document {
    /// Whether this document's balance due feeds its customer's outstanding balance
    pub fn counts_toward_balance(&self) -> bool {
        self.document_type == DocumentType::Invoice
            && !matches!(self.status, DocumentStatus::Void | DocumentStatus::Draft)
            && matches!(
                self.payment_status,
                PaymentStatus::Unpaid | PaymentStatus::PartiallyPaid
            )
    }

    pub fn reference(&self) -> DocumentReference {
        DocumentReference {
            document_type: self.document_type,
            document_id: self.id,
            number: self.number.clone(),
        }
    }
}

/// Polymorphic pointer from an inventory log row to the document that caused it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference {
    pub document_type: DocumentType,
    pub document_id: DocumentId,
    pub number: String,
}

/// Immutable stock movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLogEntry {
    pub id: InventoryLogId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub transaction_type: InventoryTransactionType,
    pub quantity_change: BigDecimal,
    pub previous_stock: BigDecimal,
    pub new_stock: BigDecimal,
    pub reference: Option<DocumentReference>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub tenant_id: TenantId,
    pub customer_id: Option<CustomerId>,
    pub invoice_id: Option<DocumentId>,
    pub number: String,
    pub financial_year: i32,
    pub amount: BigDecimal,
    pub mode: PaymentMode,
    pub payment_date: NaiveDate,
    pub reference: Option<String>,
    pub notes: Option<String>,
    /// Umbrella payment this allocation belongs to (bulk payments)
    pub parent_payment_id: Option<PaymentId>,
    /// Credit note whose application produced this payment
    pub credit_note_id: Option<DocumentId>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Errors that can occur in the billing engine
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Insufficient stock for '{product}': available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: BigDecimal,
        requested: BigDecimal,
    },
    #[error("Invalid stock state for product {product_id}: applying {change} to {current} would go negative")]
    InvalidStockState {
        product_id: ProductId,
        current: BigDecimal,
        change: BigDecimal,
    },
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Transaction timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BillingError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<crate::tax::gst::TaxError> for BillingError {
    fn from(err: crate::tax::gst::TaxError) -> Self {
        BillingError::Validation(err.to_string())
    }
}

/// Result type for billing operations
pub type BillingResult<T> = Result<T, BillingError>;
