//! # Billing Core
//!
//! A GST billing ledger engine: invoices, estimates, credit notes and
//! payments for a multi-tenant billing product, with inventory tracking and
//! customer balances kept consistent under concurrent use.
//!
//! ## Features
//!
//! - **GST calculations**: per-line CGST/SGST/IGST/CESS splits with 2-decimal rounding
//! - **Document numbering**: per-tenant, per-type, per-financial-year series
//! - **Inventory ledger**: every stock change is an immutable log entry
//! - **Payments and credit notes**: single, bulk and credit-note allocation
//! - **Balance reconciliation**: customer balances rebuilt from open invoices
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use billing_core::{BillingEngine, DocumentDraft, DocumentType, LineItemInput, MemoryStore, Tenant};
//! use bigdecimal::BigDecimal;
//!
//! # async fn run() -> billing_core::BillingResult<()> {
//! let engine = BillingEngine::with_defaults(MemoryStore::new());
//! let tenant = engine
//!     .register_tenant(Tenant::new("Acme Traders".to_string(), "KA".to_string()))
//!     .await?;
//!
//! let draft = DocumentDraft::walk_in(
//!     Default::default(),
//!     vec![LineItemInput::custom("Consulting", BigDecimal::from(2), BigDecimal::from(500))],
//! );
//! let invoice = engine
//!     .create_from_draft(DocumentType::Invoice, tenant.id, draft)
//!     .await?;
//! assert_eq!(invoice.totals.total_amount, BigDecimal::from(1000));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod input;
pub mod ledger;
pub mod reconciliation;
pub mod tax;
pub mod telemetry;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use crate::config::{BalanceRefresh, EngineConfig};
pub use input::*;
pub use ledger::*;
pub use reconciliation::BalanceReconciler;
pub use tax::gst::*;
pub use traits::*;
pub use types::*;
pub use utils::MemoryStore;
