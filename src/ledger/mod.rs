//! Ledger module: documents, stock, payments and number series

pub mod core;
pub mod documents;
pub mod inventory;
pub mod payments;
pub mod sequence;

pub use core::*;
pub use inventory::{StockAdjustment, StockChainReport};
pub use sequence::{financial_year, AllocatedNumber};
