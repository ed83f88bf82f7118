//! Document and payment number allocation
//!
//! Numbers look like `{PREFIX}-{FY}-{0000}`. The running count is read from
//! the store inside the caller's transaction, which is what keeps two
//! concurrent creations from being handed the same number.

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::traits::StoreTransaction;
use crate::types::*;

/// A number reserved for a new document or payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedNumber {
    pub number: String,
    pub financial_year: i32,
}

/// Financial year `date` falls in, labelled by the calendar year it starts in
pub fn financial_year(date: NaiveDate, start_month: u32) -> i32 {
    if date.month() >= start_month {
        date.year()
    } else {
        date.year() - 1
    }
}

pub fn format_number(prefix: &str, financial_year: i32, sequence: u64) -> String {
    format!("{}-{}-{:04}", prefix, financial_year, sequence)
}

/// Allocate the next number in `kind`'s series for the tenant.
///
/// Must be called with the transaction that will also write the numbered
/// record. If a lower count collides with an existing number (a draft was
/// deleted after later numbers were issued) the candidate is advanced until
/// it is free.
pub async fn allocate<T: StoreTransaction>(
    tx: &mut T,
    tenant_id: TenantId,
    kind: SequenceKind,
    today: NaiveDate,
) -> BillingResult<AllocatedNumber> {
    let tenant = tx
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Tenant", tenant_id))?;

    let config = tenant.sequence_config(kind);
    let fy = financial_year(today, tenant.fiscal_year_start_month);
    let count = tx.count_in_sequence(tenant_id, kind, fy).await?;

    let mut sequence = config.start_number + count;
    let mut number = format_number(&config.prefix, fy, sequence);
    while tx.sequence_number_taken(tenant_id, kind, &number).await? {
        sequence += 1;
        number = format_number(&config.prefix, fy, sequence);
    }

    debug!(tenant_id = %tenant_id, ?kind, %number, "Allocated sequence number");

    Ok(AllocatedNumber {
        number,
        financial_year: fy,
    })
}
