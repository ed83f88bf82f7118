//! Validation utilities

use bigdecimal::BigDecimal;

use crate::types::*;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> BillingResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(BillingError::InvalidAmount(format!(
            "Amount must be positive, got {}",
            amount
        )))
    } else {
        Ok(())
    }
}

/// Validate that an amount is zero or more
pub fn validate_non_negative(field: &str, amount: &BigDecimal) -> BillingResult<()> {
    if *amount < BigDecimal::from(0) {
        return Err(BillingError::Validation(format!(
            "{} cannot be negative",
            field
        )));
    }
    Ok(())
}

/// Validate a human-entered name (customer, product, tenant)
pub fn validate_name(field: &str, name: &str) -> BillingResult<()> {
    if name.trim().is_empty() {
        return Err(BillingError::Validation(format!(
            "{} cannot be empty",
            field
        )));
    }

    if name.len() > 200 {
        return Err(BillingError::Validation(format!(
            "{} cannot exceed 200 characters",
            field
        )));
    }

    Ok(())
}

/// Validate a state code used for place-of-supply comparison
pub fn validate_state_code(state_code: &str) -> BillingResult<()> {
    let trimmed = state_code.trim();
    if trimmed.is_empty() {
        return Err(BillingError::Validation(
            "State code cannot be empty".to_string(),
        ));
    }

    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BillingError::Validation(format!(
            "State code '{}' can only contain letters and digits",
            state_code
        )));
    }

    Ok(())
}

/// Validate a document number prefix
pub fn validate_prefix(prefix: &str) -> BillingResult<()> {
    if prefix.is_empty() || prefix.len() > 10 {
        return Err(BillingError::Validation(
            "Sequence prefix must be 1 to 10 characters".to_string(),
        ));
    }

    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '/' || c == '_')
    {
        return Err(BillingError::Validation(format!(
            "Sequence prefix '{}' contains unsupported characters",
            prefix
        )));
    }

    Ok(())
}

/// Validate tenant settings before they are stored
pub fn validate_tenant(tenant: &Tenant) -> BillingResult<()> {
    validate_name("Tenant name", &tenant.name)?;
    validate_state_code(&tenant.state_code)?;

    if !(1..=12).contains(&tenant.fiscal_year_start_month) {
        return Err(BillingError::Validation(format!(
            "Fiscal year start month must be 1-12, got {}",
            tenant.fiscal_year_start_month
        )));
    }

    for config in tenant.sequences.values() {
        validate_prefix(&config.prefix)?;
    }

    Ok(())
}

/// Two state codes name the same state (case and surrounding space ignored)
pub fn same_state(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}
