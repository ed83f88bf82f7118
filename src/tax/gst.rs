//! GST (Goods and Services Tax) calculation engine for Indian tax compliance
//!
//! Everything here is pure: a line's quantity, rate, discount and tax slab go
//! in, a fully rounded CGST/SGST/IGST/CESS breakdown comes out. Amounts are
//! rounded to two decimals per line, so document totals are sums of already
//! rounded lines.

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};

/// Round a monetary amount to 2 decimals, half away from zero
pub fn round_money(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(2, RoundingMode::HalfUp)
}

/// Round to whole currency units, half away from zero, keeping a 2-decimal scale
pub fn round_whole(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(0, RoundingMode::HalfUp).with_scale(2)
}

fn percent_of(amount: &BigDecimal, rate: &BigDecimal) -> BigDecimal {
    round_money(&(amount * rate / BigDecimal::from(100)))
}

/// Tax slab as configured on a tax rate: a flat total rate plus optional
/// explicit component rates.
///
/// Missing components default from `rate`: IGST to the full rate, CGST and
/// SGST to half of it each. CESS defaults to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxDescriptor {
    /// Total GST rate percentage (e.g., 18 for 18%)
    pub rate: BigDecimal,
    pub cgst_rate: Option<BigDecimal>,
    pub sgst_rate: Option<BigDecimal>,
    pub igst_rate: Option<BigDecimal>,
    pub cess_rate: Option<BigDecimal>,
}

impl TaxDescriptor {
    /// Slab with only a total rate; components are derived
    pub fn new(rate: BigDecimal) -> Self {
        Self {
            rate,
            cgst_rate: None,
            sgst_rate: None,
            igst_rate: None,
            cess_rate: None,
        }
    }

    pub fn with_cess(mut self, cess_rate: BigDecimal) -> Self {
        self.cess_rate = Some(cess_rate);
        self
    }

    /// Validate that every configured rate is a percentage between 0 and 100
    pub fn validate(&self) -> Result<(), TaxError> {
        let rates = [
            Some(&self.rate),
            self.cgst_rate.as_ref(),
            self.sgst_rate.as_ref(),
            self.igst_rate.as_ref(),
            self.cess_rate.as_ref(),
        ];

        for rate in rates.into_iter().flatten() {
            if *rate < BigDecimal::from(0) || *rate > BigDecimal::from(100) {
                return Err(TaxError::InvalidRate(format!(
                    "tax rate {} is outside 0..=100",
                    rate
                )));
            }
        }

        Ok(())
    }

    /// Component rates that apply for the given supply type
    pub fn applied_rates(&self, is_inter_state: bool) -> AppliedRates {
        let zero = BigDecimal::from(0);
        let cess = self.cess_rate.clone().unwrap_or_else(|| zero.clone());

        if is_inter_state {
            AppliedRates {
                cgst: zero.clone(),
                sgst: zero,
                igst: self.igst_rate.clone().unwrap_or_else(|| self.rate.clone()),
                cess,
            }
        } else {
            let half_rate = &self.rate / BigDecimal::from(2);
            AppliedRates {
                cgst: self.cgst_rate.clone().unwrap_or_else(|| half_rate.clone()),
                sgst: self.sgst_rate.clone().unwrap_or(half_rate),
                igst: zero,
                cess,
            }
        }
    }
}

/// Resolved component percentages for one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRates {
    pub cgst: BigDecimal,
    pub sgst: BigDecimal,
    pub igst: BigDecimal,
    pub cess: BigDecimal,
}

impl AppliedRates {
    fn zero() -> Self {
        Self {
            cgst: BigDecimal::from(0),
            sgst: BigDecimal::from(0),
            igst: BigDecimal::from(0),
            cess: BigDecimal::from(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Fixed,
    Percentage,
}

/// Discount applied to a line or to a whole document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    pub discount_type: DiscountType,
    pub value: BigDecimal,
}

impl Discount {
    pub fn none() -> Self {
        Self::fixed(BigDecimal::from(0))
    }

    pub fn fixed(value: BigDecimal) -> Self {
        Self {
            discount_type: DiscountType::Fixed,
            value,
        }
    }

    pub fn percentage(value: BigDecimal) -> Self {
        Self {
            discount_type: DiscountType::Percentage,
            value,
        }
    }

    /// Discount amount taken off `base`, rounded to 2 decimals.
    ///
    /// Negative values, percentages above 100 and fixed discounts larger than
    /// `base` are rejected rather than clamped.
    pub fn amount_on(&self, base: &BigDecimal) -> Result<BigDecimal, TaxError> {
        if self.value < BigDecimal::from(0) {
            return Err(TaxError::InvalidDiscount(format!(
                "discount cannot be negative: {}",
                self.value
            )));
        }

        let amount = match self.discount_type {
            DiscountType::Percentage => {
                if self.value > BigDecimal::from(100) {
                    return Err(TaxError::InvalidDiscount(format!(
                        "percentage discount cannot exceed 100: {}",
                        self.value
                    )));
                }
                percent_of(base, &self.value)
            }
            DiscountType::Fixed => round_money(&self.value),
        };

        if amount > *base {
            return Err(TaxError::InvalidDiscount(format!(
                "discount {} exceeds the amount it applies to ({})",
                amount, base
            )));
        }

        Ok(amount)
    }
}

impl Default for Discount {
    fn default() -> Self {
        Self::none()
    }
}

/// Detailed tax breakdown for one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineCalculation {
    /// Quantity times rate
    pub line_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub taxable_amount: BigDecimal,
    pub rates: AppliedRates,
    pub cgst_amount: BigDecimal,
    pub sgst_amount: BigDecimal,
    pub igst_amount: BigDecimal,
    pub cess_amount: BigDecimal,
    pub total_tax: BigDecimal,
    /// Taxable amount plus every tax component
    pub total_amount: BigDecimal,
}

impl LineCalculation {
    /// Compute the breakdown for one line. A missing tax descriptor means an
    /// untaxed line, not an error.
    pub fn calculate(
        quantity: &BigDecimal,
        rate: &BigDecimal,
        discount: &Discount,
        tax: Option<&TaxDescriptor>,
        is_inter_state: bool,
    ) -> Result<Self, TaxError> {
        if *quantity <= BigDecimal::from(0) {
            return Err(TaxError::Calculation(format!(
                "quantity must be positive: {}",
                quantity
            )));
        }
        if *rate < BigDecimal::from(0) {
            return Err(TaxError::Calculation(format!(
                "rate cannot be negative: {}",
                rate
            )));
        }

        let line_amount = round_money(&(quantity * rate));
        let discount_amount = discount.amount_on(&line_amount)?;
        let taxable_amount = &line_amount - &discount_amount;

        let rates = match tax {
            Some(descriptor) => {
                descriptor.validate()?;
                descriptor.applied_rates(is_inter_state)
            }
            None => AppliedRates::zero(),
        };

        let cgst_amount = percent_of(&taxable_amount, &rates.cgst);
        let sgst_amount = percent_of(&taxable_amount, &rates.sgst);
        let igst_amount = percent_of(&taxable_amount, &rates.igst);
        let cess_amount = percent_of(&taxable_amount, &rates.cess);

        let total_tax = &cgst_amount + &sgst_amount + &igst_amount + &cess_amount;
        let total_amount = &taxable_amount + &total_tax;

        Ok(Self {
            line_amount,
            discount_amount,
            taxable_amount,
            rates,
            cgst_amount,
            sgst_amount,
            igst_amount,
            cess_amount,
            total_tax,
            total_amount,
        })
    }
}

/// Document-level totals built from already rounded lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTotals {
    /// Sum of line amounts before any discount
    pub subtotal: BigDecimal,
    pub document_discount_amount: BigDecimal,
    /// Line discounts plus the document discount
    pub discount_amount: BigDecimal,
    pub taxable_amount: BigDecimal,
    pub cgst_amount: BigDecimal,
    pub sgst_amount: BigDecimal,
    pub igst_amount: BigDecimal,
    pub cess_amount: BigDecimal,
    pub total_tax: BigDecimal,
    pub shipping_charge: BigDecimal,
    pub adjustment_amount: BigDecimal,
    /// Delta between the whole-unit total and the precise sum
    pub round_off: BigDecimal,
    pub total_amount: BigDecimal,
}

impl DocumentTotals {
    /// Aggregate line breakdowns into document totals.
    ///
    /// The document discount is taken off the post-line-discount amount and
    /// does not re-base line taxes.
    pub fn calculate<'a>(
        lines: impl IntoIterator<Item = &'a LineCalculation>,
        document_discount: &Discount,
        shipping_charge: &BigDecimal,
        adjustment_amount: &BigDecimal,
    ) -> Result<Self, TaxError> {
        let lines: Vec<&LineCalculation> = lines.into_iter().collect();

        if *shipping_charge < BigDecimal::from(0) {
            return Err(TaxError::Calculation(format!(
                "shipping charge cannot be negative: {}",
                shipping_charge
            )));
        }

        let subtotal: BigDecimal = lines.iter().map(|line| &line.line_amount).sum();
        let line_discounts: BigDecimal = lines.iter().map(|line| &line.discount_amount).sum();
        let line_taxable: BigDecimal = lines.iter().map(|line| &line.taxable_amount).sum();

        let document_discount_amount = document_discount.amount_on(&line_taxable)?;
        let discount_amount = &line_discounts + &document_discount_amount;
        let taxable_amount = &line_taxable - &document_discount_amount;

        let cgst_amount: BigDecimal = lines.iter().map(|line| &line.cgst_amount).sum();
        let sgst_amount: BigDecimal = lines.iter().map(|line| &line.sgst_amount).sum();
        let igst_amount: BigDecimal = lines.iter().map(|line| &line.igst_amount).sum();
        let cess_amount: BigDecimal = lines.iter().map(|line| &line.cess_amount).sum();
        let total_tax = &cgst_amount + &sgst_amount + &igst_amount + &cess_amount;

        let shipping_charge = round_money(shipping_charge);
        let adjustment_amount = round_money(adjustment_amount);

        let precise_total = &taxable_amount + &total_tax + &shipping_charge + &adjustment_amount;
        let total_amount = round_whole(&precise_total);
        let round_off = &total_amount - &precise_total;

        if total_amount < BigDecimal::from(0) {
            return Err(TaxError::Calculation(format!(
                "document total cannot be negative: {}",
                total_amount
            )));
        }

        Ok(Self {
            subtotal: round_money(&subtotal),
            document_discount_amount,
            discount_amount: round_money(&discount_amount),
            taxable_amount: round_money(&taxable_amount),
            cgst_amount: round_money(&cgst_amount),
            sgst_amount: round_money(&sgst_amount),
            igst_amount: round_money(&igst_amount),
            cess_amount: round_money(&cess_amount),
            total_tax: round_money(&total_tax),
            shipping_charge,
            adjustment_amount,
            round_off: round_money(&round_off),
            total_amount,
        })
    }
}

/// GST-related errors
#[derive(Debug, thiserror::Error)]
pub enum TaxError {
    #[error("Invalid GST rate: {0}")]
    InvalidRate(String),
    #[error("Invalid discount: {0}")]
    InvalidDiscount(String),
    #[error("Calculation error: {0}")]
    Calculation(String),
}
