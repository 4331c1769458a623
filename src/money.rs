//! Money arithmetic using rust_decimal.
//!
//! Amounts travel through the API as `Decimal` and are stored as integer
//! cents (scale 2), so sums and increments done by SQLite stay exact.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PosError, PosResult};

/// Stored money scale (2 decimal places)
pub const DECIMAL_PLACES: u32 = 2;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Round to the stored scale, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert an amount to integer cents.
pub fn to_cents(amount: Decimal) -> PosResult<i64> {
    round_money(amount)
        .checked_mul(HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| PosError::invalid(format!("amount out of range: {}", amount)))
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, DECIMAL_PLACES)
}

/// `percent` of `amount`, rounded to the stored scale.
pub fn percentage_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / HUNDRED)
}

/// `amount` less `percent` of it.
pub fn apply_discount(amount: Decimal, percent: Decimal) -> Decimal {
    amount - percentage_of(amount, percent)
}

/// Validate a percentage in 0..=100
pub fn validate_percent(percent: Decimal, field: &str) -> PosResult<()> {
    if percent < Decimal::ZERO || percent > HUNDRED {
        return Err(PosError::invalid(format!(
            "{} must be between 0 and 100, got {}",
            field, percent
        )));
    }
    Ok(())
}

/// Breakdown of what a customer is charged for an order.
///
/// The discount comes off the subtotal, the service charge is taken on the
/// discounted amount and VAT is added on top of both.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BillBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub service_charge: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
}

impl BillBreakdown {
    pub fn compute(
        subtotal: Decimal,
        discount_percent: Decimal,
        service_percent: Decimal,
        vat_percent: Decimal,
    ) -> Self {
        let discounted = apply_discount(subtotal, discount_percent);
        let discount = subtotal - discounted;
        let service_charge = percentage_of(discounted, service_percent);
        let vat = percentage_of(discounted + service_charge, vat_percent);

        BillBreakdown {
            subtotal,
            discount,
            service_charge,
            vat,
            total: discounted + service_charge + vat,
        }
    }
}

/// Period-over-period growth in percent.
///
/// A zero previous period yields 100 when the current one is positive and 0
/// otherwise; it never divides by zero.
pub fn growth_percentage(current: Decimal, previous: Decimal) -> Decimal {
    if previous.is_zero() {
        return if current > Decimal::ZERO { HUNDRED } else { Decimal::ZERO };
    }
    round_money((current - previous) / previous * HUNDRED)
}

/// Format an amount with `,` thousands grouping, e.g. `95,000 ₫` or `1,234.50 €`.
pub fn format_currency(amount: Decimal, symbol: &str, decimals: u32) -> String {
    let rounded = amount
        .abs()
        .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.*}", decimals as usize, rounded);
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    match frac_part {
        Some(frac) => format!("{}{}.{} {}", sign, grouped, frac, symbol),
        None => format!("{}{} {}", sign, grouped, symbol),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cents_conversion_is_exact() {
        assert_eq!(to_cents(dec!(15000)).unwrap(), 1_500_000);
        assert_eq!(to_cents(dec!(0.105)).unwrap(), 11);
        assert_eq!(from_cents(1_500_000), dec!(15000));
        assert_eq!(from_cents(11), dec!(0.11));
    }

    #[test]
    fn oversized_amount_is_rejected() {
        assert!(matches!(to_cents(Decimal::MAX), Err(PosError::InvalidInput(_))));
        assert!(matches!(to_cents(Decimal::MIN), Err(PosError::InvalidInput(_))));
        // fits in Decimal after ×100 but not in i64
        assert!(to_cents(Decimal::from(i64::MAX)).is_err());
        assert_eq!(apply_discount(dec!(80), dec!(25)), dec!(60));
    }

    #[test]
    fn tenths_add_up_without_drift() {
        let total: i64 = (0..1000).map(|_| to_cents(dec!(0.1)).unwrap()).sum();
        assert_eq!(from_cents(total), dec!(100));
    }

    #[test]
    fn bill_applies_discount_service_and_vat() {
        let bill = BillBreakdown::compute(dec!(100), dec!(10), dec!(5), dec!(10));
        assert_eq!(bill.discount, dec!(10));
        assert_eq!(bill.service_charge, dec!(4.50));
        assert_eq!(bill.vat, dec!(9.45));
        assert_eq!(bill.total, dec!(103.95));
    }

    #[test]
    fn bill_without_adjustments_is_subtotal() {
        let bill = BillBreakdown::compute(dec!(95000), dec!(0), dec!(0), dec!(0));
        assert_eq!(bill.total, dec!(95000));
    }

    #[test]
    fn growth_special_cases_zero() {
        assert_eq!(growth_percentage(dec!(0), dec!(0)), dec!(0));
        assert_eq!(growth_percentage(dec!(100), dec!(0)), dec!(100));
        assert_eq!(growth_percentage(dec!(150), dec!(100)), dec!(50));
        assert_eq!(growth_percentage(dec!(50), dec!(100)), dec!(-50));
    }

    #[test]
    fn formats_with_grouping() {
        assert_eq!(format_currency(dec!(95000), "₫", 0), "95,000 ₫");
        assert_eq!(format_currency(dec!(1234.5), "€", 2), "1,234.50 €");
        assert_eq!(format_currency(dec!(-999), "$", 0), "-999 $");
        assert_eq!(format_currency(dec!(0), "$", 2), "0.00 $");
    }

    #[test]
    fn rejects_out_of_range_percent() {
        assert!(validate_percent(dec!(101), "discount").is_err());
        assert!(validate_percent(dec!(-1), "discount").is_err());
        assert!(validate_percent(dec!(12.5), "discount").is_ok());
    }
}
