//! Tax breakdown computation.
//!
//! Unit prices are tax-inclusive: the taxable base is reconstructed by
//! dividing the line total by the tax factor `1 + rate/100`. Amounts
//! accumulate unrounded; rounding to two decimals happens only when a
//! bucket or the grand total is emitted.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::BTreeMap;

/// One line as seen by the calculator: a quantity at a tax-inclusive
/// unit price.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxableLine {
    pub unit_price: Decimal,
    pub quantity: i32,
    pub tax_rate: Decimal,
}

/// Per-rate aggregate, rounded for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBucket {
    pub rate: Decimal,
    pub base: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Full breakdown: buckets in ascending rate order plus the grand total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub buckets: Vec<TaxBucket>,
    pub grand_total: Decimal,
}

/// Round to two decimals, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the per-rate breakdown and grand total for a set of lines.
///
/// Lines group by exact rate value, so `21`, `21.0` and `21.00` share a
/// bucket. Rejects negative prices or rates and non-positive quantities.
pub fn compute_breakdown(lines: &[TaxableLine]) -> Result<TaxBreakdown, AppError> {
    let mut buckets: BTreeMap<Decimal, (Decimal, Decimal)> = BTreeMap::new();
    let mut grand_total = Decimal::ZERO;

    for line in lines {
        if line.unit_price < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "unit price must not be negative"
            )));
        }
        if line.tax_rate < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "tax rate must not be negative"
            )));
        }
        if line.quantity <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "quantity must be a positive integer"
            )));
        }

        let line_total = line.unit_price * Decimal::from(line.quantity);
        // factor >= 1 since the rate is non-negative, so the division is safe.
        let factor = Decimal::ONE + line.tax_rate / Decimal::ONE_HUNDRED;
        let base = line_total / factor;
        let tax = line_total - base;

        let entry = buckets
            .entry(line.tax_rate.normalize())
            .or_insert((Decimal::ZERO, Decimal::ZERO));
        entry.0 += base;
        entry.1 += tax;
        grand_total += line_total;
    }

    let buckets = buckets
        .into_iter()
        .map(|(rate, (base, tax))| TaxBucket {
            rate,
            base: round2(base),
            tax: round2(tax),
            total: round2(base + tax),
        })
        .collect();

    Ok(TaxBreakdown {
        buckets,
        grand_total: round2(grand_total),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().expect("valid decimal literal")
    }

    fn line(unit_price: &str, quantity: i32, tax_rate: &str) -> TaxableLine {
        TaxableLine {
            unit_price: dec(unit_price),
            quantity,
            tax_rate: dec(tax_rate),
        }
    }

    #[test]
    fn reconstructs_base_from_inclusive_total() {
        let breakdown = compute_breakdown(&[line("1.21", 10, "21")]).unwrap();

        assert_eq!(breakdown.buckets.len(), 1);
        let bucket = &breakdown.buckets[0];
        assert_eq!(bucket.rate, dec("21"));
        assert_eq!(bucket.base, dec("10.00"));
        assert_eq!(bucket.tax, dec("2.10"));
        assert_eq!(bucket.total, dec("12.10"));
        assert_eq!(breakdown.grand_total, dec("12.10"));
    }

    #[test]
    fn base_plus_tax_equals_line_total_before_rounding() {
        let unit_price = dec("7.77");
        let quantity = 3;
        let rate = dec("16.5");

        let line_total = unit_price * Decimal::from(quantity);
        let factor = Decimal::ONE + rate / Decimal::ONE_HUNDRED;
        let base = line_total / factor;
        let tax = line_total - base;

        // Exact by construction, no tolerance needed.
        assert_eq!(base + tax, line_total);
        // The reconstruction itself is only precision-bounded.
        let error = (base * factor - line_total).abs();
        assert!(error < dec("0.0000000001"), "error {}", error);
    }

    #[test]
    fn zero_rate_keeps_total_as_base() {
        let breakdown = compute_breakdown(&[line("5.00", 2, "0")]).unwrap();

        let bucket = &breakdown.buckets[0];
        assert_eq!(bucket.rate, Decimal::ZERO);
        assert_eq!(bucket.base, dec("10.00"));
        assert_eq!(bucket.tax, dec("0.00"));
        assert_eq!(breakdown.grand_total, dec("10.00"));
    }

    #[test]
    fn groups_by_exact_rate_value() {
        let breakdown = compute_breakdown(&[
            line("1.21", 1, "21"),
            line("2.42", 1, "21.0"),
            line("1.10", 1, "10"),
        ])
        .unwrap();

        assert_eq!(breakdown.buckets.len(), 2);
        assert_eq!(breakdown.buckets[0].rate, dec("10"));
        assert_eq!(breakdown.buckets[1].rate, dec("21"));
        assert_eq!(breakdown.buckets[1].base, dec("3.00"));
    }

    #[test]
    fn grand_total_is_sum_of_line_totals_regardless_of_order() {
        let lines = vec![
            line("1.21", 3, "21"),
            line("0.55", 7, "10"),
            line("9.99", 1, "4"),
            line("2.00", 2, "0"),
        ];
        let mut reversed = lines.clone();
        reversed.reverse();

        let forward = compute_breakdown(&lines).unwrap();
        let backward = compute_breakdown(&reversed).unwrap();

        let expected: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        assert_eq!(forward.grand_total, round2(expected));
        assert_eq!(forward.grand_total, backward.grand_total);
        assert_eq!(forward.buckets, backward.buckets);
    }

    #[test]
    fn accumulates_unrounded_within_a_bucket() {
        // Each line's base rounds to 0.83; summing rounded values would
        // give 2.49, the unrounded accumulation rounds to 2.48.
        let breakdown =
            compute_breakdown(&[line("1.00", 1, "21"), line("1.00", 1, "21"), line("1.00", 1, "21")])
                .unwrap();

        let bucket = &breakdown.buckets[0];
        assert_eq!(bucket.base, dec("2.48"));
        assert_eq!(bucket.total, dec("3.00"));
    }

    #[test]
    fn rejects_negative_price() {
        let result = compute_breakdown(&[line("-1.00", 1, "21")]);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn rejects_negative_rate() {
        let result = compute_breakdown(&[line("1.00", 1, "-21")]);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let result = compute_breakdown(&[line("1.00", 0, "21")]);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn empty_input_yields_empty_breakdown() {
        let breakdown = compute_breakdown(&[]).unwrap();
        assert!(breakdown.buckets.is_empty());
        assert_eq!(breakdown.grand_total, Decimal::ZERO);
    }
}
