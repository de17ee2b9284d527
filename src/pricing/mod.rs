//! Per-character cost calculation.
//!
//! Pure and deterministic: the same texts and price always produce the same
//! cost, rounded to four decimal places. Amounts are `Decimal` end to end;
//! floats never touch money.

use rust_decimal::Decimal;

/// Decimal places kept on a computed cost.
pub const COST_SCALE: u32 = 4;

/// Number of billable units (characters) in a batch of texts.
///
/// Characters are Unicode scalar values, not bytes, so multi-byte input is
/// billed the same as ASCII of equal length.
pub fn billed_units(texts: &[String]) -> u64 {
    texts.iter().map(|t| t.chars().count() as u64).sum()
}

/// Cost of classifying `texts` at `price_per_char`, rounded to 4 dp.
///
/// An empty batch costs zero. Price validity (non-negative, model exists) is
/// the catalog's responsibility, not this function's.
pub fn cost(texts: &[String], price_per_char: Decimal) -> Decimal {
    cost_for_units(billed_units(texts), price_per_char)
}

/// Cost for an already-counted number of units.
///
/// Used by the saga so the audit log's `unit_count` and the charged amount
/// can never disagree.
pub fn cost_for_units(units: u64, price_per_char: Decimal) -> Decimal {
    (Decimal::from(units) * price_per_char).round_dp(COST_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cost_worked_example() {
        // "a" + "bb" = 3 chars at 0.1 each
        let c = cost(&texts(&["a", "bb"]), dec!(0.1));
        assert_eq!(c, dec!(0.3000));
    }

    #[test]
    fn test_cost_empty_batch_is_zero() {
        assert_eq!(cost(&[], dec!(0.5)), Decimal::ZERO);
    }

    #[test]
    fn test_cost_zero_price() {
        assert_eq!(cost(&texts(&["hello"]), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_cost_rounds_to_four_places() {
        // 3 chars * 0.00005 = 0.00015 -> rounds to 0.0002 (banker's: 0.0002)
        let c = cost(&texts(&["abc"]), dec!(0.00005));
        assert!(c.scale() <= COST_SCALE);
        assert_eq!(c, dec!(0.0002));
    }

    #[test]
    fn test_billed_units_counts_chars_not_bytes() {
        let t = texts(&["héllo", "日本"]);
        assert_eq!(billed_units(&t), 7);
    }

    #[test]
    fn test_cost_matches_units() {
        let t = texts(&["one", "two", "three"]);
        let units = billed_units(&t);
        assert_eq!(cost(&t, dec!(0.25)), cost_for_units(units, dec!(0.25)));
    }
}
