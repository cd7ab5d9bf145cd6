//! Realized rate volatility for dynamic thresholds.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

/// Sample standard deviation of successive rate changes.
///
/// `rates` is a chronological series of rate observations in percent.
/// Returns `None` with fewer than three observations (two changes).
pub fn realized_volatility(rates: &[Decimal]) -> Option<Decimal> {
    if rates.len() < 3 {
        return None;
    }

    let changes: Vec<f64> = rates
        .windows(2)
        .filter_map(|w| (w[1] - w[0]).to_f64())
        .collect();

    let std_dev = changes.std_dev();
    if !std_dev.is_finite() {
        return None;
    }

    Decimal::try_from(std_dev).ok().map(|v| v.round_dp(6))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_flat_series_has_zero_volatility() {
        let vol = realized_volatility(&[dec!(4.35), dec!(4.35), dec!(4.35), dec!(4.35)]);
        assert_eq!(vol, Some(Decimal::ZERO));
    }

    #[test]
    fn test_volatility_of_alternating_moves() {
        // Changes: +0.10, -0.10, +0.10 -> mean 0.0333, sample std ~0.11547
        let vol = realized_volatility(&[dec!(4.30), dec!(4.40), dec!(4.30), dec!(4.40)]).unwrap();
        assert!(vol > dec!(0.115) && vol < dec!(0.116), "vol {}", vol);
    }

    #[test]
    fn test_too_few_points() {
        assert_eq!(realized_volatility(&[dec!(4.30), dec!(4.40)]), None);
        assert_eq!(realized_volatility(&[]), None);
    }
}
