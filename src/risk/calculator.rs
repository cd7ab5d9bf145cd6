//! Mark-to-market P&L and DV01 for swap positions.
//!
//! Conventions:
//! - Rates are percentages (4.35 means 4.35%).
//! - Positive notional receives fixed, negative notional pays fixed.
//! - Valuation date is the rate set's observation date, so results never
//!   depend on the wall clock.
//! - Remaining life uses actual/365. A swap's rate sensitivity is scaled by
//!   `min(years_remaining / tenor_years, 1)`, so a matured swap is worth zero.
//!
//! ```text
//! dv01 = |notional| * D(tenor) * 0.0001 * factor
//! pnl  = notional * (fixed - market) / 100 * D(tenor) * factor
//! ```

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::error::{Result, RiskError};
use crate::models::{RateSet, RiskMetrics, SwapPosition, Tenor};

const ONE_BP: Decimal = dec!(0.0001);
const DAYS_PER_YEAR: Decimal = dec!(365);

/// Stateless pricer for swap positions.
pub struct RiskCalculator;

impl RiskCalculator {
    /// Approximate modified duration of a par swap per tenor bucket.
    pub fn modified_duration(tenor: Tenor) -> Decimal {
        match tenor {
            Tenor::Y2 => dec!(1.90),
            Tenor::Y5 => dec!(4.50),
            Tenor::Y10 => dec!(8.50),
            Tenor::Y30 => dec!(17.00),
        }
    }

    /// Price one position against the cycle's rate set.
    pub fn evaluate(position: &SwapPosition, rates: &RateSet) -> Result<RiskMetrics> {
        let tenor = position.validate()?;

        let snapshot = rates.get(tenor).ok_or_else(|| RiskError::MissingRate {
            position_id: position.id.clone(),
            tenor,
        })?;

        let maturity = position
            .maturity_date()
            .ok_or_else(|| RiskError::invalid_position(&position.id, "maturity date out of range"))?;

        let valuation_date = rates.as_of().date_naive();
        let days_remaining = (maturity - valuation_date).num_days().max(0);
        let years_remaining = Decimal::from(days_remaining) / DAYS_PER_YEAR;
        let factor = (years_remaining / Decimal::from(tenor.years())).min(Decimal::ONE);

        let duration = Self::modified_duration(tenor);
        let market_rate = snapshot.rate;
        let out_of_range = || RiskError::invalid_position(&position.id, "notional or rate too large to price");

        let dv01 = position
            .notional
            .abs()
            .checked_mul(duration)
            .and_then(|v| v.checked_mul(ONE_BP))
            .and_then(|v| v.checked_mul(factor))
            .ok_or_else(out_of_range)?
            .round_dp(2);
        let pnl = position
            .fixed_rate
            .checked_sub(market_rate)
            .and_then(|spread| position.notional.checked_mul(spread))
            .and_then(|v| v.checked_div(dec!(100)))
            .and_then(|v| v.checked_mul(duration))
            .and_then(|v| v.checked_mul(factor))
            .ok_or_else(out_of_range)?
            .round_dp(2);
        let rate_change_bps = market_rate
            .checked_sub(position.fixed_rate)
            .and_then(|v| v.checked_mul(dec!(100)))
            .ok_or_else(out_of_range)?
            .round_dp(2);

        debug!(
            position_id = %position.id,
            tenor = %tenor,
            direction = %position.direction(),
            market_rate = %market_rate,
            rate_change_bps = %rate_change_bps,
            pnl = %pnl,
            dv01 = %dv01,
            "Position priced"
        );

        Ok(RiskMetrics {
            position_id: position.id.clone(),
            pnl,
            dv01,
            computed_at: rates.as_of(),
            tenor,
            notional: position.notional,
            fixed_rate: position.fixed_rate,
            market_rate,
            rate_change_bps,
            years_remaining: years_remaining.round_dp(4),
        })
    }
}

/// Net rate exposure across positions (receive-fixed positive).
pub fn portfolio_dv01(metrics: &[RiskMetrics]) -> Decimal {
    metrics
        .iter()
        .map(RiskMetrics::signed_dv01)
        .fold(Decimal::ZERO, Decimal::saturating_add)
}
