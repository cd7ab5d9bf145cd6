//! Risk metrics derived for a position in one evaluation cycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::position::Direction;
use super::rate::Tenor;

/// Mark-to-market result for one position against one rate set.
///
/// Recomputed every cycle and superseded by newer computations; never the
/// authoritative record of anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub position_id: String,

    /// Mark-to-market P&L in USD, positive is a gain to the holder
    pub pnl: Decimal,

    /// Dollar value of one basis point (magnitude)
    pub dv01: Decimal,

    /// Valuation time (the rate set's observation time)
    pub computed_at: DateTime<Utc>,

    pub tenor: Tenor,
    pub notional: Decimal,
    pub fixed_rate: Decimal,
    pub market_rate: Decimal,

    /// (market - fixed) in basis points
    pub rate_change_bps: Decimal,

    /// Remaining life under actual/365
    pub years_remaining: Decimal,
}

impl RiskMetrics {
    pub fn direction(&self) -> Direction {
        if self.notional.is_sign_negative() {
            Direction::PayFixed
        } else {
            Direction::ReceiveFixed
        }
    }

    /// DV01 carrying the direction sign (receive-fixed positive).
    pub fn signed_dv01(&self) -> Decimal {
        self.dv01 * self.direction().sign()
    }
}
