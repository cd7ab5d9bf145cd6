//! Swap position model.

use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};

use super::rate::Tenor;

/// Lifecycle status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    #[default]
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(PositionStatus::Open),
            "CLOSED" => Ok(PositionStatus::Closed),
            other => Err(format!("unknown position status '{}'", other)),
        }
    }
}

/// Side of the fixed leg held by the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Receives fixed, pays float. Gains when rates fall.
    ReceiveFixed,
    /// Pays fixed, receives float. Gains when rates rise.
    PayFixed,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ReceiveFixed => "RCV_FIXED",
            Direction::PayFixed => "PAY_FIXED",
        }
    }

    /// +1 for receive-fixed, -1 for pay-fixed.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::ReceiveFixed => Decimal::ONE,
            Direction::PayFixed => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Interest-rate swap position held by a trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapPosition {
    /// Unique position identifier
    pub id: String,

    /// Owner of the position
    pub trader_id: String,

    /// Signed notional: positive is receive-fixed, negative is pay-fixed
    pub notional: Decimal,

    /// Fixed leg rate as a percentage
    pub fixed_rate: Decimal,

    /// Tenor label as supplied by the store (validated at evaluation time)
    pub tenor: String,

    /// Trade date
    pub entry_date: NaiveDate,

    #[serde(default)]
    pub status: PositionStatus,
}

impl SwapPosition {
    /// Create a new open position.
    pub fn new(
        id: impl Into<String>,
        trader_id: impl Into<String>,
        notional: Decimal,
        fixed_rate: Decimal,
        tenor: Tenor,
        entry_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            trader_id: trader_id.into(),
            notional,
            fixed_rate,
            tenor: tenor.to_string(),
            entry_date,
            status: PositionStatus::Open,
        }
    }

    pub fn direction(&self) -> Direction {
        if self.notional.is_sign_negative() {
            Direction::PayFixed
        } else {
            Direction::ReceiveFixed
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Parse the tenor label into a supported tenor.
    pub fn tenor(&self) -> Result<Tenor> {
        self.tenor
            .parse()
            .map_err(|reason: String| RiskError::invalid_position(&self.id, reason))
    }

    /// Reject positions the calculator cannot price.
    pub fn validate(&self) -> Result<Tenor> {
        if self.notional.is_zero() {
            return Err(RiskError::invalid_position(&self.id, "notional is zero"));
        }
        if self.fixed_rate < Decimal::ZERO {
            return Err(RiskError::invalid_position(
                &self.id,
                format!("negative fixed rate {}", self.fixed_rate),
            ));
        }
        self.tenor()
    }

    /// Entry date plus the tenor length, if the tenor is supported.
    pub fn maturity_date(&self) -> Option<NaiveDate> {
        let tenor = self.tenor().ok()?;
        self.entry_date
            .checked_add_months(Months::new(tenor.years() * 12))
    }

    /// Transition OPEN -> CLOSED. A closed position cannot be reopened or closed twice.
    pub fn close(&mut self) -> Result<()> {
        if self.status == PositionStatus::Closed {
            return Err(RiskError::InvalidTransition {
                position_id: self.id.clone(),
            });
        }
        self.status = PositionStatus::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_position(notional: Decimal) -> SwapPosition {
        SwapPosition::new(
            "POS001",
            "trader-1",
            notional,
            dec!(4.10),
            Tenor::Y5,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        )
    }

    #[test]
    fn test_direction_from_notional_sign() {
        assert_eq!(make_position(dec!(10000000)).direction(), Direction::ReceiveFixed);
        assert_eq!(make_position(dec!(-25000000)).direction(), Direction::PayFixed);
    }

    #[test]
    fn test_maturity_date() {
        let pos = make_position(dec!(10000000));
        assert_eq!(pos.maturity_date(), NaiveDate::from_ymd_opt(2029, 1, 15));
    }

    #[test]
    fn test_validation() {
        assert!(make_position(dec!(0)).validate().is_err());

        let mut pos = make_position(dec!(1000000));
        pos.tenor = "7Y".to_string();
        assert!(matches!(pos.validate(), Err(RiskError::InvalidPosition { .. })));
        assert_eq!(pos.maturity_date(), None);
    }

    #[test]
    fn test_close_is_one_way() {
        let mut pos = make_position(dec!(10000000));
        assert!(pos.is_open());
        assert!(pos.close().is_ok());
        assert_eq!(pos.status, PositionStatus::Closed);
        assert!(matches!(pos.close(), Err(RiskError::InvalidTransition { .. })));
    }
}
