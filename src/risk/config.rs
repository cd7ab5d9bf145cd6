//! Threshold configuration for the decision engine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};

/// Fixed P&L thresholds in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Close when P&L is at or above this gain
    pub profit_take_threshold: Decimal,

    /// Close when P&L is at or below this (negative) amount
    pub stop_loss_threshold: Decimal,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            profit_take_threshold: dec!(50000),
            stop_loss_threshold: dec!(-25000),
        }
    }
}

impl ThresholdConfig {
    pub fn new(profit_take_threshold: Decimal, stop_loss_threshold: Decimal) -> Self {
        Self {
            profit_take_threshold,
            stop_loss_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.profit_take_threshold <= Decimal::ZERO {
            return Err(RiskError::InvalidConfig(format!(
                "profit_take_threshold must be positive, got {}",
                self.profit_take_threshold
            )));
        }
        if self.stop_loss_threshold >= Decimal::ZERO {
            return Err(RiskError::InvalidConfig(format!(
                "stop_loss_threshold must be negative, got {}",
                self.stop_loss_threshold
            )));
        }
        Ok(())
    }
}

/// Notional-tiered thresholds scaled by recent rate volatility.
///
/// Tiers as fractions of |notional| (profit / loss):
/// - 20M and above: 0.30% / 0.15%
/// - 10M and above: 0.50% / 0.25%
/// - below 10M:     1.00% / 0.50%
///
/// Both are multiplied by `1 + volatility * 10`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicThresholds {
    pub volatility: Decimal,
}

impl Default for DynamicThresholds {
    fn default() -> Self {
        Self {
            volatility: dec!(0.02),
        }
    }
}

impl DynamicThresholds {
    pub fn new(volatility: Decimal) -> Self {
        Self { volatility }
    }

    /// Thresholds for a position of the given notional.
    pub fn for_notional(&self, notional: Decimal) -> ThresholdConfig {
        let size = notional.abs();

        let (profit_pct, loss_pct) = if size >= dec!(20000000) {
            (dec!(0.003), dec!(0.0015))
        } else if size >= dec!(10000000) {
            (dec!(0.005), dec!(0.0025))
        } else {
            (dec!(0.01), dec!(0.005))
        };

        let scale = Decimal::ONE + self.volatility * dec!(10);

        ThresholdConfig {
            profit_take_threshold: (size * profit_pct * scale).round_dp(2),
            stop_loss_threshold: -(size * loss_pct * scale).round_dp(2),
        }
    }
}

/// How the engine picks thresholds for a position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    Fixed(ThresholdConfig),
    Dynamic(DynamicThresholds),
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::Fixed(ThresholdConfig::default())
    }
}

impl ThresholdPolicy {
    pub fn validate(&self) -> Result<()> {
        match self {
            ThresholdPolicy::Fixed(config) => config.validate(),
            ThresholdPolicy::Dynamic(dynamic) if dynamic.volatility < Decimal::ZERO => {
                Err(RiskError::InvalidConfig(format!(
                    "volatility must not be negative, got {}",
                    dynamic.volatility
                )))
            }
            ThresholdPolicy::Dynamic(_) => Ok(()),
        }
    }

    /// Resolve the thresholds that apply to a position of this notional.
    pub fn thresholds_for(&self, notional: Decimal) -> ThresholdConfig {
        match self {
            ThresholdPolicy::Fixed(config) => *config,
            ThresholdPolicy::Dynamic(dynamic) => dynamic.for_notional(notional),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_valid() {
        assert!(ThresholdConfig::default().validate().is_ok());
        assert!(ThresholdPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        assert!(ThresholdConfig::new(dec!(-1), dec!(-25000)).validate().is_err());
        assert!(ThresholdConfig::new(dec!(50000), dec!(10)).validate().is_err());
        assert!(ThresholdPolicy::Dynamic(DynamicThresholds::new(dec!(-0.1)))
            .validate()
            .is_err());
    }

    #[test]
    fn test_dynamic_tiers() {
        let dynamic = DynamicThresholds::new(dec!(0.02));

        // 25M: 0.3% * 1.2 = 90,000 ; 0.15% * 1.2 = 45,000
        let large = dynamic.for_notional(dec!(-25000000));
        assert_eq!(large.profit_take_threshold, dec!(90000));
        assert_eq!(large.stop_loss_threshold, dec!(-45000));

        // 10M: 0.5% * 1.2 = 60,000 ; 0.25% * 1.2 = 30,000
        let medium = dynamic.for_notional(dec!(10000000));
        assert_eq!(medium.profit_take_threshold, dec!(60000));
        assert_eq!(medium.stop_loss_threshold, dec!(-30000));

        // 5M: 1% * 1.2 = 60,000 ; 0.5% * 1.2 = 30,000
        let small = dynamic.for_notional(dec!(5000000));
        assert_eq!(small.profit_take_threshold, dec!(60000));
        assert_eq!(small.stop_loss_threshold, dec!(-30000));
    }

    #[test]
    fn test_dynamic_widens_with_volatility() {
        let calm = DynamicThresholds::new(dec!(0)).for_notional(dec!(10000000));
        let wild = DynamicThresholds::new(dec!(0.1)).for_notional(dec!(10000000));

        assert_eq!(calm.profit_take_threshold, dec!(50000));
        assert!(wild.profit_take_threshold > calm.profit_take_threshold);
        assert!(wild.stop_loss_threshold < calm.stop_loss_threshold);
    }
}
