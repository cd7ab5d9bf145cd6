//! Risk evaluation: P&L/DV01 pricing, threshold config, and the decision engine.

mod calculator;
mod config;
mod decision;
mod volatility;

pub use calculator::{portfolio_dv01, RiskCalculator};
pub use config::{DynamicThresholds, ThresholdConfig, ThresholdPolicy};
pub use decision::DecisionEngine;
pub use volatility::realized_volatility;
