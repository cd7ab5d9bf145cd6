//! Data models for rates, swap positions, risk metrics, and signals.

mod metrics;
mod position;
mod rate;
mod signal;

pub use metrics::RiskMetrics;
pub use position::{PositionStatus, SwapPosition};
pub use rate::{RateSet, RateSnapshot, Tenor};
pub use signal::{Decision, SignalReason, TradeSignal};
