//! Trade signals emitted by the decision engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the trader should do with the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Close,
    Hold,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Close => "CLOSE",
            Decision::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLOSE" => Ok(Decision::Close),
            "HOLD" => Ok(Decision::Hold),
            other => Err(format!("unknown decision '{}'", other)),
        }
    }
}

/// Which rule produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    ProfitTarget,
    StopLoss,
    WithinRange,
}

impl SignalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalReason::ProfitTarget => "profit_target",
            SignalReason::StopLoss => "stop_loss",
            SignalReason::WithinRange => "within_range",
        }
    }

    pub fn recommended_action(&self) -> &'static str {
        match self {
            SignalReason::ProfitTarget => "Close position to lock in profit",
            SignalReason::StopLoss => "Close position to limit loss",
            SignalReason::WithinRange => "Continue monitoring",
        }
    }
}

impl FromStr for SignalReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profit_target" => Ok(SignalReason::ProfitTarget),
            "stop_loss" => Ok(SignalReason::StopLoss),
            "within_range" => Ok(SignalReason::WithinRange),
            other => Err(format!("unknown signal reason '{}'", other)),
        }
    }
}

/// Append-only decision record for one position in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub signal_id: Uuid,

    /// Evaluation cycle that produced this signal
    pub cycle_id: Uuid,

    pub position_id: String,
    pub decision: Decision,
    pub reason: SignalReason,
    pub pnl: Decimal,
    pub dv01: Decimal,

    /// Thresholds in force when the decision was made
    pub profit_take_threshold: Decimal,
    pub stop_loss_threshold: Decimal,

    /// Human-readable explanation of the decision
    pub explanation: String,

    pub generated_at: DateTime<Utc>,
}

impl TradeSignal {
    pub fn is_close(&self) -> bool {
        self.decision == Decision::Close
    }

    pub fn recommended_action(&self) -> &'static str {
        self.reason.recommended_action()
    }
}
