//! Threshold policy that turns risk metrics into CLOSE/HOLD signals.

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Decision, RiskMetrics, SignalReason, TradeSignal};

use super::config::{ThresholdConfig, ThresholdPolicy};

/// Applies profit-take and stop-loss thresholds.
///
/// Boundaries are inclusive: P&L exactly at a threshold closes the position.
/// The engine only produces signals; acting on them (closing the position)
/// is left to whoever consumes the signal.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    policy: ThresholdPolicy,
}

impl DecisionEngine {
    /// Create an engine after validating the policy.
    pub fn new(policy: ThresholdPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// Decide for one position, returning the thresholds that applied.
    pub fn decide(&self, metrics: &RiskMetrics) -> (Decision, SignalReason, ThresholdConfig) {
        let thresholds = self.policy.thresholds_for(metrics.notional);

        let (decision, reason) = if metrics.pnl >= thresholds.profit_take_threshold {
            (Decision::Close, SignalReason::ProfitTarget)
        } else if metrics.pnl <= thresholds.stop_loss_threshold {
            (Decision::Close, SignalReason::StopLoss)
        } else {
            (Decision::Hold, SignalReason::WithinRange)
        };

        (decision, reason, thresholds)
    }

    /// Build the signal record for one position.
    pub fn signal(&self, metrics: &RiskMetrics, cycle_id: Uuid) -> TradeSignal {
        let (decision, reason, thresholds) = self.decide(metrics);

        let explanation = match reason {
            SignalReason::ProfitTarget => format!(
                "Profit target hit: ${:.2} >= ${:.2}",
                metrics.pnl, thresholds.profit_take_threshold
            ),
            SignalReason::StopLoss => format!(
                "Stop loss hit: ${:.2} <= ${:.2}",
                metrics.pnl, thresholds.stop_loss_threshold
            ),
            SignalReason::WithinRange => {
                format!("P&L ${:.2} within acceptable range", metrics.pnl)
            }
        };

        match decision {
            Decision::Close => warn!(
                position_id = %metrics.position_id,
                reason = reason.as_str(),
                pnl = %metrics.pnl,
                "CLOSE signal: {}", explanation
            ),
            Decision::Hold => debug!(
                position_id = %metrics.position_id,
                pnl = %metrics.pnl,
                "HOLD signal"
            ),
        }

        TradeSignal {
            signal_id: Uuid::new_v4(),
            cycle_id,
            position_id: metrics.position_id.clone(),
            decision,
            reason,
            pnl: metrics.pnl,
            dv01: metrics.dv01,
            profit_take_threshold: thresholds.profit_take_threshold,
            stop_loss_threshold: thresholds.stop_loss_threshold,
            explanation,
            generated_at: Utc::now(),
        }
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self {
            policy: ThresholdPolicy::default(),
        }
    }
}
