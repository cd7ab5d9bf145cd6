//! Monitor runner: periodic evaluation cycles against the database.
//!
//! Handles:
//! - Polling positions and rates on a fixed interval
//! - Refreshing dynamic thresholds from recent rate history
//! - Publishing each cycle's signals to the signal log
//! - Graceful shutdown on Ctrl+C

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::models::Tenor;
use crate::pipeline::{run_cycle, CycleReport};
use crate::risk::{realized_volatility, DecisionEngine, DynamicThresholds, ThresholdPolicy};

/// Observations used to estimate volatility.
const VOLATILITY_LOOKBACK: i64 = 30;

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Seconds between evaluation cycles
    pub poll_interval_secs: u64,

    /// Threshold policy for the decision engine
    pub policy: ThresholdPolicy,

    /// Re-estimate dynamic volatility from rate history each cycle
    pub estimate_volatility: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            policy: ThresholdPolicy::default(),
            estimate_volatility: false,
        }
    }
}

/// Resolve the policy for the next cycle.
///
/// With `estimate_volatility` set and a dynamic policy, volatility comes from
/// the 10Y rate history. Too little history keeps the configured value.
pub async fn resolve_policy(db: &Database, config: &MonitorConfig) -> Result<ThresholdPolicy> {
    match config.policy {
        ThresholdPolicy::Dynamic(current) if config.estimate_volatility => {
            let history = db.rate_history(Tenor::Y10, VOLATILITY_LOOKBACK).await?;
            match realized_volatility(&history) {
                Some(volatility) => {
                    debug!(volatility = %volatility, observations = history.len(), "Estimated volatility");
                    Ok(ThresholdPolicy::Dynamic(DynamicThresholds::new(volatility)))
                }
                None => {
                    debug!(observations = history.len(), "Not enough history, keeping configured volatility");
                    Ok(ThresholdPolicy::Dynamic(current))
                }
            }
        }
        policy => Ok(policy),
    }
}

/// Main monitor runner.
pub struct Monitor {
    config: MonitorConfig,
    db: Arc<Database>,
    stats: MonitorStats,

    // Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl Monitor {
    /// Create a new monitor. The interval and threshold policy are validated up front.
    pub fn new(config: MonitorConfig, db: Arc<Database>) -> Result<Self> {
        if config.poll_interval_secs == 0 {
            bail!("Poll interval must be at least one second");
        }
        config.policy.validate()?;

        Ok(Self {
            config,
            db,
            stats: MonitorStats::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Main run loop.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            poll_interval = self.config.poll_interval_secs,
            policy = ?self.config.policy,
            "Starting monitor loop"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_secs));

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            poll_interval.tick().await;

            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.tick().await {
                // A failed cycle publishes nothing; the next tick retries
                error!(error = %e, "Evaluation cycle failed");
                self.stats.failed_cycles += 1;
            }
        }

        info!("Monitor stopped");
        Ok(())
    }

    /// Single evaluation cycle.
    pub async fn tick(&mut self) -> Result<CycleReport> {
        debug!("Monitor tick");

        let policy = resolve_policy(&self.db, &self.config).await?;
        let engine = DecisionEngine::new(policy)?;
        debug!(policy = ?engine.policy(), "Thresholds for this cycle");

        let db = self.db.as_ref();
        let report = run_cycle(db, db, db, &engine).await?;

        for failure in &report.failures {
            warn!(position_id = %failure.position_id, error = %failure.error, "Position not evaluated");
        }

        self.stats.record(&report);
        Ok(report)
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }
}

/// Running totals across cycles.
#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub signals: u64,
    pub close_signals: u64,
    pub position_errors: u64,
    pub last_portfolio_dv01: Decimal,
    pub last_total_pnl: Decimal,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl MonitorStats {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.signals += report.signals.len() as u64;
        self.close_signals += report.close_count() as u64;
        self.position_errors += report.failures.len() as u64;
        self.last_portfolio_dv01 = report.portfolio_dv01;
        self.last_total_pnl = report.total_pnl();
        self.last_cycle_at = Some(Utc::now());
    }
}

impl std::fmt::Display for MonitorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Monitor Statistics ===")?;
        writeln!(f, "Cycles:          {} (Failed: {})", self.cycles, self.failed_cycles)?;
        writeln!(f, "Signals:         {} (CLOSE: {})", self.signals, self.close_signals)?;
        writeln!(f, "Position Errors: {}", self.position_errors)?;
        writeln!(f, "Last Total P&L:  ${:.2}", self.last_total_pnl)?;
        writeln!(f, "Last DV01:       ${:.2}", self.last_portfolio_dv01)?;
        writeln!(
            f,
            "Last Cycle:      {}",
            self.last_cycle_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "Never".to_string())
        )?;
        Ok(())
    }
}
