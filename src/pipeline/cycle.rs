//! One evaluation cycle: price every open position against a frozen rate set
//! and decide CLOSE/HOLD.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, RiskError};
use crate::models::{Decision, RateSet, RiskMetrics, SwapPosition, TradeSignal};
use crate::risk::{portfolio_dv01, DecisionEngine, RiskCalculator};

use super::providers::{OpenPositions, PositionStore, RateProvider, SignalSink};

/// A position that could not be evaluated this cycle.
#[derive(Debug)]
pub struct PositionFailure {
    pub position_id: String,
    pub error: RiskError,
}

/// Outcome of one evaluation pass.
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: Uuid,

    /// Valuation time of the rate set used
    pub as_of: DateTime<Utc>,

    /// Signals in the order positions were supplied
    pub signals: Vec<TradeSignal>,

    /// Metrics behind each signal, same order
    pub metrics: Vec<RiskMetrics>,

    /// Positions excluded by a per-position error, in input order
    pub failures: Vec<PositionFailure>,

    /// Closed positions that were submitted and ignored
    pub skipped_closed: usize,

    /// Net signed DV01 of the priced positions
    pub portfolio_dv01: Decimal,
}

impl CycleReport {
    pub fn close_count(&self) -> usize {
        self.signals.iter().filter(|s| s.is_close()).count()
    }

    pub fn hold_count(&self) -> usize {
        self.signals
            .iter()
            .filter(|s| s.decision == Decision::Hold)
            .count()
    }

    pub fn total_pnl(&self) -> Decimal {
        self.metrics
            .iter()
            .map(|m| m.pnl)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Cycle {} ===", self.cycle_id)?;
        writeln!(f, "Rates as of:     {}", self.as_of.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "Signals:         {} (CLOSE: {}, HOLD: {})",
            self.signals.len(), self.close_count(), self.hold_count())?;
        writeln!(f, "Failures:        {}", self.failures.len())?;
        writeln!(f, "Skipped Closed:  {}", self.skipped_closed)?;
        writeln!(f, "Total P&L:       ${:.2}", self.total_pnl())?;
        writeln!(f, "Portfolio DV01:  ${:.2}", self.portfolio_dv01)?;
        Ok(())
    }
}

/// Evaluate positions against one immutable rate set.
///
/// Per-position errors are collected in the report and never stop the
/// remaining positions. Closed positions produce nothing.
pub fn evaluate_cycle(
    positions: &[SwapPosition],
    rates: &RateSet,
    engine: &DecisionEngine,
) -> CycleReport {
    let cycle_id = Uuid::new_v4();
    let mut signals = Vec::with_capacity(positions.len());
    let mut metrics = Vec::with_capacity(positions.len());
    let mut failures = Vec::new();
    let mut skipped_closed = 0;

    for position in positions {
        if !position.is_open() {
            debug!(position_id = %position.id, "Skipping closed position");
            skipped_closed += 1;
            continue;
        }

        match RiskCalculator::evaluate(position, rates) {
            Ok(m) => {
                signals.push(engine.signal(&m, cycle_id));
                metrics.push(m);
            }
            Err(error) => {
                warn!(position_id = %position.id, error = %error, "Position excluded from cycle");
                failures.push(PositionFailure {
                    position_id: position.id.clone(),
                    error,
                });
            }
        }
    }

    let portfolio_dv01 = portfolio_dv01(&metrics);

    CycleReport {
        cycle_id,
        as_of: rates.as_of(),
        signals,
        metrics,
        failures,
        skipped_closed,
        portfolio_dv01,
    }
}

/// Fetch inputs, evaluate, and publish the cycle's signals.
///
/// Rates and positions are fetched concurrently. If either source fails, or
/// no rate at all is quoted, the cycle aborts before anything is published.
/// Entries the store could not decode are reported first in `failures`.
pub async fn run_cycle(
    rate_provider: &dyn RateProvider,
    position_store: &dyn PositionStore,
    sink: &dyn SignalSink,
    engine: &DecisionEngine,
) -> Result<CycleReport> {
    let (snapshots, book) = tokio::try_join!(
        rate_provider.get_current_rates(),
        position_store.get_open_book()
    )?;
    let OpenPositions { positions, rejected } = book;

    let rates = RateSet::from_snapshots(snapshots);
    if rates.is_empty() {
        return Err(RiskError::unavailable("rates", "no rates quoted"));
    }

    let missing = rates.missing_tenors();
    if !missing.is_empty() {
        warn!(missing = ?missing, "Rate set incomplete");
    }

    let rejected_count = rejected.len();
    let mut report = evaluate_cycle(&positions, &rates, engine);
    report.failures.splice(0..0, rejected);

    if !report.signals.is_empty() {
        sink.publish(&report.signals).await?;
    }

    info!(
        cycle_id = %report.cycle_id,
        positions = positions.len(),
        signals = report.signals.len(),
        close = report.close_count(),
        failures = report.failures.len(),
        rejected = rejected_count,
        portfolio_dv01 = %report.portfolio_dv01,
        "Cycle complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RateSnapshot, SignalReason, Tenor};
    use crate::pipeline::providers::{InMemoryPositions, SignalLog, StaticRateFeed};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    struct DownStore;

    #[async_trait]
    impl PositionStore for DownStore {
        async fn get_open_positions(&self) -> Result<Vec<SwapPosition>> {
            Err(RiskError::unavailable("positions", "connection refused"))
        }
    }

    struct DownFeed;

    #[async_trait]
    impl RateProvider for DownFeed {
        async fn get_current_rates(&self) -> Result<Vec<RateSnapshot>> {
            Err(RiskError::unavailable("rates", "timeout"))
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn make_position(id: &str, notional: Decimal, fixed: Decimal, tenor: Tenor) -> SwapPosition {
        SwapPosition::new(id, "trader-1", notional, fixed, tenor, today())
    }

    fn sample_positions() -> Vec<SwapPosition> {
        vec![
            make_position("POS001", dec!(10000000), dec!(4.10), Tenor::Y5),
            make_position("POS002", dec!(-25000000), dec!(4.25), Tenor::Y2),
            make_position("POS003", dec!(5000000), dec!(4.52), Tenor::Y10),
        ]
    }

    fn rates_without(tenor: Option<Tenor>) -> RateSet {
        let now = Utc::now();
        RateSet::from_snapshots(
            StaticRateFeed::sample_curve()
                .into_iter()
                .filter(|(t, _)| Some(*t) != tenor)
                .map(|(t, r)| RateSnapshot::new(t, r, now)),
        )
    }

    #[test]
    fn test_signals_keep_input_order() {
        let report = evaluate_cycle(&sample_positions(), &rates_without(None), &DecisionEngine::default());

        let ids: Vec<_> = report.signals.iter().map(|s| s.position_id.as_str()).collect();
        assert_eq!(ids, vec!["POS001", "POS002", "POS003"]);
        assert!(report.failures.is_empty());
        assert!(report.signals.iter().all(|s| s.cycle_id == report.cycle_id));
    }

    #[test]
    fn test_receive_fixed_scenario_closes() {
        let now = Utc::now();
        let rates = RateSet::from_snapshots(vec![RateSnapshot::new(Tenor::Y10, dec!(3.50), now)]);
        let positions = vec![make_position("POS010", dec!(10000000), dec!(4.00), Tenor::Y10)];

        let report = evaluate_cycle(&positions, &rates, &DecisionEngine::default());

        assert_eq!(report.metrics[0].pnl, dec!(425000));
        assert_eq!(report.signals[0].decision, Decision::Close);
        assert_eq!(report.signals[0].reason, SignalReason::ProfitTarget);
    }

    #[test]
    fn test_missing_rate_isolated_to_affected_positions() {
        let mut positions = sample_positions();
        positions.push(make_position("POS004", dec!(3000000), dec!(4.00), Tenor::Y5));

        let report = evaluate_cycle(&positions, &rates_without(Some(Tenor::Y5)), &DecisionEngine::default());

        let ids: Vec<_> = report.signals.iter().map(|s| s.position_id.as_str()).collect();
        assert_eq!(ids, vec!["POS002", "POS003"]);

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].position_id, "POS001");
        assert_eq!(report.failures[1].position_id, "POS004");
        assert!(report
            .failures
            .iter()
            .all(|f| matches!(f.error, RiskError::MissingRate { tenor: Tenor::Y5, .. })));
    }

    #[test]
    fn test_invalid_position_isolated() {
        let mut positions = sample_positions();
        positions[1].notional = Decimal::ZERO;

        let report = evaluate_cycle(&positions, &rates_without(None), &DecisionEngine::default());

        assert_eq!(report.signals.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, RiskError::InvalidPosition { .. }));
    }

    #[test]
    fn test_closed_positions_are_excluded() {
        let mut positions = sample_positions();
        positions[0].close().unwrap();

        let report = evaluate_cycle(&positions, &rates_without(None), &DecisionEngine::default());

        assert_eq!(report.skipped_closed, 1);
        assert!(report.signals.iter().all(|s| s.position_id != "POS001"));
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_run_cycle_publishes_signals() {
        let feed = StaticRateFeed::default();
        let store = InMemoryPositions::new(sample_positions());
        let sink = SignalLog::new();

        let report = assert_ok!(run_cycle(&feed, &store, &sink, &DecisionEngine::default()).await);

        assert_eq!(report.signals.len(), 3);
        assert_eq!(sink.len().await, 3);
    }

    #[tokio::test]
    async fn test_store_down_aborts_cycle() {
        let feed = StaticRateFeed::default();
        let sink = SignalLog::new();

        let err = assert_err!(run_cycle(&feed, &DownStore, &sink, &DecisionEngine::default()).await);

        assert!(matches!(err, RiskError::ProviderUnavailable { .. }));
        assert_eq!(sink.len().await, 0);
    }

    #[tokio::test]
    async fn test_rate_feed_down_aborts_cycle() {
        let store = InMemoryPositions::new(sample_positions());
        let sink = SignalLog::new();

        let err = assert_err!(run_cycle(&DownFeed, &store, &sink, &DecisionEngine::default()).await);

        assert!(matches!(err, RiskError::ProviderUnavailable { .. }));
        assert_eq!(sink.len().await, 0);
    }

    #[tokio::test]
    async fn test_empty_curve_aborts_cycle() {
        let feed = StaticRateFeed::new(vec![]);
        let store = InMemoryPositions::new(sample_positions());
        let sink = SignalLog::new();

        assert_err!(run_cycle(&feed, &store, &sink, &DecisionEngine::default()).await);
        assert_eq!(sink.len().await, 0);
    }

    #[tokio::test]
    async fn test_closed_position_stops_signalling() {
        let feed = StaticRateFeed::default();
        let store = InMemoryPositions::new(sample_positions());
        let sink = SignalLog::new();
        let engine = DecisionEngine::default();

        assert_ok!(run_cycle(&feed, &store, &sink, &engine).await);
        store.close("POS002").await.unwrap();
        let second = assert_ok!(run_cycle(&feed, &store, &sink, &engine).await);

        assert_eq!(second.signals.len(), 2);
        let log = sink.signals().await;
        assert_eq!(log.iter().filter(|s| s.position_id == "POS002").count(), 1);
    }

    struct BookWithBadEntry {
        positions: Vec<SwapPosition>,
    }

    #[async_trait]
    impl PositionStore for BookWithBadEntry {
        async fn get_open_positions(&self) -> Result<Vec<SwapPosition>> {
            Ok(self.positions.clone())
        }

        async fn get_open_book(&self) -> Result<OpenPositions> {
            Ok(OpenPositions {
                positions: self.positions.clone(),
                rejected: vec![PositionFailure {
                    position_id: "POS999".to_string(),
                    error: RiskError::invalid_position("POS999", "Bad notional '1e7x'"),
                }],
            })
        }
    }

    #[tokio::test]
    async fn test_undecodable_entries_reported_as_failures() {
        let feed = StaticRateFeed::default();
        let store = BookWithBadEntry {
            positions: sample_positions(),
        };
        let sink = SignalLog::new();

        let report = assert_ok!(run_cycle(&feed, &store, &sink, &DecisionEngine::default()).await);

        assert_eq!(report.signals.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].position_id, "POS999");
        assert!(matches!(report.failures[0].error, RiskError::InvalidPosition { .. }));
    }

    #[test]
    fn test_oversized_position_does_not_stop_cycle() {
        let mut positions = sample_positions();
        positions.insert(1, make_position("POS100", Decimal::MAX, dec!(4.00), Tenor::Y30));

        let report = evaluate_cycle(&positions, &rates_without(None), &DecisionEngine::default());

        assert_eq!(report.signals.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].position_id, "POS100");
        assert!(matches!(report.failures[0].error, RiskError::InvalidPosition { .. }));
    }
}
