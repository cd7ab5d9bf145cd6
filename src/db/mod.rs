//! SQLite persistence for positions, market rates, and the signal log.
//!
//! Stores:
//! - Swap positions and their OPEN/CLOSED status
//! - Market rate observations per tenor and currency
//! - Every trade signal ever emitted (append-only audit log)
//! - Executions of CLOSE signals, kept apart so signal rows are never updated
//!
//! Decimals are stored as TEXT so values round-trip exactly. Timestamps are
//! fixed-width RFC 3339 strings, which keeps `ORDER BY` chronological.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RiskError;
use crate::models::{PositionStatus, RateSnapshot, SwapPosition, Tenor, TradeSignal};
use crate::pipeline::{OpenPositions, PositionFailure, PositionStore, RateProvider, SignalSink};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
    currency: String,
}

/// Stored position record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredPosition {
    pub id: String,
    pub trader_id: String,
    pub notional: String,
    pub fixed_rate: String,
    pub tenor: String,
    pub entry_date: String,
    pub status: String,
    pub closed_at: Option<String>,
}

/// Stored market rate observation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredRate {
    pub tenor: String,
    pub currency: String,
    pub rate: String,
    pub bid_rate: Option<String>,
    pub ask_rate: Option<String>,
    pub as_of: String,
}

/// Stored trade signal.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredSignal {
    pub signal_id: String,
    pub cycle_id: String,
    pub position_id: String,
    pub decision: String,
    pub reason: String,
    pub pnl: String,
    pub dv01: String,
    pub profit_take_threshold: String,
    pub stop_loss_threshold: String,
    pub explanation: String,
    pub executed: bool,
    pub generated_at: String,
}

/// A signal from the log together with whether its position was closed on it.
#[derive(Debug, Clone)]
pub struct SignalRecord {
    pub signal: TradeSignal,
    pub executed: bool,
}

impl TryFrom<StoredPosition> for SwapPosition {
    type Error = anyhow::Error;

    fn try_from(row: StoredPosition) -> Result<Self> {
        Ok(SwapPosition {
            notional: parse_decimal(&row.notional, "notional")?,
            fixed_rate: parse_decimal(&row.fixed_rate, "fixed_rate")?,
            entry_date: NaiveDate::parse_from_str(&row.entry_date, DATE_FORMAT)
                .with_context(|| format!("Bad entry_date '{}'", row.entry_date))?,
            status: PositionStatus::from_str(&row.status).map_err(anyhow::Error::msg)?,
            id: row.id,
            trader_id: row.trader_id,
            tenor: row.tenor,
        })
    }
}

impl TryFrom<StoredRate> for RateSnapshot {
    type Error = anyhow::Error;

    fn try_from(row: StoredRate) -> Result<Self> {
        Ok(RateSnapshot {
            tenor: Tenor::from_str(&row.tenor).map_err(anyhow::Error::msg)?,
            rate: parse_decimal(&row.rate, "rate")?,
            bid: row.bid_rate.as_deref().map(|v| parse_decimal(v, "bid_rate")).transpose()?,
            ask: row.ask_rate.as_deref().map(|v| parse_decimal(v, "ask_rate")).transpose()?,
            as_of: parse_timestamp(&row.as_of)?,
            currency: row.currency,
        })
    }
}

impl TryFrom<StoredSignal> for SignalRecord {
    type Error = anyhow::Error;

    fn try_from(row: StoredSignal) -> Result<Self> {
        let signal = TradeSignal {
            signal_id: Uuid::parse_str(&row.signal_id).context("Bad signal_id")?,
            cycle_id: Uuid::parse_str(&row.cycle_id).context("Bad cycle_id")?,
            position_id: row.position_id,
            decision: row.decision.parse().map_err(anyhow::Error::msg)?,
            reason: row.reason.parse().map_err(anyhow::Error::msg)?,
            pnl: parse_decimal(&row.pnl, "pnl")?,
            dv01: parse_decimal(&row.dv01, "dv01")?,
            profit_take_threshold: parse_decimal(&row.profit_take_threshold, "profit_take_threshold")?,
            stop_loss_threshold: parse_decimal(&row.stop_loss_threshold, "stop_loss_threshold")?,
            explanation: row.explanation,
            generated_at: parse_timestamp(&row.generated_at)?,
        };

        Ok(SignalRecord {
            signal,
            executed: row.executed,
        })
    }
}

fn parse_decimal(value: &str, field: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Bad {} '{}'", field, value))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Bad timestamp '{}'", value))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Each in-memory connection is its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self {
            pool,
            currency: "USD".to_string(),
        };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS swap_positions (
                id TEXT PRIMARY KEY,
                trader_id TEXT NOT NULL,
                notional TEXT NOT NULL,
                fixed_rate TEXT NOT NULL,
                tenor TEXT NOT NULL,
                entry_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'OPEN',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                closed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_rates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenor TEXT NOT NULL,
                currency TEXT NOT NULL DEFAULT 'USD',
                rate TEXT NOT NULL,
                bid_rate TEXT,
                ask_rate TEXT,
                as_of TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_signals (
                signal_id TEXT PRIMARY KEY,
                cycle_id TEXT NOT NULL,
                position_id TEXT NOT NULL,
                decision TEXT NOT NULL,
                reason TEXT NOT NULL,
                pnl TEXT NOT NULL,
                dv01 TEXT NOT NULL,
                profit_take_threshold TEXT NOT NULL,
                stop_loss_threshold TEXT NOT NULL,
                explanation TEXT NOT NULL,
                recommended_action TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                FOREIGN KEY (position_id) REFERENCES swap_positions(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_executions (
                signal_id TEXT PRIMARY KEY,
                position_id TEXT NOT NULL,
                executed_at TEXT NOT NULL,
                FOREIGN KEY (signal_id) REFERENCES trade_signals(signal_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_market_rates_tenor ON market_rates(tenor, currency, as_of)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trade_signals_position ON trade_signals(position_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trade_signals_time ON trade_signals(generated_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Positions ====================

    /// Insert a position, or update its terms if it exists. Status is never touched.
    pub async fn save_position(&self, position: &SwapPosition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO swap_positions (id, trader_id, notional, fixed_rate, tenor, entry_date, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                trader_id = excluded.trader_id,
                notional = excluded.notional,
                fixed_rate = excluded.fixed_rate,
                tenor = excluded.tenor,
                entry_date = excluded.entry_date
            "#,
        )
        .bind(&position.id)
        .bind(&position.trader_id)
        .bind(position.notional.to_string())
        .bind(position.fixed_rate.to_string())
        .bind(&position.tenor)
        .bind(position.entry_date.format(DATE_FORMAT).to_string())
        .bind(position.status.as_str())
        .execute(&self.pool)
        .await?;

        debug!(position_id = %position.id, "Position saved");
        Ok(())
    }

    /// Get a position by id.
    pub async fn get_position(&self, id: &str) -> Result<Option<SwapPosition>> {
        let row = sqlx::query_as::<_, StoredPosition>(
            "SELECT id, trader_id, notional, fixed_rate, tenor, entry_date, status, closed_at FROM swap_positions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SwapPosition::try_from).transpose()
    }

    /// Get all positions, newest trades first.
    pub async fn get_positions(&self) -> Result<Vec<StoredPosition>> {
        sqlx::query_as::<_, StoredPosition>(
            "SELECT id, trader_id, notional, fixed_rate, tenor, entry_date, status, closed_at FROM swap_positions ORDER BY entry_date DESC, id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch positions")
    }

    /// Get open positions in id order.
    ///
    /// Rows that cannot be decoded come back as `InvalidPosition` failures.
    pub async fn load_open_positions(&self) -> Result<OpenPositions> {
        let rows = sqlx::query_as::<_, StoredPosition>(
            "SELECT id, trader_id, notional, fixed_rate, tenor, entry_date, status, closed_at FROM swap_positions WHERE status = 'OPEN' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch open positions")?;

        let mut book = OpenPositions::default();
        for row in rows {
            let id = row.id.clone();
            match SwapPosition::try_from(row) {
                Ok(position) => book.positions.push(position),
                Err(e) => {
                    warn!(position_id = %id, error = %e, "Malformed position row");
                    book.rejected.push(PositionFailure {
                        error: RiskError::invalid_position(&id, format!("{:#}", e)),
                        position_id: id,
                    });
                }
            }
        }

        Ok(book)
    }

    /// Close a position and record its CLOSE signals as executed.
    pub async fn close_position(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE swap_positions SET status = 'CLOSED', closed_at = ? WHERE id = ? AND status = 'OPEN'",
        )
        .bind(format_timestamp(Utc::now()))
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM swap_positions WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

            if exists.is_none() {
                bail!("Position {} not found", id);
            }
            return Err(RiskError::InvalidTransition {
                position_id: id.to_string(),
            }
            .into());
        }

        sqlx::query(
            r#"
            INSERT INTO signal_executions (signal_id, position_id, executed_at)
            SELECT signal_id, position_id, ? FROM trade_signals
            WHERE position_id = ? AND decision = 'CLOSE'
            "#,
        )
        .bind(format_timestamp(Utc::now()))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(position_id = %id, "Position closed");
        Ok(())
    }

    // ==================== Market Rates ====================

    /// Store a batch of rate observations.
    pub async fn store_rates(&self, rates: &[RateSnapshot]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for rate in rates {
            sqlx::query(
                "INSERT INTO market_rates (tenor, currency, rate, bid_rate, ask_rate, as_of) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(rate.tenor.as_str())
            .bind(&rate.currency)
            .bind(rate.rate.to_string())
            .bind(rate.bid.map(|v| v.to_string()))
            .bind(rate.ask.map(|v| v.to_string()))
            .bind(format_timestamp(rate.as_of))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(count = rates.len(), "Stored market rates");
        Ok(rates.len())
    }

    /// Latest observation per tenor for the configured currency.
    pub async fn get_latest_rates(&self) -> Result<Vec<RateSnapshot>> {
        let rows = sqlx::query_as::<_, StoredRate>(
            r#"
            SELECT tenor, currency, rate, bid_rate, ask_rate, as_of FROM market_rates m
            WHERE currency = ?
              AND as_of = (
                SELECT MAX(as_of) FROM market_rates
                WHERE tenor = m.tenor AND currency = m.currency
              )
            ORDER BY id
            "#,
        )
        .bind(&self.currency)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch latest rates")?;

        rows.into_iter().map(RateSnapshot::try_from).collect()
    }

    /// Second most recent observation per tenor, for trend display.
    pub async fn get_previous_rates(&self) -> Result<Vec<RateSnapshot>> {
        let rows = sqlx::query_as::<_, StoredRate>(
            r#"
            SELECT tenor, currency, rate, bid_rate, ask_rate, as_of FROM market_rates m
            WHERE currency = ?
              AND as_of = (
                SELECT MAX(as_of) FROM market_rates
                WHERE tenor = m.tenor AND currency = m.currency
                  AND as_of < (
                    SELECT MAX(as_of) FROM market_rates
                    WHERE tenor = m.tenor AND currency = m.currency
                  )
              )
            ORDER BY id
            "#,
        )
        .bind(&self.currency)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch previous rates")?;

        rows.into_iter().map(RateSnapshot::try_from).collect()
    }

    /// Most recent `limit` rates for a tenor, oldest first.
    pub async fn rate_history(&self, tenor: Tenor, limit: i64) -> Result<Vec<Decimal>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT rate FROM market_rates WHERE tenor = ? AND currency = ? ORDER BY as_of DESC LIMIT ?",
        )
        .bind(tenor.as_str())
        .bind(&self.currency)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch rate history")?;

        rows.into_iter()
            .rev()
            .map(|(rate,)| parse_decimal(&rate, "rate"))
            .collect()
    }

    // ==================== Signals ====================

    /// Append a cycle's signals in one transaction.
    pub async fn record_signals(&self, signals: &[TradeSignal]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for signal in signals {
            sqlx::query(
                r#"
                INSERT INTO trade_signals (
                    signal_id, cycle_id, position_id, decision, reason, pnl, dv01,
                    profit_take_threshold, stop_loss_threshold, explanation,
                    recommended_action, generated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(signal.signal_id.to_string())
            .bind(signal.cycle_id.to_string())
            .bind(&signal.position_id)
            .bind(signal.decision.as_str())
            .bind(signal.reason.as_str())
            .bind(signal.pnl.to_string())
            .bind(signal.dv01.to_string())
            .bind(signal.profit_take_threshold.to_string())
            .bind(signal.stop_loss_threshold.to_string())
            .bind(&signal.explanation)
            .bind(signal.recommended_action())
            .bind(format_timestamp(signal.generated_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(count = signals.len(), "Recorded signals");
        Ok(())
    }

    /// Most recent signals, newest first.
    pub async fn get_recent_signals(&self, limit: i64) -> Result<Vec<SignalRecord>> {
        let rows = sqlx::query_as::<_, StoredSignal>(
            r#"
            SELECT s.*, EXISTS(SELECT 1 FROM signal_executions e WHERE e.signal_id = s.signal_id) AS executed
            FROM trade_signals s ORDER BY s.generated_at DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch signals")?;

        rows.into_iter().map(SignalRecord::try_from).collect()
    }

    /// Full signal history of one position, oldest first.
    pub async fn get_signals_for_position(&self, position_id: &str) -> Result<Vec<SignalRecord>> {
        let rows = sqlx::query_as::<_, StoredSignal>(
            r#"
            SELECT s.*, EXISTS(SELECT 1 FROM signal_executions e WHERE e.signal_id = s.signal_id) AS executed
            FROM trade_signals s WHERE s.position_id = ? ORDER BY s.generated_at
            "#,
        )
        .bind(position_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch position signals")?;

        rows.into_iter().map(SignalRecord::try_from).collect()
    }

    /// Signal statistics: (total, close, executed).
    pub async fn signal_counts(&self) -> Result<(i64, i64, i64)> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trade_signals")
            .fetch_one(&self.pool)
            .await?;

        let (close,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trade_signals WHERE decision = 'CLOSE'")
                .fetch_one(&self.pool)
                .await?;

        let (executed,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM signal_executions")
                .fetch_one(&self.pool)
                .await?;

        Ok((total, close, executed))
    }
}

#[async_trait]
impl RateProvider for Database {
    async fn get_current_rates(&self) -> crate::error::Result<Vec<RateSnapshot>> {
        self.get_latest_rates()
            .await
            .map_err(|e| RiskError::unavailable("sqlite market_rates", format!("{:#}", e)))
    }
}

#[async_trait]
impl PositionStore for Database {
    async fn get_open_positions(&self) -> crate::error::Result<Vec<SwapPosition>> {
        Ok(self.get_open_book().await?.positions)
    }

    async fn get_open_book(&self) -> crate::error::Result<OpenPositions> {
        self.load_open_positions()
            .await
            .map_err(|e| RiskError::unavailable("sqlite swap_positions", format!("{:#}", e)))
    }
}

#[async_trait]
impl SignalSink for Database {
    async fn publish(&self, signals: &[TradeSignal]) -> crate::error::Result<()> {
        self.record_signals(signals)
            .await
            .map_err(|e| RiskError::unavailable("sqlite trade_signals", format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, RateSet};
    use crate::pipeline::run_cycle;
    use crate::risk::DecisionEngine;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn memory_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn make_position(id: &str, notional: Decimal, fixed: Decimal, tenor: Tenor) -> SwapPosition {
        SwapPosition::new(id, "trader-1", notional, fixed, tenor, Utc::now().date_naive())
    }

    #[tokio::test]
    async fn test_position_round_trip() {
        let db = memory_db().await;
        let pos = make_position("POS001", dec!(-25000000), dec!(4.25), Tenor::Y2);
        db.save_position(&pos).await.unwrap();

        let loaded = db.get_position("POS001").await.unwrap().unwrap();
        assert_eq!(loaded, pos);
        assert!(db.get_position("POS404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_and_previous_rates() {
        let db = memory_db().await;
        let now = Utc::now();
        let earlier = now - Duration::minutes(30);

        db.store_rates(&[
            RateSnapshot::new(Tenor::Y5, dec!(4.30), earlier),
            RateSnapshot::new(Tenor::Y10, dec!(4.50), earlier),
        ])
        .await
        .unwrap();
        db.store_rates(&[RateSnapshot::new(Tenor::Y5, dec!(4.35), now)])
            .await
            .unwrap();

        let latest = db.get_latest_rates().await.unwrap();
        assert_eq!(latest.len(), 2);
        let five = latest.iter().find(|r| r.tenor == Tenor::Y5).unwrap();
        assert_eq!(five.rate, dec!(4.35));

        let previous = db.get_previous_rates().await.unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].rate, dec!(4.30));

        assert_eq!(db.rate_history(Tenor::Y5, 10).await.unwrap(), vec![dec!(4.30), dec!(4.35)]);
    }

    #[tokio::test]
    async fn test_cycle_against_database() {
        let db = memory_db().await;
        db.save_position(&make_position("POS001", dec!(10000000), dec!(4.00), Tenor::Y10))
            .await
            .unwrap();
        db.save_position(&make_position("POS002", dec!(5000000), dec!(4.35), Tenor::Y5))
            .await
            .unwrap();
        db.store_rates(&[
            RateSnapshot::new(Tenor::Y5, dec!(4.35), Utc::now()),
            RateSnapshot::new(Tenor::Y10, dec!(3.50), Utc::now()),
        ])
        .await
        .unwrap();

        let report = run_cycle(&db, &db, &db, &DecisionEngine::default()).await.unwrap();
        assert_eq!(report.signals.len(), 2);

        let history = db.get_signals_for_position("POS001").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].signal.decision, Decision::Close);
        assert_eq!(history[0].signal.pnl, dec!(425000));
        assert!(!history[0].executed);

        assert_eq!(db.signal_counts().await.unwrap(), (2, 1, 0));
    }

    #[tokio::test]
    async fn test_close_position_is_one_way() {
        let db = memory_db().await;
        let pos = make_position("POS001", dec!(10000000), dec!(4.00), Tenor::Y10);
        db.save_position(&pos).await.unwrap();

        let engine = DecisionEngine::default();
        let signal = engine.signal(
            &crate::risk::RiskCalculator::evaluate(
                &pos,
                &RateSet::from_snapshots(vec![RateSnapshot::new(Tenor::Y10, dec!(3.50), Utc::now())]),
            )
            .unwrap(),
            Uuid::new_v4(),
        );
        db.record_signals(&[signal]).await.unwrap();

        db.close_position("POS001").await.unwrap();

        let closed = db.get_position("POS001").await.unwrap().unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert!(db.load_open_positions().await.unwrap().positions.is_empty());
        assert_eq!(db.signal_counts().await.unwrap(), (1, 1, 1));

        // Re-saving terms must not reopen it
        db.save_position(&pos).await.unwrap();
        assert!(db.load_open_positions().await.unwrap().positions.is_empty());

        assert!(db.close_position("POS001").await.is_err());
        assert!(db.close_position("POS404").await.is_err());
    }

    #[tokio::test]
    async fn test_closing_leaves_signal_rows_untouched() {
        let db = memory_db().await;
        db.save_position(&make_position("POS001", dec!(10000000), dec!(4.00), Tenor::Y10))
            .await
            .unwrap();
        db.store_rates(&[RateSnapshot::new(Tenor::Y10, dec!(3.50), Utc::now())])
            .await
            .unwrap();
        run_cycle(&db, &db, &db, &DecisionEngine::default()).await.unwrap();

        let before: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT signal_id, decision, pnl, explanation, generated_at FROM trade_signals ORDER BY signal_id",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();

        db.close_position("POS001").await.unwrap();

        let after: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT signal_id, decision, pnl, explanation, generated_at FROM trade_signals ORDER BY signal_id",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();
        assert_eq!(before, after);

        let history = db.get_signals_for_position("POS001").await.unwrap();
        assert!(history[0].executed);
        assert!(db.get_recent_signals(10).await.unwrap()[0].executed);
    }

    #[tokio::test]
    async fn test_malformed_row_reported_by_cycle() {
        let db = memory_db().await;
        db.save_position(&make_position("POS001", dec!(10000000), dec!(4.00), Tenor::Y10))
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO swap_positions (id, trader_id, notional, fixed_rate, tenor, entry_date, status) VALUES ('POS002', 'trader-1', '1e7x', '4.10', '10Y', '2024-01-15', 'OPEN')",
        )
        .execute(&db.pool)
        .await
        .unwrap();
        db.store_rates(&[RateSnapshot::new(Tenor::Y10, dec!(3.50), Utc::now())])
            .await
            .unwrap();

        let report = run_cycle(&db, &db, &db, &DecisionEngine::default()).await.unwrap();

        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].position_id, "POS001");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].position_id, "POS002");
        assert!(matches!(report.failures[0].error, RiskError::InvalidPosition { .. }));
    }

    #[tokio::test]
    async fn test_bid_ask_round_trip() {
        let db = memory_db().await;
        let now = Utc::now();
        db.store_rates(&[
            RateSnapshot::new(Tenor::Y2, dec!(4.15), now).with_quotes(dec!(4.14), dec!(4.16)),
            RateSnapshot::new(Tenor::Y5, dec!(4.35), now),
        ])
        .await
        .unwrap();

        let latest = RateSet::from_snapshots(db.get_latest_rates().await.unwrap());
        let two = latest.get(Tenor::Y2).unwrap();
        assert_eq!(two.bid, Some(dec!(4.14)));
        assert_eq!(two.ask, Some(dec!(4.16)));
        assert_eq!(two.spread(), Some(dec!(0.02)));
        assert_eq!(latest.get(Tenor::Y5).unwrap().bid, None);
    }
}
