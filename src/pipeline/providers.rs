//! Collaborator interfaces for the evaluation cycle, plus in-memory versions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

use crate::error::{Result, RiskError};
use crate::models::{RateSnapshot, SwapPosition, Tenor, TradeSignal};

use super::cycle::PositionFailure;

/// Source of current par swap rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// One snapshot per supported tenor that is currently quoted.
    async fn get_current_rates(&self) -> Result<Vec<RateSnapshot>>;
}

/// Open positions plus stored entries that could not be decoded.
#[derive(Debug, Default)]
pub struct OpenPositions {
    pub positions: Vec<SwapPosition>,

    /// One `InvalidPosition` failure per undecodable entry
    pub rejected: Vec<PositionFailure>,
}

/// Source of the trader's open positions.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Open positions in a stable order.
    async fn get_open_positions(&self) -> Result<Vec<SwapPosition>>;

    /// Open positions together with entries the store holds but cannot decode.
    ///
    /// Stores that always hold well-formed positions keep the default.
    async fn get_open_book(&self) -> Result<OpenPositions> {
        Ok(OpenPositions {
            positions: self.get_open_positions().await?,
            rejected: Vec::new(),
        })
    }
}

/// Destination for the signals of a completed cycle.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Append a batch of signals. Either all are accepted or none.
    async fn publish(&self, signals: &[TradeSignal]) -> Result<()>;
}

/// Fixed curve, stamped with the time of each request.
#[derive(Debug, Clone)]
pub struct StaticRateFeed {
    curve: Vec<(Tenor, Decimal)>,
}

impl StaticRateFeed {
    pub fn new(curve: Vec<(Tenor, Decimal)>) -> Self {
        Self { curve }
    }

    /// Sample USD SOFR par curve.
    pub fn sample_curve() -> Vec<(Tenor, Decimal)> {
        vec![
            (Tenor::Y2, dec!(4.15)),
            (Tenor::Y5, dec!(4.35)),
            (Tenor::Y10, dec!(4.52)),
            (Tenor::Y30, dec!(4.68)),
        ]
    }
}

impl Default for StaticRateFeed {
    fn default() -> Self {
        Self::new(Self::sample_curve())
    }
}

#[async_trait]
impl RateProvider for StaticRateFeed {
    async fn get_current_rates(&self) -> Result<Vec<RateSnapshot>> {
        let now = Utc::now();
        Ok(self
            .curve
            .iter()
            .map(|(tenor, rate)| RateSnapshot::new(*tenor, *rate, now))
            .collect())
    }
}

/// Positions held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPositions {
    positions: Arc<RwLock<Vec<SwapPosition>>>,
}

impl InMemoryPositions {
    pub fn new(positions: Vec<SwapPosition>) -> Self {
        Self {
            positions: Arc::new(RwLock::new(positions)),
        }
    }

    /// Apply the external close action to a position.
    pub async fn close(&self, position_id: &str) -> Result<()> {
        let mut positions = self.positions.write().await;
        let position = positions
            .iter_mut()
            .find(|p| p.id == position_id)
            .ok_or_else(|| RiskError::invalid_position(position_id, "unknown position"))?;
        position.close()
    }
}

#[async_trait]
impl PositionStore for InMemoryPositions {
    async fn get_open_positions(&self) -> Result<Vec<SwapPosition>> {
        let positions = self.positions.read().await;
        Ok(positions.iter().filter(|p| p.is_open()).cloned().collect())
    }
}

/// Append-only in-memory signal log.
#[derive(Debug, Clone, Default)]
pub struct SignalLog {
    signals: Arc<RwLock<Vec<TradeSignal>>>,
}

impl SignalLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn signals(&self) -> Vec<TradeSignal> {
        self.signals.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.signals.read().await.len()
    }
}

#[async_trait]
impl SignalSink for SignalLog {
    async fn publish(&self, signals: &[TradeSignal]) -> Result<()> {
        let mut log = self.signals.write().await;
        log.extend_from_slice(signals);
        Ok(())
    }
}
