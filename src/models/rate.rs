//! Market rate snapshots for the supported swap tenors.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Swap maturity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tenor {
    #[serde(rename = "2Y")]
    Y2,
    #[serde(rename = "5Y")]
    Y5,
    #[serde(rename = "10Y")]
    Y10,
    #[serde(rename = "30Y")]
    Y30,
}

impl Tenor {
    /// All supported tenors, shortest first.
    pub const ALL: [Tenor; 4] = [Tenor::Y2, Tenor::Y5, Tenor::Y10, Tenor::Y30];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tenor::Y2 => "2Y",
            Tenor::Y5 => "5Y",
            Tenor::Y10 => "10Y",
            Tenor::Y30 => "30Y",
        }
    }

    /// Contract length in whole years.
    pub fn years(&self) -> u32 {
        match self {
            Tenor::Y2 => 2,
            Tenor::Y5 => 5,
            Tenor::Y10 => 10,
            Tenor::Y30 => 30,
        }
    }
}

impl fmt::Display for Tenor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Tenor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "2Y" => Ok(Tenor::Y2),
            "5Y" => Ok(Tenor::Y5),
            "10Y" => Ok(Tenor::Y10),
            "30Y" => Ok(Tenor::Y30),
            other => Err(format!("unsupported tenor '{}'", other)),
        }
    }
}

/// Par swap rate observed for one tenor at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub tenor: Tenor,

    /// Mid rate as a percentage (4.35 means 4.35%)
    pub rate: Decimal,

    /// Dealer bid and ask, when quoted. Pricing always uses the mid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<Decimal>,

    /// Observation time
    pub as_of: DateTime<Utc>,

    /// ISO currency code of the curve
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl RateSnapshot {
    pub fn new(tenor: Tenor, rate: Decimal, as_of: DateTime<Utc>) -> Self {
        Self {
            tenor,
            rate,
            bid: None,
            ask: None,
            as_of,
            currency: default_currency(),
        }
    }

    pub fn with_quotes(mut self, bid: Decimal, ask: Decimal) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self
    }

    /// Ask minus bid, if both sides are quoted.
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.ask? - self.bid?)
    }
}

/// Frozen market view shared by every position in one evaluation pass.
///
/// Holds at most one snapshot per tenor. Nothing can be inserted after
/// construction, so all positions in a cycle are scored against the same
/// rates.
#[derive(Debug, Clone)]
pub struct RateSet {
    rates: HashMap<Tenor, RateSnapshot>,
    as_of: DateTime<Utc>,
}

impl RateSet {
    /// Build a rate set; for duplicate tenors the latest observation wins.
    pub fn from_snapshots(snapshots: impl IntoIterator<Item = RateSnapshot>) -> Self {
        let mut rates: HashMap<Tenor, RateSnapshot> = HashMap::new();

        for snapshot in snapshots {
            match rates.get(&snapshot.tenor) {
                Some(existing) if existing.as_of >= snapshot.as_of => {}
                _ => {
                    rates.insert(snapshot.tenor, snapshot);
                }
            }
        }

        let as_of = rates
            .values()
            .map(|r| r.as_of)
            .max()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Self { rates, as_of }
    }

    pub fn get(&self, tenor: Tenor) -> Option<&RateSnapshot> {
        self.rates.get(&tenor)
    }

    /// Valuation time of the set (latest observation).
    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Supported tenors with no snapshot in this set.
    pub fn missing_tenors(&self) -> Vec<Tenor> {
        Tenor::ALL
            .iter()
            .copied()
            .filter(|t| !self.rates.contains_key(t))
            .collect()
    }

    /// Snapshots ordered by tenor.
    pub fn snapshots(&self) -> Vec<&RateSnapshot> {
        let mut out: Vec<_> = self.rates.values().collect();
        out.sort_by_key(|r| r.tenor);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tenor_parsing() {
        assert_eq!("10Y".parse::<Tenor>(), Ok(Tenor::Y10));
        assert_eq!(" 2y ".parse::<Tenor>(), Ok(Tenor::Y2));
        assert!("7Y".parse::<Tenor>().is_err());
        assert_eq!(Tenor::Y30.to_string(), "30Y");
    }

    #[test]
    fn test_rate_set_keeps_latest_per_tenor() {
        let now = Utc::now();
        let set = RateSet::from_snapshots(vec![
            RateSnapshot::new(Tenor::Y5, dec!(4.35), now),
            RateSnapshot::new(Tenor::Y5, dec!(4.20), now - Duration::hours(1)),
            RateSnapshot::new(Tenor::Y10, dec!(4.52), now - Duration::minutes(5)),
        ]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(Tenor::Y5).map(|r| r.rate), Some(dec!(4.35)));
        assert_eq!(set.as_of(), now);
        assert_eq!(set.missing_tenors(), vec![Tenor::Y2, Tenor::Y30]);
    }

    #[test]
    fn test_quotes_are_optional() {
        let now = Utc::now();
        let mid_only = RateSnapshot::new(Tenor::Y10, dec!(4.52), now);
        assert_eq!(mid_only.spread(), None);

        let quoted = mid_only.clone().with_quotes(dec!(4.51), dec!(4.53));
        assert_eq!(quoted.rate, dec!(4.52));
        assert_eq!(quoted.spread(), Some(dec!(0.02)));

        let json = serde_json::to_string(&mid_only).unwrap();
        assert!(!json.contains("bid"));
    }
}
