//! Time and layer filtering.
//!
//! Produces the transaction subsequence fed to the graph aggregator. Both
//! ranges are inclusive; an empty or inverted range simply matches nothing.

use crate::schemas::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive time range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start <= *ts && *ts <= self.end
    }
}

/// Inclusive layer range `[lo, hi]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRange {
    pub lo: i64,
    pub hi: i64,
}

impl LayerRange {
    pub fn new(lo: i64, hi: i64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, layer: i64) -> bool {
        self.lo <= layer && layer <= self.hi
    }
}

/// Current filter state.
///
/// A missing range places no constraint on that dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub time: Option<TimeRange>,
    pub layers: Option<LayerRange>,
}

impl FilterCriteria {
    pub fn new(time: TimeRange, layers: LayerRange) -> Self {
        Self {
            time: Some(time),
            layers: Some(layers),
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.time.map_or(true, |range| range.contains(&tx.timestamp))
            && self.layers.map_or(true, |range| range.contains(tx.layer))
    }
}

/// Transactions satisfying both ranges, in dataset order
pub fn filter_transactions<'a>(
    transactions: &'a [Transaction],
    criteria: &FilterCriteria,
) -> Vec<&'a Transaction> {
    transactions.iter().filter(|tx| criteria.matches(tx)).collect()
}
