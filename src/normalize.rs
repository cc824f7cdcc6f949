//! Record normalization.
//!
//! Converts loosely-typed transfer records, as returned by the token-transfer
//! API, into [`Transaction`]s. Burns and malformed records are skipped with a
//! diagnostic; nothing here aborts a batch.

use crate::ethereum::is_null_address;
use crate::schemas::Transaction;
use chrono::DateTime;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("Record is not an object: {0}")]
    NotAnObject(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid number in {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// Per-batch outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub total: usize,
    pub kept: usize,
    pub burns: usize,
    pub malformed: usize,
}

impl NormalizeStats {
    pub fn skipped(&self) -> usize {
        self.burns + self.malformed
    }
}

/// Normalize one raw record.
///
/// Returns `Ok(None)` for burn events (recipient is the null address). The
/// returned transaction carries `seq = 0`; positions are assigned when the
/// dataset is assembled.
pub fn normalize_record(record: &Value) -> Result<Option<Transaction>, NormalizeError> {
    let fields = record
        .as_object()
        .ok_or_else(|| NormalizeError::NotAnObject(truncate_repr(record)))?;

    let to_address = required(fields, "to")?;
    if is_null_address(&to_address) {
        return Ok(None);
    }
    let from_address = required(fields, "from")?;
    let hash = required(fields, "hash")?;

    let block_raw = required(fields, "blockNumber")?;
    let block_number: u64 = block_raw.parse().map_err(|_| NormalizeError::InvalidNumber {
        field: "blockNumber",
        value: block_raw.clone(),
    })?;

    let timestamp_raw = required(fields, "timeStamp")?;
    let timestamp = timestamp_raw
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| NormalizeError::InvalidTimestamp(timestamp_raw.clone()))?;

    let decimals = match optional(fields, "tokenDecimal") {
        Some(raw) => raw.parse::<u32>().map_err(|_| NormalizeError::InvalidNumber {
            field: "tokenDecimal",
            value: raw.clone(),
        })?,
        None => 0,
    };

    let raw_value = match optional(fields, "value") {
        Some(raw) => parse_raw_amount(&raw).ok_or(NormalizeError::InvalidNumber {
            field: "value",
            value: raw,
        })?,
        None => 0.0,
    };

    let layer = match optional(fields, "layer") {
        Some(raw) => raw.parse::<i64>().map_err(|_| NormalizeError::InvalidNumber {
            field: "layer",
            value: raw.clone(),
        })?,
        None => 0,
    };

    Ok(Some(Transaction {
        seq: 0,
        block_number,
        timestamp,
        hash,
        from_address,
        to_address,
        value: scale_by_decimals(raw_value, decimals),
        token_name: optional(fields, "tokenName").unwrap_or_default(),
        token_symbol: optional(fields, "tokenSymbol").unwrap_or_default(),
        layer,
    }))
}

/// Normalize a batch, preserving input order among kept records
pub fn normalize_batch(records: &[Value]) -> (Vec<Transaction>, NormalizeStats) {
    let mut stats = NormalizeStats {
        total: records.len(),
        ..Default::default()
    };
    let mut transactions = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        match normalize_record(record) {
            Ok(Some(mut tx)) => {
                tx.seq = transactions.len();
                transactions.push(tx);
            }
            Ok(None) => stats.burns += 1,
            Err(e) => {
                warn!("Skipping record {}: {}", index, e);
                stats.malformed += 1;
            }
        }
    }
    stats.kept = transactions.len();

    info!(
        "normalize_batch: {} total -> {} kept, skipped: {} burns, {} malformed",
        stats.total, stats.kept, stats.burns, stats.malformed
    );

    (transactions, stats)
}

/// `raw / 10^decimals` as a real number
pub fn scale_by_decimals(raw: f64, decimals: u32) -> f64 {
    raw / 10f64.powi(decimals.min(i32::MAX as u32) as i32)
}

/// Integer amounts arrive as decimal strings that may exceed u128
fn parse_raw_amount(raw: &str) -> Option<f64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn required(fields: &Map<String, Value>, key: &'static str) -> Result<String, NormalizeError> {
    optional(fields, key).ok_or(NormalizeError::MissingField(key))
}

/// Strings and numbers are accepted; null, empty and other shapes read as absent
fn optional(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate_repr(value: &Value) -> String {
    let repr = value.to_string();
    match repr.char_indices().nth(80) {
        Some((idx, _)) => format!("{}...", &repr[..idx]),
        None => repr,
    }
}
