//! Tabular dataset persistence and the shared read-only data context.
//!
//! The dataset is a delimited file with the columns
//! `BlockNumber, TimeStamp, Hash, From, To, Value, TokenName, TokenSymbol`
//! and an optional `layer` column. It is loaded once and handed to every
//! engine component by reference.

use crate::filter::{LayerRange, TimeRange};
use crate::schemas::{Transaction, TIMESTAMP_FORMAT};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One row of the dataset file
#[derive(Debug, Serialize, Deserialize)]
struct DatasetRow {
    #[serde(rename = "BlockNumber")]
    block_number: u64,

    #[serde(rename = "TimeStamp")]
    timestamp: String,

    #[serde(rename = "Hash")]
    hash: String,

    #[serde(rename = "From")]
    from: String,

    #[serde(rename = "To")]
    to: String,

    #[serde(rename = "Value", default)]
    value: Option<f64>,

    #[serde(rename = "TokenName", default)]
    token_name: String,

    #[serde(rename = "TokenSymbol", default)]
    token_symbol: String,

    #[serde(default)]
    layer: Option<i64>,
}

impl DatasetRow {
    fn from_transaction(tx: &Transaction) -> Self {
        Self {
            block_number: tx.block_number,
            timestamp: tx.readable_timestamp(),
            hash: tx.hash.clone(),
            from: tx.from_address.clone(),
            to: tx.to_address.clone(),
            value: Some(tx.value),
            token_name: tx.token_name.clone(),
            token_symbol: tx.token_symbol.clone(),
            layer: Some(tx.layer),
        }
    }

    /// Convert to a transaction, or say why the row is unusable
    fn into_transaction(self, seq: usize) -> Result<Transaction, String> {
        let timestamp = parse_dataset_timestamp(&self.timestamp)
            .ok_or_else(|| format!("unparseable timestamp {:?}", self.timestamp))?;
        let value = self.value.unwrap_or(0.0);
        if !value.is_finite() || value < 0.0 {
            return Err(format!("value {} is not a non-negative amount", value));
        }
        Ok(Transaction {
            seq,
            block_number: self.block_number,
            timestamp,
            hash: self.hash,
            from_address: self.from,
            to_address: self.to,
            value,
            token_name: self.token_name,
            token_symbol: self.token_symbol,
            layer: self.layer.unwrap_or(0),
        })
    }
}

/// Parse a dataset timestamp: the dataset format first, RFC 3339 as fallback
pub fn parse_dataset_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

/// Read transactions from a dataset file.
///
/// Rows that fail to parse are skipped with a warning.
pub fn read_dataset_csv(path: &Path) -> Result<Vec<Transaction>, DatasetError> {
    info!("Reading dataset from {:?}", path);

    let mut reader = csv::Reader::from_path(path)?;
    let mut transactions = Vec::new();
    let mut skipped = 0usize;

    for (line, row) in reader.deserialize::<DatasetRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("Skipping dataset row {}: {}", line + 1, e);
                skipped += 1;
                continue;
            }
        };

        match row.into_transaction(transactions.len()) {
            Ok(tx) => transactions.push(tx),
            Err(reason) => {
                warn!("Skipping dataset row {}: {}", line + 1, reason);
                skipped += 1;
            }
        }
    }

    info!(
        "Loaded {} transactions ({} rows skipped)",
        transactions.len(),
        skipped
    );
    Ok(transactions)
}

/// Write transactions to a dataset file, including the `layer` column
pub fn write_dataset_csv(transactions: &[Transaction], path: &Path) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for tx in transactions {
        writer.serialize(DatasetRow::from_transaction(tx))?;
    }
    writer.flush()?;

    info!("Wrote {} transactions to {:?}", transactions.len(), path);
    Ok(())
}

/// The full dataset, shared read-only across every interaction
#[derive(Debug, Clone, Default)]
pub struct DataContext {
    transactions: Vec<Transaction>,
}

impl DataContext {
    /// Take ownership of the dataset and assign each transaction its position
    pub fn new(mut transactions: Vec<Transaction>) -> Self {
        for (seq, tx) in transactions.iter_mut().enumerate() {
            tx.seq = seq;
        }
        Self { transactions }
    }

    pub fn load_csv(path: &Path) -> Result<Self, DatasetError> {
        Ok(Self::new(read_dataset_csv(path)?))
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn get(&self, seq: usize) -> Option<&Transaction> {
        self.transactions.get(seq)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Earliest and latest timestamps in the dataset
    pub fn time_bounds(&self) -> Option<TimeRange> {
        let start = self.transactions.iter().map(|tx| tx.timestamp).min()?;
        let end = self.transactions.iter().map(|tx| tx.timestamp).max()?;
        Some(TimeRange::new(start, end))
    }

    /// Smallest and largest layers in the dataset
    pub fn layer_bounds(&self) -> Option<LayerRange> {
        let lo = self.transactions.iter().map(|tx| tx.layer).min()?;
        let hi = self.transactions.iter().map(|tx| tx.layer).max()?;
        Some(LayerRange::new(lo, hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn tx(from: &str, to: &str, value: f64, layer: i64) -> Transaction {
        Transaction {
            seq: 99,
            block_number: 1,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            hash: format!("0x{}{}", from, to),
            from_address: from.to_string(),
            to_address: to.to_string(),
            value,
            token_name: "Token".to_string(),
            token_symbol: "TKN".to_string(),
            layer,
        }
    }

    #[test]
    fn test_context_assigns_positions() {
        let ctx = DataContext::new(vec![tx("A", "B", 1.0, 0), tx("B", "C", 2.0, 2)]);
        assert_eq!(ctx.get(0).map(|t| t.seq), Some(0));
        assert_eq!(ctx.get(1).map(|t| t.seq), Some(1));
        assert_eq!(ctx.layer_bounds(), Some(LayerRange::new(0, 2)));
    }

    #[test]
    fn test_empty_context_has_no_bounds() {
        let ctx = DataContext::default();
        assert!(ctx.time_bounds().is_none());
        assert!(ctx.layer_bounds().is_none());
    }

    #[test]
    fn test_write_then_read_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        let written = vec![tx("A", "B", 1.25, 0), tx("B", "C", 20.0, 1)];

        write_dataset_csv(&written, &path).unwrap();
        let read = read_dataset_csv(&path).unwrap();

        assert_eq!(read.len(), 2);
        assert_eq!(read[1].from_address, "B");
        assert_eq!(read[1].value, 20.0);
        assert_eq!(read[1].layer, 1);
        assert_eq!(read[0].timestamp, written[0].timestamp);
    }

    #[test]
    fn test_missing_layer_column_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "BlockNumber,TimeStamp,Hash,From,To,Value,TokenName,TokenSymbol"
        )
        .unwrap();
        writeln!(file, "10,2024-01-01 10:00:00,0x1,A,B,5.0,Token,TKN").unwrap();
        writeln!(file, "11,not a time,0x2,A,C,1.0,Token,TKN").unwrap();
        writeln!(file, "12,2024-01-02 10:00:00,0x3,B,C,,Token,TKN").unwrap();
        drop(file);

        let ctx = DataContext::load_csv(&path).unwrap();
        assert_eq!(ctx.len(), 2);
        assert!(ctx.transactions().iter().all(|t| t.layer == 0));
        assert_eq!(ctx.transactions()[1].value, 0.0);
        assert_eq!(ctx.transactions()[1].seq, 1);
    }

    #[test]
    fn test_rejects_nan_and_negative_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "BlockNumber,TimeStamp,Hash,From,To,Value,TokenName,TokenSymbol,layer"
        )
        .unwrap();
        writeln!(file, "10,2024-01-01 10:00:00,0x1,A,B,100.0,Token,TKN,0").unwrap();
        writeln!(file, "11,2024-01-01 11:00:00,0x2,B,C,NaN,Token,TKN,0").unwrap();
        writeln!(file, "12,2024-01-01 12:00:00,0x3,C,A,-50,Token,TKN,0").unwrap();
        writeln!(file, "13,2024-01-01 13:00:00,0x4,C,D,inf,Token,TKN,0").unwrap();
        drop(file);

        let ctx = DataContext::load_csv(&path).unwrap();
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.transactions()[0].value, 100.0);

        let top = crate::highlight::top_transactions(ctx.transactions(), 1);
        assert_eq!(top[0].hash, "0x1");
    }
}
