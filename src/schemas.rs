//! Data schemas for the token flow explorer.
//!
//! This module serves as the canonical definition of every record that moves
//! between stages: normalized transactions, graph elements and run metadata.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Schema version for tracking changes
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Human-readable timestamp format used in the tabular dataset (UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// PART A: Transaction Schema
// ============================================================================

/// One normalized token transfer event.
///
/// Addresses are kept exactly as provided upstream; no case normalization is
/// applied. `hash` is not assumed unique, so nothing downstream deduplicates
/// on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Position in the loaded dataset, assigned by `DataContext`
    #[serde(skip)]
    pub seq: usize,

    /// Block number (ordering hint only)
    pub block_number: u64,

    /// Block timestamp (UTC, second precision)
    pub timestamp: DateTime<Utc>,

    /// Transfer event hash
    pub hash: String,

    /// Sender address
    pub from_address: String,

    /// Recipient address
    pub to_address: String,

    /// Decimal-adjusted amount (`raw / 10^decimals`)
    pub value: f64,

    pub token_name: String,

    pub token_symbol: String,

    /// Opaque external classification, carried through for filtering
    pub layer: i64,
}

impl Transaction {
    /// Whether the address appears as sender or recipient
    pub fn touches(&self, address: &str) -> bool {
        self.from_address == address || self.to_address == address
    }

    /// Calendar day (UTC) of the transfer
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Timestamp rendered in the dataset format
    pub fn readable_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

// ============================================================================
// PART B: Graph Schema
// ============================================================================

/// Address node with metrics accumulated over one graph snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    /// Address
    pub id: String,

    /// Sum of values of every transaction touching the address (both sides add)
    pub total_value: f64,

    /// Number of transactions touching the address; a self-transfer counts twice
    pub degree: usize,

    /// Layer of the last transaction that touched the address
    pub layer: i64,
}

/// Identity of a transaction edge.
///
/// Parallel transfers between the same ordered pair stay distinct: `seq` is
/// the transaction's position in the full dataset, so the id is also stable
/// across filter changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId {
    pub source: String,
    pub target: String,
    pub seq: usize,
}

impl EdgeId {
    pub fn of(tx: &Transaction) -> Self {
        Self {
            source: tx.from_address.clone(),
            target: tx.to_address.clone(),
            seq: tx.seq,
        }
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}#{}", self.source, self.target, self.seq)
    }
}

/// Directed edge, one per transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub id: EdgeId,

    /// Transaction value
    pub weight: f64,

    pub layer: i64,
}

impl GraphEdge {
    pub fn source(&self) -> &str {
        &self.id.source
    }

    pub fn target(&self) -> &str {
        &self.id.target
    }

    /// The endpoint opposite to `address`, if the edge touches it
    pub fn other_end(&self, address: &str) -> Option<&str> {
        if self.source() == address {
            Some(self.target())
        } else if self.target() == address {
            Some(self.source())
        } else {
            None
        }
    }
}

/// Parallel edges merged by ordered (source, target) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairEdge {
    pub source: String,
    pub target: String,

    /// Number of transactions merged into this edge
    pub tx_count: usize,

    /// Sum of merged edge weights
    pub total_weight: f64,
}

// ============================================================================
// Metadata Schema
// ============================================================================

/// Run metadata for reproducibility and auditing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Schema version used
    pub schema_version: String,

    /// Run timestamp
    pub run_timestamp: DateTime<Utc>,

    /// Contract the dataset was collected for
    pub contract_address: String,

    /// Record counts by type
    pub record_counts: RecordCounts,

    /// Git commit hash (if available)
    pub git_commit: Option<String>,

    /// Crate version
    pub explorer_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecordCounts {
    pub raw_records: usize,
    pub transactions: usize,
    pub skipped: usize,
    pub nodes: usize,
    pub edges: usize,
}

impl RunMetadata {
    pub fn new(contract_address: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_timestamp: Utc::now(),
            contract_address: contract_address.to_string(),
            record_counts: RecordCounts::default(),
            git_commit: get_git_commit(),
            explorer_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn get_git_commit() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
}
