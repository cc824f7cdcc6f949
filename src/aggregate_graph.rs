//! Graph aggregation module.
//!
//! Folds an ordered transaction sequence into a graph snapshot: one node per
//! address with accumulated metrics and one directed edge per transaction.
//! Snapshots are recomputed wholesale for every filter change.

use crate::config::EdgeMode;
use crate::schemas::{EdgeId, GraphEdge, GraphNode, PairEdge, Transaction};
use polars::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Default cap on the number of transactions aggregated into one snapshot
pub const MAX_TRANSACTIONS: usize = 1000;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// Nodes and edges derived from one transaction subsequence.
///
/// Nodes and edges are ordered by first occurrence so that identical input
/// always yields an identical snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    node_index: HashMap<String, usize>,
    /// address -> indices into `edges` of every incident edge
    adjacency: HashMap<String, Vec<usize>>,
    /// transactions dropped by the cap
    truncated: usize,
}

impl GraphSnapshot {
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, address: &str) -> Option<&GraphNode> {
        self.node_index.get(address).map(|&idx| &self.nodes[idx])
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&GraphEdge> {
        self.adjacency
            .get(&id.source)?
            .iter()
            .map(|&idx| &self.edges[idx])
            .find(|edge| edge.id == *id)
    }

    /// Edges with `address` as source or target, in edge order.
    /// A self-transfer is listed once.
    pub fn incident_edges<'s>(&'s self, address: &str) -> impl Iterator<Item = &'s GraphEdge> + 's {
        self.adjacency
            .get(address)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.edges[idx])
    }

    /// Number of input transactions beyond the cap
    pub fn truncated(&self) -> usize {
        self.truncated
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Presentation elements: nodes first, then edges
    pub fn to_elements(&self) -> serde_json::Value {
        let nodes = self.nodes.iter().map(|node| {
            json!({
                "data": {
                    "id": node.id,
                    "label": node.id,
                    "total_value": node.total_value,
                    "degree": node.degree,
                    "layer": node.layer,
                }
            })
        });
        let edges = self.edges.iter().map(|edge| {
            json!({
                "data": {
                    "id": edge.id.to_string(),
                    "source": edge.source(),
                    "target": edge.target(),
                    "seq": edge.id.seq,
                    "weight": edge.weight,
                    "layer": edge.layer,
                }
            })
        });
        serde_json::Value::Array(nodes.chain(edges).collect())
    }

    fn record(&mut self, tx: &Transaction) {
        let edge_idx = self.edges.len();

        for address in [&tx.from_address, &tx.to_address] {
            let idx = match self.node_index.get(address.as_str()) {
                Some(&idx) => idx,
                None => {
                    self.node_index.insert(address.clone(), self.nodes.len());
                    self.nodes.push(GraphNode {
                        id: address.clone(),
                        total_value: 0.0,
                        degree: 0,
                        layer: tx.layer,
                    });
                    self.nodes.len() - 1
                }
            };
            let node = &mut self.nodes[idx];
            node.total_value += tx.value;
            node.degree += 1;
            // Last write wins: a node reports the layer of the latest transaction touching it
            node.layer = tx.layer;
        }

        self.adjacency
            .entry(tx.from_address.clone())
            .or_default()
            .push(edge_idx);
        if tx.to_address != tx.from_address {
            self.adjacency
                .entry(tx.to_address.clone())
                .or_default()
                .push(edge_idx);
        }

        self.edges.push(GraphEdge {
            id: EdgeId::of(tx),
            weight: tx.value,
            layer: tx.layer,
        });
    }
}

/// Single-pass aggregator with a truncation cap
#[derive(Debug, Clone, Copy)]
pub struct GraphAggregator {
    max_transactions: usize,
}

impl Default for GraphAggregator {
    fn default() -> Self {
        Self::new(MAX_TRANSACTIONS)
    }
}

impl GraphAggregator {
    pub fn new(max_transactions: usize) -> Self {
        Self { max_transactions }
    }

    pub fn max_transactions(&self) -> usize {
        self.max_transactions
    }

    /// Aggregate the first `max_transactions` transactions in input order.
    ///
    /// The cap truncates; it does not sample. Every transaction within the cap
    /// contributes exactly one edge.
    pub fn aggregate<'a, I>(&self, transactions: I) -> GraphSnapshot
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut snapshot = GraphSnapshot::default();

        for tx in transactions {
            if snapshot.edges.len() < self.max_transactions {
                snapshot.record(tx);
            } else {
                snapshot.truncated += 1;
            }
        }

        if snapshot.truncated > 0 {
            info!(
                "Truncated input to first {} transactions ({} dropped)",
                self.max_transactions, snapshot.truncated
            );
        }
        debug!(
            "Aggregated {} nodes and {} edges",
            snapshot.nodes.len(),
            snapshot.edges.len()
        );

        snapshot
    }
}

/// Merge parallel edges by ordered (source, target) pair, in first-occurrence order
pub fn merge_parallel_edges(snapshot: &GraphSnapshot) -> Vec<PairEdge> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut merged: Vec<PairEdge> = Vec::new();

    for edge in snapshot.edges() {
        let key = (edge.source(), edge.target());
        let idx = *index.entry(key).or_insert_with(|| {
            merged.push(PairEdge {
                source: edge.source().to_string(),
                target: edge.target().to_string(),
                tx_count: 0,
                total_weight: 0.0,
            });
            merged.len() - 1
        });
        merged[idx].tx_count += 1;
        merged[idx].total_weight += edge.weight;
    }

    merged
}

/// Write `nodes.parquet` and `edges.parquet` for a snapshot into `output_dir`
pub fn write_snapshot_parquet(
    snapshot: &GraphSnapshot,
    output_dir: &Path,
    edge_mode: EdgeMode,
) -> Result<(PathBuf, PathBuf), ExportError> {
    std::fs::create_dir_all(output_dir)?;

    let nodes = snapshot.nodes();
    let mut nodes_df = DataFrame::new(vec![
        Column::new(
            "id".into(),
            nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "total_value".into(),
            nodes.iter().map(|n| n.total_value).collect::<Vec<_>>(),
        ),
        Column::new(
            "degree".into(),
            nodes.iter().map(|n| n.degree as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "layer".into(),
            nodes.iter().map(|n| n.layer).collect::<Vec<_>>(),
        ),
    ])?;

    let mut edges_df = match edge_mode {
        EdgeMode::PerTransaction => {
            let edges = snapshot.edges();
            DataFrame::new(vec![
                Column::new(
                    "id".into(),
                    edges.iter().map(|e| e.id.to_string()).collect::<Vec<_>>(),
                ),
                Column::new(
                    "source".into(),
                    edges.iter().map(|e| e.source()).collect::<Vec<_>>(),
                ),
                Column::new(
                    "target".into(),
                    edges.iter().map(|e| e.target()).collect::<Vec<_>>(),
                ),
                Column::new(
                    "seq".into(),
                    edges.iter().map(|e| e.id.seq as u64).collect::<Vec<_>>(),
                ),
                Column::new(
                    "weight".into(),
                    edges.iter().map(|e| e.weight).collect::<Vec<_>>(),
                ),
                Column::new(
                    "layer".into(),
                    edges.iter().map(|e| e.layer).collect::<Vec<_>>(),
                ),
            ])?
        }
        EdgeMode::MergedByPair => {
            let pairs = merge_parallel_edges(snapshot);
            DataFrame::new(vec![
                Column::new(
                    "source".into(),
                    pairs.iter().map(|p| p.source.as_str()).collect::<Vec<_>>(),
                ),
                Column::new(
                    "target".into(),
                    pairs.iter().map(|p| p.target.as_str()).collect::<Vec<_>>(),
                ),
                Column::new(
                    "tx_count".into(),
                    pairs.iter().map(|p| p.tx_count as u64).collect::<Vec<_>>(),
                ),
                Column::new(
                    "total_weight".into(),
                    pairs.iter().map(|p| p.total_weight).collect::<Vec<_>>(),
                ),
            ])?
        }
    };

    let nodes_path = output_dir.join("nodes.parquet");
    let file = std::fs::File::create(&nodes_path)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(&mut nodes_df)?;

    let edges_path = output_dir.join("edges.parquet");
    let file = std::fs::File::create(&edges_path)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(&mut edges_df)?;

    info!(
        "Wrote {} nodes to {:?} and {} edges to {:?}",
        nodes_df.height(),
        nodes_path,
        edges_df.height(),
        edges_path
    );
    Ok((nodes_path, edges_path))
}

/// Read nodes from Parquet
pub fn read_nodes_parquet(path: &Path) -> Result<Vec<GraphNode>, ExportError> {
    let file = std::fs::File::open(path)?;
    let df = ParquetReader::new(file).finish()?;

    let ids = df.column("id")?.str()?;
    let total_values = df.column("total_value")?.f64()?;
    let degrees = df.column("degree")?.u64()?;
    let layers = df.column("layer")?.i64()?;

    let mut result = Vec::with_capacity(df.height());

    for i in 0..df.height() {
        result.push(GraphNode {
            id: ids.get(i).unwrap_or_default().to_string(),
            total_value: total_values.get(i).unwrap_or(0.0),
            degree: degrees.get(i).unwrap_or(0) as usize,
            layer: layers.get(i).unwrap_or(0),
        });
    }

    Ok(result)
}
