//! Detail resolution for tapped nodes and edges.
//!
//! Pure reads: snapshot metrics for display, plus counts recomputed by scanning
//! the full dataset independently of any filter.

use crate::aggregate_graph::GraphSnapshot;
use crate::dataset::DataContext;
use crate::schemas::EdgeId;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDetail {
    pub id: String,
    /// From the current snapshot
    pub total_value: f64,
    /// From the current snapshot
    pub degree: usize,
    /// Transactions touching the address in the full dataset
    pub dataset_degree: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeDetail {
    pub source: String,
    pub target: String,
    pub weight: f64,
    /// Transactions between the pair in either direction
    pub edge_count: usize,
    pub source_degree: usize,
    pub target_degree: usize,
}

/// Node panel contents
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodePanel {
    NothingSelected,
    Selected(NodeDetail),
}

/// Edge panel contents
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EdgePanel {
    NothingSelected,
    Selected(EdgeDetail),
}

impl std::fmt::Display for NodePanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodePanel::NothingSelected => write!(f, "Click on a node to see details"),
            NodePanel::Selected(node) => write!(
                f,
                "Node: {}, Total Value: {:.2e}, Degree: {}",
                node.id, node.total_value, node.degree
            ),
        }
    }
}

impl std::fmt::Display for EdgePanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgePanel::NothingSelected => write!(f, "Click on an edge to see details"),
            EdgePanel::Selected(edge) => write!(
                f,
                "Edge: {} -> {}, Value: {:.2e}, Edge Count: {}, Source Degree: {}, Target Degree: {}",
                edge.source,
                edge.target,
                edge.weight,
                edge.edge_count,
                edge.source_degree,
                edge.target_degree
            ),
        }
    }
}

/// Number of dataset transactions with `address` as sender or recipient
pub fn dataset_degree(data: &DataContext, address: &str) -> usize {
    data.transactions()
        .iter()
        .filter(|tx| tx.touches(address))
        .count()
}

/// Number of dataset transactions between `a` and `b`, either direction
pub fn pair_count(data: &DataContext, a: &str, b: &str) -> usize {
    data.transactions()
        .iter()
        .filter(|tx| {
            (tx.from_address == a && tx.to_address == b)
                || (tx.from_address == b && tx.to_address == a)
        })
        .count()
}

/// Detail for a node rendered in `snapshot`
pub fn resolve_node(snapshot: &GraphSnapshot, data: &DataContext, node_id: &str) -> NodePanel {
    match snapshot.node(node_id) {
        Some(node) => NodePanel::Selected(NodeDetail {
            id: node.id.clone(),
            total_value: node.total_value,
            degree: node.degree,
            dataset_degree: dataset_degree(data, node_id),
        }),
        None => NodePanel::NothingSelected,
    }
}

/// Detail for an edge of the full dataset
pub fn resolve_edge(data: &DataContext, edge: &EdgeId) -> EdgePanel {
    let tx = match data.get(edge.seq) {
        Some(tx) if tx.from_address == edge.source && tx.to_address == edge.target => tx,
        _ => return EdgePanel::NothingSelected,
    };

    EdgePanel::Selected(EdgeDetail {
        source: edge.source.clone(),
        target: edge.target.clone(),
        weight: tx.value,
        edge_count: pair_count(data, &edge.source, &edge.target),
        source_degree: dataset_degree(data, &edge.source),
        target_degree: dataset_degree(data, &edge.target),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate_graph::GraphAggregator;
    use crate::filter::{filter_transactions, FilterCriteria, LayerRange};
    use crate::schemas::Transaction;
    use chrono::{TimeZone, Utc};

    fn context() -> DataContext {
        let rows = [
            ("A", "B", 10.0, 0),
            ("B", "A", 20.0, 1),
            ("A", "B", 5.0, 0),
            ("B", "C", 2.0, 1),
        ];
        DataContext::new(
            rows.iter()
                .map(|&(from, to, value, layer)| Transaction {
                    seq: 0,
                    block_number: 1,
                    timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    hash: String::new(),
                    from_address: from.to_string(),
                    to_address: to.to_string(),
                    value,
                    token_name: String::new(),
                    token_symbol: String::new(),
                    layer,
                })
                .collect(),
        )
    }

    #[test]
    fn test_edge_detail_counts_both_directions() {
        let data = context();
        let id = EdgeId::of(&data.transactions()[0]);

        let EdgePanel::Selected(detail) = resolve_edge(&data, &id) else {
            panic!("edge should resolve");
        };
        assert_eq!(detail.weight, 10.0);
        assert_eq!(detail.edge_count, 3);
        assert_eq!(detail.source_degree, 3);
        assert_eq!(detail.target_degree, 4);
    }

    #[test]
    fn test_unknown_edge_is_nothing_selected() {
        let data = context();
        let bogus = EdgeId {
            source: "A".to_string(),
            target: "Z".to_string(),
            seq: 0,
        };
        assert_eq!(resolve_edge(&data, &bogus), EdgePanel::NothingSelected);

        let out_of_range = EdgeId {
            source: "A".to_string(),
            target: "B".to_string(),
            seq: 99,
        };
        assert_eq!(resolve_edge(&data, &out_of_range), EdgePanel::NothingSelected);
    }

    #[test]
    fn test_node_detail_uses_snapshot_and_full_scan() {
        let data = context();
        let criteria = FilterCriteria {
            time: None,
            layers: Some(LayerRange::new(0, 0)),
        };
        let snapshot = GraphAggregator::default()
            .aggregate(filter_transactions(data.transactions(), &criteria));

        let NodePanel::Selected(detail) = resolve_node(&snapshot, &data, "A") else {
            panic!("node should resolve");
        };
        assert_eq!(detail.total_value, 15.0);
        assert_eq!(detail.degree, 2);
        assert_eq!(detail.dataset_degree, 3);

        assert_eq!(resolve_node(&snapshot, &data, "C"), NodePanel::NothingSelected);
    }

    #[test]
    fn test_panel_text() {
        assert_eq!(
            NodePanel::NothingSelected.to_string(),
            "Click on a node to see details"
        );
        assert_eq!(
            EdgePanel::NothingSelected.to_string(),
            "Click on an edge to see details"
        );
        let panel = NodePanel::Selected(NodeDetail {
            id: "A".to_string(),
            total_value: 1500.0,
            degree: 2,
            dataset_degree: 2,
        });
        assert_eq!(panel.to_string(), "Node: A, Total Value: 1.50e3, Degree: 2");
    }
}
