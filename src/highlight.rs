//! Highlight engine.
//!
//! Computes style overlays: an ordered rule list layered on the base
//! stylesheet where later rules override earlier ones for the same property.
//! Top-K and high-frequency highlights are grounded on the full dataset,
//! never on the filtered view. Tap highlights follow the adjacency of the
//! current snapshot.

use crate::aggregate_graph::GraphSnapshot;
use crate::schemas::{EdgeId, Transaction};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Which elements a style rule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    AllNodes,
    SelectedNode,
    AllEdges,
    SelectedEdge,
    Node(String),
    Edge(EdgeId),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::AllNodes => write!(f, "node"),
            Selector::SelectedNode => write!(f, "node:selected"),
            Selector::AllEdges => write!(f, "edge"),
            Selector::SelectedEdge => write!(f, "edge:selected"),
            Selector::Node(id) => write!(f, "node[id = \"{}\"]", id),
            Selector::Edge(id) => write!(f, "edge[id = \"{}\"]", id),
        }
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One (selector, style attributes) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleRule {
    pub selector: Selector,
    pub style: BTreeMap<String, String>,
}

impl StyleRule {
    fn new(selector: Selector, attributes: &[(&str, &str)]) -> Self {
        Self {
            selector,
            style: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

const EMPHASIZED_NODE: &[(&str, &str)] = &[
    ("background-color", "yellow"),
    ("opacity", "1"),
    ("text-opacity", "1"),
];
const TOP_NODE: &[(&str, &str)] = &[
    ("background-color", "yellow"),
    ("opacity", "1"),
    ("font-weight", "bold"),
    ("text-opacity", "1"),
];
const TOP_EDGE: &[(&str, &str)] = &[("line-color", "yellow"), ("opacity", "1"), ("width", "4")];
const HIGH_FREQUENCY_NODE: &[(&str, &str)] = &[
    ("background-color", "orange"),
    ("opacity", "1"),
    ("text-opacity", "1"),
];

/// The fixed stylesheet every overlay is layered on
pub fn base_stylesheet() -> Vec<StyleRule> {
    vec![
        StyleRule::new(
            Selector::AllNodes,
            &[
                ("width", "mapData(degree, 0, 20, 20, 50)"),
                ("height", "mapData(degree, 0, 20, 20, 50)"),
                ("background-color", "mapData(total_value, 0, 1e18, blue, red)"),
                ("label", "data(label)"),
                ("color", "#222"),
                ("font-size", "8px"),
                ("text-valign", "center"),
                ("text-halign", "center"),
                ("text-opacity", "0"),
            ],
        ),
        StyleRule::new(
            Selector::SelectedNode,
            &[("text-opacity", "1"), ("background-color", "green")],
        ),
        StyleRule::new(
            Selector::AllEdges,
            &[
                ("curve-style", "bezier"),
                ("target-arrow-shape", "triangle"),
                ("line-color", "#888"),
                ("width", "mapData(weight, 0, 1e18, 1, 5)"),
            ],
        ),
        StyleRule::new(
            Selector::SelectedEdge,
            &[("line-color", "yellow"), ("width", "5")],
        ),
    ]
}

/// The `k` largest transactions by value; ties keep input order
pub fn top_transactions(transactions: &[Transaction], k: usize) -> Vec<&Transaction> {
    let mut ranked: Vec<&Transaction> = transactions.iter().collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
    ranked.truncate(k);
    ranked
}

/// Addresses that appear more than `threshold` times on one calendar day
/// as sender, or more than `threshold` times on one day as recipient.
///
/// Sender and recipient appearances are bucketed separately; the result is
/// the union of both directions in first-occurrence order.
pub fn high_frequency_addresses(transactions: &[Transaction], threshold: usize) -> Vec<String> {
    let mut sent: HashMap<(&str, NaiveDate), usize> = HashMap::new();
    let mut received: HashMap<(&str, NaiveDate), usize> = HashMap::new();

    for tx in transactions {
        let day = tx.day();
        *sent.entry((tx.from_address.as_str(), day)).or_insert(0) += 1;
        *received.entry((tx.to_address.as_str(), day)).or_insert(0) += 1;
    }

    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for tx in transactions {
        let day = tx.day();
        let candidates = [
            (tx.from_address.as_str(), &sent),
            (tx.to_address.as_str(), &received),
        ];
        for (address, counts) in candidates {
            if counts[&(address, day)] > threshold && seen.insert(address) {
                result.push(address.to_string());
            }
        }
    }

    result
}

/// Computes overlays for each highlight mode
#[derive(Debug, Clone, Copy)]
pub struct HighlightEngine {
    top_k: usize,
    high_frequency_threshold: usize,
}

impl Default for HighlightEngine {
    fn default() -> Self {
        Self::new(10, 5)
    }
}

impl HighlightEngine {
    pub fn new(top_k: usize, high_frequency_threshold: usize) -> Self {
        Self {
            top_k,
            high_frequency_threshold,
        }
    }

    /// Endpoints and edges of the global top-K transactions
    pub fn top_k_overlay(&self, transactions: &[Transaction]) -> Vec<StyleRule> {
        let top = top_transactions(transactions, self.top_k);

        let mut node_rules = Vec::with_capacity(top.len() * 2);
        let mut edge_rules = Vec::with_capacity(top.len());
        for tx in &top {
            node_rules.push(StyleRule::new(Selector::Node(tx.from_address.clone()), TOP_NODE));
            node_rules.push(StyleRule::new(Selector::Node(tx.to_address.clone()), TOP_NODE));
            edge_rules.push(StyleRule::new(Selector::Edge(EdgeId::of(tx)), TOP_EDGE));
        }

        let mut rules = base_stylesheet();
        rules.extend(node_rules);
        rules.extend(edge_rules);
        rules
    }

    /// Addresses with a same-day burst above the threshold
    pub fn high_frequency_overlay(&self, transactions: &[Transaction]) -> Vec<StyleRule> {
        let addresses = high_frequency_addresses(transactions, self.high_frequency_threshold);
        debug!("{} high-frequency addresses", addresses.len());

        let mut rules = base_stylesheet();
        rules.extend(
            addresses
                .into_iter()
                .map(|address| StyleRule::new(Selector::Node(address), HIGH_FREQUENCY_NODE)),
        );
        rules
    }

    /// Dim everything, then emphasize the node, its incident edges and its neighbors.
    ///
    /// A node absent from the snapshot gets the base stylesheet.
    pub fn node_tap_overlay(&self, snapshot: &GraphSnapshot, node_id: &str) -> Vec<StyleRule> {
        let mut rules = base_stylesheet();
        if snapshot.node(node_id).is_none() {
            debug!("Tapped node {} is not in the current graph", node_id);
            return rules;
        }
        rules.extend(dimmed());
        rules.push(StyleRule::new(
            Selector::Node(node_id.to_string()),
            &[("opacity", "1"), ("text-opacity", "1"), ("background-color", "green")],
        ));

        let mut neighbors = HashSet::new();
        for edge in snapshot.incident_edges(node_id) {
            rules.push(StyleRule::new(
                Selector::Edge(edge.id.clone()),
                &[("opacity", "1"), ("line-color", "yellow"), ("width", "4")],
            ));
            if let Some(other) = edge.other_end(node_id) {
                // a self-transfer must not repaint the tapped node
                if other != node_id && neighbors.insert(other) {
                    rules.push(StyleRule::new(
                        Selector::Node(other.to_string()),
                        EMPHASIZED_NODE,
                    ));
                }
            }
        }
        rules
    }

    /// Dim everything, then emphasize the edge and both endpoints
    pub fn edge_tap_overlay(&self, edge: &EdgeId) -> Vec<StyleRule> {
        let mut rules = base_stylesheet();
        rules.extend(dimmed());
        rules.push(StyleRule::new(
            Selector::Edge(edge.clone()),
            &[("opacity", "1"), ("line-color", "yellow"), ("width", "5")],
        ));
        rules.push(StyleRule::new(
            Selector::Node(edge.source.clone()),
            EMPHASIZED_NODE,
        ));
        rules.push(StyleRule::new(
            Selector::Node(edge.target.clone()),
            EMPHASIZED_NODE,
        ));
        rules
    }
}

fn dimmed() -> [StyleRule; 2] {
    [
        StyleRule::new(Selector::AllNodes, &[("opacity", "0.3"), ("text-opacity", "0")]),
        StyleRule::new(Selector::AllEdges, &[("opacity", "0.1")]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate_graph::GraphAggregator;
    use chrono::{TimeZone, Utc};

    fn tx(seq: usize, from: &str, to: &str, value: f64, day: u32) -> Transaction {
        Transaction {
            seq,
            block_number: seq as u64,
            timestamp: Utc.with_ymd_and_hms(2024, 2, day, 9, seq as u32 % 60, 0).unwrap(),
            hash: format!("0x{}", seq),
            from_address: from.to_string(),
            to_address: to.to_string(),
            value,
            token_name: String::new(),
            token_symbol: String::new(),
            layer: 0,
        }
    }

    fn node_selectors(rules: &[StyleRule]) -> Vec<String> {
        rules
            .iter()
            .filter_map(|r| match &r.selector {
                Selector::Node(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_selector_rendering() {
        let edge = EdgeId {
            source: "A".to_string(),
            target: "B".to_string(),
            seq: 3,
        };
        assert_eq!(Selector::AllNodes.to_string(), "node");
        assert_eq!(Selector::SelectedEdge.to_string(), "edge:selected");
        assert_eq!(Selector::Node("A".to_string()).to_string(), "node[id = \"A\"]");
        assert_eq!(Selector::Edge(edge).to_string(), "edge[id = \"A-B#3\"]");
    }

    #[test]
    fn test_base_stylesheet_shape() {
        let base = base_stylesheet();
        assert_eq!(base.len(), 4);
        assert_eq!(base[0].selector, Selector::AllNodes);
        assert_eq!(base[3].style["line-color"], "yellow");
    }

    #[test]
    fn test_top_transactions_stable_ties() {
        let data: Vec<Transaction> = (0..15)
            .map(|i| tx(i, "A", "B", if i % 3 == 0 { 100.0 } else { i as f64 }, 1))
            .collect();
        let top: Vec<usize> = top_transactions(&data, 10).iter().map(|t| t.seq).collect();

        // five ties at 100.0 keep input order, then descending values
        assert_eq!(top, vec![0, 3, 6, 9, 12, 14, 13, 11, 10, 8]);
    }

    #[test]
    fn test_top_k_overlay_layout() {
        let data = vec![tx(0, "A", "B", 1.0, 1), tx(1, "C", "D", 9.0, 1)];
        let rules = HighlightEngine::new(1, 5).top_k_overlay(&data);

        assert_eq!(rules.len(), 4 + 3);
        assert_eq!(rules[4].selector, Selector::Node("C".to_string()));
        assert_eq!(rules[5].selector, Selector::Node("D".to_string()));
        assert_eq!(rules[6].selector, Selector::Edge(EdgeId::of(&data[1])));
    }

    #[test]
    fn test_high_frequency_threshold_boundary() {
        let mut data = Vec::new();
        // six same-day sends from HOT, five from WARM
        for i in 0..6 {
            data.push(tx(data.len(), "HOT", &format!("R{}", i), 1.0, 5));
        }
        for i in 0..5 {
            data.push(tx(data.len(), "WARM", &format!("S{}", i), 1.0, 5));
        }
        // six receipts for SINK spread across two days
        for i in 0..6 {
            data.push(tx(data.len(), &format!("T{}", i), "SINK", 1.0, 6 + (i as u32 % 2)));
        }

        assert_eq!(high_frequency_addresses(&data, 5), vec!["HOT".to_string()]);
    }

    #[test]
    fn test_high_frequency_union_of_directions() {
        let mut data = Vec::new();
        for i in 0..6 {
            data.push(tx(data.len(), &format!("F{}", i), "HUB", 1.0, 8));
        }
        // mixed directions do not combine: 3 sends + 3 receipts
        for i in 0..3 {
            data.push(tx(data.len(), "MIX", &format!("G{}", i), 1.0, 9));
            data.push(tx(data.len(), &format!("H{}", i), "MIX", 1.0, 9));
        }

        let rules = HighlightEngine::default().high_frequency_overlay(&data);
        assert_eq!(node_selectors(&rules), vec!["HUB".to_string()]);
        assert_eq!(rules[4].style["background-color"], "orange");
    }

    #[test]
    fn test_node_tap_uses_snapshot_adjacency() {
        let data = vec![
            tx(0, "A", "B", 1.0, 1),
            tx(1, "B", "C", 1.0, 1),
            tx(2, "A", "B", 1.0, 1),
            tx(3, "D", "E", 1.0, 1),
        ];
        let snapshot = GraphAggregator::default().aggregate(&data);
        let rules = HighlightEngine::default().node_tap_overlay(&snapshot, "B");

        assert_eq!(rules[4].style["opacity"], "0.3");
        assert_eq!(rules[5].style["opacity"], "0.1");
        assert_eq!(rules[6].selector, Selector::Node("B".to_string()));
        let edges: Vec<usize> = rules
            .iter()
            .filter_map(|r| match &r.selector {
                Selector::Edge(id) => Some(id.seq),
                _ => None,
            })
            .collect();
        assert_eq!(edges, vec![0, 1, 2]);
        assert_eq!(node_selectors(&rules), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_node_tap_self_transfer_keeps_tapped_style() {
        let data = vec![tx(0, "A", "A", 1.0, 1)];
        let snapshot = GraphAggregator::default().aggregate(&data);
        let rules = HighlightEngine::default().node_tap_overlay(&snapshot, "A");
        let last_node = rules
            .iter()
            .rev()
            .find(|r| r.selector == Selector::Node("A".to_string()))
            .unwrap();
        assert_eq!(last_node.style["background-color"], "green");
    }

    #[test]
    fn test_node_tap_outside_snapshot_is_base() {
        let data = vec![tx(0, "A", "B", 1.0, 1)];
        let snapshot = GraphAggregator::default().aggregate(&data);
        let rules = HighlightEngine::default().node_tap_overlay(&snapshot, "Z");
        assert_eq!(rules, base_stylesheet());
    }

    #[test]
    fn test_edge_tap_overlay() {
        let data = vec![tx(4, "A", "B", 1.0, 1)];
        let id = EdgeId::of(&data[0]);
        let rules = HighlightEngine::default().edge_tap_overlay(&id);
        assert_eq!(rules.len(), 4 + 2 + 3);
        assert_eq!(rules[6].selector, Selector::Edge(id));
        assert_eq!(node_selectors(&rules), vec!["A", "B"]);
    }

    #[test]
    fn test_rule_serialization() {
        let rule = StyleRule::new(Selector::Node("A".to_string()), &[("opacity", "1")]);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["selector"], "node[id = \"A\"]");
        assert_eq!(json["style"]["opacity"], "1");
    }
}
