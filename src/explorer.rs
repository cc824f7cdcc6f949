//! Interaction session.
//!
//! Every user interaction arrives as an [`ExplorerEvent`]. A batch of events
//! fired together is resolved by [`Explorer::dispatch`] in one synchronous
//! pass: filter changes rebuild the graph snapshot, then at most one style
//! trigger is honored, chosen by fixed priority
//! reset > top-K > high-frequency > node tap > edge tap.

use crate::aggregate_graph::{GraphAggregator, GraphSnapshot};
use crate::config::GraphConfig;
use crate::dataset::DataContext;
use crate::detail::{resolve_edge, resolve_node, EdgePanel, NodePanel};
use crate::filter::{filter_transactions, FilterCriteria, LayerRange, TimeRange};
use crate::highlight::{base_stylesheet, HighlightEngine, StyleRule};
use crate::schemas::EdgeId;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExplorerEvent {
    /// New filter bounds; an absent range keeps its current value
    FilterChanged {
        #[serde(default)]
        time: Option<TimeRange>,
        #[serde(default)]
        layers: Option<LayerRange>,
    },
    ShowTopK,
    HighlightHighFreq,
    Reset,
    NodeTapped {
        id: String,
    },
    EdgeTapped(EdgeId),
}

/// Style-affecting events, in priority order
#[derive(Debug, Clone, Copy)]
enum StyleTrigger<'e> {
    Reset,
    TopK,
    HighFrequency,
    NodeTap(&'e str),
    EdgeTap(&'e EdgeId),
}

impl<'e> StyleTrigger<'e> {
    fn from_event(event: &'e ExplorerEvent) -> Option<Self> {
        match event {
            ExplorerEvent::FilterChanged { .. } => None,
            ExplorerEvent::Reset => Some(Self::Reset),
            ExplorerEvent::ShowTopK => Some(Self::TopK),
            ExplorerEvent::HighlightHighFreq => Some(Self::HighFrequency),
            ExplorerEvent::NodeTapped { id } => Some(Self::NodeTap(id)),
            ExplorerEvent::EdgeTapped(edge) => Some(Self::EdgeTap(edge)),
        }
    }

    fn priority(&self) -> u8 {
        match self {
            Self::Reset => 0,
            Self::TopK => 1,
            Self::HighFrequency => 2,
            Self::NodeTap(_) => 3,
            Self::EdgeTap(_) => 4,
        }
    }
}

/// Everything the presentation layer renders after an interaction
#[derive(Debug, Clone, Serialize)]
pub struct ExplorerView {
    pub elements: serde_json::Value,
    pub stylesheet: Vec<StyleRule>,
    pub node_info: String,
    pub edge_info: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub truncated: usize,
}

/// Graph and style state for one interactive session over a shared dataset
pub struct Explorer<'d> {
    data: &'d DataContext,
    aggregator: GraphAggregator,
    highlighter: HighlightEngine,
    criteria: FilterCriteria,
    snapshot: GraphSnapshot,
    stylesheet: Vec<StyleRule>,
    node_panel: NodePanel,
    edge_panel: EdgePanel,
}

impl<'d> Explorer<'d> {
    /// Start a session covering the full time and layer range of the dataset
    pub fn new(data: &'d DataContext, config: &GraphConfig) -> Self {
        Self::with_engines(
            data,
            GraphAggregator::new(config.max_transactions),
            HighlightEngine::new(config.top_k, config.high_frequency_threshold),
        )
    }

    pub fn with_engines(
        data: &'d DataContext,
        aggregator: GraphAggregator,
        highlighter: HighlightEngine,
    ) -> Self {
        let criteria = FilterCriteria {
            time: data.time_bounds(),
            layers: data.layer_bounds(),
        };
        let snapshot = aggregator.aggregate(filter_transactions(data.transactions(), &criteria));

        Self {
            data,
            aggregator,
            highlighter,
            criteria,
            snapshot,
            stylesheet: base_stylesheet(),
            node_panel: NodePanel::NothingSelected,
            edge_panel: EdgePanel::NothingSelected,
        }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn snapshot(&self) -> &GraphSnapshot {
        &self.snapshot
    }

    pub fn stylesheet(&self) -> &[StyleRule] {
        &self.stylesheet
    }

    pub fn node_panel(&self) -> &NodePanel {
        &self.node_panel
    }

    pub fn edge_panel(&self) -> &EdgePanel {
        &self.edge_panel
    }

    pub fn handle(&mut self, event: ExplorerEvent) -> ExplorerView {
        self.dispatch(std::slice::from_ref(&event))
    }

    /// Apply a batch of events fired by one interaction.
    ///
    /// An empty batch resets the stylesheet to the base; a batch carrying only
    /// filter changes leaves the current stylesheet in place.
    pub fn dispatch(&mut self, events: &[ExplorerEvent]) -> ExplorerView {
        let mut filter_changed = false;
        for event in events {
            if let ExplorerEvent::FilterChanged { time, layers } = event {
                if let Some(time) = time {
                    self.criteria.time = Some(*time);
                }
                if let Some(layers) = layers {
                    self.criteria.layers = Some(*layers);
                }
                filter_changed = true;
            }
        }
        if filter_changed {
            self.snapshot = self
                .aggregator
                .aggregate(filter_transactions(self.data.transactions(), &self.criteria));
        }

        for event in events {
            match event {
                ExplorerEvent::NodeTapped { id } => {
                    self.node_panel = resolve_node(&self.snapshot, self.data, id);
                }
                ExplorerEvent::EdgeTapped(edge) => {
                    self.edge_panel = resolve_edge(self.data, edge);
                }
                _ => {}
            }
        }

        let trigger = events
            .iter()
            .filter_map(StyleTrigger::from_event)
            .min_by_key(StyleTrigger::priority);
        match trigger {
            Some(trigger) => {
                debug!("Applying style trigger {:?}", trigger);
                self.stylesheet = self.overlay(trigger);
            }
            None if events.is_empty() => self.stylesheet = base_stylesheet(),
            None => {}
        }

        self.view()
    }

    fn overlay(&self, trigger: StyleTrigger<'_>) -> Vec<StyleRule> {
        let transactions = self.data.transactions();
        match trigger {
            StyleTrigger::Reset => base_stylesheet(),
            StyleTrigger::TopK => self.highlighter.top_k_overlay(transactions),
            StyleTrigger::HighFrequency => self.highlighter.high_frequency_overlay(transactions),
            StyleTrigger::NodeTap(id) => self.highlighter.node_tap_overlay(&self.snapshot, id),
            StyleTrigger::EdgeTap(edge) => self.highlighter.edge_tap_overlay(edge),
        }
    }

    pub fn view(&self) -> ExplorerView {
        ExplorerView {
            elements: self.snapshot.to_elements(),
            stylesheet: self.stylesheet.clone(),
            node_info: self.node_panel.to_string(),
            edge_info: self.edge_panel.to_string(),
            node_count: self.snapshot.nodes().len(),
            edge_count: self.snapshot.edges().len(),
            truncated: self.snapshot.truncated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::Selector;
    use crate::schemas::Transaction;
    use chrono::{TimeZone, Utc};

    fn context() -> DataContext {
        let rows = [
            ("A", "B", 10.0, 1, 0),
            ("B", "C", 20.0, 1, 1),
            ("A", "C", 5.0, 2, 0),
        ];
        DataContext::new(
            rows.iter()
                .map(|&(from, to, value, day, layer)| Transaction {
                    seq: 0,
                    block_number: 1,
                    timestamp: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
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
    fn test_event_json_shape() {
        let event: ExplorerEvent =
            serde_json::from_str(r#"{"event":"node_tapped","id":"A"}"#).unwrap();
        assert_eq!(event, ExplorerEvent::NodeTapped { id: "A".to_string() });

        let event: ExplorerEvent = serde_json::from_str(
            r#"{"event":"edge_tapped","source":"A","target":"B","seq":0}"#,
        )
        .unwrap();
        assert!(matches!(event, ExplorerEvent::EdgeTapped(ref e) if e.seq == 0));

        let event: ExplorerEvent =
            serde_json::from_str(r#"{"event":"filter_changed","layers":{"lo":0,"hi":0}}"#)
                .unwrap();
        assert_eq!(
            event,
            ExplorerEvent::FilterChanged {
                time: None,
                layers: Some(LayerRange::new(0, 0))
            }
        );
    }

    #[test]
    fn test_reset_wins_over_everything() {
        let data = context();
        let mut explorer = Explorer::new(&data, &GraphConfig::default());
        let view = explorer.dispatch(&[
            ExplorerEvent::NodeTapped { id: "A".to_string() },
            ExplorerEvent::ShowTopK,
            ExplorerEvent::Reset,
        ]);
        assert_eq!(view.stylesheet, base_stylesheet());
    }

    #[test]
    fn test_top_k_beats_high_frequency_and_taps() {
        let data = context();
        let mut explorer = Explorer::new(&data, &GraphConfig::default());
        explorer.dispatch(&[
            ExplorerEvent::HighlightHighFreq,
            ExplorerEvent::EdgeTapped(EdgeId::of(&data.transactions()[0])),
            ExplorerEvent::ShowTopK,
        ]);
        // three transactions: six endpoint rules and three edge rules
        assert_eq!(explorer.stylesheet().len(), 4 + 9);
        // the edge tap still refreshes its panel
        assert!(explorer.edge_panel().to_string().starts_with("Edge: A -> B"));
    }

    #[test]
    fn test_node_tap_beats_edge_tap() {
        let data = context();
        let mut explorer = Explorer::new(&data, &GraphConfig::default());
        explorer.dispatch(&[
            ExplorerEvent::EdgeTapped(EdgeId::of(&data.transactions()[1])),
            ExplorerEvent::NodeTapped { id: "C".to_string() },
        ]);
        assert_eq!(
            explorer.stylesheet()[6].selector,
            Selector::Node("C".to_string())
        );
    }

    #[test]
    fn test_filter_only_keeps_stylesheet() {
        let data = context();
        let mut explorer = Explorer::new(&data, &GraphConfig::default());
        explorer.handle(ExplorerEvent::ShowTopK);
        let before = explorer.stylesheet().to_vec();

        let view = explorer.handle(ExplorerEvent::FilterChanged {
            time: None,
            layers: Some(LayerRange::new(0, 0)),
        });
        assert_eq!(view.stylesheet, before);
        assert_eq!(view.edge_count, 2);
        assert_eq!(view.node_count, 3);
    }

    #[test]
    fn test_empty_batch_is_base() {
        let data = context();
        let mut explorer = Explorer::new(&data, &GraphConfig::default());
        explorer.handle(ExplorerEvent::HighlightHighFreq);
        let view = explorer.dispatch(&[]);
        assert_eq!(view.stylesheet, base_stylesheet());
    }

    #[test]
    fn test_node_panel_tracks_taps() {
        let data = context();
        let mut explorer = Explorer::new(&data, &GraphConfig::default());
        assert_eq!(explorer.view().node_info, "Click on a node to see details");

        let view = explorer.handle(ExplorerEvent::NodeTapped { id: "B".to_string() });
        assert_eq!(view.node_info, "Node: B, Total Value: 3.00e1, Degree: 2");

        let view = explorer.handle(ExplorerEvent::NodeTapped { id: "nobody".to_string() });
        assert_eq!(view.node_info, "Click on a node to see details");
        assert_eq!(explorer.node_panel(), &NodePanel::NothingSelected);
        assert_eq!(view.stylesheet, base_stylesheet());
    }
}
