//! Token Flow Explorer Library
//!
//! Turns on-chain token transfers for a contract into an interactive
//! node/edge network: filtering by time and layer, highlighting the largest
//! transfers and high-frequency addresses, and resolving node/edge details.
//!
//! # Pipeline Stages
//!
//! 1. **Fetch** ([`fetch`]): Pulls raw token transfer records from Etherscan
//! 2. **Normalize** ([`normalize`]): Converts raw records into typed transactions, dropping burns
//! 3. **Filter** ([`filter`]): Selects the transactions within a time and layer range
//! 4. **Aggregate** ([`aggregate_graph`]): Folds transactions into a node/edge graph snapshot
//! 5. **Highlight** ([`highlight`]) / **Detail** ([`detail`]): Style overlays and on-demand statistics
//!
//! [`explorer`] ties stages 3-5 together behind a single event dispatch.
//!
//! # Example
//!
//! ```no_run
//! use token_flow_explorer::config::ExplorerConfig;
//! use token_flow_explorer::dataset::DataContext;
//! use token_flow_explorer::explorer::{Explorer, ExplorerEvent};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ExplorerConfig::load()?;
//!     let data = DataContext::load_csv(&config.paths.dataset_file)?;
//!     let mut explorer = Explorer::new(&data, &config.graph);
//!     let view = explorer.handle(ExplorerEvent::ShowTopK);
//!     println!("{} nodes, {} style rules", view.node_count, view.stylesheet.len());
//!     Ok(())
//! }
//! ```

pub mod aggregate_graph;
pub mod config;
pub mod dataset;
pub mod detail;
pub mod ethereum;
pub mod explorer;
pub mod fetch;
pub mod filter;
pub mod highlight;
pub mod normalize;
pub mod schemas;

// Re-export commonly used types
pub use aggregate_graph::{GraphAggregator, GraphSnapshot};
pub use config::ExplorerConfig;
pub use dataset::DataContext;
pub use explorer::{Explorer, ExplorerEvent, ExplorerView};
pub use schemas::{EdgeId, GraphEdge, GraphNode, RunMetadata, Transaction};
