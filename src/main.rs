//! Token Flow Explorer CLI
//!
//! Collects token transfers for a contract and explores them as a
//! transaction network from the command line.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use token_flow_explorer::aggregate_graph::{
    read_nodes_parquet, write_snapshot_parquet, GraphAggregator,
};
use token_flow_explorer::config::{EdgeMode, ExplorerConfig};
use token_flow_explorer::dataset::{parse_dataset_timestamp, write_dataset_csv, DataContext};
use token_flow_explorer::detail::{resolve_edge, resolve_node};
use token_flow_explorer::explorer::{Explorer, ExplorerEvent};
use token_flow_explorer::fetch::EtherscanClient;
use token_flow_explorer::filter::{filter_transactions, FilterCriteria, LayerRange, TimeRange};
use token_flow_explorer::highlight::{high_frequency_addresses, top_transactions};
use token_flow_explorer::normalize::normalize_batch;
use token_flow_explorer::schemas::{EdgeId, RunMetadata};

#[derive(Parser)]
#[command(name = "token-flow-explorer")]
#[command(version)]
#[command(about = "Explore token transfers for a contract as a transaction network", long_about = None)]
struct Cli {
    /// Path to configuration file (optional, uses env vars if not provided)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory (dataset, exports and metadata are placed under it)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Start of time range (YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS", inclusive)
    #[arg(long)]
    start: Option<String>,

    /// End of time range (YYYY-MM-DD covers the whole day, inclusive)
    #[arg(long)]
    end: Option<String>,

    /// Lowest layer to include
    #[arg(long)]
    min_layer: Option<i64>,

    /// Highest layer to include
    #[arg(long)]
    max_layer: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch token transfers for a contract and write the dataset
    Fetch {
        /// Contract address (defaults to the configured one)
        #[arg(long)]
        contract: Option<String>,
    },

    /// Build the graph for a filter and print a summary
    Graph {
        #[command(flatten)]
        filter: FilterArgs,

        /// Print presentation elements as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// List the largest transactions in the full dataset
    Top {
        /// Number of transactions (defaults to the configured top_k)
        #[arg(short = 'k', long)]
        k: Option<usize>,
    },

    /// List addresses with a same-day burst of transfers
    HighFreq {
        /// Same-day count an address must exceed
        #[arg(short, long)]
        threshold: Option<usize>,
    },

    /// Show details for a node
    Node {
        address: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show details for an edge
    Edge {
        source: String,
        target: String,
        /// Dataset position of the transaction
        seq: usize,
    },

    /// Export the filtered graph to Parquet
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        /// Merge parallel edges by (source, target) pair
        #[arg(long)]
        merged: bool,
    },

    /// Read event batches (JSON, one per line) from stdin and print a view per batch
    Session,

    /// Show dataset and export status
    Status,
}

/// One line of session input: a single event or a batch fired together
#[derive(Deserialize)]
#[serde(untagged)]
enum EventBatch {
    One(ExplorerEvent),
    Many(Vec<ExplorerEvent>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output on stdout stays clean
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let mut config = match &cli.config {
        Some(path) => ExplorerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ExplorerConfig::load().context("Failed to load config from environment")?,
    };

    if let Some(data_dir) = &cli.data_dir {
        config.paths.rebase(data_dir.clone());
    }

    match cli.command {
        Commands::Fetch { contract } => {
            config.ensure_directories()?;
            cmd_fetch(&config, contract).await?;
        }
        Commands::Graph { filter, json } => cmd_graph(&config, &filter, json)?,
        Commands::Top { k } => cmd_top(&config, k)?,
        Commands::HighFreq { threshold } => cmd_high_freq(&config, threshold)?,
        Commands::Node { address, filter } => cmd_node(&config, &address, &filter)?,
        Commands::Edge {
            source,
            target,
            seq,
        } => cmd_edge(&config, source, target, seq)?,
        Commands::Export { filter, merged } => {
            config.ensure_directories()?;
            cmd_export(&config, &filter, merged)?;
        }
        Commands::Session => cmd_session(&config)?,
        Commands::Status => cmd_status(&config)?,
    }

    Ok(())
}

fn load_dataset(config: &ExplorerConfig) -> Result<DataContext> {
    let path = &config.paths.dataset_file;
    if !path.exists() {
        anyhow::bail!("Dataset not found: {:?}. Run fetch first.", path);
    }
    DataContext::load_csv(path).with_context(|| format!("Failed to read dataset {:?}", path))
}

/// Parse a CLI time bound; a bare date expands to the start or end of that day
fn parse_bound(raw: &str, is_end: bool) -> Result<DateTime<Utc>> {
    if let Some(ts) = parse_dataset_timestamp(raw) {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date {:?}", raw))?;
    let time = if is_end {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|naive| naive.and_utc())
        .with_context(|| format!("Invalid date {:?}", raw))
}

/// Resolve filter arguments against the dataset's own bounds
fn build_criteria(args: &FilterArgs, data: &DataContext) -> Result<FilterCriteria> {
    let mut criteria = FilterCriteria {
        time: data.time_bounds(),
        layers: data.layer_bounds(),
    };

    if args.start.is_some() || args.end.is_some() {
        let bounds = criteria.time;
        let start = match &args.start {
            Some(raw) => parse_bound(raw, false)?,
            None => bounds.map_or(DateTime::<Utc>::MIN_UTC, |b| b.start),
        };
        let end = match &args.end {
            Some(raw) => parse_bound(raw, true)?,
            None => bounds.map_or(DateTime::<Utc>::MAX_UTC, |b| b.end),
        };
        criteria.time = Some(TimeRange::new(start, end));
    }

    if args.min_layer.is_some() || args.max_layer.is_some() {
        let bounds = criteria.layers;
        let lo = args.min_layer.or(bounds.map(|b| b.lo)).unwrap_or(i64::MIN);
        let hi = args.max_layer.or(bounds.map(|b| b.hi)).unwrap_or(i64::MAX);
        criteria.layers = Some(LayerRange::new(lo, hi));
    }

    Ok(criteria)
}

async fn cmd_fetch(config: &ExplorerConfig, contract: Option<String>) -> Result<()> {
    info!("=== Fetching Token Transfers ===");

    if config.etherscan_api_key.is_empty() {
        anyhow::bail!("ETHERSCAN_API_KEY is not set");
    }
    let contract = contract.unwrap_or_else(|| config.contract_address.clone());

    let client = EtherscanClient::from_config(config).context("Failed to build HTTP client")?;
    let records = client.fetch_all(&contract).await;
    info!("{} -> {} raw records", contract, records.len());

    let (transactions, stats) = normalize_batch(&records);

    let output_path = &config.paths.dataset_file;
    write_dataset_csv(&transactions, output_path).context("Failed to write dataset")?;

    let mut metadata = RunMetadata::new(&contract);
    metadata.record_counts.raw_records = stats.total;
    metadata.record_counts.transactions = stats.kept;
    metadata.record_counts.skipped = stats.skipped();
    let metadata_path = config.paths.metadata_dir.join("fetch_metadata.json");
    metadata.save(&metadata_path)?;

    info!("Dataset saved to {:?}", output_path);
    info!("Metadata saved to {:?}", metadata_path);

    Ok(())
}

fn cmd_graph(config: &ExplorerConfig, filter: &FilterArgs, json: bool) -> Result<()> {
    let data = load_dataset(config)?;
    let criteria = build_criteria(filter, &data)?;

    let selected = filter_transactions(data.transactions(), &criteria);
    let aggregator = GraphAggregator::new(config.graph.max_transactions);
    let snapshot = aggregator.aggregate(selected);

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot.to_elements())?);
        return Ok(());
    }

    info!(
        "Graph: {} nodes, {} edges ({} transactions over the cap of {})",
        snapshot.nodes().len(),
        snapshot.edges().len(),
        snapshot.truncated(),
        aggregator.max_transactions()
    );

    let mut by_degree: Vec<_> = snapshot.nodes().iter().collect();
    by_degree.sort_by(|a, b| b.degree.cmp(&a.degree));
    for node in by_degree.iter().take(10) {
        println!(
            "{}  degree={}  total_value={:.4}  layer={}",
            node.id, node.degree, node.total_value, node.layer
        );
    }

    Ok(())
}

fn cmd_top(config: &ExplorerConfig, k: Option<usize>) -> Result<()> {
    let data = load_dataset(config)?;
    let k = k.unwrap_or(config.graph.top_k);

    for (rank, tx) in top_transactions(data.transactions(), k).iter().enumerate() {
        println!(
            "{:>2}. {} -> {}  value={}  {}  seq={}",
            rank + 1,
            tx.from_address,
            tx.to_address,
            tx.value,
            tx.readable_timestamp(),
            tx.seq
        );
    }

    Ok(())
}

fn cmd_high_freq(config: &ExplorerConfig, threshold: Option<usize>) -> Result<()> {
    let data = load_dataset(config)?;
    let threshold = threshold.unwrap_or(config.graph.high_frequency_threshold);

    let addresses = high_frequency_addresses(data.transactions(), threshold);
    info!(
        "{} addresses exceed {} same-day transfers",
        addresses.len(),
        threshold
    );
    for address in addresses {
        println!("{}", address);
    }

    Ok(())
}

fn cmd_node(config: &ExplorerConfig, address: &str, filter: &FilterArgs) -> Result<()> {
    let data = load_dataset(config)?;
    let criteria = build_criteria(filter, &data)?;
    let snapshot = GraphAggregator::new(config.graph.max_transactions)
        .aggregate(filter_transactions(data.transactions(), &criteria));

    println!("{}", resolve_node(&snapshot, &data, address));
    Ok(())
}

fn cmd_edge(config: &ExplorerConfig, source: String, target: String, seq: usize) -> Result<()> {
    let data = load_dataset(config)?;
    let edge = EdgeId {
        source,
        target,
        seq,
    };

    println!("{}", resolve_edge(&data, &edge));
    Ok(())
}

fn cmd_export(config: &ExplorerConfig, filter: &FilterArgs, merged: bool) -> Result<()> {
    info!("=== Exporting Graph ===");

    let data = load_dataset(config)?;
    let criteria = build_criteria(filter, &data)?;
    let snapshot = GraphAggregator::new(config.graph.max_transactions)
        .aggregate(filter_transactions(data.transactions(), &criteria));

    let edge_mode = if merged {
        EdgeMode::MergedByPair
    } else {
        config.graph.edge_mode
    };
    let (nodes_path, edges_path) =
        write_snapshot_parquet(&snapshot, &config.paths.export_dir, edge_mode)
            .context("Failed to export graph")?;

    let mut metadata = RunMetadata::new(&config.contract_address);
    metadata.record_counts.transactions = data.len();
    metadata.record_counts.nodes = snapshot.nodes().len();
    metadata.record_counts.edges = snapshot.edges().len();
    let metadata_path = config.paths.metadata_dir.join("export_metadata.json");
    metadata.save(&metadata_path)?;

    info!("Nodes saved to {:?}", nodes_path);
    info!("Edges saved to {:?}", edges_path);
    info!("Metadata saved to {:?}", metadata_path);

    Ok(())
}

fn cmd_session(config: &ExplorerConfig) -> Result<()> {
    let data = load_dataset(config)?;
    let mut explorer = Explorer::new(&data, &config.graph);

    println!("{}", serde_json::to_string(&explorer.view())?);

    let stdin = std::io::stdin();
    for (line_no, line) in stdin.lock().lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let events = match serde_json::from_str::<EventBatch>(&line) {
            Ok(EventBatch::One(event)) => vec![event],
            Ok(EventBatch::Many(events)) => events,
            Err(e) => {
                warn!("Ignoring line {}: {}", line_no + 1, e);
                continue;
            }
        };

        let view = explorer.dispatch(&events);
        debug!("Active filter after line {}: {:?}", line_no + 1, explorer.criteria());
        println!("{}", serde_json::to_string(&view)?);
    }

    Ok(())
}

fn cmd_status(config: &ExplorerConfig) -> Result<()> {
    info!("=== Explorer Status ===");
    info!("Data directory: {:?}", config.paths.data_dir);

    let dataset = &config.paths.dataset_file;
    if dataset.exists() {
        let data = DataContext::load_csv(dataset)?;
        info!("  ✓ Dataset {:?}: {} transactions", dataset, data.len());
        if let (Some(time), Some(layers)) = (data.time_bounds(), data.layer_bounds()) {
            info!(
                "    time {} .. {}, layers {} .. {}",
                time.start, time.end, layers.lo, layers.hi
            );
        }
    } else {
        info!("  ✗ Dataset {:?}: not found", dataset);
    }

    let nodes_path = config.paths.export_dir.join("nodes.parquet");
    if nodes_path.exists() {
        let count = read_nodes_parquet(&nodes_path).map(|v| v.len()).unwrap_or(0);
        info!("  ✓ Nodes export: {} records", count);
    } else {
        info!("  ✗ Nodes export: not found");
    }

    for file in ["fetch_metadata.json", "export_metadata.json"] {
        let path = config.paths.metadata_dir.join(file);
        if path.exists() {
            info!("  ✓ {}", file);
        } else {
            info!("  ✗ {}", file);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bound_date_expands_to_day() {
        let start = parse_bound("2024-01-02", false).unwrap();
        let end = parse_bound("2024-01-02", true).unwrap();
        assert_eq!(start.to_string(), "2024-01-02 00:00:00 UTC");
        assert_eq!(end.to_string(), "2024-01-02 23:59:59 UTC");
    }

    #[test]
    fn test_parse_bound_full_timestamp() {
        let ts = parse_bound("2024-01-02 10:11:12", true).unwrap();
        assert_eq!(ts.to_string(), "2024-01-02 10:11:12 UTC");
        assert!(parse_bound("tomorrow", false).is_err());
    }

    #[test]
    fn test_session_line_shapes() {
        let one: EventBatch = serde_json::from_str(r#"{"event":"reset"}"#).unwrap();
        assert!(matches!(one, EventBatch::One(ExplorerEvent::Reset)));

        let many: EventBatch =
            serde_json::from_str(r#"[{"event":"show_top_k"},{"event":"reset"}]"#).unwrap();
        assert!(matches!(many, EventBatch::Many(ref events) if events.len() == 2));
    }
}
