//! mev-commit event extractor CLI.
//!
//! Queries an indexing service for mev-commit events, blocks and
//! transactions and prints a summary or writes Parquet files.
//!
//! # Usage
//!
//! ```bash
//! # Slashes in the last 50k blocks
//! mev-commit-events events FundsSlashed --blocks 50000
//!
//! # Window deposits of one bidder, written to a single Parquet file
//! mev-commit-events events BidderRegistered --address 0xabc... --out deposits.parquet
//!
//! # Raw blocks and transactions, streamed to ./data/blocks-txs/
//! mev-commit-events blocks-txs --from 1000 --to 2000 --save
//!
//! # Find transactions anywhere in history
//! mev-commit-events search-txs 0x1234...
//!
//! # Known events and endpoints
//! mev-commit-events list
//! ```

use std::path::{Path, PathBuf};

use alloy::primitives::{Address, B256};
use alloy::providers::ProviderBuilder;
use anyhow::{Context, Result};
use arrow_array::RecordBatch;
use clap::{Args, Parser, Subcommand};
use mev_commit::EventRegistry;
use mev_commit_events::config::Config;
use mev_commit_events::{
    Client, EventQuery, IndexingService, QueryOutput, RangeSpec, RpcService, Sink, endpoints,
};
use url::Url;

/// mev-commit event extractor.
#[derive(Debug, Parser)]
#[command(name = "mev-commit-events", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Indexing service URL. Overrides the configuration file.
    #[arg(long, conflicts_with = "endpoint")]
    url: Option<Url>,

    /// Named indexing endpoint (see `list`).
    #[arg(long)]
    endpoint: Option<String>,

    /// Query a JSON-RPC node instead of an indexing service. Only
    /// `events` and `height` are supported there.
    #[arg(long, conflicts_with_all = ["url", "endpoint"])]
    rpc: Option<Url>,

    #[command(subcommand)]
    command: Command,
}

/// Block range flags shared by all range queries.
#[derive(Debug, Clone, Copy, Args)]
struct RangeArgs {
    /// First block (inclusive).
    #[arg(long = "from")]
    from_block: Option<u64>,

    /// End block (exclusive). Defaults to the current height.
    #[arg(long = "to")]
    to_block: Option<u64>,

    /// Number of blocks before `--to`. Ignored when `--from` is given.
    #[arg(long = "blocks")]
    block_count: Option<u64>,
}

impl RangeArgs {
    const fn spec(self) -> RangeSpec {
        RangeSpec::from_parts(self.from_block, self.to_block, self.block_count)
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Query one named mev-commit event.
    Events {
        /// Event name (see `list`).
        name: String,

        #[command(flatten)]
        range: RangeArgs,

        /// Only events whose first indexed parameter is this address.
        #[arg(long)]
        address: Option<Address>,

        /// Skip transaction and block columns.
        #[arg(long)]
        no_transactions: bool,

        /// Fail when the query matches nothing.
        #[arg(long)]
        require_data: bool,

        /// Write the assembled table to this Parquet file.
        #[arg(long, conflicts_with = "save")]
        out: Option<PathBuf>,

        /// Stream the raw tables to `<data_dir>/<name>/`.
        #[arg(long)]
        save: bool,
    },

    /// Query every block in a range.
    Blocks {
        #[command(flatten)]
        range: RangeArgs,

        /// Stream to `<data_dir>/blocks/` instead of printing.
        #[arg(long)]
        save: bool,
    },

    /// Query every block in a range with its transactions.
    BlocksTxs {
        #[command(flatten)]
        range: RangeArgs,

        /// Stream to `<data_dir>/blocks-txs/` instead of printing.
        #[arg(long)]
        save: bool,
    },

    /// Find transactions by hash across the whole chain.
    SearchTxs {
        /// Transaction hashes.
        #[arg(required = true)]
        hashes: Vec<B256>,

        /// Stream to `<data_dir>/search-txs/` instead of printing.
        #[arg(long)]
        save: bool,
    },

    /// Print the current indexed chain height.
    Height,

    /// List known events and endpoints.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    if matches!(cli.command, Command::List) {
        cmd_list(&config.registry()?);
        return Ok(());
    }

    let data_dir = config.data_dir();

    if let Some(rpc) = cli.rpc {
        tracing::info!(rpc = %rpc, "querying chain node directly");
        let provider = ProviderBuilder::new().connect_http(rpc);
        let client = Client::with_service(RpcService::new(provider), config.registry()?);
        return run(&client, cli.command, &data_dir).await;
    }

    let url = match (cli.url, cli.endpoint) {
        (Some(url), _) => Some(url),
        (None, Some(name)) => {
            let endpoint =
                endpoints::by_name(&name).with_context(|| format!("unknown endpoint `{name}`"))?;
            Some(Url::parse(endpoint.url).context("parsing endpoint url")?)
        }
        (None, None) => None,
    };
    let client = config
        .client_builder(url)?
        .connect()
        .context("connecting to indexing service")?;
    run(&client, cli.command, &data_dir).await
}

/// Execute a query subcommand against `client`.
async fn run<S: IndexingService>(
    client: &Client<S>,
    command: Command,
    data_dir: &Path,
) -> Result<()> {
    match command {
        Command::Events {
            name,
            range,
            address,
            no_transactions,
            require_data,
            out,
            save,
        } => {
            let mut query = EventQuery::new(range.spec());
            if let Some(address) = address {
                query = query.for_address(address);
            }
            if no_transactions {
                query = query.without_transactions();
            }
            let save_dir = save.then(|| data_dir.join(&name));
            cmd_events(client, &name, query, require_data, out.as_deref(), save_dir).await
        }
        Command::Blocks { range, save } => {
            let out = client
                .get_blocks(range.spec(), sink_for(save, data_dir, "blocks"))
                .await?;
            report(&out);
            Ok(())
        }
        Command::BlocksTxs { range, save } => {
            let out = client
                .get_blocks_txs(range.spec(), sink_for(save, data_dir, "blocks-txs"))
                .await?;
            report(&out);
            Ok(())
        }
        Command::SearchTxs { hashes, save } => {
            let out = client
                .search_txs(&hashes, sink_for(save, data_dir, "search-txs"))
                .await?;
            report(&out);
            if out.num_rows() < hashes.len() {
                tracing::warn!(
                    requested = hashes.len(),
                    found = out.num_rows(),
                    "some transactions not found"
                );
            }
            Ok(())
        }
        Command::Height => {
            let height = client.current_height().await?;
            print_height(height);
            Ok(())
        }
        Command::List => {
            cmd_list(client.registry());
            Ok(())
        }
    }
}

fn sink_for(save: bool, data_dir: &Path, name: &str) -> Sink {
    if save {
        Sink::Parquet(data_dir.join(name))
    } else {
        Sink::Memory
    }
}

/// Execute the `events` subcommand.
async fn cmd_events<S: IndexingService>(
    client: &Client<S>,
    name: &str,
    query: EventQuery,
    require_data: bool,
    out: Option<&Path>,
    save_dir: Option<PathBuf>,
) -> Result<()> {
    if let Some(dir) = save_dir {
        let handle = client.save_event(name, query, &dir).await?;
        report(&QueryOutput::Persisted(handle));
        return Ok(());
    }

    let table = if require_data {
        client.execute_event_query(name, query).await?
    } else {
        client.query_event(name, query).await?
    };

    if let Some(path) = out {
        let rows = mev_commit_events::parquet::write(path, table.schema(), &[table.clone()])
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(rows, path = %path.display(), "table written");
    }
    report(&QueryOutput::Table(table));
    Ok(())
}

/// Print a short summary of a query result.
#[allow(clippy::print_stdout, reason = "CLI output")]
fn report(out: &QueryOutput) {
    match out {
        QueryOutput::Table(table) => print_table(table),
        QueryOutput::Persisted(handle) => {
            println!("{}", handle.dir.display());
            for (table, rows) in &handle.rows {
                println!("  {table:<14} {rows} rows");
            }
        }
    }
}

#[allow(clippy::print_stdout, reason = "CLI output")]
fn print_table(table: &RecordBatch) {
    println!("{} rows", table.num_rows());
    for field in table.schema().fields() {
        println!("  {:<28} {}", field.name(), field.data_type());
    }
}

#[allow(clippy::print_stdout, reason = "CLI output")]
fn print_height(height: u64) {
    println!("{height}");
}

/// Execute the `list` subcommand.
#[allow(clippy::print_stdout, reason = "CLI output")]
fn cmd_list(registry: &EventRegistry) {
    println!("{:<26} {:<44} Signature", "Event", "Contract");
    println!("{}", "-".repeat(110));
    for event in registry.iter() {
        let definition = event.definition();
        println!(
            "{:<26} {:<44} {}",
            definition.name,
            definition.contract.to_string(),
            event.canonical_signature(),
        );
    }

    println!();
    println!("{:<12} {:<8} URL", "Endpoint", "Type");
    println!("{}", "-".repeat(60));
    for endpoint in endpoints::ALL {
        let net_type = if endpoint.is_testnet { "test" } else { "main" };
        println!("{:<12} {:<8} {}", endpoint.name, net_type, endpoint.url);
    }
}
