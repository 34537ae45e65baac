//! High-level query facade.
//!
//! [`Client`] ties the pipeline together: every operation resolves its block
//! range, builds the query, collects the results from the indexing service
//! and assembles them into one table. Only [`Client::execute_event_query`]
//! treats an empty result as an error; every other operation returns an
//! empty table instead.
//!
//! ```no_run
//! use mev_commit_events::client::{ClientBuilder, EventQuery};
//! use mev_commit_events::QueryError;
//! use mev_commit_events::range::RangeSpec;
//!
//! # async fn run() -> mev_commit_events::Result<()> {
//! let url = "https://mev-commit.hypersync.xyz".parse().map_err(QueryError::transport)?;
//! let client = ClientBuilder::new(url).connect()?;
//! let slashes = client
//!     .query_event("FundsSlashed", EventQuery::new(RangeSpec::LastBlocks { count: 10_000 }))
//!     .await?;
//! println!("{} slashes", slashes.num_rows());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use arrow_array::RecordBatch;
use mev_commit::EventRegistry;
use url::Url;

use crate::assembler::{assemble, assemble_blocks};
use crate::collector::{self, Collected, PersistedHandle, Sink};
use crate::error::{QueryError, Result};
use crate::http::{HttpConfig, HttpService};
use crate::query::{QueryTarget, StreamConfig, build};
use crate::range::{self, BlockRange, RangeSpec};
use crate::service::IndexingService;
use crate::table::RawResultSet;
use crate::timing::timed;

/// Options of a named-event query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQuery {
    /// Blocks to search.
    pub range: RangeSpec,
    /// Only logs whose first indexed parameter is this address.
    pub address: Option<Address>,
    /// Join transaction and block columns onto every event row.
    pub transaction_columns: bool,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self::new(RangeSpec::Latest)
    }
}

impl EventQuery {
    /// Query over `range`, with transaction columns and no address filter.
    #[must_use]
    pub const fn new(range: RangeSpec) -> Self {
        Self {
            range,
            address: None,
            transaction_columns: true,
        }
    }

    /// Restrict to logs indexed by `address`.
    #[must_use]
    pub const fn for_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Return only decoded event columns plus the transaction hash.
    #[must_use]
    pub const fn without_transactions(mut self) -> Self {
        self.transaction_columns = false;
        self
    }
}

/// Output of an operation that can persist its results.
#[derive(Debug, Clone)]
pub enum QueryOutput {
    /// Assembled table.
    Table(RecordBatch),
    /// Per-table Parquet files.
    Persisted(PersistedHandle),
}

impl QueryOutput {
    /// Number of result rows: table rows, or the rows of the driving table
    /// on disk.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        match self {
            Self::Table(batch) => batch.num_rows(),
            Self::Persisted(handle) => handle
                .rows_in("decoded_logs")
                .max(handle.rows_in("transactions"))
                .max(handle.rows_in("blocks")),
        }
    }
}

/// Configures and connects a [`Client`] over HTTP.
#[derive(Debug)]
pub struct ClientBuilder {
    http: HttpConfig,
    registry: Option<EventRegistry>,
}

impl ClientBuilder {
    /// Builder for the service at `url`.
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self {
            http: HttpConfig::new(url),
            registry: None,
        }
    }

    /// Send `token` as a bearer token with every request.
    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.http.bearer_token = Some(token.into());
        self
    }

    /// Abort requests that take longer than `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.http.timeout = Some(timeout);
        self
    }

    /// Use `registry` instead of the built-in mev-commit events.
    #[must_use]
    pub fn registry(mut self, registry: EventRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Create the HTTP connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or a built-in
    /// event definition is malformed.
    pub fn connect(self) -> Result<Client<HttpService>> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => EventRegistry::mev_commit()?,
        };
        let service = HttpService::new(self.http)?;
        tracing::debug!(url = %service.url(), events = registry.len(), "client connected");
        Ok(Client::with_service(service, registry))
    }
}

/// Query facade over an [`IndexingService`].
#[derive(Debug)]
pub struct Client<S> {
    service: S,
    registry: EventRegistry,
}

fn memory(collected: Collected) -> Result<RawResultSet> {
    collected
        .into_memory()
        .ok_or(QueryError::Unsupported("in-memory assembly of persisted results"))
}

fn output(
    collected: Collected,
    config: &StreamConfig,
    finish: fn(&RawResultSet, &StreamConfig) -> Result<RecordBatch>,
) -> Result<QueryOutput> {
    match collected {
        Collected::Memory(raw) => Ok(QueryOutput::Table(finish(&raw, config)?)),
        Collected::Persisted(handle) => Ok(QueryOutput::Persisted(handle)),
    }
}

fn assemble_with_transactions(raw: &RawResultSet, config: &StreamConfig) -> Result<RecordBatch> {
    assemble(raw, config, true)
}

impl<S: IndexingService> Client<S> {
    /// Client over any data source.
    pub const fn with_service(service: S, registry: EventRegistry) -> Self {
        Self { service, registry }
    }

    /// Events this client can query.
    #[must_use]
    pub const fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// The underlying data source.
    #[must_use]
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Current chain height reported by the service.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Transport`] if the request fails.
    pub async fn current_height(&self) -> Result<u64> {
        timed("current_height", self.service.height()).await
    }

    /// Query a named event. An empty range yields an empty table with the
    /// event's full schema.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Registry`] for an unknown event, or any
    /// transport, decode or assembly error.
    pub async fn query_event(&self, name: &str, query: EventQuery) -> Result<RecordBatch> {
        timed("query_event", async {
            let (_, table) = self.event_table(name, query).await?;
            Ok(table)
        })
        .await
    }

    /// Query a named event and fail if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NoData`] when the result has no rows, plus
    /// everything [`Client::query_event`] can return.
    pub async fn execute_event_query(&self, name: &str, query: EventQuery) -> Result<RecordBatch> {
        timed("execute_event_query", async {
            let (range, table) = self.event_table(name, query).await?;
            if table.num_rows() == 0 {
                return Err(QueryError::NoData {
                    event: name.to_owned(),
                    from_block: range.from_block(),
                    to_block: range.to_block(),
                });
            }
            Ok(table)
        })
        .await
    }

    /// Query a named event and stream the raw tables into `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Registry`] for an unknown event, or any
    /// transport, decode or I/O error.
    pub async fn save_event(
        &self,
        name: &str,
        query: EventQuery,
        dir: &Path,
    ) -> Result<PersistedHandle> {
        timed("save_event", async {
            let event = self.registry.lookup(name)?;
            let range = range::resolve(&self.service, query.range).await?;
            let target = QueryTarget::Event {
                event,
                address_filter: query.address,
            };
            let (built, config) = build(range, target);
            let sink = Sink::Parquet(dir.to_path_buf());
            match collector::collect(&self.service, &built, &config, &sink).await? {
                Collected::Persisted(handle) => {
                    tracing::info!(event = name, %range, rows = ?handle.rows, "event saved");
                    Ok(handle)
                }
                Collected::Memory(_) => Err(QueryError::Unsupported("file sink returned tables")),
            }
        })
        .await
    }

    /// Blocks in `range` with all of their transactions.
    ///
    /// # Errors
    ///
    /// Returns any transport, assembly or I/O error.
    pub async fn get_blocks_txs(&self, range: RangeSpec, sink: Sink) -> Result<QueryOutput> {
        timed("get_blocks_txs", async {
            let range = range::resolve(&self.service, range).await?;
            let out = self
                .run(range, QueryTarget::BlocksAndTransactions, &sink, assemble_with_transactions)
                .await?;
            tracing::info!(%range, rows = out.num_rows(), "blocks and transactions");
            Ok(out)
        })
        .await
    }

    /// Every block in `range`.
    ///
    /// # Errors
    ///
    /// Returns any transport, coercion or I/O error.
    pub async fn get_blocks(&self, range: RangeSpec, sink: Sink) -> Result<QueryOutput> {
        timed("get_blocks", async {
            let range = range::resolve(&self.service, range).await?;
            let out = self.run(range, QueryTarget::Blocks, &sink, assemble_blocks).await?;
            tracing::info!(%range, rows = out.num_rows(), "blocks");
            Ok(out)
        })
        .await
    }

    /// Find transactions by hash anywhere in the chain's history.
    ///
    /// # Errors
    ///
    /// Returns any transport, assembly or I/O error.
    pub async fn search_txs(&self, hashes: &[B256], sink: Sink) -> Result<QueryOutput> {
        timed("search_txs", async {
            let range = range::resolve(&self.service, RangeSpec::Latest).await?;
            let out = self
                .run(
                    range,
                    QueryTarget::TransactionHashes(hashes),
                    &sink,
                    assemble_with_transactions,
                )
                .await?;
            tracing::info!(requested = hashes.len(), found = out.num_rows(), "transaction search");
            Ok(out)
        })
        .await
    }

    async fn event_table(
        &self,
        name: &str,
        query: EventQuery,
    ) -> Result<(BlockRange, RecordBatch)> {
        let event = self.registry.lookup(name)?;
        let range = range::resolve(&self.service, query.range).await?;
        let target = QueryTarget::Event {
            event,
            address_filter: query.address,
        };
        let (built, config) = build(range, target);
        let collected = collector::collect(&self.service, &built, &config, &Sink::Memory).await?;
        let table = assemble(&memory(collected)?, &config, query.transaction_columns)?;
        tracing::info!(event = name, %range, rows = table.num_rows(), "event query");
        Ok((range, table))
    }

    async fn run(
        &self,
        range: BlockRange,
        target: QueryTarget<'_>,
        sink: &Sink,
        finish: fn(&RawResultSet, &StreamConfig) -> Result<RecordBatch>,
    ) -> Result<QueryOutput> {
        let (query, config) = build(range, target);
        let collected = collector::collect(&self.service, &query, &config, sink).await?;
        output(collected, &config, finish)
    }
}
