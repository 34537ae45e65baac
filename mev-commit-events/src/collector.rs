//! Runs a query against an [`IndexingService`] and gathers the results.
//!
//! The service may answer a query in several pages; the collector re-issues
//! the query from each page's `next_block` until the range is covered. Raw
//! logs are decoded on the client page by page, so `decoded_logs` and `logs`
//! always have the same row count.
//!
//! With [`Sink::Memory`] the four tables are concatenated into a
//! [`RawResultSet`]. With [`Sink::Parquet`] every page is coerced and written
//! straight to `<dir>/<table>.parquet`, and only the row counts are kept.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::{Schema, SchemaRef};
use arrow_select::concat::concat_batches;
use mev_commit::ColumnType;

use crate::coerce::coerce_batch;
use crate::decode::LogDecoder;
use crate::error::{QueryError, Result};
use crate::parquet::TableWriter;
use crate::query::{Query, StreamConfig};
use crate::service::{IndexingService, QueryResponse};
use crate::table::{
    BLOCK_SCHEMA, LOG_SCHEMA, RawResultSet, TRANSACTION_SCHEMA, blocks_to_batch, logs_to_batch,
    transactions_to_batch,
};

/// Where collected results go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Sink {
    /// Keep everything in memory.
    #[default]
    Memory,
    /// Stream every table into Parquet files under this directory.
    Parquet(PathBuf),
}

/// Files produced by a [`Sink::Parquet`] collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedHandle {
    /// Output directory.
    pub dir: PathBuf,
    /// Written files, one per table.
    pub files: Vec<PathBuf>,
    /// Rows written per table name.
    pub rows: BTreeMap<&'static str, usize>,
}

impl PersistedHandle {
    /// Rows written for `table`, or zero if it was not written.
    #[must_use]
    pub fn rows_in(&self, table: &str) -> usize {
        self.rows.get(table).copied().unwrap_or(0)
    }
}

/// Result of [`collect`].
#[derive(Debug, Clone)]
pub enum Collected {
    /// In-memory tables.
    Memory(RawResultSet),
    /// Tables written to disk.
    Persisted(PersistedHandle),
}

impl Collected {
    /// The in-memory tables, or `None` for a persisted collection.
    #[must_use]
    pub fn into_memory(self) -> Option<RawResultSet> {
        match self {
            Self::Memory(raw) => Some(raw),
            Self::Persisted(_) => None,
        }
    }
}

/// One response page converted to tables.
struct Page {
    decoded_logs: RecordBatch,
    logs: RecordBatch,
    transactions: RecordBatch,
    blocks: RecordBatch,
}

fn empty_schema() -> SchemaRef {
    Arc::new(Schema::empty())
}

fn to_page(
    response: QueryResponse,
    decoder: Option<&LogDecoder>,
    config: &StreamConfig,
) -> Result<(Page, usize)> {
    let mut blocks = Vec::new();
    let mut transactions = Vec::new();
    let mut logs = Vec::new();
    for chunk in response.data {
        blocks.extend(chunk.blocks);
        transactions.extend(chunk.transactions);
        logs.extend(chunk.logs);
    }

    let mode = config.hex_output;
    let (decoded_logs, failures) = match decoder {
        Some(decoder) => decoder.decode_batch(&logs, mode)?,
        None => (RecordBatch::new_empty(empty_schema()), 0),
    };

    let page = Page {
        decoded_logs,
        logs: logs_to_batch(&logs, mode)?,
        transactions: transactions_to_batch(&transactions, mode)?,
        blocks: blocks_to_batch(&blocks, mode)?,
    };
    Ok((page, failures))
}

/// Accumulates pages in memory.
struct MemoryTables {
    decoded_schema: SchemaRef,
    decoded_logs: Vec<RecordBatch>,
    logs: Vec<RecordBatch>,
    transactions: Vec<RecordBatch>,
    blocks: Vec<RecordBatch>,
}

impl MemoryTables {
    fn push(&mut self, page: Page) {
        if page.logs.num_rows() > 0 {
            self.decoded_logs.push(page.decoded_logs);
            self.logs.push(page.logs);
        }
        if page.transactions.num_rows() > 0 {
            self.transactions.push(page.transactions);
        }
        if page.blocks.num_rows() > 0 {
            self.blocks.push(page.blocks);
        }
    }

    fn finish(self) -> Result<RawResultSet> {
        Ok(RawResultSet {
            decoded_logs: concat_batches(&self.decoded_schema, &self.decoded_logs)?,
            logs: concat_batches(&LOG_SCHEMA, &self.logs)?,
            transactions: concat_batches(&TRANSACTION_SCHEMA, &self.transactions)?,
            blocks: concat_batches(&BLOCK_SCHEMA, &self.blocks)?,
        })
    }
}

/// A table file together with the coercions applied to its pages.
struct CoercedWriter {
    name: &'static str,
    mapping: BTreeMap<String, ColumnType>,
    writer: TableWriter,
}

impl CoercedWriter {
    fn create(
        dir: &Path,
        name: &'static str,
        schema: SchemaRef,
        mapping: &BTreeMap<String, ColumnType>,
    ) -> Result<Self> {
        let schema = coerce_batch(&RecordBatch::new_empty(schema), mapping)?.schema();
        let writer = TableWriter::create(&dir.join(format!("{name}.parquet")), schema)?;
        Ok(Self {
            name,
            mapping: mapping.clone(),
            writer,
        })
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        if batch.num_rows() == 0 {
            return Ok(());
        }
        self.writer.write(&coerce_batch(batch, &self.mapping)?)
    }
}

/// Streams pages into per-table Parquet files.
struct FileTables {
    dir: PathBuf,
    decoded_logs: Option<CoercedWriter>,
    logs: CoercedWriter,
    transactions: CoercedWriter,
    blocks: CoercedWriter,
}

impl FileTables {
    fn create(dir: &Path, decoded_schema: SchemaRef, config: &StreamConfig) -> Result<Self> {
        let mapping = &config.column_mapping;
        // A table without columns cannot be written as Parquet.
        let decoded_logs = if decoded_schema.fields().is_empty() {
            None
        } else {
            Some(CoercedWriter::create(
                dir,
                "decoded_logs",
                decoded_schema,
                &mapping.decoded_log,
            )?)
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            decoded_logs,
            logs: CoercedWriter::create(dir, "logs", Arc::clone(&LOG_SCHEMA), &BTreeMap::new())?,
            transactions: CoercedWriter::create(
                dir,
                "transactions",
                Arc::clone(&TRANSACTION_SCHEMA),
                &mapping.transaction,
            )?,
            blocks: CoercedWriter::create(
                dir,
                "blocks",
                Arc::clone(&BLOCK_SCHEMA),
                &mapping.block,
            )?,
        })
    }

    fn push(&mut self, page: &Page) -> Result<()> {
        if let Some(writer) = &mut self.decoded_logs {
            writer.write(&page.decoded_logs)?;
        }
        self.logs.write(&page.logs)?;
        self.transactions.write(&page.transactions)?;
        self.blocks.write(&page.blocks)
    }

    fn finish(self) -> Result<PersistedHandle> {
        let mut files = Vec::new();
        let mut rows = BTreeMap::new();
        let writers = self
            .decoded_logs
            .into_iter()
            .chain([self.logs, self.transactions, self.blocks]);
        for writer in writers {
            let (path, count) = writer.writer.finish()?;
            files.push(path);
            rows.insert(writer.name, count);
        }
        Ok(PersistedHandle {
            dir: self.dir,
            files,
            rows,
        })
    }
}

enum Destination {
    Memory(MemoryTables),
    Files(FileTables),
}

/// Run `query` to completion and deliver the results to `sink`.
///
/// # Errors
///
/// Returns the first transport, decode or I/O error. A page whose
/// `next_block` does not advance is a [`QueryError::Transport`] error.
/// Nothing is retried and no partial result is returned.
pub async fn collect<S: IndexingService>(
    service: &S,
    query: &Query,
    config: &StreamConfig,
    sink: &Sink,
) -> Result<Collected> {
    let decoder = config
        .event_signature
        .as_deref()
        .map(LogDecoder::new)
        .transpose()?;
    let decoded_schema = decoder.as_ref().map_or_else(empty_schema, LogDecoder::schema);

    let mut destination = match sink {
        Sink::Memory => Destination::Memory(MemoryTables {
            decoded_schema,
            decoded_logs: Vec::new(),
            logs: Vec::new(),
            transactions: Vec::new(),
            blocks: Vec::new(),
        }),
        Sink::Parquet(dir) => Destination::Files(FileTables::create(dir, decoded_schema, config)?),
    };

    let mut page_query = query.clone();
    let mut pages = 0u64;
    let mut failures = 0usize;

    loop {
        let response = service.query(&page_query).await?;
        let next_block = response.next_block;
        let (page, page_failures) = to_page(response, decoder.as_ref(), config)?;
        pages += 1;
        failures += page_failures;

        tracing::debug!(
            page = pages,
            from = page_query.from_block,
            next_block,
            blocks = page.blocks.num_rows(),
            transactions = page.transactions.num_rows(),
            logs = page.logs.num_rows(),
            "page received"
        );

        match &mut destination {
            Destination::Memory(tables) => tables.push(page),
            Destination::Files(tables) => tables.push(&page)?,
        }

        let Some(to_block) = page_query.to_block else {
            break;
        };
        if next_block >= to_block {
            break;
        }
        if next_block <= page_query.from_block {
            return Err(QueryError::transport(format!(
                "indexing service made no progress: next_block {next_block} at from_block {}",
                page_query.from_block
            )));
        }
        page_query.from_block = next_block;
    }

    if failures > 0 {
        tracing::warn!(failures, "logs that failed to decode were kept as null rows");
    }

    match destination {
        Destination::Memory(tables) => {
            let raw = tables.finish()?;
            tracing::debug!(
                pages,
                decoded_logs = raw.decoded_logs.num_rows(),
                transactions = raw.transactions.num_rows(),
                blocks = raw.blocks.num_rows(),
                "collected"
            );
            Ok(Collected::Memory(raw))
        }
        Destination::Files(tables) => {
            let handle = tables.finish()?;
            tracing::info!(pages, dir = %handle.dir.display(), rows = ?handle.rows, "persisted");
            Ok(Collected::Persisted(handle))
        }
    }
}
