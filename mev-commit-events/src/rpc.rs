//! [`IndexingService`] backed by a plain Ethereum JSON-RPC node.
//!
//! Log selections are served with `eth_getLogs` in adaptive batches, and the
//! blocks of matched logs with `eth_getBlockByNumber`. A node has no cheap
//! way to select transactions, so transaction selections and
//! `include_all_blocks` are rejected as unsupported. Each query is answered
//! in a single page covering the whole range.

use std::collections::BTreeSet;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::U256;
use alloy::providers::Provider;
use alloy::rpc::types::{Block, Filter, Log};

use crate::error::{QueryError, Result};
use crate::query::{LogSelection, Query};
use crate::rows::{BlockRow, LogRow};
use crate::service::{IndexingService, QueryResponse, ResponseData};

/// Per-request timeout for RPC calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between consecutive `eth_getLogs` calls to avoid rate-limiting.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Maximum consecutive RPC errors before giving up.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Tracks `eth_getLogs` batch size with an adaptive ceiling.
///
/// On success the size doubles toward the ceiling; on error the ceiling
/// is permanently lowered so the node's actual limit is learned once.
#[derive(Debug)]
struct Batcher {
    size: u64,
    ceiling: u64,
}

impl Batcher {
    const DEFAULT: u64 = 2_000;
    const MIN: u64 = 10;

    const fn new() -> Self {
        Self {
            size: Self::DEFAULT,
            ceiling: Self::DEFAULT,
        }
    }

    /// Grow toward the learned ceiling after a successful request.
    fn grow(&mut self) {
        self.size = (self.size * 2).min(self.ceiling);
    }

    /// Shrink and lower the ceiling after a failed request.
    /// Returns `false` when already at the minimum (caller should bail).
    fn shrink(&mut self) -> bool {
        if self.size <= Self::MIN {
            return false;
        }
        self.ceiling = (self.size / 2).max(Self::MIN);
        self.size = self.ceiling;
        true
    }
}

/// Log source over any alloy [`Provider`].
#[derive(Debug, Clone)]
pub struct RpcService<P> {
    provider: P,
}

impl<P: Provider> RpcService<P> {
    /// Wrap a connected provider.
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

async fn with_timeout<T, E: std::error::Error + Send + Sync + 'static>(
    what: &'static str,
    request: impl IntoFuture<Output = std::result::Result<T, E>>,
) -> Result<T> {
    tokio::time::timeout(REQUEST_TIMEOUT, request)
        .await
        .map_err(|_| QueryError::transport(format!("{what} timed out")))?
        .map_err(QueryError::transport)
}

/// Apply a log selection to a filter. Empty topic positions are wildcards.
fn selection_filter(selection: &LogSelection) -> Filter {
    let mut filter = Filter::new();
    if !selection.address.is_empty() {
        filter = filter.address(selection.address.clone());
    }
    for (pos, topics) in selection.topics.iter().enumerate() {
        if topics.is_empty() {
            continue;
        }
        let topics = topics.clone();
        filter = match pos {
            0 => filter.event_signature(topics),
            1 => filter.topic1(topics),
            2 => filter.topic2(topics),
            3 => filter.topic3(topics),
            _ => filter,
        };
    }
    filter
}

/// Fetch all logs matching `filter` in `[from, to]` using adaptive batches.
async fn fetch_logs<P: Provider>(
    provider: &P,
    filter: &Filter,
    from: u64,
    to: u64,
) -> Result<Vec<Log>> {
    let mut logs = Vec::new();
    let mut block = from;
    let mut batch = Batcher::new();
    let mut errors = 0u32;

    while block <= to {
        let end = (block + batch.size - 1).min(to);
        let page = filter.clone().from_block(block).to_block(end);

        match with_timeout("eth_getLogs", provider.get_logs(&page)).await {
            Ok(new) => {
                errors = 0;
                logs.extend(new);
                batch.grow();
                block = end + 1;
                if block <= to {
                    tokio::time::sleep(INTER_BATCH_DELAY).await;
                }
            }
            Err(e) => {
                errors += 1;
                if errors >= MAX_CONSECUTIVE_ERRORS || !batch.shrink() {
                    return Err(e);
                }
                tracing::warn!(block, batch_size = batch.size, error = %e, "narrowing log range");
            }
        }
    }

    Ok(logs)
}

fn log_row(log: Log) -> LogRow {
    LogRow {
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
        transaction_index: log.transaction_index,
        log_index: log.log_index,
        address: Some(log.address()),
        topics: log.topics().to_vec(),
        data: Some(log.data().data.clone()),
        removed: Some(log.removed),
    }
}

fn block_row(block: &Block) -> BlockRow {
    let header = &block.header;
    BlockRow {
        number: Some(header.number),
        hash: Some(header.hash),
        parent_hash: Some(header.parent_hash),
        miner: Some(header.beneficiary),
        timestamp: Some(U256::from(header.timestamp)),
        gas_limit: Some(U256::from(header.gas_limit)),
        gas_used: Some(U256::from(header.gas_used)),
        base_fee_per_gas: header.base_fee_per_gas.map(U256::from),
        size: header.size,
        blob_gas_used: header.blob_gas_used.map(U256::from),
        excess_blob_gas: header.excess_blob_gas.map(U256::from),
        extra_data: Some(header.extra_data.clone()),
    }
}

impl<P: Provider> IndexingService for RpcService<P> {
    async fn height(&self) -> Result<u64> {
        with_timeout("eth_blockNumber", self.provider.get_block_number()).await
    }

    async fn query(&self, query: &Query) -> Result<QueryResponse> {
        if !query.transactions.is_empty() {
            return Err(QueryError::Unsupported("transaction selections over JSON-RPC"));
        }
        if query.include_all_blocks {
            return Err(QueryError::Unsupported("full block ranges over JSON-RPC"));
        }

        let to_block = match query.to_block {
            Some(to) => to,
            None => self.height().await?,
        };
        // Nothing to fetch in an empty range.
        let Some(last) = to_block.checked_sub(1).filter(|last| *last >= query.from_block) else {
            return Ok(QueryResponse {
                next_block: to_block,
                ..QueryResponse::default()
            });
        };

        let mut logs = Vec::new();
        for selection in &query.logs {
            let filter = selection_filter(selection);
            logs.extend(fetch_logs(&self.provider, &filter, query.from_block, last).await?);
        }
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        tracing::debug!(logs = logs.len(), from = query.from_block, to = to_block, "rpc logs fetched");

        let mut blocks = Vec::new();
        if !query.field_selection.block.is_empty() {
            let numbers: BTreeSet<u64> = logs.iter().filter_map(|log| log.block_number).collect();
            for number in numbers {
                let block = with_timeout(
                    "eth_getBlockByNumber",
                    self.provider.get_block_by_number(BlockNumberOrTag::Number(number)),
                )
                .await?
                .ok_or_else(|| QueryError::transport(format!("block {number} not found")))?;
                blocks.push(block_row(&block));
            }
        }

        Ok(QueryResponse {
            archive_height: None,
            next_block: to_block,
            total_execution_time: 0,
            data: vec![ResponseData {
                blocks,
                transactions: Vec::new(),
                logs: logs.into_iter().map(log_row).collect(),
            }],
        })
    }
}
