//! The indexing-service seam.
//!
//! The pipeline only needs two calls from a data source: the current chain
//! height, and one page of results for a [`Query`]. [`crate::http::HttpService`]
//! talks to a HyperSync-style HTTP service, [`crate::rpc::RpcService`] serves
//! log queries from a plain JSON-RPC node, and tests plug in an in-memory
//! source.

use std::future::Future;

use serde::Deserialize;

use crate::error::Result;
use crate::query::Query;
use crate::rows::{BlockRow, LogRow, TransactionRow};

/// A source of blocks, transactions and logs.
pub trait IndexingService: Send + Sync {
    /// Current chain height as seen by the service.
    fn height(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Execute one page of `query`.
    ///
    /// The service may stop early; [`QueryResponse::next_block`] tells the
    /// caller where to resume.
    fn query(&self, query: &Query) -> impl Future<Output = Result<QueryResponse>> + Send;
}

/// One page of query results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    /// Height of the service's archive, if reported.
    #[serde(default)]
    pub archive_height: Option<u64>,
    /// First block not covered by this page.
    pub next_block: u64,
    /// Server-side execution time in milliseconds.
    #[serde(default)]
    pub total_execution_time: u64,
    /// Result chunks, in block order.
    #[serde(default)]
    pub data: Vec<ResponseData>,
}

/// A chunk of rows within a [`QueryResponse`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponseData {
    /// Block rows.
    pub blocks: Vec<BlockRow>,
    /// Transaction rows.
    pub transactions: Vec<TransactionRow>,
    /// Log rows.
    pub logs: Vec<LogRow>,
}

impl QueryResponse {
    /// Total rows across all chunks, per table: `(blocks, transactions, logs)`.
    #[must_use]
    pub fn row_counts(&self) -> (usize, usize, usize) {
        self.data.iter().fold((0, 0, 0), |(b, t, l), d| {
            (b + d.blocks.len(), t + d.transactions.len(), l + d.logs.len())
        })
    }
}
