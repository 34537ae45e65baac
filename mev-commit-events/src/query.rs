//! Query and stream-configuration construction.
//!
//! [`build`] turns a resolved [`BlockRange`] and a [`QueryTarget`] into the
//! wire [`Query`] sent to the indexing service and the client-side
//! [`StreamConfig`] that tells the collector and assembler how to decode and
//! type the results. Both are fresh values per call.

use std::collections::{BTreeMap, BTreeSet};

use alloy::primitives::{Address, B256};
use mev_commit::columns::{BLOCK_COLUMN_TYPES, TRANSACTION_COLUMN_TYPES};
use mev_commit::{ColumnType, ColumnTypes, RegisteredEvent};
use serde::{Deserialize, Serialize};

use crate::range::BlockRange;

/// Every block field the service can return.
pub const BLOCK_FIELDS: &[&str] = &[
    "number",
    "hash",
    "parent_hash",
    "miner",
    "timestamp",
    "gas_limit",
    "gas_used",
    "base_fee_per_gas",
    "size",
    "blob_gas_used",
    "excess_blob_gas",
    "extra_data",
];

/// Every transaction field the service can return.
pub const TRANSACTION_FIELDS: &[&str] = &[
    "block_number",
    "block_hash",
    "transaction_index",
    "hash",
    "from",
    "to",
    "nonce",
    "value",
    "gas",
    "gas_price",
    "gas_used",
    "cumulative_gas_used",
    "effective_gas_price",
    "max_fee_per_gas",
    "max_priority_fee_per_gas",
    "max_fee_per_blob_gas",
    "chain_id",
    "input",
    "status",
    "type",
];

/// Every log field the service can return.
pub const LOG_FIELDS: &[&str] = &[
    "block_number",
    "transaction_hash",
    "transaction_index",
    "log_index",
    "address",
    "topics",
    "data",
    "removed",
];

/// Page limit on transactions for block+transaction queries.
pub const MAX_TRANSACTIONS_PER_PAGE: usize = 1_000;

/// Wire query sent to the indexing service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Inclusive start block.
    pub from_block: u64,
    /// Exclusive end block; `None` means the service's tip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_block: Option<u64>,
    /// Log selections, OR-ed together.
    #[serde(default)]
    pub logs: Vec<LogSelection>,
    /// Transaction selections, OR-ed together.
    #[serde(default)]
    pub transactions: Vec<TransactionSelection>,
    /// Return every block in range, not only those with matches.
    #[serde(default)]
    pub include_all_blocks: bool,
    /// Columns to return per table.
    #[serde(default)]
    pub field_selection: FieldSelection,
    /// How matched rows pull in related rows.
    #[serde(default)]
    pub join_mode: JoinMode,
    /// Stop a page once this many transactions were collected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_num_transactions: Option<usize>,
}

/// Log filter. Empty lists match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSelection {
    /// Emitting contracts.
    #[serde(default)]
    pub address: Vec<Address>,
    /// Topic filters, AND-ed by position and OR-ed within a position.
    #[serde(default)]
    pub topics: Vec<Vec<B256>>,
}

impl LogSelection {
    /// Whether a log with `address` and `topics` passes this filter.
    #[must_use]
    pub fn matches(&self, address: Address, topics: &[B256]) -> bool {
        if !self.address.is_empty() && !self.address.contains(&address) {
            return false;
        }
        self.topics.iter().enumerate().all(|(pos, wanted)| {
            wanted.is_empty() || topics.get(pos).is_some_and(|t| wanted.contains(t))
        })
    }
}

/// Transaction filter. Empty lists match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSelection {
    /// Senders.
    #[serde(default)]
    pub from: Vec<Address>,
    /// Recipients.
    #[serde(default)]
    pub to: Vec<Address>,
    /// Transaction hashes.
    #[serde(default)]
    pub hash: Vec<B256>,
}

/// Requested column names per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    /// Block fields.
    #[serde(default)]
    pub block: BTreeSet<String>,
    /// Transaction fields.
    #[serde(default)]
    pub transaction: BTreeSet<String>,
    /// Log fields.
    #[serde(default)]
    pub log: BTreeSet<String>,
}

fn field_set(fields: &[&str]) -> BTreeSet<String> {
    fields.iter().map(|f| (*f).to_owned()).collect()
}

/// How the service joins related rows onto matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Matched logs pull in their transactions and blocks; matched
    /// transactions pull in their blocks.
    #[default]
    Default,
    /// Also pull in every log and transaction of touched blocks.
    JoinAll,
    /// Return only the matched rows.
    JoinNothing,
}

/// Encoding of binary values (hashes, addresses, bytes) in output tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HexOutput {
    /// Plain lowercase hex.
    NonPrefixed,
    /// Lowercase hex with a `0x` prefix.
    #[default]
    Prefixed,
}

/// Column name to target type, per table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Decoded event parameters.
    pub decoded_log: BTreeMap<String, ColumnType>,
    /// Transaction columns.
    pub transaction: BTreeMap<String, ColumnType>,
    /// Block columns.
    pub block: BTreeMap<String, ColumnType>,
}

fn mapping(types: ColumnTypes) -> BTreeMap<String, ColumnType> {
    types.iter().map(|(name, ty)| ((*name).to_owned(), *ty)).collect()
}

impl ColumnMapping {
    /// Build from static type tables.
    #[must_use]
    pub fn from_tables(
        decoded_log: ColumnTypes,
        transaction: ColumnTypes,
        block: ColumnTypes,
    ) -> Self {
        Self {
            decoded_log: mapping(decoded_log),
            transaction: mapping(transaction),
            block: mapping(block),
        }
    }

    /// Default transaction and block types with no decoded-log types.
    #[must_use]
    pub fn defaults() -> Self {
        Self::from_tables(&[], TRANSACTION_COLUMN_TYPES, BLOCK_COLUMN_TYPES)
    }
}

/// Client-side decoding and typing instructions paired with a [`Query`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConfig {
    /// Binary value encoding.
    pub hex_output: HexOutput,
    /// Event declaration used to decode logs, if this is an event query.
    pub event_signature: Option<String>,
    /// Type coercions applied after assembly.
    pub column_mapping: ColumnMapping,
}

/// What a query asks for.
#[derive(Debug, Clone, Copy)]
pub enum QueryTarget<'a> {
    /// Logs of one registered event, optionally filtered on the first
    /// indexed parameter.
    Event {
        /// The event.
        event: &'a RegisteredEvent,
        /// Address expected in topic position 1.
        address_filter: Option<Address>,
    },
    /// Every block in range.
    Blocks,
    /// Every block in range with all of its transactions.
    BlocksAndTransactions,
    /// Transactions with the given hashes, and their blocks.
    TransactionHashes(&'a [B256]),
}

/// Build the query and stream configuration for `target` over `range`.
#[must_use]
pub fn build(range: BlockRange, target: QueryTarget<'_>) -> (Query, StreamConfig) {
    let mut query = Query {
        from_block: range.from_block(),
        to_block: Some(range.to_block()),
        ..Query::default()
    };
    let mut config = StreamConfig {
        hex_output: HexOutput::Prefixed,
        event_signature: None,
        column_mapping: ColumnMapping::defaults(),
    };

    match target {
        QueryTarget::Event {
            event,
            address_filter,
        } => {
            let definition = event.definition();
            let mut topics = vec![vec![event.topic0()]];
            if let Some(address) = address_filter {
                topics.push(vec![address.into_word()]);
            }
            query.logs.push(LogSelection {
                address: vec![definition.contract],
                topics,
            });
            query.field_selection = FieldSelection {
                block: field_set(BLOCK_FIELDS),
                transaction: field_set(TRANSACTION_FIELDS),
                log: field_set(LOG_FIELDS),
            };
            config.event_signature = Some(definition.signature.to_owned());
            config.column_mapping = ColumnMapping::from_tables(
                definition.decoded_log_types,
                definition.transaction_column_types,
                definition.block_column_types,
            );
        }
        QueryTarget::Blocks => {
            query.include_all_blocks = true;
            query.field_selection.block = field_set(BLOCK_FIELDS);
        }
        QueryTarget::BlocksAndTransactions => {
            query.transactions.push(TransactionSelection::default());
            query.field_selection.block = field_set(BLOCK_FIELDS);
            query.field_selection.transaction = field_set(TRANSACTION_FIELDS);
            query.max_num_transactions = Some(MAX_TRANSACTIONS_PER_PAGE);
        }
        QueryTarget::TransactionHashes(hashes) => {
            query.transactions.push(TransactionSelection {
                hash: hashes.to_vec(),
                ..TransactionSelection::default()
            });
            query.field_selection.block = field_set(BLOCK_FIELDS);
            query.field_selection.transaction = field_set(TRANSACTION_FIELDS);
        }
    }

    (query, config)
}
