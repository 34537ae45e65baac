//! Arrow schemas and row-to-batch conversion for the four result tables.
//!
//! Join keys and positions (`number`, `block_number`, `transaction_index`,
//! `log_index`) are `UInt64`. Everything else is `Utf8`: binary values as hex
//! (prefix controlled by [`HexOutput`]) and quantities as `0x` hex, so wei
//! amounts never overflow before the assembler coerces them.

use std::fmt::LowerHex;
use std::sync::{Arc, LazyLock};

use alloy::primitives::U256;
use arrow_array::{ArrayRef, BooleanArray, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema, SchemaRef};

use crate::error::Result;
use crate::query::HexOutput;
use crate::rows::{BlockRow, LogRow, TransactionRow};

fn utf8(name: &str) -> Field {
    Field::new(name, DataType::Utf8, true)
}

fn uint64(name: &str) -> Field {
    Field::new(name, DataType::UInt64, true)
}

/// Schema of the `blocks` table.
pub static BLOCK_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        uint64("number"),
        utf8("hash"),
        utf8("parent_hash"),
        utf8("miner"),
        utf8("timestamp"),
        utf8("gas_limit"),
        utf8("gas_used"),
        utf8("base_fee_per_gas"),
        utf8("size"),
        utf8("blob_gas_used"),
        utf8("excess_blob_gas"),
        utf8("extra_data"),
    ]))
});

/// Schema of the `transactions` table.
pub static TRANSACTION_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        uint64("block_number"),
        utf8("block_hash"),
        uint64("transaction_index"),
        utf8("hash"),
        utf8("from"),
        utf8("to"),
        utf8("nonce"),
        utf8("value"),
        utf8("gas"),
        utf8("gas_price"),
        utf8("gas_used"),
        utf8("cumulative_gas_used"),
        utf8("effective_gas_price"),
        utf8("max_fee_per_gas"),
        utf8("max_priority_fee_per_gas"),
        utf8("max_fee_per_blob_gas"),
        utf8("chain_id"),
        utf8("input"),
        uint64("status"),
        uint64("type"),
    ]))
});

/// Schema of the `logs` table, mirroring `eth_getLogs`.
pub static LOG_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        uint64("block_number"),
        utf8("transaction_hash"),
        uint64("transaction_index"),
        uint64("log_index"),
        utf8("address"),
        utf8("topic0"),
        utf8("topic1"),
        utf8("topic2"),
        utf8("topic3"),
        utf8("data"),
        Field::new("removed", DataType::Boolean, true),
    ]))
});

/// Render a fixed-size value (hash, address) as hex.
pub(crate) fn hex<T: LowerHex>(value: &T, mode: HexOutput) -> String {
    match mode {
        HexOutput::Prefixed => format!("{value:#x}"),
        HexOutput::NonPrefixed => format!("{value:x}"),
    }
}

/// Render a byte string as hex. `Bytes` always prints its `0x` through
/// `LowerHex`, so it goes through `alloy::hex` instead.
pub(crate) fn hex_bytes(bytes: &[u8], mode: HexOutput) -> String {
    match mode {
        HexOutput::Prefixed => alloy::hex::encode_prefixed(bytes),
        HexOutput::NonPrefixed => alloy::hex::encode(bytes),
    }
}

fn quantity(value: Option<U256>) -> Option<String> {
    value.map(|v| format!("{v:#x}"))
}

fn strings(values: Vec<Option<String>>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

fn uints(values: Vec<Option<u64>>) -> ArrayRef {
    Arc::new(UInt64Array::from(values))
}

/// Convert block rows into a batch with [`BLOCK_SCHEMA`].
///
/// # Errors
///
/// Returns an error if Arrow rejects the columns.
pub fn blocks_to_batch(rows: &[BlockRow], mode: HexOutput) -> Result<RecordBatch> {
    let quantities =
        |f: fn(&BlockRow) -> Option<U256>| strings(rows.iter().map(|r| quantity(f(r))).collect());

    let columns: Vec<ArrayRef> = vec![
        uints(rows.iter().map(|r| r.number).collect()),
        strings(rows.iter().map(|r| r.hash.map(|h| hex(&h, mode))).collect()),
        strings(rows.iter().map(|r| r.parent_hash.map(|h| hex(&h, mode))).collect()),
        strings(rows.iter().map(|r| r.miner.map(|a| hex(&a, mode))).collect()),
        quantities(|r| r.timestamp),
        quantities(|r| r.gas_limit),
        quantities(|r| r.gas_used),
        quantities(|r| r.base_fee_per_gas),
        quantities(|r| r.size),
        quantities(|r| r.blob_gas_used),
        quantities(|r| r.excess_blob_gas),
        strings(rows.iter().map(|r| r.extra_data.as_ref().map(|d| hex_bytes(d, mode))).collect()),
    ];
    Ok(RecordBatch::try_new(Arc::clone(&BLOCK_SCHEMA), columns)?)
}

/// Convert transaction rows into a batch with [`TRANSACTION_SCHEMA`].
///
/// # Errors
///
/// Returns an error if Arrow rejects the columns.
pub fn transactions_to_batch(rows: &[TransactionRow], mode: HexOutput) -> Result<RecordBatch> {
    let quantities = |f: fn(&TransactionRow) -> Option<U256>| {
        strings(rows.iter().map(|r| quantity(f(r))).collect())
    };

    let columns: Vec<ArrayRef> = vec![
        uints(rows.iter().map(|r| r.block_number).collect()),
        strings(rows.iter().map(|r| r.block_hash.map(|h| hex(&h, mode))).collect()),
        uints(rows.iter().map(|r| r.transaction_index).collect()),
        strings(rows.iter().map(|r| r.hash.map(|h| hex(&h, mode))).collect()),
        strings(rows.iter().map(|r| r.from.map(|a| hex(&a, mode))).collect()),
        strings(rows.iter().map(|r| r.to.map(|a| hex(&a, mode))).collect()),
        quantities(|r| r.nonce),
        quantities(|r| r.value),
        quantities(|r| r.gas),
        quantities(|r| r.gas_price),
        quantities(|r| r.gas_used),
        quantities(|r| r.cumulative_gas_used),
        quantities(|r| r.effective_gas_price),
        quantities(|r| r.max_fee_per_gas),
        quantities(|r| r.max_priority_fee_per_gas),
        quantities(|r| r.max_fee_per_blob_gas),
        quantities(|r| r.chain_id),
        strings(rows.iter().map(|r| r.input.as_ref().map(|d| hex_bytes(d, mode))).collect()),
        uints(rows.iter().map(|r| r.status).collect()),
        uints(rows.iter().map(|r| r.kind).collect()),
    ];
    Ok(RecordBatch::try_new(Arc::clone(&TRANSACTION_SCHEMA), columns)?)
}

/// Convert log rows into a batch with [`LOG_SCHEMA`].
///
/// # Errors
///
/// Returns an error if Arrow rejects the columns.
pub fn logs_to_batch(rows: &[LogRow], mode: HexOutput) -> Result<RecordBatch> {
    let topic = |pos: usize| {
        strings(
            rows.iter()
                .map(|r| r.topics.get(pos).map(|t| hex(t, mode)))
                .collect(),
        )
    };

    let columns: Vec<ArrayRef> = vec![
        uints(rows.iter().map(|r| r.block_number).collect()),
        strings(rows.iter().map(|r| r.transaction_hash.map(|h| hex(&h, mode))).collect()),
        uints(rows.iter().map(|r| r.transaction_index).collect()),
        uints(rows.iter().map(|r| r.log_index).collect()),
        strings(rows.iter().map(|r| r.address.map(|a| hex(&a, mode))).collect()),
        topic(0),
        topic(1),
        topic(2),
        topic(3),
        strings(rows.iter().map(|r| r.data.as_ref().map(|d| hex_bytes(d, mode))).collect()),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.removed).collect::<Vec<_>>())),
    ];
    Ok(RecordBatch::try_new(Arc::clone(&LOG_SCHEMA), columns)?)
}

/// The four tables gathered for one query, in source order.
#[derive(Debug, Clone)]
pub struct RawResultSet {
    /// One row per raw log, holding decoded event parameters.
    pub decoded_logs: RecordBatch,
    /// Raw logs.
    pub logs: RecordBatch,
    /// Transactions.
    pub transactions: RecordBatch,
    /// Blocks.
    pub blocks: RecordBatch,
}
