//! Joins the four collected tables into one result table.
//!
//! Event queries produce one row per decoded log, widened with the emitting
//! transaction and its block. Block+transaction queries produce one row per
//! transaction. Joins are left joins, so the row count always follows the
//! left side.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arrow_array::{Array, ArrayRef, RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{Field, Schema};
use arrow_select::take::take;
use mev_commit::ColumnType;

use crate::coerce::coerce_batch;
use crate::error::{QueryError, Result};
use crate::query::StreamConfig;
use crate::table::RawResultSet;

/// Block columns carried onto transaction rows, and their output names.
const BLOCK_JOIN_COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "timestamp"),
    ("base_fee_per_gas", "base_fee_per_gas"),
    ("gas_used", "block_gas_used"),
];

/// Suffix for right-side columns whose name is already taken.
const COLLISION_SUFFIX: &str = "_tx";

/// Join key appended to decoded logs.
const HASH_COLUMN: &str = "hash";

/// Suffix for an event parameter named like [`HASH_COLUMN`].
const PARAM_SUFFIX: &str = "_param";

/// A batch together with the coercions its columns are due.
struct Typed {
    batch: RecordBatch,
    mapping: BTreeMap<String, ColumnType>,
}

impl Typed {
    fn coerce(self) -> Result<RecordBatch> {
        coerce_batch(&self.batch, &self.mapping)
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str, table: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| QueryError::Decode(format!("{table} table has no usable `{name}` column")))
}

fn build_batch(fields: Vec<Field>, columns: Vec<ArrayRef>, rows: usize) -> Result<RecordBatch> {
    let options = arrow_array::RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        columns,
        &options,
    )?)
}

fn row_index(idx: usize) -> Result<u32> {
    u32::try_from(idx)
        .map_err(|_| QueryError::Decode(format!("row {idx} is beyond the joinable row range")))
}

/// `transactions ⟕ blocks` on `block_number = number`.
fn join_transactions_blocks(raw: &RawResultSet, config: &StreamConfig) -> Result<Typed> {
    let transactions = &raw.transactions;
    let blocks = &raw.blocks;

    let numbers = column::<UInt64Array>(blocks, "number", "blocks")?;
    let mut by_number = HashMap::with_capacity(numbers.len());
    for (idx, number) in numbers.iter().enumerate() {
        if let Some(number) = number {
            let row = row_index(idx)?;
            by_number.entry(number).or_insert(row);
        }
    }

    let block_numbers = column::<UInt64Array>(transactions, "block_number", "transactions")?;
    let indices: UInt32Array = block_numbers
        .iter()
        .map(|n| n.and_then(|n| by_number.get(&n).copied()))
        .collect();

    let mapping = &config.column_mapping;
    let mut fields: Vec<Field> = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();
    let mut types = BTreeMap::new();

    for (field, array) in transactions.schema().fields().iter().zip(transactions.columns()) {
        fields.push(field.as_ref().clone());
        columns.push(Arc::clone(array));
        if let Some(ty) = mapping.transaction.get(field.name()) {
            types.insert(field.name().clone(), *ty);
        }
    }

    for (source, target) in BLOCK_JOIN_COLUMNS {
        let Some(array) = blocks.column_by_name(source) else {
            continue;
        };
        let joined = take(array.as_ref(), &indices, None)?;
        fields.push(Field::new(*target, joined.data_type().clone(), true));
        columns.push(joined);
        if let Some(ty) = mapping.block.get(*source) {
            types.insert((*target).to_owned(), *ty);
        }
    }

    Ok(Typed {
        batch: build_batch(fields, columns, transactions.num_rows())?,
        mapping: types,
    })
}

/// Decoded logs with the emitting transaction hash appended as
/// [`HASH_COLUMN`]. A parameter already called that gets [`PARAM_SUFFIX`].
fn decoded_with_hash(raw: &RawResultSet, config: &StreamConfig) -> Result<Typed> {
    let decoded = &raw.decoded_logs;
    let logs = &raw.logs;
    if decoded.num_rows() != logs.num_rows() {
        return Err(QueryError::JoinIntegrity {
            decoded: decoded.num_rows(),
            logs: logs.num_rows(),
        });
    }

    let hashes = logs
        .column_by_name("transaction_hash")
        .ok_or_else(|| QueryError::Decode("logs table has no `transaction_hash` column".into()))?;

    let mut mapping = config.column_mapping.decoded_log.clone();
    let mut fields: Vec<Field> = Vec::with_capacity(decoded.num_columns() + 1);
    for field in decoded.schema().fields() {
        if field.name() == HASH_COLUMN {
            let renamed = format!("{HASH_COLUMN}{PARAM_SUFFIX}");
            if let Some(ty) = mapping.remove(HASH_COLUMN) {
                mapping.insert(renamed.clone(), ty);
            }
            fields.push(field.as_ref().clone().with_name(renamed));
        } else {
            fields.push(field.as_ref().clone());
        }
    }
    let mut columns = decoded.columns().to_vec();
    fields.push(Field::new(HASH_COLUMN, hashes.data_type().clone(), true));
    columns.push(Arc::clone(hashes));

    Ok(Typed {
        batch: build_batch(fields, columns, decoded.num_rows())?,
        mapping,
    })
}

/// `left ⟕ right` on `left.hash = right.hash`. The right key is dropped and
/// right-side name collisions get [`COLLISION_SUFFIX`].
fn join_on_hash(left: Typed, right: Typed) -> Result<Typed> {
    let right_hashes = column::<StringArray>(&right.batch, HASH_COLUMN, "transactions")?;
    let mut by_hash = HashMap::with_capacity(right_hashes.len());
    for (idx, hash) in right_hashes.iter().enumerate() {
        if let Some(hash) = hash {
            let row = row_index(idx)?;
            by_hash.entry(hash).or_insert(row);
        }
    }

    let left_hashes = column::<StringArray>(&left.batch, HASH_COLUMN, "decoded logs")?;
    let indices: UInt32Array = left_hashes
        .iter()
        .map(|h| h.and_then(|h| by_hash.get(h).copied()))
        .collect();

    let left_schema = left.batch.schema();
    let mut fields: Vec<Field> = left_schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns = left.batch.columns().to_vec();
    let mut mapping = left.mapping;

    for (field, array) in right.batch.schema().fields().iter().zip(right.batch.columns()) {
        let name = field.name();
        if name == HASH_COLUMN {
            continue;
        }
        let output = if left_schema.index_of(name).is_ok() {
            format!("{name}{COLLISION_SUFFIX}")
        } else {
            name.clone()
        };
        let joined = take(array.as_ref(), &indices, None)?;
        fields.push(Field::new(output.as_str(), joined.data_type().clone(), true));
        columns.push(joined);
        if let Some(ty) = right.mapping.get(name) {
            mapping.insert(output, *ty);
        }
    }

    Ok(Typed {
        batch: build_batch(fields, columns, left.batch.num_rows())?,
        mapping,
    })
}

/// Assemble the result table of an event or block+transaction query.
///
/// When neither decoded logs nor logs are present the result is the
/// transaction/block join. An event query with no rows at all still returns
/// its full event-shaped schema. Otherwise every decoded log becomes one
/// row, joined to its transaction and block when
/// `want_transaction_columns` is set.
///
/// # Errors
///
/// Returns [`QueryError::JoinIntegrity`] if decoded and raw logs differ in
/// length, or any coercion or Arrow error.
pub fn assemble(
    raw: &RawResultSet,
    config: &StreamConfig,
    want_transaction_columns: bool,
) -> Result<RecordBatch> {
    let transactions = join_transactions_blocks(raw, config)?;
    let no_logs = raw.decoded_logs.num_rows() == 0 && raw.logs.num_rows() == 0;
    let event_shaped = config.event_signature.is_some();

    if no_logs && (transactions.batch.num_rows() > 0 || !event_shaped) {
        return transactions.coerce();
    }

    let events = decoded_with_hash(raw, config)?;
    let joined = if want_transaction_columns {
        join_on_hash(events, transactions)?
    } else {
        events
    };
    joined.coerce()
}

/// Assemble the result table of a block-only query.
///
/// # Errors
///
/// Returns an error if a block column cannot be coerced.
pub fn assemble_blocks(raw: &RawResultSet, config: &StreamConfig) -> Result<RecordBatch> {
    coerce_batch(&raw.blocks, &config.column_mapping.block)
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{B256, U256};
    use arrow_array::{Float64Array, Int64Array};
    use arrow_schema::DataType;
    use mev_commit::EventRegistry;

    use super::*;
    use crate::decode::LogDecoder;
    use crate::query::{HexOutput, QueryTarget, build};
    use crate::range::BlockRange;
    use crate::rows::{BlockRow, LogRow, TransactionRow};
    use crate::table::{blocks_to_batch, logs_to_batch, transactions_to_batch};

    fn funds_slashed_config() -> StreamConfig {
        let registry = EventRegistry::mev_commit().expect("registry");
        let event = registry.lookup("FundsSlashed").expect("known");
        let range = BlockRange::new(0, 100).expect("range");
        build(
            range,
            QueryTarget::Event {
                event,
                address_filter: None,
            },
        )
        .1
    }

    fn slash_log(block: u64, tx: u8, amount: u64) -> LogRow {
        let mut data = [0u8; 32];
        data[24..].copy_from_slice(&amount.to_be_bytes());
        LogRow {
            block_number: Some(block),
            transaction_hash: Some(B256::repeat_byte(tx)),
            log_index: Some(0),
            topics: vec![
                alloy::primitives::keccak256("FundsSlashed(address,uint256)"),
                B256::repeat_byte(0xee),
            ],
            data: Some(data.to_vec().into()),
            ..LogRow::default()
        }
    }

    fn tx(block: u64, hash: u8, gas_used: u64) -> TransactionRow {
        TransactionRow {
            block_number: Some(block),
            hash: Some(B256::repeat_byte(hash)),
            gas_used: Some(U256::from(gas_used)),
            gas_price: Some(U256::from(1_000_000_000u64)),
            nonce: Some(U256::from(3)),
            ..TransactionRow::default()
        }
    }

    fn block(number: u64) -> BlockRow {
        BlockRow {
            number: Some(number),
            timestamp: Some(U256::from(1_700_000_000u64 + number)),
            gas_used: Some(U256::from(15_000_000u64)),
            base_fee_per_gas: Some(U256::from(7)),
            ..BlockRow::default()
        }
    }

    fn raw_set(
        config: &StreamConfig,
        logs: &[LogRow],
        txs: &[TransactionRow],
        blocks: &[BlockRow],
    ) -> RawResultSet {
        let mode = HexOutput::Prefixed;
        let decoded = match config.event_signature.as_deref() {
            Some(sig) => {
                let decoder = LogDecoder::new(sig).expect("decoder");
                decoder.decode_batch(logs, mode).expect("decode").0
            }
            None => RecordBatch::new_empty(Arc::new(Schema::empty())),
        };
        RawResultSet {
            decoded_logs: decoded,
            logs: logs_to_batch(logs, mode).expect("logs"),
            transactions: transactions_to_batch(txs, mode).expect("txs"),
            blocks: blocks_to_batch(blocks, mode).expect("blocks"),
        }
    }

    #[test]
    fn event_rows_are_widened_with_transaction_and_block() {
        let config = funds_slashed_config();
        let raw = raw_set(
            &config,
            &[slash_log(10, 0xa1, 5), slash_log(11, 0xa2, 6), slash_log(11, 0xff, 7)],
            &[tx(10, 0xa1, 21_000), tx(11, 0xa2, 50_000)],
            &[block(10), block(11)],
        );

        let table = assemble(&raw, &config, true).expect("assembles");
        assert_eq!(table.num_rows(), 3, "one row per decoded log");

        let amount = column::<Float64Array>(&table, "amount", "result").expect("float amount");
        assert!((amount.value(2) - 7.0).abs() < f64::EPSILON, "decoded amount");

        let gas_used = column::<Float64Array>(&table, "gas_used", "result").expect("tx gas used");
        assert!((gas_used.value(0) - 21_000.0).abs() < f64::EPSILON, "tx gas");
        assert!(gas_used.is_null(2), "unmatched transaction is null");

        let block_gas = column::<Float64Array>(&table, "block_gas_used", "result").expect("renamed");
        assert!((block_gas.value(1) - 15_000_000.0).abs() < f64::EPSILON, "block gas");

        let timestamp = column::<Int64Array>(&table, "timestamp", "result").expect("int timestamp");
        assert_eq!(timestamp.value(0), 1_700_000_010, "block timestamp");

        let nonce = column::<Int64Array>(&table, "nonce", "result").expect("int nonce");
        assert_eq!(nonce.value(1), 3, "nonce");
    }

    #[test]
    fn colliding_transaction_columns_get_suffix() {
        // Parameters named like transaction columns.
        let config = StreamConfig {
            event_signature: Some("Probe(address indexed from, uint256 value)".into()),
            ..funds_slashed_config()
        };
        let mut data = [0u8; 32];
        data[31] = 9;
        let log = LogRow {
            transaction_hash: Some(B256::repeat_byte(1)),
            topics: vec![
                alloy::primitives::keccak256("Probe(address,uint256)"),
                B256::repeat_byte(2),
            ],
            data: Some(data.to_vec().into()),
            ..LogRow::default()
        };
        let raw = raw_set(&config, &[log], &[tx(1, 1, 100)], &[block(1)]);

        let table = assemble(&raw, &config, true).expect("assembles");
        let schema = table.schema();
        assert!(schema.index_of("from").is_ok(), "decoded param kept");
        assert!(schema.index_of("from_tx").is_ok(), "transaction column suffixed");
        assert!(schema.index_of("value_tx").is_ok(), "transaction value suffixed");
        assert_eq!(
            schema.field_with_name("value_tx").expect("present").data_type(),
            &DataType::Float64,
            "mapping follows the renamed column"
        );
    }

    #[test]
    fn hash_parameter_does_not_shadow_join_key() {
        let mut config = StreamConfig {
            event_signature: Some("Stored(bytes32 indexed hash, uint256 amount)".into()),
            ..funds_slashed_config()
        };
        config.column_mapping.decoded_log.insert("hash".to_owned(), ColumnType::Utf8);
        let mut data = [0u8; 32];
        data[31] = 4;
        let log = LogRow {
            block_number: Some(3),
            transaction_hash: Some(B256::repeat_byte(0x33)),
            topics: vec![
                alloy::primitives::keccak256("Stored(bytes32,uint256)"),
                B256::repeat_byte(0x77),
            ],
            data: Some(data.to_vec().into()),
            ..LogRow::default()
        };
        let raw = raw_set(&config, &[log], &[tx(3, 0x33, 42)], &[block(3)]);

        let table = assemble(&raw, &config, true).expect("assembles");
        let schema = table.schema();
        let hash_columns = schema.fields().iter().filter(|f| f.name() == "hash").count();
        assert_eq!(hash_columns, 1, "single join key column");

        let param = column::<StringArray>(&table, "hash_param", "result").expect("renamed param");
        assert_eq!(param.value(0), format!("0x{}", "77".repeat(32)), "parameter value kept");
        let key = column::<StringArray>(&table, "hash", "result").expect("join key");
        assert_eq!(key.value(0), format!("0x{}", "33".repeat(32)), "transaction hash");

        let gas_price = column::<Float64Array>(&table, "gas_price", "result").expect("joined");
        assert!(gas_price.is_valid(0), "transaction columns joined");
        let timestamp = column::<Int64Array>(&table, "timestamp", "result").expect("joined");
        assert_eq!(timestamp.value(0), 1_700_000_003, "block columns joined");
    }

    #[test]
    fn empty_event_query_keeps_event_shape() {
        let config = funds_slashed_config();
        let raw = raw_set(&config, &[], &[], &[]);

        let table = assemble(&raw, &config, true).expect("assembles");
        assert_eq!(table.num_rows(), 0, "no rows");
        let schema = table.schema();
        for name in ["provider", "amount", "hash", "gas_price", "block_gas_used"] {
            assert!(schema.index_of(name).is_ok(), "empty table has `{name}`");
        }
        assert_eq!(
            schema.field_with_name("amount").expect("present").data_type(),
            &DataType::Float64,
            "declared type applied to empty table"
        );
    }

    #[test]
    fn without_logs_result_is_transaction_join() {
        let range = BlockRange::new(0, 10).expect("range");
        let (_, config) = build(range, QueryTarget::BlocksAndTransactions);
        let raw = raw_set(&config, &[], &[tx(5, 1, 10), tx(6, 2, 20)], &[block(5)]);

        let table = assemble(&raw, &config, true).expect("assembles");
        assert_eq!(table.num_rows(), 2, "one row per transaction");
        let ts = column::<Int64Array>(&table, "timestamp", "result").expect("timestamp");
        assert!(ts.is_valid(0) && ts.is_null(1), "left join keeps unmatched transaction");
    }

    #[test]
    fn mismatched_decoded_and_raw_logs_fail() {
        let config = funds_slashed_config();
        let mut raw = raw_set(&config, &[slash_log(1, 1, 1)], &[], &[]);
        raw.decoded_logs = raw.decoded_logs.slice(0, 0);

        let err = assemble(&raw, &config, true).expect_err("cardinality mismatch");
        assert!(matches!(err, QueryError::JoinIntegrity { decoded: 0, logs: 1 }), "{err}");
    }

    #[test]
    fn reassembling_is_stable() {
        let config = funds_slashed_config();
        let raw = raw_set(&config, &[slash_log(10, 0xa1, 5)], &[tx(10, 0xa1, 1)], &[block(10)]);
        let once = assemble(&raw, &config, true).expect("first");

        let mapping = &config.column_mapping;
        let mut full = mapping.decoded_log.clone();
        full.extend(mapping.transaction.clone());
        for (source, target) in BLOCK_JOIN_COLUMNS {
            if let Some(ty) = mapping.block.get(*source) {
                full.insert((*target).to_owned(), *ty);
            }
        }
        assert!(full.contains_key("block_gas_used"), "renamed block column mapped");

        let again = coerce_batch(&once, &full).expect("recoerce");
        assert_eq!(once, again, "coercion is idempotent on assembled output");
    }

    #[test]
    fn block_only_assembly_coerces_blocks() {
        let (_, config) = build(BlockRange::new(0, 10).expect("range"), QueryTarget::Blocks);
        let raw = raw_set(&config, &[], &[], &[block(1), block(2)]);
        let table = assemble_blocks(&raw, &config).expect("assembles");
        assert_eq!(table.num_rows(), 2, "one row per block");
        assert_eq!(
            table.schema().field_with_name("gas_limit").expect("present").data_type(),
            &DataType::Float64,
            "block types"
        );
    }
}
