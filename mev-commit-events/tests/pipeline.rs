//! End-to-end tests of the query facade against an in-memory archive.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::{Address, B256, U256, address, keccak256};
use arrow_array::{Array, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::DataType;
use mev_commit::{ColumnType, ColumnTypes, EventDefinition, EventRegistry};
use mev_commit_events::query::Query;
use mev_commit_events::range::{self, BlockRange};
use mev_commit_events::rows::{BlockRow, LogRow, TransactionRow};
use mev_commit_events::service::{QueryResponse, ResponseData};
use mev_commit_events::{Client, EventQuery, IndexingService, QueryOutput, RangeSpec, Result, Sink};

const DEPOSITS: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
const DEPOSIT_TYPES: ColumnTypes = &[("amount", ColumnType::Float64)];

const ALICE: Address = address!("00000000000000000000000000000000000a11ce");
const BOB: Address = address!("0000000000000000000000000000000000000b0b");

/// Chain data served the way an indexing service would: logs by
/// selection, plus the transactions and blocks they belong to.
#[derive(Default)]
struct Archive {
    height: u64,
    blocks: Vec<BlockRow>,
    transactions: Vec<TransactionRow>,
    logs: Vec<LogRow>,
    /// Blocks answered per page; `None` answers the whole range at once.
    page_blocks: Option<u64>,
    height_calls: AtomicUsize,
    queries: Mutex<Vec<Query>>,
}

impl Archive {
    fn query_count(&self) -> usize {
        self.queries.lock().expect("lock").len()
    }
}

impl IndexingService for Archive {
    async fn height(&self) -> Result<u64> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.height)
    }

    async fn query(&self, query: &Query) -> Result<QueryResponse> {
        self.queries.lock().expect("lock").push(query.clone());

        let to_block = query.to_block.unwrap_or(self.height);
        let end = self
            .page_blocks
            .map_or(to_block, |n| (query.from_block + n).min(to_block));
        let in_page = |block: Option<u64>| block.is_some_and(|b| b >= query.from_block && b < end);

        let logs: Vec<LogRow> = self
            .logs
            .iter()
            .filter(|log| in_page(log.block_number))
            .filter(|log| {
                query.logs.iter().any(|selection| {
                    log.address
                        .is_some_and(|address| selection.matches(address, &log.topics))
                })
            })
            .cloned()
            .collect();
        let log_hashes: HashSet<B256> =
            logs.iter().filter_map(|log| log.transaction_hash).collect();

        let transactions: Vec<TransactionRow> = self
            .transactions
            .iter()
            .filter(|tx| in_page(tx.block_number))
            .filter(|tx| {
                let hash = tx.hash.unwrap_or_default();
                log_hashes.contains(&hash)
                    || query
                        .transactions
                        .iter()
                        .any(|sel| sel.hash.is_empty() || sel.hash.contains(&hash))
            })
            .cloned()
            .collect();

        let wanted: HashSet<u64> = logs
            .iter()
            .filter_map(|log| log.block_number)
            .chain(transactions.iter().filter_map(|tx| tx.block_number))
            .collect();
        let blocks = self
            .blocks
            .iter()
            .filter(|block| in_page(block.number))
            .filter(|block| {
                query.include_all_blocks || block.number.is_some_and(|n| wanted.contains(&n))
            })
            .cloned()
            .collect();

        Ok(QueryResponse {
            archive_height: Some(self.height),
            next_block: end,
            total_execution_time: 1,
            data: vec![ResponseData {
                blocks,
                transactions,
                logs,
            }],
        })
    }
}

fn deposit_registry() -> EventRegistry {
    EventRegistry::new([EventDefinition::new(
        "Deposit",
        "Deposit(address indexed who, uint256 amount)",
        DEPOSITS,
        DEPOSIT_TYPES,
    )])
    .expect("valid registry")
}

fn tx_hash(n: u64) -> B256 {
    keccak256(n.to_be_bytes())
}

fn deposit(block: u64, tx: u64, who: Address, amount: u64) -> LogRow {
    LogRow {
        block_number: Some(block),
        transaction_hash: Some(tx_hash(tx)),
        log_index: Some(0),
        address: Some(DEPOSITS),
        topics: vec![
            keccak256("Deposit(address,uint256)"),
            who.into_word(),
        ],
        data: Some(U256::from(amount).to_be_bytes::<32>().to_vec().into()),
        removed: Some(false),
        ..LogRow::default()
    }
}

fn transaction(block: u64, n: u64) -> TransactionRow {
    TransactionRow {
        block_number: Some(block),
        hash: Some(tx_hash(n)),
        from: Some(ALICE),
        to: Some(DEPOSITS),
        nonce: Some(U256::from(n)),
        gas_price: Some(U256::from(2_000_000_000u64)),
        gas_used: Some(U256::from(21_000u64)),
        value: Some(U256::ZERO),
        ..TransactionRow::default()
    }
}

fn block(number: u64) -> BlockRow {
    BlockRow {
        number: Some(number),
        hash: Some(B256::with_last_byte(u8::try_from(number % 256).expect("fits"))),
        timestamp: Some(U256::from(1_700_000_000 + number * 12)),
        gas_used: Some(U256::from(12_000_000u64)),
        gas_limit: Some(U256::from(30_000_000u64)),
        base_fee_per_gas: Some(U256::from(7u64)),
        ..BlockRow::default()
    }
}

/// Three deposits in blocks 10, 11 and 12; block 12 is missing.
fn deposit_archive() -> Archive {
    Archive {
        height: 1_000,
        logs: vec![
            deposit(10, 1, ALICE, 100),
            deposit(11, 2, BOB, 250),
            deposit(12, 3, ALICE, 75),
        ],
        transactions: vec![transaction(10, 1), transaction(11, 2), transaction(12, 3)],
        blocks: vec![block(10), block(11)],
        ..Archive::default()
    }
}

fn column<'a, T: 'static>(table: &'a RecordBatch, name: &str) -> &'a T {
    table
        .column_by_name(name)
        .unwrap_or_else(|| panic!("column `{name}` present"))
        .as_any()
        .downcast_ref::<T>()
        .unwrap_or_else(|| panic!("column `{name}` has the expected type"))
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mev-commit-events-it-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[tokio::test]
async fn event_rows_join_transactions_and_blocks() {
    let client = Client::with_service(deposit_archive(), deposit_registry());

    let table = client
        .query_event("Deposit", EventQuery::new(RangeSpec::between(0, 100)))
        .await
        .expect("query succeeds");

    assert_eq!(table.num_rows(), 3, "one row per deposit");

    let amount = column::<Float64Array>(&table, "amount");
    assert_eq!(amount.data_type(), &DataType::Float64, "declared type applied");
    assert!((amount.value(1) - 250.0).abs() < f64::EPSILON, "decoded amount");

    let timestamp = column::<Int64Array>(&table, "timestamp");
    assert_eq!(timestamp.value(0), 1_700_000_120, "block timestamp joined");
    assert!(timestamp.is_null(2), "missing block leaves nulls");

    let gas_price = column::<Float64Array>(&table, "gas_price");
    assert!(gas_price.is_valid(2), "transaction still joined without its block");

    let hashes = column::<StringArray>(&table, "hash");
    assert_eq!(hashes.value(0), format!("{:#x}", tx_hash(1)), "transaction hash attached");
}

#[tokio::test]
async fn address_filter_narrows_to_indexed_bidder() {
    let archive = deposit_archive();
    let client = Client::with_service(archive, deposit_registry());

    let table = client
        .query_event(
            "Deposit",
            EventQuery::new(RangeSpec::between(0, 100))
                .for_address(ALICE)
                .without_transactions(),
        )
        .await
        .expect("query succeeds");

    assert_eq!(table.num_rows(), 2, "only alice's deposits");
    assert!(table.schema().index_of("gas_price").is_err(), "no transaction columns");

    let queries = client.service().queries.lock().expect("lock");
    let topics = &queries.first().expect("one query").logs.first().expect("selection").topics;
    assert_eq!(topics.get(1), Some(&vec![ALICE.into_word()]), "padded address topic");
}

#[tokio::test]
async fn block_and_transaction_query_has_one_row_per_transaction() {
    let mut archive = Archive {
        height: 500,
        ..Archive::default()
    };
    for number in 100..110 {
        archive.blocks.push(block(number));
        for i in 0..5 {
            archive.transactions.push(transaction(number, number * 10 + i));
        }
    }
    // Outside the requested range.
    archive.transactions.push(transaction(250, 9_999));
    let client = Client::with_service(archive, deposit_registry());

    let out = client
        .get_blocks_txs(RangeSpec::between(100, 200), Sink::Memory)
        .await
        .expect("query succeeds");
    let QueryOutput::Table(table) = out else {
        panic!("memory sink returns a table");
    };

    assert_eq!(table.num_rows(), 50, "transaction-level rows");
    let timestamp = column::<Int64Array>(&table, "timestamp");
    assert_eq!(timestamp.null_count(), 0, "every transaction carries its block timestamp");
    assert_eq!(timestamp.value(7), 1_700_000_000 + 101 * 12, "eighth transaction is in block 101");
    assert_eq!(client.service().height_calls.load(Ordering::SeqCst), 0, "explicit range");
}

#[tokio::test]
async fn count_before_end_block_resolves_without_height() {
    let archive = deposit_archive();
    let range = range::resolve(&archive, RangeSpec::from_parts(None, Some(1_000), Some(100)))
        .await
        .expect("resolves");
    assert_eq!(range, BlockRange::new(900, 1_000).expect("valid"), "count before end");
    assert_eq!(archive.height_calls.load(Ordering::SeqCst), 0, "no height lookup");

    let latest = range::resolve(&archive, RangeSpec::LastBlocks { count: 10 })
        .await
        .expect("resolves");
    assert_eq!(latest, BlockRange::new(990, 1_000).expect("valid"), "last blocks");
    assert_eq!(archive.height_calls.load(Ordering::SeqCst), 1, "one height lookup");
}

#[tokio::test]
async fn only_execute_event_query_rejects_empty_results() {
    let client = Client::with_service(deposit_archive(), deposit_registry());
    let quiet = EventQuery::new(RangeSpec::between(500, 600));

    let table = client.query_event("Deposit", quiet).await.expect("empty is fine");
    assert_eq!(table.num_rows(), 0, "no rows");
    for name in ["who", "amount", "hash", "gas_price", "timestamp"] {
        assert!(table.schema().index_of(name).is_ok(), "empty table keeps `{name}`");
    }

    let err = client
        .execute_event_query("Deposit", quiet)
        .await
        .expect_err("no data is an error here");
    assert!(err.is_no_data(), "{err}");
    assert!(err.to_string().contains("[500, 600)"), "{err}");

    let blocks = client
        .get_blocks(RangeSpec::between(500, 600), Sink::Memory)
        .await
        .expect("empty blocks are fine");
    assert_eq!(blocks.num_rows(), 0, "no blocks");

    let found = client
        .execute_event_query("Deposit", EventQuery::new(RangeSpec::between(0, 100)))
        .await
        .expect("data present");
    assert_eq!(found.num_rows(), 3, "same rows as query_event");
}

#[tokio::test]
async fn unknown_event_is_a_registry_error() {
    let client = Client::with_service(deposit_archive(), deposit_registry());
    let err = client
        .query_event("Withdrawal", EventQuery::default())
        .await
        .expect_err("not registered");
    assert!(err.is_unknown_event(), "{err}");
    assert_eq!(client.service().query_count(), 0, "nothing sent");
}

#[tokio::test]
async fn paged_responses_are_stitched_together() {
    let archive = Archive {
        page_blocks: Some(4),
        ..deposit_archive()
    };
    let client = Client::with_service(archive, deposit_registry());

    let table = client
        .query_event("Deposit", EventQuery::new(RangeSpec::between(0, 16)))
        .await
        .expect("query succeeds");

    assert_eq!(table.num_rows(), 3, "deposits from every page");
    let starts: Vec<u64> = client
        .service()
        .queries
        .lock()
        .expect("lock")
        .iter()
        .map(|q| q.from_block)
        .collect();
    assert_eq!(starts, vec![0, 4, 8, 12], "one request per page");
}

#[tokio::test]
async fn saved_event_reads_back_with_coerced_types() {
    let dir = scratch_dir("save-event");
    let client = Client::with_service(deposit_archive(), deposit_registry());

    let handle = client
        .save_event("Deposit", EventQuery::new(RangeSpec::between(0, 100)), &dir)
        .await
        .expect("saved");

    assert_eq!(handle.rows_in("decoded_logs"), 3, "decoded rows");
    assert_eq!(handle.rows_in("logs"), 3, "raw logs");
    assert_eq!(handle.rows_in("transactions"), 3, "transactions");
    assert_eq!(handle.rows_in("blocks"), 2, "blocks");
    assert_eq!(handle.files.len(), 4, "one file per table");

    let decoded = mev_commit_events::parquet::read(&dir.join("decoded_logs.parquet")).expect("read");
    let rows: usize = decoded.iter().map(RecordBatch::num_rows).sum();
    assert_eq!(rows, 3, "all decoded rows on disk");
    let first = decoded.first().expect("one batch");
    assert_eq!(
        first.schema().field_with_name("amount").expect("amount").data_type(),
        &DataType::Float64,
        "coerced before writing"
    );

    let leftovers = std::fs::read_dir(&dir)
        .expect("dir exists")
        .filter_map(std::result::Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
        .count();
    assert_eq!(leftovers, 0, "temp files renamed");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn transaction_search_covers_full_history() {
    let client = Client::with_service(deposit_archive(), deposit_registry());

    let out = client
        .search_txs(&[tx_hash(2), B256::repeat_byte(0x42)], Sink::Memory)
        .await
        .expect("search succeeds");

    assert_eq!(out.num_rows(), 1, "only the known transaction");
    assert_eq!(client.service().height_calls.load(Ordering::SeqCst), 1, "height bounds the search");
    let queries = client.service().queries.lock().expect("lock");
    let query = queries.first().expect("one query");
    assert_eq!((query.from_block, query.to_block), (0, Some(1_000)), "genesis to tip");
}
