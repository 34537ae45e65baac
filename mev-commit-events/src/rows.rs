//! Wire row types returned by an indexing service.
//!
//! Every field is optional: the service only fills the fields named in the
//! query's field selection. Quantities are accepted as JSON numbers, decimal
//! strings, or `0x`-prefixed hex strings.

use alloy::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrString {
    Num(u64),
    Str(String),
}

fn parse_u256(s: &str) -> Result<U256, String> {
    s.trim().parse::<U256>().map_err(|e| format!("invalid quantity `{s}`: {e}"))
}

/// Deserialize an optional `u64` from a number, decimal or hex string.
fn opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrString::Num(n)) => Ok(Some(n)),
        Some(NumOrString::Str(s)) => {
            let value = parse_u256(&s).map_err(serde::de::Error::custom)?;
            u64::try_from(value)
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("quantity `{s}` exceeds u64")))
        }
    }
}

/// Deserialize an optional `U256` from a number, decimal or hex string.
fn opt_u256<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrString::Num(n)) => Ok(Some(U256::from(n))),
        Some(NumOrString::Str(s)) => parse_u256(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// A block header row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BlockRow {
    /// Block number.
    #[serde(deserialize_with = "opt_u64")]
    pub number: Option<u64>,
    /// Block hash.
    pub hash: Option<B256>,
    /// Parent block hash.
    pub parent_hash: Option<B256>,
    /// Fee recipient.
    pub miner: Option<Address>,
    /// Unix timestamp in seconds.
    #[serde(deserialize_with = "opt_u256")]
    pub timestamp: Option<U256>,
    /// Gas limit.
    #[serde(deserialize_with = "opt_u256")]
    pub gas_limit: Option<U256>,
    /// Gas used by all transactions.
    #[serde(deserialize_with = "opt_u256")]
    pub gas_used: Option<U256>,
    /// EIP-1559 base fee.
    #[serde(deserialize_with = "opt_u256")]
    pub base_fee_per_gas: Option<U256>,
    /// Encoded block size in bytes.
    #[serde(deserialize_with = "opt_u256")]
    pub size: Option<U256>,
    /// EIP-4844 blob gas used.
    #[serde(deserialize_with = "opt_u256")]
    pub blob_gas_used: Option<U256>,
    /// EIP-4844 excess blob gas.
    #[serde(deserialize_with = "opt_u256")]
    pub excess_blob_gas: Option<U256>,
    /// Extra data set by the block producer.
    pub extra_data: Option<Bytes>,
}

/// A transaction row, including receipt fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransactionRow {
    /// Containing block number.
    #[serde(deserialize_with = "opt_u64")]
    pub block_number: Option<u64>,
    /// Containing block hash.
    pub block_hash: Option<B256>,
    /// Position within the block.
    #[serde(deserialize_with = "opt_u64")]
    pub transaction_index: Option<u64>,
    /// Transaction hash.
    pub hash: Option<B256>,
    /// Sender.
    pub from: Option<Address>,
    /// Recipient; `None` for contract creation.
    pub to: Option<Address>,
    /// Sender nonce.
    #[serde(deserialize_with = "opt_u256")]
    pub nonce: Option<U256>,
    /// Transferred wei.
    #[serde(deserialize_with = "opt_u256")]
    pub value: Option<U256>,
    /// Gas limit.
    #[serde(deserialize_with = "opt_u256")]
    pub gas: Option<U256>,
    /// Legacy gas price.
    #[serde(deserialize_with = "opt_u256")]
    pub gas_price: Option<U256>,
    /// Gas used (receipt).
    #[serde(deserialize_with = "opt_u256")]
    pub gas_used: Option<U256>,
    /// Cumulative gas used in the block (receipt).
    #[serde(deserialize_with = "opt_u256")]
    pub cumulative_gas_used: Option<U256>,
    /// Price actually paid per gas (receipt).
    #[serde(deserialize_with = "opt_u256")]
    pub effective_gas_price: Option<U256>,
    /// EIP-1559 fee cap.
    #[serde(deserialize_with = "opt_u256")]
    pub max_fee_per_gas: Option<U256>,
    /// EIP-1559 tip cap.
    #[serde(deserialize_with = "opt_u256")]
    pub max_priority_fee_per_gas: Option<U256>,
    /// EIP-4844 blob fee cap.
    #[serde(deserialize_with = "opt_u256")]
    pub max_fee_per_blob_gas: Option<U256>,
    /// EIP-155 chain id.
    #[serde(deserialize_with = "opt_u256")]
    pub chain_id: Option<U256>,
    /// Call data.
    pub input: Option<Bytes>,
    /// Execution status (1 success, 0 revert).
    #[serde(deserialize_with = "opt_u64")]
    pub status: Option<u64>,
    /// EIP-2718 type.
    #[serde(rename = "type", deserialize_with = "opt_u64")]
    pub kind: Option<u64>,
}

/// A raw event log row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogRow {
    /// Containing block number.
    #[serde(deserialize_with = "opt_u64")]
    pub block_number: Option<u64>,
    /// Emitting transaction hash.
    pub transaction_hash: Option<B256>,
    /// Emitting transaction position.
    #[serde(deserialize_with = "opt_u64")]
    pub transaction_index: Option<u64>,
    /// Position of the log within the block.
    #[serde(deserialize_with = "opt_u64")]
    pub log_index: Option<u64>,
    /// Emitting contract.
    pub address: Option<Address>,
    /// Indexed topics, signature hash first.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed parameters.
    pub data: Option<Bytes>,
    /// Whether the log was removed by a reorg.
    pub removed: Option<bool>,
}
