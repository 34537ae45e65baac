//! Column type overrides applied to wire-decoded fields.
//!
//! Wei quantities can exceed the range of a 64-bit integer, so fee and gas
//! columns are widened to `Float64`. Counters (nonces, chain ids, block
//! numbers, timestamps) stay integral as `Int64`.

use std::fmt;

/// Target type of a column after coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 64-bit IEEE float.
    Float64,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// UTF-8 text.
    Utf8,
    /// Boolean.
    Boolean,
}

impl ColumnType {
    /// Lowercase type name, as shown in listings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Utf8 => "utf8",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A static `column name → type` table.
pub type ColumnTypes = &'static [(&'static str, ColumnType)];

/// Default transaction column types.
pub const TRANSACTION_COLUMN_TYPES: ColumnTypes = &[
    ("gas", ColumnType::Float64),
    ("gas_price", ColumnType::Float64),
    ("gas_used", ColumnType::Float64),
    ("cumulative_gas_used", ColumnType::Float64),
    ("effective_gas_price", ColumnType::Float64),
    ("max_fee_per_gas", ColumnType::Float64),
    ("max_priority_fee_per_gas", ColumnType::Float64),
    ("max_fee_per_blob_gas", ColumnType::Float64),
    ("value", ColumnType::Float64),
    ("nonce", ColumnType::Int64),
    ("chain_id", ColumnType::Int64),
];

/// Default block column types.
pub const BLOCK_COLUMN_TYPES: ColumnTypes = &[
    ("gas_limit", ColumnType::Float64),
    ("gas_used", ColumnType::Float64),
    ("size", ColumnType::Float64),
    ("blob_gas_used", ColumnType::Float64),
    ("excess_blob_gas", ColumnType::Float64),
    ("base_fee_per_gas", ColumnType::Float64),
    ("timestamp", ColumnType::Int64),
];
