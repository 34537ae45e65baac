//! Errors surfaced by the extraction pipeline.
//!
//! Nothing in the pipeline retries or recovers silently: every failure below
//! reaches the caller of the [`crate::client::Client`] operation that
//! triggered it.

use arrow_schema::ArrowError;
use mev_commit::RegistryError;
use parquet::errors::ParquetError;

/// Boxed transport-level cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the query pipeline.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Registry lookup failed (e.g. unknown event name or signature).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A named-event query produced no rows.
    #[error("no data for event `{event}` in blocks [{from_block}, {to_block})")]
    NoData {
        /// Event name.
        event: String,
        /// Inclusive start of the searched range.
        from_block: u64,
        /// Exclusive end of the searched range.
        to_block: u64,
    },

    /// The indexing service or chain node failed or answered nonsense.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// Decoded and raw log streams disagree on cardinality.
    #[error("decoded log count {decoded} does not match raw log count {logs}")]
    JoinIntegrity {
        /// Rows in `decoded_logs`.
        decoded: usize,
        /// Rows in `logs`.
        logs: usize,
    },

    /// An explicit range whose start lies after its end.
    #[error("invalid block range: from {from_block} is after to {to_block}")]
    InvalidRange {
        /// Requested start.
        from_block: u64,
        /// Requested end.
        to_block: u64,
    },

    /// The data source cannot serve this kind of query.
    #[error("unsupported query: {0}")]
    Unsupported(&'static str),

    /// A wire value could not be decoded into a table.
    #[error("decode error: {0}")]
    Decode(String),

    /// Arrow table construction failed.
    #[error(transparent)]
    Arrow(#[from] ArrowError),

    /// Parquet writing or reading failed.
    #[error(transparent)]
    Parquet(#[from] ParquetError),

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QueryError {
    /// Wrap any transport failure.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    /// Whether this is [`QueryError::NoData`].
    #[must_use]
    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }

    /// Whether this is an unknown-event registry error.
    #[must_use]
    pub const fn is_unknown_event(&self) -> bool {
        matches!(self, Self::Registry(RegistryError::UnknownEvent(_)))
    }
}

/// Result alias for the pipeline.
pub type Result<T, E = QueryError> = std::result::Result<T, E>;
