//! Block range resolution.
//!
//! Callers may give any combination of `from`, `to` and `count`. The
//! combination is first classified into a [`RangeSpec`], then resolved into a
//! concrete half-open [`BlockRange`], fetching the chain height at most once
//! and only for variants that need it.

use std::fmt;

use crate::error::{QueryError, Result};
use crate::service::IndexingService;

/// Half-open block interval `[from_block, to_block)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRange {
    from_block: u64,
    to_block: u64,
}

impl BlockRange {
    /// Create a range.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRange`] if `from_block > to_block`.
    pub fn new(from_block: u64, to_block: u64) -> Result<Self> {
        if from_block > to_block {
            return Err(QueryError::InvalidRange {
                from_block,
                to_block,
            });
        }
        Ok(Self {
            from_block,
            to_block,
        })
    }

    /// Inclusive start.
    #[must_use]
    pub const fn from_block(&self) -> u64 {
        self.from_block
    }

    /// Exclusive end.
    #[must_use]
    pub const fn to_block(&self) -> u64 {
        self.to_block
    }

    /// Number of blocks covered.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.to_block - self.from_block
    }

    /// Whether the range covers no blocks.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.from_block == self.to_block
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from_block, self.to_block)
    }
}

/// How the caller specified the block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeSpec {
    /// Nothing given: full history up to the current height.
    #[default]
    Latest,
    /// Only a count: the last `count` blocks before the current height.
    LastBlocks {
        /// Number of blocks.
        count: u64,
    },
    /// A count ending at an explicit `to_block`.
    CountBefore {
        /// Exclusive end.
        to_block: u64,
        /// Number of blocks.
        count: u64,
    },
    /// Explicit bounds; a missing `to_block` is the current height and a
    /// missing `from_block` is genesis.
    Bounds {
        /// Inclusive start.
        from_block: Option<u64>,
        /// Exclusive end.
        to_block: Option<u64>,
    },
}

impl RangeSpec {
    /// Classify loose optional bounds.
    ///
    /// An explicit `from_block` always wins over `count`.
    #[must_use]
    pub const fn from_parts(
        from_block: Option<u64>,
        to_block: Option<u64>,
        count: Option<u64>,
    ) -> Self {
        match (from_block, to_block, count) {
            (None, None, None) => Self::Latest,
            (None, None, Some(count)) => Self::LastBlocks { count },
            (None, Some(to_block), Some(count)) => Self::CountBefore { to_block, count },
            (Some(_), _, _) | (None, Some(_), None) => Self::Bounds {
                from_block,
                to_block,
            },
        }
    }

    /// Fully specified range.
    #[must_use]
    pub const fn between(from_block: u64, to_block: u64) -> Self {
        Self::Bounds {
            from_block: Some(from_block),
            to_block: Some(to_block),
        }
    }

    /// Whether resolving this range needs the current chain height.
    #[must_use]
    pub const fn needs_height(&self) -> bool {
        match self {
            Self::Latest | Self::LastBlocks { .. } => true,
            Self::CountBefore { .. } => false,
            Self::Bounds { to_block, .. } => to_block.is_none(),
        }
    }

    /// Resolve against a known chain height.
    ///
    /// `height` is only read for variants where [`Self::needs_height`] is
    /// true; pass `0` otherwise. A count larger than the end block clamps the
    /// start to genesis.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRange`] if explicit bounds are reversed.
    pub fn resolve_at(self, height: u64) -> Result<BlockRange> {
        match self {
            Self::Latest => BlockRange::new(0, height),
            Self::LastBlocks { count } => BlockRange::new(start_before(height, count), height),
            Self::CountBefore { to_block, count } => {
                BlockRange::new(start_before(to_block, count), to_block)
            }
            Self::Bounds {
                from_block,
                to_block,
            } => BlockRange::new(from_block.unwrap_or(0), to_block.unwrap_or(height)),
        }
    }
}

/// `to_block - count`, clamped at genesis.
fn start_before(to_block: u64, count: u64) -> u64 {
    to_block.checked_sub(count).unwrap_or_else(|| {
        tracing::warn!(to_block, count, "block count exceeds range end, clamping start to 0");
        0
    })
}

/// Resolve `spec`, asking `service` for the chain height only when needed.
///
/// # Errors
///
/// Returns [`QueryError::Transport`] if the height request fails, or
/// [`QueryError::InvalidRange`] for reversed explicit bounds.
pub async fn resolve<S: IndexingService>(service: &S, spec: RangeSpec) -> Result<BlockRange> {
    let height = if spec.needs_height() {
        service.height().await?
    } else {
        0
    };
    let range = spec.resolve_at(height)?;
    tracing::debug!(?spec, %range, "resolved block range");
    Ok(range)
}
