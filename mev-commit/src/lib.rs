//! mev-commit contract and event catalogue.
//!
//! Knows which mev-commit contracts exist, which events they emit, and how
//! each event's fields should be typed once decoded. The
//! [`EventRegistry`] is the single source of that knowledge for the
//! extraction pipeline in `mev-commit-events`.
//!
//! ```
//! use mev_commit::{EventKind, EventRegistry};
//!
//! let registry = EventRegistry::mev_commit()?;
//! let deposits = registry.lookup(EventKind::BidderRegistered.name())?;
//! assert_eq!(deposits.canonical_signature(), "BidderRegistered(address,uint256,uint256)");
//! # Ok::<(), mev_commit::RegistryError>(())
//! ```

pub mod columns;
pub mod contracts;
mod error;
pub mod events;

pub use columns::{ColumnType, ColumnTypes};
pub use contracts::Contract;
pub use error::RegistryError;
pub use events::{EventDefinition, EventKind, EventRegistry, RegisteredEvent};
