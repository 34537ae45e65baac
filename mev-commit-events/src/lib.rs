//! mev-commit event extraction.
//!
//! Queries a HyperSync-style indexing service for mev-commit contract
//! events, decodes them, joins them with their transactions and blocks and
//! returns Arrow tables or writes Parquet files.
//!
//! The pipeline runs in five steps, each in its own module:
//! [`range`] resolves the block range, [`query`] builds the service query,
//! [`collector`] pages through the results, [`decode`] turns raw logs into
//! event columns, and [`assembler`] joins and coerces the final table.
//! [`client::Client`] drives all of them.

pub mod assembler;
pub mod client;
pub mod coerce;
pub mod collector;
pub mod config;
pub mod decode;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod parquet;
pub mod query;
pub mod range;
pub mod rows;
pub mod rpc;
pub mod service;
pub mod table;
pub mod timing;

pub use client::{Client, ClientBuilder, EventQuery, QueryOutput};
pub use collector::{PersistedHandle, Sink};
pub use error::{QueryError, Result};
pub use http::{HttpConfig, HttpService};
pub use range::{BlockRange, RangeSpec};
pub use rpc::RpcService;
pub use service::IndexingService;
