//! xdcc-mule - Search XDCC bot catalogs and orchestrate transfers
//!
//! This library indexes the file listings published by IRC bots and drives
//! transfers of those files over one shared connection per network.
//!
//! # Features
//!
//! - **Catalog Index**: Rebuilds an in-memory index from an aggregator document
//!   and every listing it points at, fetched in parallel
//! - **Ordered Token Search**: `"foo bar"` finds names containing `foo` then `bar`
//! - **Deduplicated Transfers**: At most one in-flight job per file
//! - **Shared Connections**: One connection per IRC network, torn down when idle
//! - **Live Status**: Pollable per-file status, percentage and ETA
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xdcc_mule::{CatalogIndex, HttpFetcher, MuleConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MuleConfig {
//!     catalog_url: "https://example.com/xdcc.ini".to_string(),
//!     ..MuleConfig::default()
//! };
//! let fetcher = HttpFetcher::new(config.fetch_connect_timeout)?;
//! let index = CatalogIndex::new(&config, Arc::new(fetcher));
//!
//! for hit in index.search("ubuntu iso").await? {
//!     println!("{} {} {}", hit.file.bot_name, hit.file.file_number, hit.file.file_name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod client;
pub mod connections;
pub mod error;
pub mod fetch;
pub mod index;
pub mod jobs;
pub mod orchestrator;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod testing;

pub use catalog::{fetch_catalog, parse_catalog, parse_listing};
pub use client::{
    ClientConnector, ConnectOptions, Connecting, ConnectionEvent, JobEvent, TransferClient,
    TransferJob,
};
pub use connections::{Connection, ConnectionRegistry};
pub use error::{CatalogError, TransferError};
pub use fetch::{DocumentFetcher, HttpFetcher};
pub use index::{CatalogIndex, IndexSnapshot, RebuildStats, SearchPattern};
pub use jobs::{JobRegistry, Reservation};
pub use orchestrator::TransferOrchestrator;
pub use scheduler::spawn_periodic_refresh;
pub use types::{
    parse_excluded_channels, CatalogSource, FileDescriptor, IndexedFile, JobKey, MuleConfig,
    ParseStatusError, StatusOption, TransferStatus,
};
