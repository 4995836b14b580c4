//! `logsviewer` imports must-gather archives into a queryable store and correlates workload events
//! to the pods, nodes and volumes involved in them.
//!
//! # Overview
//!
//! A must-gather archive is a tar.gz snapshot of the resource manifests of a cluster. logsviewer
//! extracts it, decodes the manifests into canonical records and stores them in SQLite through
//! an asynchronous persistence queue. The store keeps no relations between records, so the
//! resolver rebuilds them at query time from owner labels, node names and creation times.
//!
//! # Architecture
//!
//! - **Ingest**: archive extraction, layout discovery and manifest decoding
//! - **Store**: a de-duplicating work queue with bounded retries that upserts records
//! - **Management**: the SQLite schema, upserts, lookups, listings and the import ledger
//! - **Resolver**: correlation of pods, VMIs and migrations into log query parameters
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use logsviewer::{
//!     config::LogsViewerConfig, ingest::Ingester, resolver::Resolver, store::ObjectStore,
//! };
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LogsViewerConfig::default();
//!     let store = ObjectStore::new(config.db_path(), config.store_options());
//!
//!     let (stop_tx, stop_rx) = watch::channel(false);
//!     let runner = tokio::spawn({
//!         let store = store.clone();
//!         async move { store.run(2, stop_rx).await }
//!     });
//!
//!     let ingester = Ingester::new(store.clone(), config.staging_dir(), config.enrichment_file());
//!     let report = ingester.import("/tmp/must-gather.tar.gz").await?;
//!     println!("imported {} records", report.imported);
//!
//!     let resolver = Resolver::new(store.pool().await?);
//!     let results = resolver.resolve_full_history("3f1c9a52-vmi-uid").await?;
//!     println!("{}", serde_json::to_string_pretty(&results)?);
//!
//!     stop_tx.send(true)?;
//!     runner.await??;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument types
//! - [`config`] - Configuration and defaults
//! - [`ingest`] - Archive extraction and manifest ingestion
//! - [`management`] - The SQLite record store
//! - [`manifest`] - Typed views of cluster manifests
//! - [`models`] - Canonical records and query results
//! - [`resolver`] - Correlation of workload events
//! - [`store`] - The persistence queue
//! - [`utils`] - Path and environment helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod ingest;
pub mod management;
pub mod manifest;
pub mod models;
pub mod resolver;
pub mod store;
pub mod utils;

pub use error::*;
