//! `datalogger-api`: ingestion, CSV persistence, and the query engine behind
//! the `/api/data` and `/api/summary` endpoints.
//!
//! Follows the Explicit Module Boundary Pattern (EMBP): sibling modules reach
//! each other through the re-exports below rather than through deep paths.

pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod models;
pub mod routes;
pub mod store;

pub use config::Config;
pub use error::{AppError, IngestError, QueryError, StoreError};
pub use models::{AggregateRecord, DeviceId, Metric, RawRecord, Reading};
pub use store::{RecordStore, Snapshot};
