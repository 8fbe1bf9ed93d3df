//! Schema reconciliation for the reviews collection.
//!
//! A migration run scans the collection in ID order, classifies each
//! review's schema generation, recovers or quarantines records with broken
//! foreign keys, plans a minimal field-level patch and commits patches in
//! bounded atomic groups. The census is the read-only counterpart.

pub mod census;
pub mod document;
pub mod driver;
pub mod mutation;
pub mod pipeline;
pub mod scan;
pub mod store;
pub mod writer;

pub use driver::{Driver, DriverConfig, RunError, RunMode, RunState};
pub use store::{DocumentStore, MemoryDocumentStore, PgDocumentStore, StoreError};
