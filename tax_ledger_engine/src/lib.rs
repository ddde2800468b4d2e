//! Tax Ledger Engine
//!
//! The engine keeps the internal sales-tax ledger consistent with the order state of the remote commerce platform.
//! It is fed strictly-typed, normalized order events (live webhook deliveries and backfill rows alike) and applies
//! them idempotently, so at-least-once delivery and overlapping imports cannot duplicate or corrupt ledger rows.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the database directly;
//!    use the public API instead. The exception is the data types, which are defined in [`mod@db_types`] and are
//!    public.
//! 2. The engine public API ([`mod@ledger_api`]). Backends implement the traits in [`mod@traits`] in order to serve
//!    the synchronization server.
//!
//! The engine also emits events on a small hook channel whenever a transaction is ingested or an import completes,
//! so other parts of the application can react without being wired into the ingestion path.

pub mod db_types;
pub mod events;
pub mod events_model;
mod ledger_api;
pub mod tax;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use ledger_api::{
    BatchOutcome,
    EventOutcome,
    ImportRowOutcome,
    IntegrationContext,
    LedgerFlowApi,
    SyncTrackerApi,
};
