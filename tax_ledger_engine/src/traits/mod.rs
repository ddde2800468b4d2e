//! The behaviour backends must implement to serve the synchronization engine.

mod import_checkpoints;
mod integration_management;
mod ledger_database;
mod webhook_mirror;

pub use import_checkpoints::ImportCheckpoints;
pub use integration_management::IntegrationManagement;
pub use ledger_database::{RefundOutcome, TaxLedgerDatabase, TaxLedgerError, UpsertResult};
pub use webhook_mirror::WebhookMirror;
