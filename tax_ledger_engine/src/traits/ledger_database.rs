use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{
    ExternalOrderId,
    NewTransaction,
    TransactionKey,
    TransactionRecord,
    TransactionStatus,
};

/// The result of a timestamp-gated upsert.
#[derive(Debug, Clone)]
pub enum UpsertResult {
    /// No row existed for the key; a new one was created.
    Inserted(TransactionRecord),
    /// The existing row was overwritten because the event's source timestamp was not older.
    Updated(TransactionRecord),
    /// The event's source timestamp was older than the stored row. Nothing was changed.
    Stale,
}

impl UpsertResult {
    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            UpsertResult::Inserted(rec) | UpsertResult::Updated(rec) => Some(rec),
            UpsertResult::Stale => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    /// The synthetic refund record (freshly inserted, or the pre-existing one on redelivery).
    pub refund: TransactionRecord,
    /// True when the refund record already existed, i.e. this was a duplicate delivery.
    pub already_recorded: bool,
    /// The original order after the refund-sum check, if it exists in the ledger.
    pub original: Option<TransactionRecord>,
    /// True when the sum of all refund records now exactly matches the original total.
    pub fully_refunded: bool,
}

/// This trait defines the highest level of behaviour for backends supporting the tax ledger engine.
///
/// This behaviour includes:
/// * Idempotent, ordering-aware transaction writes keyed by `(organization, integration, external_id)`
/// * Refund synthesis with back-references and refund-sum settlement of the original
/// * Status-only transitions for cancellations
#[allow(async_fn_in_trait)]
pub trait TaxLedgerDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// In a single atomic statement, inserts the transaction, or overwrites the existing row for the same key iff
    /// the incoming `last_modified` is not older than the stored one. This is the only write path live events use;
    /// it must never be implemented as a read-modify-write.
    fn upsert_transaction(
        &self,
        tx: NewTransaction,
    ) -> impl std::future::Future<Output = Result<UpsertResult, TaxLedgerError>> + Send;

    /// Inserts the transaction unless a row already exists for its key. Returns the record and whether it was
    /// inserted. This is the backfill write path: an order that live webhooks already created is skipped, which
    /// makes repeated or overlapping imports safe.
    fn insert_transaction_if_absent(
        &self,
        tx: NewTransaction,
    ) -> impl std::future::Future<Output = Result<(TransactionRecord, bool), TaxLedgerError>> + Send;

    /// Records a refund in a single atomic transaction:
    /// * the synthetic refund record is inserted idempotently (negated amounts, back-reference),
    /// * the refund totals for the original are summed,
    /// * the original's status flips to `Refunded` only when that sum exactly equals its total, and stays
    ///   `Completed` otherwise.
    fn process_refund(
        &self,
        refund: NewTransaction,
        original: &TransactionKey,
    ) -> impl std::future::Future<Output = Result<RefundOutcome, TaxLedgerError>> + Send;

    /// A status-only transition, gated on the source timestamp like [`Self::upsert_transaction`]. Monetary fields
    /// are untouched. Returns `None` when no row matched (unknown key, or a stale event).
    fn update_transaction_status(
        &self,
        key: &TransactionKey,
        status: TransactionStatus,
        last_modified: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<TransactionRecord>, TaxLedgerError>> + Send;

    /// Returns the ledger row for the given key, if any.
    fn fetch_transaction(
        &self,
        key: &TransactionKey,
    ) -> impl std::future::Future<Output = Result<Option<TransactionRecord>, TaxLedgerError>> + Send;

    /// All refund records back-referencing the given original order.
    fn fetch_refunds_for(
        &self,
        key: &TransactionKey,
    ) -> impl std::future::Future<Output = Result<Vec<TransactionRecord>, TaxLedgerError>> + Send;

    /// Closes the database connection.
    fn close(&mut self) -> impl std::future::Future<Output = Result<(), TaxLedgerError>> + Send {
        async move { Ok(()) }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TaxLedgerError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested transaction {0} does not exist")]
    TransactionNotFound(ExternalOrderId),
    #[error("The requested integration {0} does not exist")]
    IntegrationNotFound(i64),
    #[error("The requested import job {0} does not exist")]
    ImportJobNotFound(i64),
    #[error("Could not serialize snapshot: {0}")]
    SnapshotSerialization(String),
}

impl From<sqlx::Error> for TaxLedgerError {
    fn from(e: sqlx::Error) -> Self {
        TaxLedgerError::DatabaseError(e.to_string())
    }
}
