use crate::{
    db_types::{ImportCheckpoint, ImportJob, ImportJobStatus, NewImportJob},
    traits::TaxLedgerError,
};

/// The persisted job-checkpoint store for historical imports.
///
/// Progress is written after every batch, not only at completion, so a restart can resume from the last cursor. An
/// in-process cache may sit in front of this as a read-through optimization, but the rows here are the source of
/// truth.
#[allow(async_fn_in_trait)]
pub trait ImportCheckpoints: Clone {
    fn create_import_job(
        &self,
        job: NewImportJob,
    ) -> impl std::future::Future<Output = Result<ImportJob, TaxLedgerError>> + Send;

    /// Record a batch boundary: the pagination cursor and running totals. Marks the job in progress.
    fn checkpoint_import_job(
        &self,
        id: i64,
        checkpoint: ImportCheckpoint,
    ) -> impl std::future::Future<Output = Result<ImportJob, TaxLedgerError>> + Send;

    /// Move the job to a terminal state. A failed job keeps the totals already checkpointed; partial progress is
    /// never discarded.
    fn finish_import_job(
        &self,
        id: i64,
        status: ImportJobStatus,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<ImportJob, TaxLedgerError>> + Send;

    fn fetch_import_job(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<Option<ImportJob>, TaxLedgerError>> + Send;

    /// The most recent non-terminal job for the integration, if one exists (used for restart recovery).
    fn fetch_resumable_job(
        &self,
        integration_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<ImportJob>, TaxLedgerError>> + Send;
}
