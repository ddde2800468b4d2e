use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ImportCheckpoint, ImportJob, ImportJobStatus, NewImportJob},
    traits::TaxLedgerError,
};

pub async fn create_job(job: NewImportJob, conn: &mut SqliteConnection) -> Result<ImportJob, TaxLedgerError> {
    let job = sqlx::query_as(
        r#"
        INSERT INTO import_jobs (integration_id, status, window_start, window_end)
        VALUES ($1, 'Pending', $2, $3)
        RETURNING *;
        "#,
    )
    .bind(job.integration_id)
    .bind(job.window_start)
    .bind(job.window_end)
    .fetch_one(conn)
    .await?;
    Ok(job)
}

/// Record a batch boundary. The job transitions to `InProgress` if it was still pending.
pub async fn checkpoint_job(
    id: i64,
    checkpoint: ImportCheckpoint,
    conn: &mut SqliteConnection,
) -> Result<ImportJob, TaxLedgerError> {
    debug!(
        "🗃️ Import job {id} checkpoint: cursor {:?}, {} fetched, {} processed",
        checkpoint.cursor, checkpoint.total_fetched, checkpoint.total_processed
    );
    let job: Option<ImportJob> = sqlx::query_as(
        r#"
        UPDATE import_jobs
        SET status = 'InProgress', cursor = $2, total_fetched = $3, total_processed = $4,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING *;
        "#,
    )
    .bind(id)
    .bind(checkpoint.cursor)
    .bind(checkpoint.total_fetched)
    .bind(checkpoint.total_processed)
    .fetch_optional(conn)
    .await?;
    job.ok_or(TaxLedgerError::ImportJobNotFound(id))
}

/// Terminal transition. Totals already checkpointed are left untouched so a failed job retains partial progress.
pub async fn finish_job(
    id: i64,
    status: ImportJobStatus,
    error: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<ImportJob, TaxLedgerError> {
    let job: Option<ImportJob> = sqlx::query_as(
        r#"
        UPDATE import_jobs
        SET status = $2, error = $3, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING *;
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(error)
    .fetch_optional(conn)
    .await?;
    job.ok_or(TaxLedgerError::ImportJobNotFound(id))
}

pub async fn fetch_job(id: i64, conn: &mut SqliteConnection) -> Result<Option<ImportJob>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM import_jobs WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_resumable_job(
    integration_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ImportJob>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM import_jobs
        WHERE integration_id = $1 AND status IN ('Pending', 'InProgress')
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(integration_id)
    .fetch_optional(conn)
    .await
}
