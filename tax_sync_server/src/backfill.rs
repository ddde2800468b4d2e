//! Resumable historical order import.
//!
//! A backfill pages through the remote order listing for a date window and feeds each row through the ledger's
//! dedup-insert path. Progress (cursor and totals) is checkpointed after every batch so that a crash or restart
//! resumes from the last batch boundary instead of starting over. Live webhooks may create the same orders
//! concurrently; the key-level dedup makes that overlap harmless.

use log::*;
use shopify_sync::{
    retry::retry_with_rate_limit,
    OrderPageRequest,
    OrderSource,
    ShopifyApiError,
};
use tax_ledger_engine::{
    db_types::{ImportCheckpoint, ImportJob, ImportJobStatus, ImportSummary},
    tax::TaxCalculator,
    traits::{ImportCheckpoints, IntegrationManagement, TaxLedgerDatabase, TaxLedgerError},
    ImportRowOutcome,
    IntegrationContext,
    LedgerFlowApi,
    SyncTrackerApi,
};
use thiserror::Error;
use tokio::{task::JoinHandle, time::sleep};

use crate::{config::BackfillConfig, integrations::order_event_data};

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("Remote platform error: {0}")]
    Remote(#[from] ShopifyApiError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] TaxLedgerError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportWindow {
    pub start: Option<chrono::DateTime<chrono::Utc>>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct BackfillImporter<B, S, C> {
    ledger: LedgerFlowApi<B>,
    tracker: SyncTrackerApi<B>,
    source: S,
    calculator: C,
    config: BackfillConfig,
}

impl<B, S, C> BackfillImporter<B, S, C>
where
    B: TaxLedgerDatabase + IntegrationManagement + ImportCheckpoints + Clone,
    S: OrderSource,
    C: TaxCalculator,
{
    pub fn new(
        ledger: LedgerFlowApi<B>,
        tracker: SyncTrackerApi<B>,
        source: S,
        calculator: C,
        config: BackfillConfig,
    ) -> Self {
        Self { ledger, tracker, source, calculator, config }
    }

    /// Run the import described by `job` to a terminal state.
    ///
    /// The job row carries the window and the resume cursor, so a job adopted after a restart continues where the
    /// last checkpoint left off. Returns the summary of this run; a failed run returns the error after persisting
    /// the failure, never discarding progress already checkpointed.
    pub async fn import_historical_orders(
        &self,
        ctx: IntegrationContext,
        job: ImportJob,
    ) -> Result<ImportSummary, BackfillError> {
        let mut cursor = job.cursor;
        let mut total_fetched = job.total_fetched as u64;
        let mut total_processed = job.total_processed as u64;
        let mut summary = ImportSummary {
            window_start: job.window_start,
            window_end: job.window_end,
            ..Default::default()
        };
        info!(
            "🔁️ Starting historical import job {} for integration {} (window {:?}..{:?}, resuming at {:?})",
            job.id, ctx.integration_id, job.window_start, job.window_end, cursor
        );
        self.tracker.mark_syncing(ctx.integration_id).await.map_err(BackfillError::Ledger)?;

        loop {
            let page = OrderPageRequest::new(self.config.batch_size)
                .window(job.window_start, job.window_end)
                .after(cursor);
            let orders =
                match retry_with_rate_limit(|| self.source.fetch_orders_page(&page), self.config.retry_policy).await
                {
                    Ok(orders) => orders,
                    Err(e) => {
                        return Err(self.fail_job(&ctx, &job, e, summary).await);
                    },
                };
            if orders.is_empty() {
                break;
            }
            total_fetched += orders.len() as u64;
            let batch_len = orders.len() as u32;
            for order in orders {
                cursor = Some(cursor.unwrap_or(0).max(order.id));
                // One order's failure is logged and skipped; it never takes the batch or the job down with it
                match order_event_data(order) {
                    Ok(data) => match self.ledger.import_order(&ctx, data, &self.calculator).await {
                        Ok(ImportRowOutcome::Imported(_)) => {
                            summary.total_imported += 1;
                            total_processed += 1;
                        },
                        Ok(ImportRowOutcome::Skipped(rec)) => {
                            trace!("🔁️ Order {} already in the ledger. Skipped", rec.external_id);
                            summary.total_skipped += 1;
                            total_processed += 1;
                        },
                        Err(e) => {
                            warn!("🔁️ Could not import an order: {e}");
                            summary.total_failed += 1;
                        },
                    },
                    Err(e) => {
                        warn!("🔁️ Skipping an order that failed normalization: {e}");
                        summary.total_failed += 1;
                    },
                }
            }
            let checkpoint = ImportCheckpoint {
                cursor,
                total_fetched: total_fetched as i64,
                total_processed: total_processed as i64,
            };
            self.tracker.checkpoint_import_job(job.id, checkpoint).await.map_err(BackfillError::Ledger)?;

            if let Some(max) = self.config.max_orders {
                if total_fetched >= max {
                    info!("🔁️ Import job {} hit the {max}-order cap. Completing", job.id);
                    break;
                }
            }
            if batch_len < page.page_size() {
                break;
            }
            // Fixed inter-batch delay bounds the request rate without per-item sleeps
            sleep(self.config.batch_delay).await;
        }

        summary.completed = true;
        self.tracker
            .finish_import_job(job.id, ImportJobStatus::Completed, None)
            .await
            .map_err(BackfillError::Ledger)?;
        self.tracker.record_import_summary(ctx.integration_id, &summary).await.map_err(BackfillError::Ledger)?;
        self.tracker.mark_connected(ctx.integration_id).await.map_err(BackfillError::Ledger)?;
        self.ledger.notify_import_completed(ctx.integration_id, &summary).await;
        info!(
            "🔁️ Import job {} complete: {} imported, {} skipped, {} failed",
            job.id, summary.total_imported, summary.total_skipped, summary.total_failed
        );
        Ok(summary)
    }

    /// Persist a terminal failure. Totals already checkpointed stay in place, and every record imported so far
    /// remains in the ledger.
    async fn fail_job(
        &self,
        ctx: &IntegrationContext,
        job: &ImportJob,
        error: ShopifyApiError,
        summary: ImportSummary,
    ) -> BackfillError {
        let msg = if error.is_permanent() {
            format!("The platform rejected our credentials or the request: {error}. Reconnect the integration.")
        } else {
            format!("Giving up after repeated transient failures: {error}")
        };
        error!("🔁️ Import job {} failed: {msg}", job.id);
        if let Err(e) = self.tracker.finish_import_job(job.id, ImportJobStatus::Failed, Some(&msg)).await {
            error!("🔁️ Could not record the failure on job {}: {e}", job.id);
        }
        let summary = ImportSummary { completed: false, ..summary };
        if let Err(e) = self.tracker.record_import_summary(ctx.integration_id, &summary).await {
            error!("🔁️ Could not record the import summary: {e}");
        }
        if let Err(e) = self.tracker.mark_sync_error(ctx.integration_id, &msg).await {
            error!("🔁️ Could not flag the integration: {e}");
        }
        BackfillError::Remote(error)
    }
}

/// Runs the import on a background task so the triggering request is not held open. Do not await the returned
/// handle unless you want to block on the whole import.
pub fn start_backfill_worker<B, S, C>(
    importer: BackfillImporter<B, S, C>,
    ctx: IntegrationContext,
    job: ImportJob,
) -> JoinHandle<()>
where
    B: TaxLedgerDatabase + IntegrationManagement + ImportCheckpoints + Clone + Send + Sync + 'static,
    S: OrderSource + Send + Sync + 'static,
    C: TaxCalculator + Send + Sync + 'static,
{
    tokio::spawn(async move {
        match importer.import_historical_orders(ctx, job).await {
            Ok(summary) => {
                info!(
                    "🔁️ Historical import for integration {} finished. {} imported, {} skipped",
                    ctx.integration_id, summary.total_imported, summary.total_skipped
                );
            },
            Err(e) => {
                error!("🔁️ Historical import for integration {} failed. {e}", ctx.integration_id);
            },
        }
    })
}
