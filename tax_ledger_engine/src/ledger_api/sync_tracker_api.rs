use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{
        ImportCheckpoint,
        ImportJob,
        ImportJobStatus,
        ImportSummary,
        IntegrationRecord,
        NewImportJob,
        NewWebhookSubscription,
        SyncStatus,
        WebhookHealthReport,
        WebhookSubscriptionRecord,
    },
    traits::{ImportCheckpoints, IntegrationManagement, TaxLedgerError, WebhookMirror},
};

/// Bookkeeping API for integration sync state, import-job checkpoints and the webhook mirror.
pub struct SyncTrackerApi<B> {
    db: B,
}

impl<B> Debug for SyncTrackerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyncTrackerApi")
    }
}

impl<B> Clone for SyncTrackerApi<B>
where B: Clone
{
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> SyncTrackerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> SyncTrackerApi<B>
where B: IntegrationManagement
{
    pub async fn integration(&self, id: i64) -> Result<IntegrationRecord, TaxLedgerError> {
        self.db.fetch_integration(id).await?.ok_or(TaxLedgerError::IntegrationNotFound(id))
    }

    pub async fn integration_for_shop(&self, shop_domain: &str) -> Result<Option<IntegrationRecord>, TaxLedgerError> {
        self.db.fetch_integration_by_shop(shop_domain).await
    }

    pub async fn connected_integrations(&self) -> Result<Vec<IntegrationRecord>, TaxLedgerError> {
        self.db.fetch_connected_integrations().await
    }

    pub async fn touch_sync_activity(&self, id: i64) -> Result<(), TaxLedgerError> {
        trace!("📋️ Bumping last sync activity for integration {id}");
        self.db.touch_sync_activity(id).await
    }

    pub async fn mark_syncing(&self, id: i64) -> Result<(), TaxLedgerError> {
        self.db.set_sync_status(id, SyncStatus::Syncing, None).await
    }

    pub async fn mark_connected(&self, id: i64) -> Result<(), TaxLedgerError> {
        self.db.set_sync_status(id, SyncStatus::Connected, None).await
    }

    /// Record a terminal sync failure in human-readable form. The dashboard surfaces this verbatim.
    pub async fn mark_sync_error(&self, id: i64, error: &str) -> Result<(), TaxLedgerError> {
        info!("📋️ Integration {id} flagged with sync error: {error}");
        self.db.set_sync_status(id, SyncStatus::Error, Some(error)).await
    }

    /// The shop uninstalled the app; the integration needs to be reconnected by the merchant.
    pub async fn mark_disconnected(&self, id: i64) -> Result<(), TaxLedgerError> {
        info!("📋️ Integration {id} disconnected");
        self.db.set_sync_status(id, SyncStatus::Disconnected, Some("App uninstalled from the shop")).await
    }

    pub async fn record_webhook_health(
        &self,
        id: i64,
        report: &WebhookHealthReport,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), TaxLedgerError> {
        debug!("📋️ Recording webhook health for integration {id}: {}", report.overall_status);
        self.db.record_webhook_health(id, report, next_check_at).await
    }

    pub async fn record_import_summary(&self, id: i64, summary: &ImportSummary) -> Result<(), TaxLedgerError> {
        self.db.record_import_summary(id, summary).await
    }
}

impl<B> SyncTrackerApi<B>
where B: ImportCheckpoints
{
    pub async fn create_import_job(&self, job: NewImportJob) -> Result<ImportJob, TaxLedgerError> {
        let job = self.db.create_import_job(job).await?;
        info!("📋️ Import job {} created for integration {}", job.id, job.integration_id);
        Ok(job)
    }

    pub async fn checkpoint_import_job(
        &self,
        id: i64,
        checkpoint: ImportCheckpoint,
    ) -> Result<ImportJob, TaxLedgerError> {
        self.db.checkpoint_import_job(id, checkpoint).await
    }

    pub async fn finish_import_job(
        &self,
        id: i64,
        status: ImportJobStatus,
        error: Option<&str>,
    ) -> Result<ImportJob, TaxLedgerError> {
        info!("📋️ Import job {id} finished with status {status}");
        self.db.finish_import_job(id, status, error).await
    }

    pub async fn import_job(&self, id: i64) -> Result<Option<ImportJob>, TaxLedgerError> {
        self.db.fetch_import_job(id).await
    }

    pub async fn resumable_job(&self, integration_id: i64) -> Result<Option<ImportJob>, TaxLedgerError> {
        self.db.fetch_resumable_job(integration_id).await
    }
}

impl<B> SyncTrackerApi<B>
where B: WebhookMirror
{
    pub async fn replace_subscription_snapshot(
        &self,
        integration_id: i64,
        subs: &[NewWebhookSubscription],
    ) -> Result<(), TaxLedgerError> {
        self.db.replace_subscription_snapshot(integration_id, subs).await
    }

    pub async fn subscription_snapshot(
        &self,
        integration_id: i64,
    ) -> Result<Vec<WebhookSubscriptionRecord>, TaxLedgerError> {
        self.db.fetch_subscription_snapshot(integration_id).await
    }
}
