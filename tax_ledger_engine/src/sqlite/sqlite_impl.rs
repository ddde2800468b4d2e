//! `SqliteDatabase` is a concrete implementation of a tax ledger engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{create_schema, db_url, import_jobs, integrations, new_pool, transactions, webhook_subs};
use crate::{
    db_types::{
        ImportCheckpoint,
        ImportJob,
        ImportJobStatus,
        ImportSummary,
        IntegrationRecord,
        NewImportJob,
        NewTransaction,
        NewWebhookSubscription,
        SyncStatus,
        TransactionKey,
        TransactionRecord,
        TransactionStatus,
        TransactionType,
        WebhookHealthReport,
        WebhookSubscriptionRecord,
    },
    traits::{
        ImportCheckpoints,
        IntegrationManagement,
        RefundOutcome,
        TaxLedgerDatabase,
        TaxLedgerError,
        UpsertResult,
        WebhookMirror,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connect to the database at `url` and apply the schema.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, TaxLedgerError> {
        let pool = new_pool(url, max_connections).await?;
        create_schema(&pool).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub async fn new_default(max_connections: u32) -> Result<Self, TaxLedgerError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register a new integration. Onboarding proper lives outside the engine; this exists for provisioning and
    /// test setup.
    pub async fn create_integration(
        &self,
        organization_id: i64,
        shop_domain: &str,
        access_token: &str,
    ) -> Result<IntegrationRecord, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        integrations::insert_integration(organization_id, shop_domain, access_token, &mut conn).await
    }
}

impl TaxLedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn upsert_transaction(&self, tx: NewTransaction) -> Result<UpsertResult, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::upsert(tx, &mut conn).await
    }

    async fn insert_transaction_if_absent(
        &self,
        tx: NewTransaction,
    ) -> Result<(TransactionRecord, bool), TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::insert_if_absent(tx, &mut conn).await
    }

    async fn process_refund(
        &self,
        refund: NewTransaction,
        original: &TransactionKey,
    ) -> Result<RefundOutcome, TaxLedgerError> {
        let mut tx = self.pool.begin().await?;
        let original_before = transactions::fetch_by_key(original, &mut tx).await?;
        let mut refund = refund;
        if let Some(orig) = &original_before {
            // Classify against the original before inserting: a refund covering the full order value is a Refund,
            // anything smaller a PartialRefund.
            refund.transaction_type = if refund.total.abs() == orig.total.abs() {
                TransactionType::Refund
            } else {
                TransactionType::PartialRefund
            };
        }
        let (refund_rec, inserted) = transactions::insert_if_absent(refund, &mut tx).await?;
        let mut original_after = None;
        let mut fully_refunded = false;
        match original_before {
            Some(orig) => {
                let refunded = transactions::sum_refund_totals(original, &mut tx).await?;
                // Strict equality on minor units decides full-vs-partial. The amounts are exact integers from the
                // platform; the one-unit tolerance applies only to the float-derived tax breakdown.
                fully_refunded = -refunded == orig.total.value();
                let target =
                    if fully_refunded { TransactionStatus::Refunded } else { TransactionStatus::Completed };
                original_after = if matches!(orig.status, TransactionStatus::Completed | TransactionStatus::Refunded)
                {
                    transactions::set_status(original, target, &mut tx).await?
                } else {
                    // A pending or cancelled original is left alone; the refund record still stands on its own.
                    Some(orig)
                };
            },
            None => {
                warn!(
                    "🗃️ Refund {} arrived for unknown original {}. Recording the refund on its own.",
                    refund_rec.external_id, original.external_id
                );
            },
        }
        tx.commit().await?;
        debug!(
            "🗃️ Refund {} recorded against {} (fully refunded: {fully_refunded})",
            refund_rec.external_id, original.external_id
        );
        Ok(RefundOutcome { refund: refund_rec, already_recorded: !inserted, original: original_after, fully_refunded })
    }

    async fn update_transaction_status(
        &self,
        key: &TransactionKey,
        status: TransactionStatus,
        last_modified: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::update_status_gated(key, status, last_modified, &mut conn).await
    }

    async fn fetch_transaction(&self, key: &TransactionKey) -> Result<Option<TransactionRecord>, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_by_key(key, &mut conn).await?)
    }

    async fn fetch_refunds_for(&self, key: &TransactionKey) -> Result<Vec<TransactionRecord>, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_refunds_for(key, &mut conn).await?)
    }

    async fn close(&mut self) -> Result<(), TaxLedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl IntegrationManagement for SqliteDatabase {
    async fn fetch_integration(&self, id: i64) -> Result<Option<IntegrationRecord>, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(integrations::fetch_integration(id, &mut conn).await?)
    }

    async fn fetch_integration_by_shop(
        &self,
        shop_domain: &str,
    ) -> Result<Option<IntegrationRecord>, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(integrations::fetch_integration_by_shop(shop_domain, &mut conn).await?)
    }

    async fn fetch_connected_integrations(&self) -> Result<Vec<IntegrationRecord>, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(integrations::fetch_connected_integrations(&mut conn).await?)
    }

    async fn touch_sync_activity(&self, id: i64) -> Result<(), TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        integrations::touch_sync_activity(id, &mut conn).await
    }

    async fn set_sync_status(
        &self,
        id: i64,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<(), TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        integrations::set_sync_status(id, status, error, &mut conn).await
    }

    async fn record_webhook_health(
        &self,
        id: i64,
        report: &WebhookHealthReport,
        next_check_at: DateTime<Utc>,
    ) -> Result<(), TaxLedgerError> {
        let json =
            serde_json::to_string(report).map_err(|e| TaxLedgerError::SnapshotSerialization(e.to_string()))?;
        let mut conn = self.pool.acquire().await?;
        integrations::record_webhook_health(id, &json, next_check_at, &mut conn).await
    }

    async fn record_import_summary(&self, id: i64, summary: &ImportSummary) -> Result<(), TaxLedgerError> {
        let json =
            serde_json::to_string(summary).map_err(|e| TaxLedgerError::SnapshotSerialization(e.to_string()))?;
        let mut conn = self.pool.acquire().await?;
        integrations::record_import_summary(id, &json, &mut conn).await
    }
}

impl ImportCheckpoints for SqliteDatabase {
    async fn create_import_job(&self, job: NewImportJob) -> Result<ImportJob, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        import_jobs::create_job(job, &mut conn).await
    }

    async fn checkpoint_import_job(
        &self,
        id: i64,
        checkpoint: ImportCheckpoint,
    ) -> Result<ImportJob, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        import_jobs::checkpoint_job(id, checkpoint, &mut conn).await
    }

    async fn finish_import_job(
        &self,
        id: i64,
        status: ImportJobStatus,
        error: Option<&str>,
    ) -> Result<ImportJob, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        import_jobs::finish_job(id, status, error, &mut conn).await
    }

    async fn fetch_import_job(&self, id: i64) -> Result<Option<ImportJob>, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(import_jobs::fetch_job(id, &mut conn).await?)
    }

    async fn fetch_resumable_job(&self, integration_id: i64) -> Result<Option<ImportJob>, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(import_jobs::fetch_resumable_job(integration_id, &mut conn).await?)
    }
}

impl WebhookMirror for SqliteDatabase {
    async fn replace_subscription_snapshot(
        &self,
        integration_id: i64,
        subs: &[NewWebhookSubscription],
    ) -> Result<(), TaxLedgerError> {
        let mut tx = self.pool.begin().await?;
        webhook_subs::replace_snapshot(integration_id, subs, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_subscription_snapshot(
        &self,
        integration_id: i64,
    ) -> Result<Vec<WebhookSubscriptionRecord>, TaxLedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(webhook_subs::fetch_snapshot(integration_id, &mut conn).await?)
    }
}
