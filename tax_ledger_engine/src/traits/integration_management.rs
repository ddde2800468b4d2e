use chrono::{DateTime, Utc};

use crate::{
    db_types::{ImportSummary, IntegrationRecord, SyncStatus, WebhookHealthReport},
    traits::TaxLedgerError,
};

/// Integration bookkeeping: the sync status, staleness tracking and the persisted snapshots the rest of the
/// application reads.
#[allow(async_fn_in_trait)]
pub trait IntegrationManagement: Clone {
    fn fetch_integration(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<Option<IntegrationRecord>, TaxLedgerError>> + Send;

    /// Look an integration up by the shop identifier the platform sends in its webhook headers.
    fn fetch_integration_by_shop(
        &self,
        shop_domain: &str,
    ) -> impl std::future::Future<Output = Result<Option<IntegrationRecord>, TaxLedgerError>> + Send;

    /// Every integration that is still connected (i.e. should have live webhook subscriptions).
    fn fetch_connected_integrations(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<IntegrationRecord>, TaxLedgerError>> + Send;

    /// Bump `last_sync_at`. Called once per processed webhook event so staleness monitoring can tell a quiet shop
    /// from a broken subscription.
    fn touch_sync_activity(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<(), TaxLedgerError>> + Send;

    /// Set the sync status, with a human-readable error message for terminal failures.
    fn set_sync_status(
        &self,
        id: i64,
        status: SyncStatus,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), TaxLedgerError>> + Send;

    /// Persist the webhook-health snapshot and the time of the next scheduled check.
    fn record_webhook_health(
        &self,
        id: i64,
        report: &WebhookHealthReport,
        next_check_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), TaxLedgerError>> + Send;

    /// Persist the summary of the most recent historical import.
    fn record_import_summary(
        &self,
        id: i64,
        summary: &ImportSummary,
    ) -> impl std::future::Future<Output = Result<(), TaxLedgerError>> + Send;
}
