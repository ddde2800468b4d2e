use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use stt_common::{MoneyMinor, Secret};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------   ExternalOrderId   ---------------------------------------------------------
/// The order id as assigned by the commerce platform. Refund records carry a synthetic id derived from the refund id
/// (`refund_<id>`), so that every ledger row has a stable external identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ExternalOrderId(pub String);

impl ExternalOrderId {
    pub fn for_refund(refund_id: i64) -> Self {
        Self(format!("refund_{refund_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ExternalOrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for ExternalOrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for ExternalOrderId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl Display for ExternalOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------   TransactionKey   ----------------------------------------------------------
/// `(organization_id, integration_id, external_id)` uniquely identifies one logical order in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionKey {
    pub organization_id: i64,
    pub integration_id: i64,
    pub external_id: ExternalOrderId,
}

impl TransactionKey {
    pub fn new(organization_id: i64, integration_id: i64, external_id: ExternalOrderId) -> Self {
        Self { organization_id, integration_id, external_id }
    }
}

impl Display for TransactionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.organization_id, self.integration_id, self.external_id)
    }
}

//--------------------------------------   TransactionType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionType {
    Sale,
    Refund,
    PartialRefund,
    Cancel,
    Adjustment,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Sale => write!(f, "Sale"),
            TransactionType::Refund => write!(f, "Refund"),
            TransactionType::PartialRefund => write!(f, "PartialRefund"),
            TransactionType::Cancel => write!(f, "Cancel"),
            TransactionType::Adjustment => write!(f, "Adjustment"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sale" => Ok(Self::Sale),
            "Refund" => Ok(Self::Refund),
            "PartialRefund" => Ok(Self::PartialRefund),
            "Cancel" => Ok(Self::Cancel),
            "Adjustment" => Ok(Self::Adjustment),
            s => Err(ConversionError(format!("Invalid transaction type: {s}"))),
        }
    }
}

//--------------------------------------   TransactionStatus   -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// The order exists but payment has not settled.
    Pending,
    /// The order is paid and counts towards tax obligations.
    Completed,
    /// The order was voided before settlement.
    Cancelled,
    /// Payment failed on the platform side.
    Failed,
    /// The full order value has been refunded.
    Refunded,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "Pending"),
            TransactionStatus::Completed => write!(f, "Completed"),
            TransactionStatus::Cancelled => write!(f, "Cancelled"),
            TransactionStatus::Failed => write!(f, "Failed"),
            TransactionStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            "Failed" => Ok(Self::Failed),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid transaction status: {value}. But this conversion cannot fail. Defaulting to Pending");
            TransactionStatus::Pending
        })
    }
}

//--------------------------------------     Jurisdiction      -------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub postal: Option<String>,
}

//--------------------------------------   CustomerIdentity    -------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub external_id: Option<i64>,
    pub email: Option<String>,
}

//--------------------------------------   TransactionRecord   -------------------------------------------------------
/// One ledger entry for an order, refund or adjustment. Created by the first event that touches an external id and
/// only ever status-transitioned afterwards, never hard-deleted.
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRecord {
    pub id: i64,
    pub organization_id: i64,
    pub integration_id: i64,
    pub external_id: ExternalOrderId,
    pub order_number: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub subtotal: MoneyMinor,
    pub tax: MoneyMinor,
    pub total: MoneyMinor,
    pub discount: MoneyMinor,
    pub shipping: MoneyMinor,
    pub currency: String,
    /// The tax-category breakdown, stored verbatim as the TaxCalculator returned it (JSON).
    pub tax_breakdown: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub postal: Option<String>,
    pub customer_external_id: Option<i64>,
    pub customer_email: Option<String>,
    /// Back-reference from a refund record to the original order's external id.
    pub original_external_id: Option<ExternalOrderId>,
    /// Provenance (JSON): which source produced the row, topic, refund id.
    pub metadata: Option<String>,
    pub transaction_date: DateTime<Utc>,
    /// The source timestamp gate. An incoming event only overwrites the row if its own source timestamp is not
    /// older than this.
    pub last_modified: DateTime<Utc>,
    /// Bumped on every accepted overwrite. A returned record with revision 0 was freshly inserted.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn key(&self) -> TransactionKey {
        TransactionKey::new(self.organization_id, self.integration_id, self.external_id.clone())
    }

    pub fn jurisdiction(&self) -> Jurisdiction {
        Jurisdiction {
            country: self.country.clone(),
            province: self.province.clone(),
            city: self.city.clone(),
            postal: self.postal.clone(),
        }
    }
}

//--------------------------------------    NewTransaction     -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub organization_id: i64,
    pub integration_id: i64,
    pub external_id: ExternalOrderId,
    pub order_number: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub subtotal: MoneyMinor,
    pub tax: MoneyMinor,
    pub total: MoneyMinor,
    pub discount: MoneyMinor,
    pub shipping: MoneyMinor,
    pub currency: String,
    pub tax_breakdown: Option<String>,
    pub jurisdiction: Jurisdiction,
    pub customer: CustomerIdentity,
    pub original_external_id: Option<ExternalOrderId>,
    pub metadata: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl NewTransaction {
    pub fn key(&self) -> TransactionKey {
        TransactionKey::new(self.organization_id, self.integration_id, self.external_id.clone())
    }
}

//--------------------------------------      SyncStatus       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum SyncStatus {
    Connected,
    Syncing,
    Error,
    Disconnected,
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Connected => write!(f, "Connected"),
            SyncStatus::Syncing => write!(f, "Syncing"),
            SyncStatus::Error => write!(f, "Error"),
            SyncStatus::Disconnected => write!(f, "Disconnected"),
        }
    }
}

impl FromStr for SyncStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Connected" => Ok(Self::Connected),
            "Syncing" => Ok(Self::Syncing),
            "Error" => Ok(Self::Error),
            "Disconnected" => Ok(Self::Disconnected),
            s => Err(ConversionError(format!("Invalid sync status: {s}"))),
        }
    }
}

//--------------------------------------   IntegrationRecord   -------------------------------------------------------
/// One connected shop. Carries the credential, the rolling sync state and the latest webhook-health and
/// historical-import snapshots that the dashboard reads.
#[derive(Clone, FromRow)]
pub struct IntegrationRecord {
    pub id: i64,
    pub organization_id: i64,
    pub shop_domain: String,
    access_token: String,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// JSON-serialized [`WebhookHealthReport`].
    pub webhook_health: Option<String>,
    pub webhook_next_check_at: Option<DateTime<Utc>>,
    /// JSON-serialized [`ImportSummary`] of the most recent backfill.
    pub historical_import_state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntegrationRecord {
    pub fn credentials(&self) -> Secret<String> {
        Secret::new(self.access_token.clone())
    }
}

impl std::fmt::Debug for IntegrationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationRecord")
            .field("id", &self.id)
            .field("organization_id", &self.organization_id)
            .field("shop_domain", &self.shop_domain)
            .field("access_token", &"****")
            .field("sync_status", &self.sync_status)
            .field("last_sync_at", &self.last_sync_at)
            .finish()
    }
}

//--------------------------------------      ImportJob        -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ImportJobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Display for ImportJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportJobStatus::Pending => write!(f, "Pending"),
            ImportJobStatus::InProgress => write!(f, "InProgress"),
            ImportJobStatus::Completed => write!(f, "Completed"),
            ImportJobStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// The persisted checkpoint row for one backfill run. Updated after every batch, so a crashed import can resume
/// from the last cursor instead of starting over.
#[derive(Debug, Clone, FromRow)]
pub struct ImportJob {
    pub id: i64,
    pub integration_id: i64,
    pub status: ImportJobStatus,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    /// The `since_id` pagination cursor of the last fully processed batch.
    pub cursor: Option<i64>,
    pub total_fetched: i64,
    pub total_processed: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub integration_id: i64,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

/// Incremental progress for a running job.
#[derive(Debug, Clone, Copy)]
pub struct ImportCheckpoint {
    pub cursor: Option<i64>,
    pub total_fetched: i64,
    pub total_processed: i64,
}

/// The durable summary copied onto the integration once a job reaches a terminal state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_imported: u64,
    pub total_skipped: u64,
    pub total_failed: u64,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub completed: bool,
}

//--------------------------------------  WebhookSubscription  -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Healthy,
    Unhealthy,
    Missing,
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Healthy => write!(f, "Healthy"),
            SubscriptionStatus::Unhealthy => write!(f, "Unhealthy"),
            SubscriptionStatus::Missing => write!(f, "Missing"),
        }
    }
}

/// Local mirror of one remote webhook registration. Rows are written only by the subscription reconciler.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookSubscriptionRecord {
    pub id: i64,
    pub integration_id: i64,
    pub topic: String,
    pub remote_id: Option<i64>,
    pub address: Option<String>,
    pub status: SubscriptionStatus,
    pub consecutive_failures: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookSubscription {
    pub topic: String,
    pub remote_id: Option<i64>,
    pub address: Option<String>,
    pub status: SubscriptionStatus,
    pub consecutive_failures: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookOverallStatus {
    Healthy,
    Degraded,
    Failed,
}

impl Display for WebhookOverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookOverallStatus::Healthy => write!(f, "Healthy"),
            WebhookOverallStatus::Degraded => write!(f, "Degraded"),
            WebhookOverallStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicHealth {
    pub topic: String,
    pub status: SubscriptionStatus,
    pub address: Option<String>,
    pub remote_id: Option<i64>,
}

/// The snapshot persisted on the integration after each reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookHealthReport {
    pub overall_status: WebhookOverallStatus,
    pub per_topic: Vec<TopicHealth>,
    pub checked_at: DateTime<Utc>,
}

impl WebhookHealthReport {
    /// Overall health from the per-topic classification: healthy at 100% healthy topics, degraded at 60% or more,
    /// failed below that.
    pub fn from_topics(per_topic: Vec<TopicHealth>, checked_at: DateTime<Utc>) -> Self {
        let total = per_topic.len().max(1);
        let healthy = per_topic.iter().filter(|t| t.status == SubscriptionStatus::Healthy).count();
        let ratio = healthy as f64 / total as f64;
        let overall_status = if healthy == per_topic.len() && !per_topic.is_empty() {
            WebhookOverallStatus::Healthy
        } else if ratio >= 0.6 {
            WebhookOverallStatus::Degraded
        } else {
            WebhookOverallStatus::Failed
        };
        Self { overall_status, per_topic, checked_at }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall_status == WebhookOverallStatus::Healthy
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn refund_ids_are_synthetic() {
        let id = ExternalOrderId::for_refund(509562969);
        assert_eq!(id.as_str(), "refund_509562969");
    }

    #[test]
    fn status_round_trips() {
        for status in
            [TransactionStatus::Pending, TransactionStatus::Completed, TransactionStatus::Refunded] {
            assert_eq!(status.to_string().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("Paidish".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn overall_health_thresholds() {
        let topic = |status| TopicHealth { topic: "orders/create".into(), status, address: None, remote_id: None };
        let now = Utc::now();
        let all_healthy = WebhookHealthReport::from_topics(
            vec![topic(SubscriptionStatus::Healthy), topic(SubscriptionStatus::Healthy)],
            now,
        );
        assert_eq!(all_healthy.overall_status, WebhookOverallStatus::Healthy);

        let degraded = WebhookHealthReport::from_topics(
            vec![
                topic(SubscriptionStatus::Healthy),
                topic(SubscriptionStatus::Healthy),
                topic(SubscriptionStatus::Healthy),
                topic(SubscriptionStatus::Missing),
                topic(SubscriptionStatus::Unhealthy),
            ],
            now,
        );
        assert_eq!(degraded.overall_status, WebhookOverallStatus::Degraded);

        let failed = WebhookHealthReport::from_topics(
            vec![topic(SubscriptionStatus::Missing), topic(SubscriptionStatus::Missing)],
            now,
        );
        assert_eq!(failed.overall_status, WebhookOverallStatus::Failed);
    }
}
