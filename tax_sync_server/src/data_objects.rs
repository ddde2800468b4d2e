use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tax_ledger_engine::db_types::{IntegrationRecord, SyncStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Parameters for triggering a historical import. All fields optional; an open window imports everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackfillRequest {
    #[serde(default)]
    pub window_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_orders: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillAccepted {
    pub job_id: i64,
    pub message: String,
}

/// The sync state of one integration, as the dashboard reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub integration_id: i64,
    pub shop_domain: String,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub webhook_health: Option<serde_json::Value>,
    pub webhook_next_check_at: Option<DateTime<Utc>>,
    pub historical_import_state: Option<serde_json::Value>,
}

impl From<IntegrationRecord> for SyncStatusResponse {
    fn from(rec: IntegrationRecord) -> Self {
        let parse = |s: &Option<String>| s.as_deref().and_then(|s| serde_json::from_str(s).ok());
        Self {
            integration_id: rec.id,
            shop_domain: rec.shop_domain.clone(),
            sync_status: rec.sync_status,
            sync_error: rec.sync_error.clone(),
            last_sync_at: rec.last_sync_at,
            webhook_health: parse(&rec.webhook_health),
            webhook_next_check_at: rec.webhook_next_check_at,
            historical_import_state: parse(&rec.historical_import_state),
        }
    }
}
