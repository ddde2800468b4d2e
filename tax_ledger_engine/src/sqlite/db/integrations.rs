use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{IntegrationRecord, SyncStatus},
    traits::TaxLedgerError,
};

pub async fn insert_integration(
    organization_id: i64,
    shop_domain: &str,
    access_token: &str,
    conn: &mut SqliteConnection,
) -> Result<IntegrationRecord, TaxLedgerError> {
    let record = sqlx::query_as(
        r#"
        INSERT INTO integrations (organization_id, shop_domain, access_token)
        VALUES ($1, $2, $3)
        RETURNING *;
        "#,
    )
    .bind(organization_id)
    .bind(shop_domain)
    .bind(access_token)
    .fetch_one(conn)
    .await?;
    Ok(record)
}

pub async fn fetch_integration(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<IntegrationRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM integrations WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_integration_by_shop(
    shop_domain: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<IntegrationRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM integrations WHERE shop_domain = $1").bind(shop_domain).fetch_optional(conn).await
}

pub async fn fetch_connected_integrations(
    conn: &mut SqliteConnection,
) -> Result<Vec<IntegrationRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM integrations WHERE sync_status != 'Disconnected' ORDER BY id ASC")
        .fetch_all(conn)
        .await
}

pub async fn touch_sync_activity(id: i64, conn: &mut SqliteConnection) -> Result<(), TaxLedgerError> {
    let result = sqlx::query(
        "UPDATE integrations SET last_sync_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(TaxLedgerError::IntegrationNotFound(id));
    }
    Ok(())
}

pub async fn set_sync_status(
    id: i64,
    status: SyncStatus,
    error: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), TaxLedgerError> {
    debug!("🗃️ Integration {id} sync status -> {status}");
    let result = sqlx::query(
        "UPDATE integrations SET sync_status = $2, sync_error = $3, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(id)
    .bind(status)
    .bind(error)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(TaxLedgerError::IntegrationNotFound(id));
    }
    Ok(())
}

pub async fn record_webhook_health(
    id: i64,
    health_json: &str,
    next_check_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), TaxLedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE integrations
        SET webhook_health = $2, webhook_next_check_at = $3, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(health_json)
    .bind(next_check_at)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(TaxLedgerError::IntegrationNotFound(id));
    }
    Ok(())
}

pub async fn record_import_summary(
    id: i64,
    summary_json: &str,
    conn: &mut SqliteConnection,
) -> Result<(), TaxLedgerError> {
    let result = sqlx::query(
        "UPDATE integrations SET historical_import_state = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(id)
    .bind(summary_json)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(TaxLedgerError::IntegrationNotFound(id));
    }
    Ok(())
}
