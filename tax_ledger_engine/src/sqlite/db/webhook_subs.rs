use sqlx::SqliteConnection;

use crate::{
    db_types::{NewWebhookSubscription, WebhookSubscriptionRecord},
    traits::TaxLedgerError,
};

/// Replace the whole snapshot for an integration. Runs inside the caller's transaction.
pub async fn replace_snapshot(
    integration_id: i64,
    subs: &[NewWebhookSubscription],
    conn: &mut SqliteConnection,
) -> Result<(), TaxLedgerError> {
    sqlx::query("DELETE FROM webhook_subscriptions WHERE integration_id = $1")
        .bind(integration_id)
        .execute(&mut *conn)
        .await?;
    for sub in subs {
        sqlx::query(
            r#"
            INSERT INTO webhook_subscriptions
                (integration_id, topic, remote_id, address, status, consecutive_failures)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(integration_id)
        .bind(&sub.topic)
        .bind(sub.remote_id)
        .bind(&sub.address)
        .bind(sub.status)
        .bind(sub.consecutive_failures)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn fetch_snapshot(
    integration_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookSubscriptionRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM webhook_subscriptions WHERE integration_id = $1 ORDER BY topic ASC")
        .bind(integration_id)
        .fetch_all(conn)
        .await
}
