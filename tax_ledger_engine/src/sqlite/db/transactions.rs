use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewTransaction, TransactionKey, TransactionRecord, TransactionStatus},
    traits::{TaxLedgerError, UpsertResult},
};

/// The single-statement, timestamp-gated upsert.
///
/// The conflict target is the ledger's uniqueness constraint; the `WHERE` clause on the `DO UPDATE` arm is what
/// defends against out-of-order delivery: an event whose source timestamp is older than the stored row changes
/// nothing and returns no row. The write is atomic by construction, so concurrent deliveries for the same key can
/// never interleave a read-modify-write.
pub async fn upsert(tx: NewTransaction, conn: &mut SqliteConnection) -> Result<UpsertResult, TaxLedgerError> {
    let record: Option<TransactionRecord> = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                organization_id, integration_id, external_id, order_number, transaction_type, status,
                subtotal, tax, total, discount, shipping, currency, tax_breakdown,
                country, province, city, postal, customer_external_id, customer_email,
                original_external_id, metadata, transaction_date, last_modified
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                      $21, $22, $23)
            ON CONFLICT (organization_id, integration_id, external_id) DO UPDATE SET
                order_number = excluded.order_number,
                transaction_type = excluded.transaction_type,
                status = excluded.status,
                subtotal = excluded.subtotal,
                tax = excluded.tax,
                total = excluded.total,
                discount = excluded.discount,
                shipping = excluded.shipping,
                currency = excluded.currency,
                tax_breakdown = excluded.tax_breakdown,
                country = excluded.country,
                province = excluded.province,
                city = excluded.city,
                postal = excluded.postal,
                customer_external_id = excluded.customer_external_id,
                customer_email = excluded.customer_email,
                metadata = excluded.metadata,
                transaction_date = excluded.transaction_date,
                last_modified = excluded.last_modified,
                revision = transactions.revision + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE excluded.last_modified >= transactions.last_modified
            RETURNING *;
        "#,
    )
    .bind(tx.organization_id)
    .bind(tx.integration_id)
    .bind(&tx.external_id)
    .bind(&tx.order_number)
    .bind(tx.transaction_type)
    .bind(tx.status)
    .bind(tx.subtotal)
    .bind(tx.tax)
    .bind(tx.total)
    .bind(tx.discount)
    .bind(tx.shipping)
    .bind(&tx.currency)
    .bind(&tx.tax_breakdown)
    .bind(&tx.jurisdiction.country)
    .bind(&tx.jurisdiction.province)
    .bind(&tx.jurisdiction.city)
    .bind(&tx.jurisdiction.postal)
    .bind(tx.customer.external_id)
    .bind(&tx.customer.email)
    .bind(&tx.original_external_id)
    .bind(&tx.metadata)
    .bind(tx.transaction_date)
    .bind(tx.last_modified)
    .fetch_optional(conn)
    .await?;
    let result = match record {
        None => {
            debug!("🗃️ Stale event for {} discarded", tx.key());
            UpsertResult::Stale
        },
        Some(rec) if rec.revision == 0 => {
            debug!("🗃️ Transaction {} inserted with id {}", rec.external_id, rec.id);
            UpsertResult::Inserted(rec)
        },
        Some(rec) => {
            debug!("🗃️ Transaction {} overwritten (revision {})", rec.external_id, rec.revision);
            UpsertResult::Updated(rec)
        },
    };
    Ok(result)
}

/// Inserts the transaction, returning `false` in the second element if a row already existed for the key.
pub async fn insert_if_absent(
    tx: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<(TransactionRecord, bool), TaxLedgerError> {
    let key = tx.key();
    let inserted: Option<TransactionRecord> = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                organization_id, integration_id, external_id, order_number, transaction_type, status,
                subtotal, tax, total, discount, shipping, currency, tax_breakdown,
                country, province, city, postal, customer_external_id, customer_email,
                original_external_id, metadata, transaction_date, last_modified
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                      $21, $22, $23)
            ON CONFLICT (organization_id, integration_id, external_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(tx.organization_id)
    .bind(tx.integration_id)
    .bind(&tx.external_id)
    .bind(&tx.order_number)
    .bind(tx.transaction_type)
    .bind(tx.status)
    .bind(tx.subtotal)
    .bind(tx.tax)
    .bind(tx.total)
    .bind(tx.discount)
    .bind(tx.shipping)
    .bind(&tx.currency)
    .bind(&tx.tax_breakdown)
    .bind(&tx.jurisdiction.country)
    .bind(&tx.jurisdiction.province)
    .bind(&tx.jurisdiction.city)
    .bind(&tx.jurisdiction.postal)
    .bind(tx.customer.external_id)
    .bind(&tx.customer.email)
    .bind(&tx.original_external_id)
    .bind(&tx.metadata)
    .bind(tx.transaction_date)
    .bind(tx.last_modified)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(rec) => {
            debug!("🗃️ Transaction {} inserted with id {}", rec.external_id, rec.id);
            Ok((rec, true))
        },
        None => {
            let existing = fetch_by_key(&key, conn)
                .await?
                .ok_or_else(|| TaxLedgerError::TransactionNotFound(key.external_id.clone()))?;
            Ok((existing, false))
        },
    }
}

pub async fn fetch_by_key(
    key: &TransactionKey,
    conn: &mut SqliteConnection,
) -> Result<Option<TransactionRecord>, sqlx::Error> {
    let record = sqlx::query_as(
        "SELECT * FROM transactions WHERE organization_id = $1 AND integration_id = $2 AND external_id = $3",
    )
    .bind(key.organization_id)
    .bind(key.integration_id)
    .bind(&key.external_id)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

pub async fn fetch_refunds_for(
    key: &TransactionKey,
    conn: &mut SqliteConnection,
) -> Result<Vec<TransactionRecord>, sqlx::Error> {
    let records = sqlx::query_as(
        r#"
        SELECT * FROM transactions
        WHERE organization_id = $1 AND integration_id = $2 AND original_external_id = $3
        ORDER BY transaction_date ASC
        "#,
    )
    .bind(key.organization_id)
    .bind(key.integration_id)
    .bind(&key.external_id)
    .fetch_all(conn)
    .await?;
    Ok(records)
}

/// The sum of all refund totals recorded against the given original. Refund rows store negated amounts, so the
/// result is zero or negative.
pub async fn sum_refund_totals(key: &TransactionKey, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let sum: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(total), 0) FROM transactions
        WHERE organization_id = $1 AND integration_id = $2 AND original_external_id = $3
        "#,
    )
    .bind(key.organization_id)
    .bind(key.integration_id)
    .bind(&key.external_id)
    .fetch_one(conn)
    .await?;
    Ok(sum)
}

/// Timestamp-gated status-only transition. Monetary fields are untouched.
pub async fn update_status_gated(
    key: &TransactionKey,
    status: TransactionStatus,
    last_modified: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<TransactionRecord>, TaxLedgerError> {
    let record = sqlx::query_as(
        r#"
        UPDATE transactions
        SET status = $4, last_modified = $5, revision = revision + 1, updated_at = CURRENT_TIMESTAMP
        WHERE organization_id = $1 AND integration_id = $2 AND external_id = $3 AND last_modified <= $5
        RETURNING *;
        "#,
    )
    .bind(key.organization_id)
    .bind(key.integration_id)
    .bind(&key.external_id)
    .bind(status)
    .bind(last_modified)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

/// Ungated status write used by internal bookkeeping (refund-sum settlement). Does not bump `last_modified`.
pub(crate) async fn set_status(
    key: &TransactionKey,
    status: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<TransactionRecord>, TaxLedgerError> {
    let record = sqlx::query_as(
        r#"
        UPDATE transactions
        SET status = $4, updated_at = CURRENT_TIMESTAMP
        WHERE organization_id = $1 AND integration_id = $2 AND external_id = $3
        RETURNING *;
        "#,
    )
    .bind(key.organization_id)
    .bind(key.integration_id)
    .bind(&key.external_id)
    .bind(status)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}
