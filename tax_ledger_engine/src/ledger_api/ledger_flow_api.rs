use std::fmt::Debug;

use log::*;
use serde_json::json;
use stt_common::MoneyMinor;

use crate::{
    db_types::{
        CustomerIdentity,
        ExternalOrderId,
        Jurisdiction,
        NewTransaction,
        TransactionKey,
        TransactionRecord,
        TransactionStatus,
        TransactionType,
    },
    events::{EventProducers, TransactionIngestedEvent},
    events_model::{derive_status, CancelEventData, OrderEvent, OrderEventData, RefundEventData},
    tax::TaxCalculator,
    traits::{TaxLedgerDatabase, TaxLedgerError, UpsertResult},
};

/// The organization/integration pair an event belongs to. Webhook deliveries resolve this from the shop identifier
/// header; backfills carry it on the job.
#[derive(Debug, Clone, Copy)]
pub struct IntegrationContext {
    pub organization_id: i64,
    pub integration_id: i64,
}

impl IntegrationContext {
    pub fn new(organization_id: i64, integration_id: i64) -> Self {
        Self { organization_id, integration_id }
    }

    pub fn key(&self, external_id: ExternalOrderId) -> TransactionKey {
        TransactionKey::new(self.organization_id, self.integration_id, external_id)
    }
}

/// What the upserter did with one event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Inserted(TransactionRecord),
    Updated(TransactionRecord),
    /// Discarded: the event's source timestamp was older than the stored row.
    Stale,
    Cancelled(TransactionRecord),
    /// A cancellation for an unknown external id, or one outrun by newer data. Nothing to do.
    CancelIgnored(ExternalOrderId),
    RefundApplied {
        refund: TransactionRecord,
        fully_refunded: bool,
        duplicate: bool,
    },
    /// The event carries no ledger mutation (e.g. an app uninstall, which the dispatcher handles).
    Ignored,
}

#[derive(Debug, Clone)]
pub enum ImportRowOutcome {
    Imported(TransactionRecord),
    /// A record already existed for the key; the row was skipped. This is what makes overlapping backfills and
    /// webhook/backfill races harmless.
    Skipped(TransactionRecord),
}

/// Aggregate result of applying a batch of events. Item failures are isolated and counted, never propagated.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub applied: usize,
    pub stale: usize,
    pub failed: usize,
    pub outcomes: Vec<EventOutcome>,
}

/// `LedgerFlowApi` is the primary API for applying normalized order events to the ledger, idempotently and in the
/// face of out-of-order, at-least-once delivery.
pub struct LedgerFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for LedgerFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerFlowApi")
    }
}

impl<B> Clone for LedgerFlowApi<B>
where B: Clone
{
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> LedgerFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> LedgerFlowApi<B>
where B: TaxLedgerDatabase
{
    /// Apply one normalized event to the ledger.
    ///
    /// * Create/update events go through the timestamp-gated atomic upsert; an update for an unknown external id
    ///   simply inserts (defends against a missed create delivery).
    /// * Refund events insert a new synthetic record and settle the original's status from the refund sum.
    /// * Cancellations are status-only transitions.
    ///
    /// The call is idempotent: replaying any event yields the same end state.
    pub async fn upsert_event<C: TaxCalculator>(
        &self,
        ctx: &IntegrationContext,
        event: OrderEvent,
        calculator: &C,
    ) -> Result<EventOutcome, TaxLedgerError> {
        let outcome = match event {
            OrderEvent::Created(data) | OrderEvent::Updated(data) => self.apply_order(ctx, data, calculator).await?,
            OrderEvent::Cancelled(data) => self.apply_cancel(ctx, data).await?,
            OrderEvent::Refunded(data) => self.apply_refund(ctx, data).await?,
            OrderEvent::Uninstalled(_) => EventOutcome::Ignored,
        };
        Ok(outcome)
    }

    /// Apply a batch of events. One event's failure (e.g. a malformed payload that slipped through) never aborts
    /// processing of its siblings; failures are aggregated into the outcome.
    pub async fn upsert_all<C: TaxCalculator>(
        &self,
        ctx: &IntegrationContext,
        events: Vec<OrderEvent>,
        calculator: &C,
    ) -> BatchOutcome {
        let mut batch = BatchOutcome::default();
        for event in events {
            let kind = event.kind();
            let id = event.external_id();
            match self.upsert_event(ctx, event, calculator).await {
                Ok(EventOutcome::Stale) => {
                    batch.stale += 1;
                    batch.outcomes.push(EventOutcome::Stale);
                },
                Ok(outcome) => {
                    batch.applied += 1;
                    batch.outcomes.push(outcome);
                },
                Err(e) => {
                    warn!("📦️ Failed to apply {kind} event for {id}: {e}");
                    batch.failed += 1;
                },
            }
        }
        batch
    }

    /// The backfill write path: insert unless a record already exists for the key.
    pub async fn import_order<C: TaxCalculator>(
        &self,
        ctx: &IntegrationContext,
        data: OrderEventData,
        calculator: &C,
    ) -> Result<ImportRowOutcome, TaxLedgerError> {
        let tx = self.build_transaction(ctx, data, calculator, "backfill");
        let (record, inserted) = self.db.insert_transaction_if_absent(tx).await?;
        if inserted {
            debug!("📦️ Imported order {}", record.external_id);
            self.notify_ingested(&record, true).await;
            Ok(ImportRowOutcome::Imported(record))
        } else {
            trace!("📦️ Order {} already present. Skipping", record.external_id);
            Ok(ImportRowOutcome::Skipped(record))
        }
    }

    async fn apply_order<C: TaxCalculator>(
        &self,
        ctx: &IntegrationContext,
        data: OrderEventData,
        calculator: &C,
    ) -> Result<EventOutcome, TaxLedgerError> {
        let tx = self.build_transaction(ctx, data, calculator, "webhook");
        match self.db.upsert_transaction(tx).await? {
            UpsertResult::Inserted(rec) => {
                info!("📦️ Order {} added to the ledger", rec.external_id);
                self.notify_ingested(&rec, true).await;
                Ok(EventOutcome::Inserted(rec))
            },
            UpsertResult::Updated(rec) => {
                info!("📦️ Order {} updated (revision {})", rec.external_id, rec.revision);
                self.notify_ingested(&rec, false).await;
                Ok(EventOutcome::Updated(rec))
            },
            UpsertResult::Stale => Ok(EventOutcome::Stale),
        }
    }

    async fn apply_cancel(
        &self,
        ctx: &IntegrationContext,
        data: CancelEventData,
    ) -> Result<EventOutcome, TaxLedgerError> {
        let key = ctx.key(data.external_id.clone());
        match self.db.update_transaction_status(&key, TransactionStatus::Cancelled, data.last_modified).await? {
            Some(rec) => {
                info!("📦️ Order {} cancelled", rec.external_id);
                Ok(EventOutcome::Cancelled(rec))
            },
            None => {
                warn!("📦️ Cancellation for unknown or newer order {}. Ignoring", data.external_id);
                Ok(EventOutcome::CancelIgnored(data.external_id))
            },
        }
    }

    async fn apply_refund(
        &self,
        ctx: &IntegrationContext,
        data: RefundEventData,
    ) -> Result<EventOutcome, TaxLedgerError> {
        let original_key = ctx.key(data.original_external_id.clone());
        let refund = self.build_refund(ctx, data);
        let outcome = self.db.process_refund(refund, &original_key).await?;
        if outcome.already_recorded {
            info!("📦️ Refund {} already recorded. Nothing to do", outcome.refund.external_id);
        } else {
            info!(
                "📦️ Refund {} of {} recorded against {} (fully refunded: {})",
                outcome.refund.external_id,
                outcome.refund.total.abs(),
                original_key.external_id,
                outcome.fully_refunded
            );
            self.notify_ingested(&outcome.refund, true).await;
        }
        Ok(EventOutcome::RefundApplied {
            refund: outcome.refund,
            fully_refunded: outcome.fully_refunded,
            duplicate: outcome.already_recorded,
        })
    }

    fn build_transaction<C: TaxCalculator>(
        &self,
        ctx: &IntegrationContext,
        data: OrderEventData,
        calculator: &C,
        source: &str,
    ) -> NewTransaction {
        let status = derive_status(&data.financial_state);
        let summary = calculator.summarize(&data.tax_lines, &data.jurisdiction, data.amounts.tax);
        if !summary.validated {
            warn!(
                "📦️ Tax breakdown for {} does not add up to the reported total {}. Storing it anyway, flagged.",
                data.external_id, data.amounts.tax
            );
        }
        let metadata = json!({
            "source": source,
            "financial_state": data.financial_state.to_string(),
        })
        .to_string();
        NewTransaction {
            organization_id: ctx.organization_id,
            integration_id: ctx.integration_id,
            external_id: data.external_id,
            order_number: data.order_number,
            transaction_type: TransactionType::Sale,
            status,
            subtotal: data.amounts.subtotal,
            tax: data.amounts.tax,
            total: data.amounts.total,
            discount: data.amounts.discount,
            shipping: data.amounts.shipping,
            currency: data.currency,
            tax_breakdown: Some(summary.to_json()),
            jurisdiction: data.jurisdiction,
            customer: data.customer,
            original_external_id: None,
            metadata: Some(metadata),
            transaction_date: data.occurred_at,
            last_modified: data.last_modified,
        }
    }

    /// A refund becomes its own ledger row: synthetic external id, negated amounts, back-reference to the original.
    fn build_refund(&self, ctx: &IntegrationContext, data: RefundEventData) -> NewTransaction {
        let metadata = json!({
            "source": "webhook",
            "refund_id": data.refund_id,
            "original_external_id": data.original_external_id.as_str(),
            "note": data.note,
        })
        .to_string();
        NewTransaction {
            organization_id: ctx.organization_id,
            integration_id: ctx.integration_id,
            external_id: ExternalOrderId::for_refund(data.refund_id),
            order_number: String::new(),
            transaction_type: TransactionType::Refund,
            status: TransactionStatus::Completed,
            subtotal: -data.amounts.subtotal,
            tax: -data.amounts.tax,
            total: -data.amounts.total,
            discount: MoneyMinor::default(),
            shipping: MoneyMinor::default(),
            currency: String::new(),
            tax_breakdown: None,
            jurisdiction: Jurisdiction::default(),
            customer: CustomerIdentity::default(),
            original_external_id: Some(data.original_external_id),
            metadata: Some(metadata),
            transaction_date: data.occurred_at,
            last_modified: data.last_modified,
        }
    }

    async fn notify_ingested(&self, record: &TransactionRecord, inserted: bool) {
        for producer in &self.producers.transaction_ingested {
            let event = TransactionIngestedEvent::new(record.clone(), inserted);
            producer.publish_event(event).await;
        }
    }

    /// Announce a finished historical import to the subscribed hooks.
    pub async fn notify_import_completed(&self, integration_id: i64, summary: &crate::db_types::ImportSummary) {
        for producer in &self.producers.import_completed {
            let event = crate::events::ImportCompletedEvent { integration_id, summary: summary.clone() };
            producer.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::{
        events::EventProducers,
        tax::CategoryMapCalculator,
        test_utils::{paid_order_event, prepare_test_env},
        SqliteDatabase,
    };

    #[tokio::test]
    async fn backfill_and_live_delivery_share_one_record() {
        prepare_test_env();
        let db = SqliteDatabase::new_with_url("sqlite::memory:", 1).await.unwrap();
        let integration = db.create_integration(1, "example.myshopify.com", "shpat_test").await.unwrap();
        let ctx = IntegrationContext::new(integration.organization_id, integration.id);
        let api = LedgerFlowApi::new(db, EventProducers::default());

        let event = paid_order_event("42".to_string(), 10_000, Utc::now());
        let imported = api.import_order(&ctx, event.clone(), &CategoryMapCalculator).await.unwrap();
        assert!(matches!(imported, ImportRowOutcome::Imported(_)));

        // The live webhook for the same order arrives afterwards; same key, so no second row appears
        let outcome = api.upsert_event(&ctx, OrderEvent::Updated(event.clone()), &CategoryMapCalculator).await.unwrap();
        let record = match outcome {
            EventOutcome::Updated(rec) => rec,
            other => panic!("expected an overwrite of the imported row, got {other:?}"),
        };
        assert_eq!(record.total, event.amounts.total);

        // And a second import run skips it
        let outcome = api.import_order(&ctx, event, &CategoryMapCalculator).await.unwrap();
        assert!(matches!(outcome, ImportRowOutcome::Skipped(_)));
    }
}
