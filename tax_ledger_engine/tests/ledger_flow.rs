//! End-to-end ledger flow tests against an in-memory SQLite backend.

use stt_common::MoneyMinor;
use tax_ledger_engine::{
    db_types::{TransactionStatus, TransactionType},
    events_model::{OrderEvent, RemoteFinancialState},
    tax::CategoryMapCalculator,
    traits::TaxLedgerDatabase,
    EventOutcome,
    ImportRowOutcome,
};

mod support;
use support::{new_api, order_event, refund_event, ts};

const CALC: CategoryMapCalculator = CategoryMapCalculator;

#[tokio::test]
async fn duplicate_create_events_yield_one_record() {
    let (api, ctx) = new_api().await;
    let event = order_event("1001", RemoteFinancialState::Paid, 10_000, ts(60));

    let first = api.upsert_event(&ctx, OrderEvent::Created(event.clone()), &CALC).await.unwrap();
    let first = match first {
        EventOutcome::Inserted(rec) => rec,
        other => panic!("expected insert, got {other:?}"),
    };

    // Identical redelivery: same key, same source timestamp
    let second = api.upsert_event(&ctx, OrderEvent::Created(event), &CALC).await.unwrap();
    let second = match second {
        EventOutcome::Updated(rec) => rec,
        other => panic!("expected overwrite of the existing row, got {other:?}"),
    };

    assert_eq!(first.id, second.id, "redelivery must not create a second row");
    assert_eq!(first.total, second.total);
    assert_eq!(first.status, second.status);
    assert_eq!(second.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn older_update_does_not_overwrite_newer_data() {
    let (api, ctx) = new_api().await;
    let newer = order_event("2002", RemoteFinancialState::Paid, 12_000, ts(10));
    let older = order_event("2002", RemoteFinancialState::Pending, 9_000, ts(300));

    api.upsert_event(&ctx, OrderEvent::Created(newer), &CALC).await.unwrap();
    let outcome = api.upsert_event(&ctx, OrderEvent::Updated(older), &CALC).await.unwrap();
    assert!(matches!(outcome, EventOutcome::Stale));

    let key = ctx.key("2002".parse().unwrap());
    let stored = api.db().fetch_transaction(&key).await.unwrap().unwrap();
    assert_eq!(stored.total, MoneyMinor::from(12_000));
    assert_eq!(stored.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn update_for_unknown_order_is_treated_as_create() {
    let (api, ctx) = new_api().await;
    let event = order_event("3003", RemoteFinancialState::Paid, 5_000, ts(10));
    let outcome = api.upsert_event(&ctx, OrderEvent::Updated(event), &CALC).await.unwrap();
    assert!(matches!(outcome, EventOutcome::Inserted(_)), "a missed create must not lose the order");
}

#[tokio::test]
async fn refunds_create_synthetic_records_and_settle_the_original() {
    let (api, ctx) = new_api().await;
    api.upsert_event(&ctx, OrderEvent::Created(order_event("4004", RemoteFinancialState::Paid, 10_000, ts(100))), &CALC)
        .await
        .unwrap();

    // First, a partial refund of 4000
    let outcome = api
        .upsert_event(&ctx, OrderEvent::Refunded(refund_event(71, "4004", 4_000, ts(50))), &CALC)
        .await
        .unwrap();
    match outcome {
        EventOutcome::RefundApplied { refund, fully_refunded, duplicate } => {
            assert_eq!(refund.total, MoneyMinor::from(-4_000));
            assert_eq!(refund.transaction_type, TransactionType::PartialRefund);
            assert!(!fully_refunded);
            assert!(!duplicate);
        },
        other => panic!("expected refund outcome, got {other:?}"),
    }
    let key = ctx.key("4004".parse().unwrap());
    let original = api.db().fetch_transaction(&key).await.unwrap().unwrap();
    assert_eq!(original.status, TransactionStatus::Completed, "partial refund must not flip the original");

    // The remaining 6000 completes the refund
    let outcome = api
        .upsert_event(&ctx, OrderEvent::Refunded(refund_event(72, "4004", 6_000, ts(20))), &CALC)
        .await
        .unwrap();
    match outcome {
        EventOutcome::RefundApplied { refund, fully_refunded, .. } => {
            assert_eq!(refund.total, MoneyMinor::from(-6_000));
            assert!(fully_refunded);
        },
        other => panic!("expected refund outcome, got {other:?}"),
    }

    let original = api.db().fetch_transaction(&key).await.unwrap().unwrap();
    assert_eq!(original.status, TransactionStatus::Refunded);
    let refunds = api.db().fetch_refunds_for(&key).await.unwrap();
    assert_eq!(refunds.len(), 2);
    let refunded: MoneyMinor = refunds.iter().map(|r| r.total).sum();
    assert_eq!(refunded, MoneyMinor::from(-10_000));
}

#[tokio::test]
async fn redelivered_refunds_are_not_double_counted() {
    let (api, ctx) = new_api().await;
    api.upsert_event(&ctx, OrderEvent::Created(order_event("5005", RemoteFinancialState::Paid, 8_000, ts(100))), &CALC)
        .await
        .unwrap();
    let refund = refund_event(81, "5005", 8_000, ts(50));
    api.upsert_event(&ctx, OrderEvent::Refunded(refund.clone()), &CALC).await.unwrap();
    let outcome = api.upsert_event(&ctx, OrderEvent::Refunded(refund), &CALC).await.unwrap();
    match outcome {
        EventOutcome::RefundApplied { duplicate, fully_refunded, .. } => {
            assert!(duplicate);
            assert!(fully_refunded, "the settled state must be stable under redelivery");
        },
        other => panic!("expected refund outcome, got {other:?}"),
    }
    let key = ctx.key("5005".parse().unwrap());
    assert_eq!(api.db().fetch_refunds_for(&key).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cancellation_is_a_status_only_update() {
    let (api, ctx) = new_api().await;
    api.upsert_event(&ctx, OrderEvent::Created(order_event("6006", RemoteFinancialState::Paid, 7_500, ts(100))), &CALC)
        .await
        .unwrap();
    let cancel = tax_ledger_engine::events_model::CancelEventData {
        external_id: "6006".parse().unwrap(),
        occurred_at: ts(10),
        last_modified: ts(10),
    };
    let outcome = api.upsert_event(&ctx, OrderEvent::Cancelled(cancel), &CALC).await.unwrap();
    let record = match outcome {
        EventOutcome::Cancelled(rec) => rec,
        other => panic!("expected cancellation, got {other:?}"),
    };
    assert_eq!(record.status, TransactionStatus::Cancelled);
    assert_eq!(record.total, MoneyMinor::from(7_500), "monetary fields must be untouched");
}

#[tokio::test]
async fn cancellation_for_unknown_order_is_ignored() {
    let (api, ctx) = new_api().await;
    let cancel = tax_ledger_engine::events_model::CancelEventData {
        external_id: "nope".parse().unwrap(),
        occurred_at: ts(10),
        last_modified: ts(10),
    };
    let outcome = api.upsert_event(&ctx, OrderEvent::Cancelled(cancel), &CALC).await.unwrap();
    assert!(matches!(outcome, EventOutcome::CancelIgnored(_)));
}

#[tokio::test]
async fn reimporting_a_window_skips_every_existing_order() {
    let (api, ctx) = new_api().await;
    let orders = (0..3i64)
        .map(|i| order_event(&format!("70{i}"), RemoteFinancialState::Paid, 1_000 * (i + 1), ts(100)))
        .collect::<Vec<_>>();

    let mut imported = 0;
    for order in orders.clone() {
        if matches!(api.import_order(&ctx, order, &CALC).await.unwrap(), ImportRowOutcome::Imported(_)) {
            imported += 1;
        }
    }
    assert_eq!(imported, 3);

    let mut skipped = 0;
    for order in orders {
        if matches!(api.import_order(&ctx, order, &CALC).await.unwrap(), ImportRowOutcome::Skipped(_)) {
            skipped += 1;
        }
    }
    assert_eq!(skipped, 3, "a re-run over an already imported window must insert nothing");
}

#[tokio::test]
async fn batch_application_counts_stale_items_without_aborting() {
    let (api, ctx) = new_api().await;
    api.upsert_event(&ctx, OrderEvent::Created(order_event("8008", RemoteFinancialState::Paid, 2_000, ts(10))), &CALC)
        .await
        .unwrap();

    let events = vec![
        OrderEvent::Updated(order_event("8008", RemoteFinancialState::Pending, 1_500, ts(500))), // stale
        OrderEvent::Created(order_event("8009", RemoteFinancialState::Paid, 3_000, ts(5))),
        OrderEvent::Created(order_event("8010", RemoteFinancialState::Pending, 4_000, ts(5))),
    ];
    let batch = api.upsert_all(&ctx, events, &CALC).await;
    assert_eq!(batch.applied, 2);
    assert_eq!(batch.stale, 1);
    assert_eq!(batch.failed, 0);
}
