use chrono::{DateTime, Utc};
use stt_common::MoneyMinor;
use tax_ledger_engine::{
    db_types::{CustomerIdentity, ExternalOrderId, Jurisdiction},
    events::EventProducers,
    events_model::{OrderAmounts, OrderEventData, RefundEventData, RemoteFinancialState},
    tax::RawTaxLine,
    IntegrationContext,
    LedgerFlowApi,
    SqliteDatabase,
};

pub async fn new_db() -> SqliteDatabase {
    let _ = env_logger::try_init();
    SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("could not create in-memory database")
}

pub async fn new_api() -> (LedgerFlowApi<SqliteDatabase>, IntegrationContext) {
    let db = new_db().await;
    let integration = db.create_integration(1, "example.myshopify.com", "shpat_test").await.expect("integration");
    let ctx = IntegrationContext::new(integration.organization_id, integration.id);
    (LedgerFlowApi::new(db, EventProducers::default()), ctx)
}

pub fn order_event(
    external_id: &str,
    state: RemoteFinancialState,
    total: i64,
    last_modified: DateTime<Utc>,
) -> OrderEventData {
    let tax = total / 10;
    OrderEventData {
        external_id: ExternalOrderId(external_id.to_string()),
        order_number: format!("#{external_id}"),
        financial_state: state,
        currency: "USD".to_string(),
        amounts: OrderAmounts {
            subtotal: MoneyMinor::from(total - tax),
            tax: MoneyMinor::from(tax),
            total: MoneyMinor::from(total),
            discount: MoneyMinor::default(),
            shipping: MoneyMinor::default(),
        },
        tax_lines: vec![RawTaxLine { category: "State Tax".into(), rate: 0.1, amount: MoneyMinor::from(tax) }],
        jurisdiction: Jurisdiction {
            country: Some("US".into()),
            province: Some("NY".into()),
            city: None,
            postal: None,
        },
        customer: CustomerIdentity { external_id: Some(42), email: Some("jon@example.com".into()) },
        occurred_at: last_modified,
        last_modified,
    }
}

pub fn refund_event(refund_id: i64, original: &str, total: i64, at: DateTime<Utc>) -> RefundEventData {
    let tax = total / 10;
    RefundEventData {
        refund_id,
        original_external_id: ExternalOrderId(original.to_string()),
        amounts: OrderAmounts {
            subtotal: MoneyMinor::from(total - tax),
            tax: MoneyMinor::from(tax),
            total: MoneyMinor::from(total),
            discount: MoneyMinor::default(),
            shipping: MoneyMinor::default(),
        },
        note: None,
        occurred_at: at,
        last_modified: at,
    }
}

pub fn ts(seconds_ago: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::seconds(seconds_ago)
}
