//! Helpers for exercising the engine in tests (within this crate and from dependent crates that enable the
//! `test_utils` feature).

use chrono::{DateTime, Utc};
use stt_common::MoneyMinor;

use crate::{
    db_types::{CustomerIdentity, ExternalOrderId, Jurisdiction},
    events_model::{OrderAmounts, OrderEventData, RemoteFinancialState},
    tax::RawTaxLine,
};

/// Load a .env file if present and initialize logging. Safe to call from every test.
pub fn prepare_test_env() {
    let _ = dotenvy::dotenv();
    let _ = env_logger::try_init();
}

/// A paid order event with sensible defaults, for tests that only care about a couple of fields.
pub fn paid_order_event(external_id: impl Into<ExternalOrderId>, total: i64, at: DateTime<Utc>) -> OrderEventData {
    let tax = total / 10;
    OrderEventData {
        external_id: external_id.into(),
        order_number: "#1001".to_string(),
        financial_state: RemoteFinancialState::Paid,
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
            city: Some("Albany".into()),
            postal: Some("12201".into()),
        },
        customer: CustomerIdentity::default(),
        occurred_at: at,
        last_modified: at,
    }
}
