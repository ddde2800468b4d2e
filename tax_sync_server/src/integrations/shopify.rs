//! Normalization of raw platform payloads into the engine's event model.
//!
//! This is the single boundary where loosely-typed JSON becomes strictly-typed events: one validator per event
//! kind, and nothing past this module ever touches a raw payload.

use chrono::{DateTime, Utc};
use log::trace;
use shopify_sync::{ShopifyOrder, ShopifyRefund};
use stt_common::MoneyMinor;
use tax_ledger_engine::{
    db_types::{CustomerIdentity, ExternalOrderId, Jurisdiction},
    events_model::{
        CancelEventData,
        OrderAmounts,
        OrderEvent,
        OrderEventData,
        RefundEventData,
        RemoteFinancialState,
        UninstallEventData,
    },
    tax::RawTaxLine,
};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EventConversionError {
    #[error("The payload contained invalid data. {0}")]
    FormatError(String),
    #[error("The payload could not be parsed. {0}")]
    MalformedPayload(String),
}

/// The one string-keyed step: map the topic header onto the typed event union. Everything downstream dispatches by
/// exhaustive matching. `Ok(None)` means the topic is not one this engine processes; the caller acknowledges it so
/// the platform does not retry the delivery forever.
pub fn normalize_topic(topic: &str, body: &[u8], shop_domain: &str) -> Result<Option<OrderEvent>, EventConversionError> {
    let event = match topic {
        "orders/create" => Some(created_event(parse_payload::<ShopifyOrder>(body)?)?),
        "orders/updated" => Some(updated_event(parse_payload::<ShopifyOrder>(body)?)?),
        "orders/cancelled" => Some(cancelled_event(parse_payload::<ShopifyOrder>(body)?)?),
        "refunds/create" => Some(refund_event(parse_payload::<ShopifyRefund>(body)?)?),
        "app/uninstalled" => Some(uninstalled_event(shop_domain)),
        _ => None,
    };
    Ok(event)
}

fn parse_payload<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, EventConversionError> {
    serde_json::from_slice(body).map_err(|e| EventConversionError::MalformedPayload(e.to_string()))
}

pub fn created_event(order: ShopifyOrder) -> Result<OrderEvent, EventConversionError> {
    Ok(OrderEvent::Created(order_event_data(order)?))
}

pub fn updated_event(order: ShopifyOrder) -> Result<OrderEvent, EventConversionError> {
    Ok(OrderEvent::Updated(order_event_data(order)?))
}

pub fn cancelled_event(order: ShopifyOrder) -> Result<OrderEvent, EventConversionError> {
    let last_modified = parse_timestamp(&order.updated_at, "updated_at")?;
    let occurred_at = match &order.cancelled_at {
        Some(ts) => parse_timestamp(ts, "cancelled_at")?,
        None => last_modified,
    };
    Ok(OrderEvent::Cancelled(CancelEventData {
        external_id: ExternalOrderId::from(order.id),
        occurred_at,
        last_modified,
    }))
}

pub fn refund_event(refund: ShopifyRefund) -> Result<OrderEvent, EventConversionError> {
    let occurred_at = match &refund.processed_at {
        Some(ts) => parse_timestamp(ts, "processed_at")?,
        None => parse_timestamp(&refund.created_at, "created_at")?,
    };
    let subtotal = refund
        .refund_line_items
        .iter()
        .map(|li| parse_money(&li.subtotal, "refund_line_items.subtotal"))
        .sum::<Result<MoneyMinor, _>>()?;
    let tax = refund
        .refund_line_items
        .iter()
        .map(|li| parse_money(&li.total_tax, "refund_line_items.total_tax"))
        .sum::<Result<MoneyMinor, _>>()?;
    // The refunded value is carried by the refund-kind transactions. Store-credit refunds have none; fall back to
    // the line-item split.
    let refunded: MoneyMinor = refund
        .transactions
        .iter()
        .filter(|t| t.kind == "refund")
        .map(|t| parse_money(&t.amount, "transactions.amount"))
        .sum::<Result<MoneyMinor, _>>()?;
    let total = if refunded.is_zero() { subtotal + tax } else { refunded };
    Ok(OrderEvent::Refunded(RefundEventData {
        refund_id: refund.id,
        original_external_id: ExternalOrderId::from(refund.order_id),
        amounts: OrderAmounts { subtotal, tax, total, discount: MoneyMinor::default(), shipping: MoneyMinor::default() },
        note: refund.note,
        occurred_at,
        last_modified: occurred_at,
    }))
}

pub fn uninstalled_event(shop_domain: &str) -> OrderEvent {
    OrderEvent::Uninstalled(UninstallEventData { shop_domain: shop_domain.to_string(), occurred_at: Utc::now() })
}

/// The validator for order-shaped payloads.
pub fn order_event_data(order: ShopifyOrder) -> Result<OrderEventData, EventConversionError> {
    trace!("Normalizing order payload: {:?}", order.id);
    if order.id <= 0 {
        return Err(EventConversionError::FormatError(format!("Invalid order id: {}", order.id)));
    }
    let financial_state = order
        .financial_status
        .as_deref()
        .unwrap_or("pending")
        .parse::<RemoteFinancialState>()
        .unwrap_or_else(|_| RemoteFinancialState::Unknown(String::new()));
    let subtotal = parse_money(&order.subtotal_price, "subtotal_price")?;
    let tax = parse_money(&order.total_tax, "total_tax")?;
    let total = parse_money(&order.total_price, "total_price")?;
    let discount = parse_money(&order.total_discounts, "total_discounts")?;
    let shipping = match &order.total_shipping_price_set {
        Some(set) => parse_money(&set.shop_money.amount, "total_shipping_price_set")?,
        None => MoneyMinor::default(),
    };
    let tax_lines = order
        .tax_lines
        .iter()
        .map(|line| {
            Ok(RawTaxLine { category: line.title.clone(), rate: line.rate, amount: parse_money(&line.price, "tax_lines.price")? })
        })
        .collect::<Result<Vec<_>, EventConversionError>>()?;
    let address = order.billing_address.as_ref().or(order.shipping_address.as_ref());
    let jurisdiction = address
        .map(|a| Jurisdiction {
            country: a.country_code.clone(),
            province: a.province_code.clone(),
            city: a.city.clone(),
            postal: a.zip.clone(),
        })
        .unwrap_or_default();
    let customer = CustomerIdentity {
        external_id: order.customer.as_ref().map(|c| c.id),
        email: order.customer.as_ref().and_then(|c| c.email.clone()).or(order.email),
    };
    let created_at = parse_timestamp(&order.created_at, "created_at")?;
    let occurred_at = match &order.processed_at {
        Some(ts) => parse_timestamp(ts, "processed_at")?,
        None => created_at,
    };
    let last_modified = parse_timestamp(&order.updated_at, "updated_at")?;
    Ok(OrderEventData {
        external_id: ExternalOrderId::from(order.id),
        order_number: order.name,
        financial_state,
        currency: order.currency,
        amounts: OrderAmounts { subtotal, tax, total, discount, shipping },
        tax_lines,
        jurisdiction,
        customer,
        occurred_at,
        last_modified,
    })
}

fn parse_money(value: &str, field: &str) -> Result<MoneyMinor, EventConversionError> {
    if value.is_empty() {
        return Ok(MoneyMinor::default());
    }
    value.parse::<MoneyMinor>().map_err(|e| EventConversionError::FormatError(format!("{field}: {e}")))
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>, EventConversionError> {
    value
        .parse::<DateTime<Utc>>()
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| EventConversionError::FormatError(format!("{field}: {e}")))
}

#[cfg(test)]
mod test {
    use stt_common::MoneyMinor;
    use tax_ledger_engine::events_model::OrderEvent;

    use super::*;

    fn order_json() -> &'static [u8] {
        br##"{
            "id": 820982911946154500,
            "name": "#9999",
            "email": "jon@example.com",
            "created_at": "2026-01-10T15:00:00-05:00",
            "updated_at": "2026-01-10T15:05:00-05:00",
            "financial_status": "paid",
            "currency": "USD",
            "subtotal_price": "93.00",
            "total_price": "100.44",
            "total_tax": "7.44",
            "total_discounts": "0.00",
            "tax_lines": [{"title": "State Tax", "rate": 0.08, "price": "7.44"}],
            "customer": {"id": 1153, "email": "jon@example.com"},
            "billing_address": {"country_code": "US", "province_code": "NY", "city": "Albany", "zip": "12201"}
        }"##
    }

    #[test]
    fn normalizes_an_order_payload() {
        let event = normalize_topic("orders/create", order_json(), "example.myshopify.com").unwrap().unwrap();
        let data = match event {
            OrderEvent::Created(data) => data,
            other => panic!("expected a create event, got {other:?}"),
        };
        assert_eq!(data.external_id.as_str(), "820982911946154500");
        assert_eq!(data.order_number, "#9999");
        assert_eq!(data.amounts.total, MoneyMinor::from(10_044));
        assert_eq!(data.amounts.tax, MoneyMinor::from(744));
        assert_eq!(data.financial_state, RemoteFinancialState::Paid);
        assert_eq!(data.jurisdiction.province.as_deref(), Some("NY"));
        assert_eq!(data.tax_lines.len(), 1);
        assert!(data.last_modified > data.occurred_at);
    }

    #[test]
    fn unknown_topics_normalize_to_none() {
        assert!(normalize_topic("products/update", b"{}", "shop").unwrap().is_none());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(normalize_topic("orders/create", b"not json", "shop").is_err());
        // A parseable order with a garbage amount is a format error, not a panic
        let bad = br##"{
            "id": 1, "name": "#1", "created_at": "2026-01-10T15:00:00Z", "updated_at": "2026-01-10T15:00:00Z",
            "currency": "USD", "subtotal_price": "ninety", "total_price": "100.00", "total_tax": "0.00",
            "total_discounts": "0.00"
        }"##;
        assert!(matches!(
            normalize_topic("orders/create", bad, "shop"),
            Err(EventConversionError::FormatError(_))
        ));
    }

    #[test]
    fn refund_total_comes_from_refund_transactions() {
        let refund = br#"{
            "id": 509562969,
            "order_id": 820982911946154500,
            "created_at": "2026-01-12T09:00:00-05:00",
            "transactions": [
                {"id": 1, "amount": "41.94", "kind": "refund", "status": "success"},
                {"id": 2, "amount": "41.94", "kind": "void", "status": "success"}
            ],
            "refund_line_items": [{"subtotal": "39.00", "total_tax": "2.94"}]
        }"#;
        let event = normalize_topic("refunds/create", refund, "shop").unwrap().unwrap();
        let data = match event {
            OrderEvent::Refunded(data) => data,
            other => panic!("expected a refund event, got {other:?}"),
        };
        assert_eq!(data.amounts.total, MoneyMinor::from(4_194), "void transactions must not count");
        assert_eq!(data.amounts.subtotal, MoneyMinor::from(3_900));
        assert_eq!(data.amounts.tax, MoneyMinor::from(294));
        assert_eq!(data.original_external_id.as_str(), "820982911946154500");
    }
}
