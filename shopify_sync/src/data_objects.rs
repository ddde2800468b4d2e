use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MAX_PAGE_SIZE;

/// An order as the REST Admin API reports it. Dates and amounts arrive as strings and are only parsed at the
/// normalization boundary.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShopifyOrder {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub processed_at: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<String>,
    #[serde(default)]
    pub financial_status: Option<String>,
    pub currency: String,
    pub subtotal_price: String,
    pub total_price: String,
    pub total_tax: String,
    pub total_discounts: String,
    #[serde(default)]
    pub total_shipping_price_set: Option<PriceSet>,
    #[serde(default)]
    pub tax_lines: Vec<TaxLine>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PriceSet {
    pub shop_money: ShopMoney,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShopMoney {
    pub amount: String,
    #[serde(default)]
    pub currency_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaxLine {
    pub title: String,
    #[serde(default)]
    pub rate: f64,
    pub price: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Customer {
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Address {
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub province_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
}

/// A refund event payload. The refunded amount is carried by the `refund` kind transactions; line items carry the
/// subtotal/tax split.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShopifyRefund {
    pub id: i64,
    pub order_id: i64,
    pub created_at: String,
    #[serde(default)]
    pub processed_at: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub transactions: Vec<RefundTransaction>,
    #[serde(default)]
    pub refund_line_items: Vec<RefundLineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RefundTransaction {
    pub id: i64,
    pub amount: String,
    pub kind: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RefundLineItem {
    #[serde(default)]
    pub subtotal: String,
    #[serde(default)]
    pub total_tax: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: i64,
    pub address: String,
    pub topic: String,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWebhook {
    pub topic: String,
    pub address: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub myshopify_domain: String,
    #[serde(default)]
    pub country_code: Option<String>,
    pub currency: String,
    #[serde(default)]
    pub iana_timezone: Option<String>,
}

/// One page of the order listing. `since_id` is the resume cursor; ids are returned in ascending order.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderPageRequest {
    pub created_at_min: Option<DateTime<Utc>>,
    pub created_at_max: Option<DateTime<Utc>>,
    pub limit: u32,
    pub since_id: Option<i64>,
}

impl OrderPageRequest {
    pub fn new(limit: u32) -> Self {
        Self { limit: limit.clamp(1, MAX_PAGE_SIZE), ..Default::default() }
    }

    pub fn window(mut self, from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.created_at_min = from;
        self.created_at_max = until;
        self
    }

    pub fn after(mut self, since_id: Option<i64>) -> Self {
        self.since_id = since_id;
        self
    }

    /// Effective page size, never above the remote maximum.
    pub fn page_size(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(OrderPageRequest::new(50).page_size(), 50);
        assert_eq!(OrderPageRequest::new(1000).page_size(), MAX_PAGE_SIZE);
        assert_eq!(OrderPageRequest { limit: 0, ..Default::default() }.page_size(), 1);
    }

    #[test]
    fn deserialize_order() {
        let order = r##"{
            "id": 820982911946154500,
            "name": "#9999",
            "email": "jon@example.com",
            "created_at": "2026-01-10T15:00:00-05:00",
            "updated_at": "2026-01-10T15:05:00-05:00",
            "cancelled_at": null,
            "financial_status": "paid",
            "currency": "USD",
            "subtotal_price": "93.00",
            "total_price": "100.44",
            "total_tax": "7.44",
            "total_discounts": "0.00",
            "tax_lines": [{"title": "State Tax", "rate": 0.08, "price": "7.44"}],
            "customer": {"id": 115310627314723950, "email": "jon@example.com", "first_name": "Jon", "last_name": "Q"},
            "billing_address": {"country_code": "US", "province_code": "NY", "city": "Albany", "zip": "12201"}
        }"##;
        let order: ShopifyOrder = serde_json::from_str(order).unwrap();
        assert_eq!(order.id, 820982911946154500);
        assert_eq!(order.name, "#9999");
        assert_eq!(order.financial_status.as_deref(), Some("paid"));
        assert_eq!(order.tax_lines.len(), 1);
        assert_eq!(order.billing_address.unwrap().province_code.as_deref(), Some("NY"));
    }

    #[test]
    fn deserialize_refund() {
        let refund = r#"{
            "id": 509562969,
            "order_id": 820982911946154500,
            "created_at": "2026-01-12T09:00:00-05:00",
            "note": "customer returned item",
            "transactions": [{"id": 179259969, "amount": "41.94", "kind": "refund", "status": "success"}],
            "refund_line_items": [{"subtotal": "39.00", "total_tax": "2.94"}]
        }"#;
        let refund: ShopifyRefund = serde_json::from_str(refund).unwrap();
        assert_eq!(refund.order_id, 820982911946154500);
        assert_eq!(refund.transactions[0].kind, "refund");
    }
}
