//! The normalized event model.
//!
//! Raw platform payloads are parsed into these strictly-typed events in one normalization step, right after
//! authentication. Everything downstream (the upserter, the backfill importer, the tests) works on this tagged
//! union and dispatches by exhaustive matching, so adding a topic is a compile-time-checked change.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stt_common::MoneyMinor;

use crate::{
    db_types::{CustomerIdentity, ExternalOrderId, Jurisdiction, TransactionStatus},
    tax::RawTaxLine,
};

//--------------------------------------  RemoteFinancialState  ------------------------------------------------------
/// The financial state the platform reports for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteFinancialState {
    Pending,
    Authorized,
    Paid,
    PartiallyRefunded,
    Refunded,
    Voided,
    /// A state this engine does not recognize. Kept verbatim for diagnostics; derives to Pending.
    Unknown(String),
}

impl FromStr for RemoteFinancialState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s {
            "pending" => Self::Pending,
            "authorized" => Self::Authorized,
            "paid" | "partially_paid" => Self::Paid,
            "partially_refunded" => Self::PartiallyRefunded,
            "refunded" => Self::Refunded,
            "voided" => Self::Voided,
            other => Self::Unknown(other.to_string()),
        };
        Ok(state)
    }
}

impl Display for RemoteFinancialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteFinancialState::Pending => write!(f, "pending"),
            RemoteFinancialState::Authorized => write!(f, "authorized"),
            RemoteFinancialState::Paid => write!(f, "paid"),
            RemoteFinancialState::PartiallyRefunded => write!(f, "partially_refunded"),
            RemoteFinancialState::Refunded => write!(f, "refunded"),
            RemoteFinancialState::Voided => write!(f, "voided"),
            RemoteFinancialState::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// Map the remote financial state onto a ledger status. Unrecognized states land on Pending rather than failing the
/// event, so a platform-side vocabulary addition does not stall ingestion.
pub fn derive_status(state: &RemoteFinancialState) -> TransactionStatus {
    match state {
        RemoteFinancialState::Refunded | RemoteFinancialState::PartiallyRefunded => TransactionStatus::Refunded,
        RemoteFinancialState::Voided => TransactionStatus::Cancelled,
        RemoteFinancialState::Paid => TransactionStatus::Completed,
        RemoteFinancialState::Pending | RemoteFinancialState::Authorized => TransactionStatus::Pending,
        RemoteFinancialState::Unknown(_) => TransactionStatus::Pending,
    }
}

//--------------------------------------      OrderEvent       -------------------------------------------------------
/// A normalized inbound event, live webhook delivery or backfill row.
#[derive(Debug, Clone)]
pub enum OrderEvent {
    Created(OrderEventData),
    Updated(OrderEventData),
    Cancelled(CancelEventData),
    Refunded(RefundEventData),
    Uninstalled(UninstallEventData),
}

impl OrderEvent {
    pub fn external_id(&self) -> ExternalOrderId {
        match self {
            OrderEvent::Created(data) | OrderEvent::Updated(data) => data.external_id.clone(),
            OrderEvent::Cancelled(data) => data.external_id.clone(),
            OrderEvent::Refunded(data) => ExternalOrderId::for_refund(data.refund_id),
            OrderEvent::Uninstalled(_) => ExternalOrderId("".to_string()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "created",
            OrderEvent::Updated(_) => "updated",
            OrderEvent::Cancelled(_) => "cancelled",
            OrderEvent::Refunded(_) => "refunded",
            OrderEvent::Uninstalled(_) => "uninstalled",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderAmounts {
    pub subtotal: MoneyMinor,
    pub tax: MoneyMinor,
    pub total: MoneyMinor,
    pub discount: MoneyMinor,
    pub shipping: MoneyMinor,
}

#[derive(Debug, Clone)]
pub struct OrderEventData {
    pub external_id: ExternalOrderId,
    pub order_number: String,
    pub financial_state: RemoteFinancialState,
    pub currency: String,
    pub amounts: OrderAmounts,
    pub tax_lines: Vec<RawTaxLine>,
    pub jurisdiction: Jurisdiction,
    pub customer: CustomerIdentity,
    /// When the order happened on the platform.
    pub occurred_at: DateTime<Utc>,
    /// The source modification timestamp used for the ordering gate.
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CancelEventData {
    pub external_id: ExternalOrderId,
    pub occurred_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefundEventData {
    pub refund_id: i64,
    pub original_external_id: ExternalOrderId,
    /// Positive amounts as reported by the platform; the ledger stores the negated values.
    pub amounts: OrderAmounts,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UninstallEventData {
    pub shop_domain: String,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn financial_state_mapping() {
        let derive = |s: &str| derive_status(&s.parse::<RemoteFinancialState>().unwrap());
        assert_eq!(derive("refunded"), TransactionStatus::Refunded);
        assert_eq!(derive("partially_refunded"), TransactionStatus::Refunded);
        assert_eq!(derive("voided"), TransactionStatus::Cancelled);
        assert_eq!(derive("paid"), TransactionStatus::Completed);
        assert_eq!(derive("pending"), TransactionStatus::Pending);
        assert_eq!(derive("some_new_state"), TransactionStatus::Pending);
    }

    #[test]
    fn refund_events_get_synthetic_ids() {
        let event = OrderEvent::Refunded(RefundEventData {
            refund_id: 42,
            original_external_id: ExternalOrderId::from(7i64),
            amounts: OrderAmounts::default(),
            note: None,
            occurred_at: Utc::now(),
            last_modified: Utc::now(),
        });
        assert_eq!(event.external_id().as_str(), "refund_42");
        assert_eq!(event.kind(), "refunded");
    }
}
