use crate::{
    db_types::{NewWebhookSubscription, WebhookSubscriptionRecord},
    traits::TaxLedgerError,
};

/// Local mirror of the remote webhook registrations. Only the subscription reconciler writes here.
#[allow(async_fn_in_trait)]
pub trait WebhookMirror: Clone {
    /// Replace the whole snapshot for an integration with the freshly observed state.
    async fn replace_subscription_snapshot(
        &self,
        integration_id: i64,
        subs: &[NewWebhookSubscription],
    ) -> Result<(), TaxLedgerError>;

    async fn fetch_subscription_snapshot(
        &self,
        integration_id: i64,
    ) -> Result<Vec<WebhookSubscriptionRecord>, TaxLedgerError>;
}
