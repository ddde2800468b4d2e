//! The seams the synchronization workers are written against, so they can be exercised without a live shop.

use crate::{
    api::ApiResponse,
    retry::CircuitBreaker,
    OrderPageRequest,
    Shop,
    ShopifyApiError,
    ShopifyOrder,
    Webhook,
};

/// A paginated source of historical orders.
#[allow(async_fn_in_trait)]
pub trait OrderSource {
    async fn fetch_orders_page(
        &self,
        page: &OrderPageRequest,
    ) -> Result<ApiResponse<Vec<ShopifyOrder>>, ShopifyApiError>;
}

/// Remote webhook subscription management.
#[allow(async_fn_in_trait)]
pub trait WebhookAdmin {
    async fn fetch_webhooks(&self) -> Result<Vec<Webhook>, ShopifyApiError>;

    async fn install_webhook(&self, address: &str, topic: &str) -> Result<Webhook, ShopifyApiError>;

    async fn delete_webhook(&self, id: i64) -> Result<(), ShopifyApiError>;

    async fn get_shop(&self) -> Result<Shop, ShopifyApiError>;
}

/// Routes every admin call through a circuit breaker. An integration whose remote keeps failing gets cut off for
/// the breaker's cool-down instead of being re-probed on every touch.
pub struct GuardedAdmin<'a, A> {
    admin: &'a A,
    breaker: &'a CircuitBreaker,
}

impl<'a, A: WebhookAdmin> GuardedAdmin<'a, A> {
    pub fn new(admin: &'a A, breaker: &'a CircuitBreaker) -> Self {
        Self { admin, breaker }
    }
}

impl<'a, A: WebhookAdmin> WebhookAdmin for GuardedAdmin<'a, A> {
    async fn fetch_webhooks(&self) -> Result<Vec<Webhook>, ShopifyApiError> {
        self.breaker.call(|| self.admin.fetch_webhooks()).await
    }

    async fn install_webhook(&self, address: &str, topic: &str) -> Result<Webhook, ShopifyApiError> {
        self.breaker.call(|| self.admin.install_webhook(address, topic)).await
    }

    async fn delete_webhook(&self, id: i64) -> Result<(), ShopifyApiError> {
        self.breaker.call(|| self.admin.delete_webhook(id)).await
    }

    async fn get_shop(&self) -> Result<Shop, ShopifyApiError> {
        self.breaker.call(|| self.admin.get_shop()).await
    }
}
