use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    config::ShopifyConfig,
    data_objects::{NewWebhook, OrderPageRequest, Shop, ShopifyOrder, Webhook},
    rate_limit::CallBudget,
    traits::{OrderSource, WebhookAdmin},
    ShopifyApiError,
};

/// A decoded REST response: the typed payload plus the rate-limit budget the platform reported alongside it.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub value: T,
    pub budget: CallBudget,
}

#[derive(Clone)]
pub struct ShopifyApi {
    config: ShopifyConfig,
    client: Arc<Client>,
}

impl ShopifyApi {
    pub fn new(config: ShopifyConfig) -> Result<Self, ShopifyApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(config.admin_access_token.reveal().as_str())
            .map_err(|e| ShopifyApiError::Initialization(e.to_string()))?;
        headers.insert("X-Shopify-Access-Token", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ShopifyApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<B>,
    ) -> Result<ApiResponse<T>, ShopifyApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ShopifyApiError::Timeout(e.to_string())
            } else {
                ShopifyApiError::RestResponseError(e.to_string())
            }
        })?;
        let budget = CallBudget::decode(response.headers());
        trace!("Call budget: {}/{}", budget.used, budget.limit);
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            let value = response.json::<T>().await.map_err(|e| ShopifyApiError::JsonError(e.to_string()))?;
            Ok(ApiResponse { value, budget })
        } else if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited by the platform. Retry-After: {:?}", budget.retry_after);
            Err(ShopifyApiError::RateLimited { retry_after: budget.retry_after })
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ShopifyApiError::RestResponseError(e.to_string()))?;
            Err(ShopifyApiError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("https://{}/admin/api/{}{path}", self.config.shop, self.config.api_version)
    }

    pub fn shop_domain(&self) -> &str {
        &self.config.shop
    }
}

impl OrderSource for ShopifyApi {
    async fn fetch_orders_page(
        &self,
        page: &OrderPageRequest,
    ) -> Result<ApiResponse<Vec<ShopifyOrder>>, ShopifyApiError> {
        #[derive(Deserialize)]
        struct OrdersResponse {
            orders: Vec<ShopifyOrder>,
        }
        let mut params = vec![("status", "any".to_string()), ("limit", page.page_size().to_string())];
        if let Some(min) = page.created_at_min {
            params.push(("created_at_min", min.to_rfc3339()));
        }
        if let Some(max) = page.created_at_max {
            params.push(("created_at_max", max.to_rfc3339()));
        }
        if let Some(since_id) = page.since_id {
            params.push(("since_id", since_id.to_string()));
        }
        debug!("Fetching order page (since_id: {:?}, limit: {})", page.since_id, page.page_size());
        let result = self.rest_query::<OrdersResponse, ()>(Method::GET, "/orders.json", &params, None).await?;
        info!("Fetched {} orders", result.value.orders.len());
        Ok(ApiResponse { value: result.value.orders, budget: result.budget })
    }
}

impl WebhookAdmin for ShopifyApi {
    async fn fetch_webhooks(&self) -> Result<Vec<Webhook>, ShopifyApiError> {
        #[derive(Deserialize)]
        struct WebhookResponse {
            webhooks: Vec<Webhook>,
        }
        debug!("Fetching webhooks");
        let result = self.rest_query::<WebhookResponse, ()>(Method::GET, "/webhooks.json", &[], None).await?;
        info!("Fetched {} webhooks", result.value.webhooks.len());
        Ok(result.value.webhooks)
    }

    async fn install_webhook(&self, address: &str, topic: &str) -> Result<Webhook, ShopifyApiError> {
        #[derive(Serialize)]
        struct WebhookInput {
            webhook: NewWebhook,
        }
        #[derive(Deserialize)]
        struct WebhookResponse {
            webhook: Webhook,
        }
        let webhook = NewWebhook { topic: topic.to_string(), address: address.to_string(), format: "json".to_string() };
        let input = WebhookInput { webhook };
        debug!("Installing webhook: {}", serde_json::to_string(&input).unwrap_or_default());
        let result =
            self.rest_query::<WebhookResponse, WebhookInput>(Method::POST, "/webhooks.json", &[], Some(input)).await?;
        info!("Installed webhook: {:?}", result.value.webhook.id);
        Ok(result.value.webhook)
    }

    async fn delete_webhook(&self, id: i64) -> Result<(), ShopifyApiError> {
        let path = format!("/webhooks/{id}.json");
        debug!("Deleting webhook {id}");
        let _ = self.rest_query::<serde_json::Value, ()>(Method::DELETE, &path, &[], None).await?;
        info!("Deleted webhook {id}");
        Ok(())
    }

    async fn get_shop(&self) -> Result<Shop, ShopifyApiError> {
        #[derive(Deserialize)]
        struct ShopResponse {
            shop: Shop,
        }
        debug!("Fetching shop metadata");
        let result = self.rest_query::<ShopResponse, ()>(Method::GET, "/shop.json", &[], None).await?;
        Ok(result.value.shop)
    }
}
