use std::{env, time::Duration};

use log::*;
use shopify_sync::{retry::RetryPolicy, ShopifyConfig as ShopifyApiConfig, MAX_PAGE_SIZE};
use stt_common::{parse_boolean_flag, Secret};

const DEFAULT_STT_HOST: &str = "127.0.0.1";
const DEFAULT_STT_PORT: u16 = 8360;
const DEFAULT_BATCH_SIZE: u32 = 100;
const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_WEBHOOK_CHECK_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Shopify storefront configuration
    pub shopify_config: ShopifyConfig,
    /// The public base URL this server is reachable at. Webhook subscriptions are registered against it.
    pub webhook_base_url: String,
    pub backfill: BackfillConfig,
    /// How often the subscription reconciler re-checks webhook health.
    pub webhook_check_interval: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct ShopifyConfig {
    /// The url for the shopify storefront to use. e.g. "my-shop.myshopify.com"
    pub shop: String,
    pub api_version: String,
    pub admin_access_token: Secret<String>,
    /// The webhook signing secret.
    pub hmac_secret: Secret<String>,
    /// The previous signing secret, accepted alongside the primary during key rotation.
    pub hmac_fallback_secret: Option<Secret<String>>,
    pub hmac_checks: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct BackfillConfig {
    /// Orders fetched per page. Clamped to the platform's maximum page size.
    pub batch_size: u32,
    /// Fixed delay between batches. Bounds the request rate without per-item sleeps.
    pub batch_delay: Duration,
    /// Upper bound on orders fetched by one run. `None` means the window alone bounds the run.
    pub max_orders: Option<u64>,
    pub retry_policy: RetryPolicy,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            max_orders: None,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_STT_HOST.to_string(),
            port: DEFAULT_STT_PORT,
            database_url: String::default(),
            shopify_config: ShopifyConfig::default(),
            webhook_base_url: String::default(),
            backfill: BackfillConfig::default(),
            webhook_check_interval: DEFAULT_WEBHOOK_CHECK_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("STT_HOST").ok().unwrap_or_else(|| DEFAULT_STT_HOST.into());
        let port = env::var("STT_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for STT_PORT. {e} Using the default, {DEFAULT_STT_PORT}, instead."
                    );
                    DEFAULT_STT_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_STT_PORT);
        let database_url = env::var("STT_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ STT_DATABASE_URL is not set. Please set it to the URL for the ledger database.");
            String::default()
        });
        let webhook_base_url = env::var("STT_WEBHOOK_BASE_URL").ok().unwrap_or_else(|| {
            warn!(
                "🪛️ STT_WEBHOOK_BASE_URL is not set. The subscription reconciler cannot register webhooks without \
                 it, so webhook health will report unhealthy until it is configured."
            );
            String::default()
        });
        let shopify_config = ShopifyConfig::from_env_or_defaults();
        let backfill = BackfillConfig::from_env_or_defaults();
        let webhook_check_interval = env::var("STT_WEBHOOK_CHECK_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WEBHOOK_CHECK_INTERVAL);
        Self { host, port, database_url, shopify_config, webhook_base_url, backfill, webhook_check_interval }
    }

    /// The canonical address webhook subscriptions must point at.
    pub fn canonical_webhook_address(&self) -> String {
        format!("{}/shopify/webhook", self.webhook_base_url.trim_end_matches('/'))
    }
}

impl ShopifyConfig {
    pub fn from_env_or_defaults() -> Self {
        let api_config = ShopifyApiConfig::new_from_env_or_default();
        let hmac_secret = env::var("STT_SHOPIFY_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ STT_SHOPIFY_HMAC_SECRET is not set. Please set it to the webhook signing secret for your app."
            );
            String::default()
        });
        let hmac_secret = Secret::new(hmac_secret);
        let hmac_fallback_secret = env::var("STT_SHOPIFY_HMAC_FALLBACK_SECRET").ok().map(|s| {
            info!("🪛️ A fallback webhook signing secret is configured (key rotation in progress).");
            Secret::new(s)
        });
        let hmac_checks = parse_boolean_flag(env::var("STT_SHOPIFY_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook signature checks are DISABLED. Do not run like this in production.");
        }
        Self {
            shop: api_config.shop,
            api_version: api_config.api_version,
            admin_access_token: api_config.admin_access_token,
            hmac_secret,
            hmac_fallback_secret,
            hmac_checks,
        }
    }

    pub fn shopify_api_config(&self) -> ShopifyApiConfig {
        ShopifyApiConfig {
            shop: self.shop.clone(),
            api_version: self.api_version.clone(),
            admin_access_token: self.admin_access_token.clone(),
        }
    }

    /// The API client configuration for a specific integration's credentials.
    pub fn api_config_for(&self, shop: &str, access_token: Secret<String>) -> ShopifyApiConfig {
        ShopifyApiConfig { shop: shop.to_string(), api_version: self.api_version.clone(), admin_access_token: access_token }
    }
}

impl BackfillConfig {
    pub fn from_env_or_defaults() -> Self {
        let batch_size = env::var("STT_BACKFILL_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let batch_delay = env::var("STT_BACKFILL_BATCH_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BATCH_DELAY);
        let max_orders = env::var("STT_BACKFILL_MAX_ORDERS").ok().and_then(|s| s.parse::<u64>().ok()).and_then(|n| {
            if n == 0 {
                None
            } else {
                Some(n)
            }
        });
        Self { batch_size, batch_delay, max_orders, retry_policy: RetryPolicy::default() }
    }
}
