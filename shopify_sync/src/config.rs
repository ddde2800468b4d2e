use log::*;
use stt_common::Secret;

#[derive(Debug, Clone, Default)]
pub struct ShopifyConfig {
    pub shop: String,
    pub admin_access_token: Secret<String>,
    pub api_version: String,
}

impl ShopifyConfig {
    pub fn new(shop: impl Into<String>, admin_access_token: Secret<String>, api_version: impl Into<String>) -> Self {
        Self { shop: shop.into(), admin_access_token, api_version: api_version.into() }
    }

    pub fn new_from_env_or_default() -> Self {
        let shop = std::env::var("STT_SHOPIFY_SHOP").unwrap_or_else(|_| {
            warn!("STT_SHOPIFY_SHOP not set, using (probably useless) default");
            "example.myshopify.com".to_string()
        });
        let api_version = std::env::var("STT_SHOPIFY_API_VERSION").unwrap_or_else(|_| {
            warn!("STT_SHOPIFY_API_VERSION not set, using 2024-04 as default");
            "2024-04".to_string()
        });
        let admin_access_token = Secret::new(std::env::var("STT_SHOPIFY_ADMIN_ACCESS_TOKEN").unwrap_or_else(|_| {
            warn!("STT_SHOPIFY_ADMIN_ACCESS_TOKEN not set, using (probably useless) default");
            "shpat_00000000000000".to_string()
        }));
        Self { shop, admin_access_token, api_version }
    }
}
