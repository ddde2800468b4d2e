use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use actix_web::{http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use tax_ledger_engine::{
    events::{EventHandler, EventProducers, TransactionIngestedEvent},
    LedgerFlowApi,
    SqliteDatabase,
    SyncTrackerApi,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    middleware::HmacMiddlewareFactory,
    reconciler::start_reconciler_worker,
    routes::{health, ReconcileWebhooksRoute, SyncStatusRoute, TriggerBackfillRoute},
    webhook_routes::{ShopifyWebhookRoute, HMAC_HEADER},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let producers = start_ingest_audit_hook();
    let _reconciler = start_reconciler_worker(db.clone(), config.clone());
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Subscribes a hook that writes an audit line for every accepted ledger write. Returns the producer set to hand
/// to the ledger API.
fn start_ingest_audit_hook() -> EventProducers {
    let handler = EventHandler::new(
        25,
        Arc::new(|ev: TransactionIngestedEvent| {
            Box::pin(async move {
                let verb = if ev.inserted { "created" } else { "updated" };
                info!(
                    target: "stt::ledger_audit",
                    "Transaction {} {verb} (org {}, integration {}, status {})",
                    ev.record.external_id, ev.record.organization_id, ev.record.integration_id, ev.record.status
                );
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        }),
    );
    let mut producers = EventProducers::default();
    producers.transaction_ingested.push(handler.subscribe());
    tokio::spawn(handler.start_handler());
    producers
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<actix_web::dev::Server, ServerError> {
    let bind_to = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let ledger_api = LedgerFlowApi::new(db.clone(), producers.clone());
        let tracker_api = SyncTrackerApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("stt::access_log"))
            .app_data(web::Data::new(ledger_api))
            .app_data(web::Data::new(tracker_api))
            .app_data(web::Data::new(config.clone()));
        let api_scope = web::scope("/api")
            .service(TriggerBackfillRoute::<SqliteDatabase>::new())
            .service(ReconcileWebhooksRoute::<SqliteDatabase>::new())
            .service(SyncStatusRoute::<SqliteDatabase>::new());
        let hmac = HmacMiddlewareFactory::new(
            HMAC_HEADER,
            config.shopify_config.hmac_secret.clone(),
            config.shopify_config.hmac_fallback_secret.clone(),
            config.shopify_config.hmac_checks,
        );
        let shopify_scope = web::scope("/shopify").wrap(hmac).service(ShopifyWebhookRoute::<SqliteDatabase>::new());
        app.service(health).service(api_scope).service(shopify_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind(bind_to)?
    .run();
    Ok(srv)
}
