//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! the current worker to stop processing new requests. For this reason, any long operation (backfills in
//! particular) is spawned onto a background task and the handler returns immediately.

use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use shopify_sync::ShopifyApi;
use tax_ledger_engine::{
    db_types::NewImportJob,
    tax::CategoryMapCalculator,
    traits::{ImportCheckpoints, IntegrationManagement, TaxLedgerDatabase, WebhookMirror},
    IntegrationContext,
    LedgerFlowApi,
    SyncTrackerApi,
};

use crate::{
    backfill::{start_backfill_worker, BackfillImporter, ImportWindow},
    config::ServerConfig,
    data_objects::{BackfillAccepted, BackfillRequest, SyncStatusResponse},
    errors::ServerError,
    reconciler::SubscriptionReconciler,
};

/// The full backend contract the synchronization server needs from its database.
pub trait LedgerBackend:
    TaxLedgerDatabase + IntegrationManagement + ImportCheckpoints + WebhookMirror + Clone + Send + Sync + 'static
{
}

impl<T> LedgerBackend for T where
    T: TaxLedgerDatabase + IntegrationManagement + ImportCheckpoints + WebhookMirror + Clone + Send + Sync + 'static
{
}

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Backfill  ----------------------------------------------------
route!(trigger_backfill => Post "/integrations/{id}/backfill" impl LedgerBackend);
/// Kick off a historical import for the integration.
///
/// The import runs on a background worker; the response only confirms that the job was created (or that an
/// interrupted one is being resumed) and returns its id. Progress is checkpointed per batch and can be read back
/// via the sync-status endpoint.
pub async fn trigger_backfill<B: LedgerBackend>(
    path: web::Path<i64>,
    body: web::Json<BackfillRequest>,
    ledger: web::Data<LedgerFlowApi<B>>,
    tracker: web::Data<SyncTrackerApi<B>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let integration_id = path.into_inner();
    let params = body.into_inner();
    let integration = tracker.integration(integration_id).await?;
    let api_config = config.shopify_config.api_config_for(&integration.shop_domain, integration.credentials());
    let source = ShopifyApi::new(api_config).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let mut backfill_config = config.backfill;
    if params.max_orders.is_some() {
        backfill_config.max_orders = params.max_orders;
    }
    let window = ImportWindow { start: params.window_start, end: params.window_end };
    let importer = BackfillImporter::new(
        ledger.get_ref().clone(),
        tracker.get_ref().clone(),
        source,
        CategoryMapCalculator,
        backfill_config,
    );
    // Adopt an interrupted job if one exists, otherwise start fresh
    let job = match tracker.resumable_job(integration_id).await? {
        Some(job) => {
            info!("🔁️ Resuming interrupted import job {} for integration {integration_id}", job.id);
            job
        },
        None => {
            tracker
                .create_import_job(NewImportJob {
                    integration_id,
                    window_start: window.start,
                    window_end: window.end,
                })
                .await?
        },
    };
    let ctx = IntegrationContext::new(integration.organization_id, integration.id);
    let job_id = job.id;
    start_backfill_worker(importer, ctx, job);
    Ok(HttpResponse::Accepted().json(BackfillAccepted { job_id, message: "Historical import started".to_string() }))
}

//----------------------------------------------   Reconcile  ----------------------------------------------------
route!(reconcile_webhooks => Post "/integrations/{id}/webhooks/reconcile" impl LedgerBackend);
/// Run one verify-heal-reverify cycle against the integration's remote webhook subscriptions and return the
/// resulting health report.
pub async fn reconcile_webhooks<B: LedgerBackend>(
    path: web::Path<i64>,
    tracker: web::Data<SyncTrackerApi<B>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let integration_id = path.into_inner();
    let integration = tracker.integration(integration_id).await?;
    let api_config = config.shopify_config.api_config_for(&integration.shop_domain, integration.credentials());
    let admin = ShopifyApi::new(api_config).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let reconciler = SubscriptionReconciler::new(
        tracker.get_ref().clone(),
        config.canonical_webhook_address(),
        config.webhook_check_interval,
    );
    let report = reconciler.ensure_health(integration_id, &admin).await?;
    Ok(HttpResponse::Ok().json(report))
}

//----------------------------------------------   Sync status  -------------------------------------------------
route!(sync_status => Get "/integrations/{id}/sync_status" impl LedgerBackend);
pub async fn sync_status<B: LedgerBackend>(
    path: web::Path<i64>,
    tracker: web::Data<SyncTrackerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let integration = tracker.integration(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SyncStatusResponse::from(integration)))
}
