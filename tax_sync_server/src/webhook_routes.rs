//----------------------------------------------   Webhook dispatch  ----------------------------------------------

use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, info, trace, warn};
use tax_ledger_engine::{
    events_model::OrderEvent,
    tax::CategoryMapCalculator,
    EventOutcome,
    IntegrationContext,
    LedgerFlowApi,
    SyncTrackerApi,
};

use crate::{
    data_objects::JsonResponse,
    errors::ServerError,
    integrations::normalize_topic,
    route,
    routes::LedgerBackend,
};

pub const TOPIC_HEADER: &str = "X-Shopify-Topic";
pub const SHOP_HEADER: &str = "X-Shopify-Shop-Domain";
pub const HMAC_HEADER: &str = "X-Shopify-Hmac-Sha256";

route!(shopify_webhook => Post "/webhook" impl LedgerBackend);
/// The single inbound webhook endpoint.
///
/// The HMAC middleware has already authenticated the delivery by the time this handler runs. The topic and shop
/// headers are required; everything else about the payload is the normalization step's problem.
///
/// Webhook responses must always be in the 200 range once the delivery is authenticated and well-formed, otherwise
/// the platform will keep retrying it. That includes topics this engine does not recognize, and payloads that fail
/// to process: both are acknowledged (with `success: false` for the latter) rather than bounced.
pub async fn shopify_webhook<B: LedgerBackend>(
    req: HttpRequest,
    body: web::Bytes,
    ledger: web::Data<LedgerFlowApi<B>>,
    tracker: web::Data<SyncTrackerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("🛍️️ Received webhook request: {}", req.uri());
    let topic = required_header(&req, TOPIC_HEADER)?;
    let shop = required_header(&req, SHOP_HEADER)?;

    let integration = match tracker.integration_for_shop(&shop).await {
        Ok(Some(integration)) => integration,
        Ok(None) => {
            warn!("🛍️️ Webhook delivery for unknown shop {shop}. Acknowledging without processing.");
            return Ok(HttpResponse::Ok().json(JsonResponse::failure(format!("Unknown shop: {shop}"))));
        },
        Err(e) => {
            warn!("🛍️️ Could not look up integration for {shop}. {e}");
            return Ok(HttpResponse::Ok().json(JsonResponse::failure("Could not look up integration.")));
        },
    };

    let event = match normalize_topic(&topic, body.as_ref(), &shop) {
        Ok(Some(event)) => event,
        Ok(None) => {
            // Not a topic we process. Acknowledge it so the platform does not treat the delivery as failed and
            // retry it indefinitely.
            debug!("🛍️️ Ignoring unrecognized topic {topic} from {shop}");
            return Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Topic {topic} acknowledged"))));
        },
        Err(e) => {
            warn!("🛍️️ Could not normalize {topic} payload from {shop}. {e}");
            return Ok(HttpResponse::Ok().json(JsonResponse::failure(e.to_string())));
        },
    };

    // An uninstall tears down the integration rather than touching the ledger
    if let OrderEvent::Uninstalled(_) = &event {
        info!("🛍️️ Shop {shop} uninstalled the app. Disconnecting integration {}", integration.id);
        if let Err(e) = tracker.mark_disconnected(integration.id).await {
            warn!("🛍️️ Could not disconnect integration {}. {e}", integration.id);
        }
        return Ok(HttpResponse::Ok().json(JsonResponse::success("Integration disconnected.")));
    }

    let ctx = IntegrationContext::new(integration.organization_id, integration.id);
    let kind = event.kind();
    let result = ledger.upsert_event(&ctx, event, &CategoryMapCalculator).await;
    if let Err(e) = tracker.touch_sync_activity(integration.id).await {
        warn!("🛍️️ Could not bump sync activity for integration {}. {e}", integration.id);
    }
    let response = match result {
        Ok(EventOutcome::Inserted(rec)) => {
            info!("🛍️️ {kind} event created transaction {}", rec.external_id);
            JsonResponse::success("Order recorded.")
        },
        Ok(EventOutcome::Updated(rec)) => {
            info!("🛍️️ {kind} event updated transaction {}", rec.external_id);
            JsonResponse::success("Order updated.")
        },
        Ok(EventOutcome::Stale) => {
            info!("🛍️️ Stale {kind} event discarded");
            JsonResponse::success("Event is older than the stored record. Ignored.")
        },
        Ok(EventOutcome::Cancelled(rec)) => {
            info!("🛍️️ Order {} cancelled", rec.external_id);
            JsonResponse::success("Order cancelled.")
        },
        Ok(EventOutcome::CancelIgnored(id)) => {
            info!("🛍️️ Cancellation for unknown order {id} acknowledged");
            JsonResponse::success("Nothing to cancel.")
        },
        Ok(EventOutcome::RefundApplied { refund, fully_refunded, duplicate }) => {
            info!(
                "🛍️️ Refund {} applied (full: {fully_refunded}, duplicate: {duplicate})",
                refund.external_id
            );
            JsonResponse::success("Refund recorded.")
        },
        Ok(EventOutcome::Ignored) => JsonResponse::success("Event acknowledged."),
        Err(e) => {
            warn!("🛍️️ Could not process {kind} event for integration {}. {e}", integration.id);
            JsonResponse::failure("Unexpected error handling the event.")
        },
    };
    Ok(HttpResponse::Ok().json(response))
}

fn required_header(req: &HttpRequest, name: &str) -> Result<String, ServerError> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ServerError::MissingHeader(name.to_string()))
}
