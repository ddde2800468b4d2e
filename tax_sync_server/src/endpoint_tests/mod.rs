//! Webhook endpoint tests: signature enforcement, header validation, and dispatch behaviour.

use actix_web::{http::StatusCode, test, web, App};
use stt_common::Secret;
use tax_ledger_engine::{
    db_types::TransactionStatus,
    events::EventProducers,
    test_utils::prepare_test_env,
    traits::TaxLedgerDatabase,
    IntegrationContext,
    LedgerFlowApi,
    SqliteDatabase,
    SyncTrackerApi,
};

use crate::{
    data_objects::JsonResponse,
    middleware::HmacMiddlewareFactory,
    signature::calculate_hmac,
    webhook_routes::{ShopifyWebhookRoute, HMAC_HEADER, SHOP_HEADER, TOPIC_HEADER},
};

const SHOP: &str = "example.myshopify.com";
const SECRET: &str = "hush";
const FALLBACK: &str = "old-hush";

fn order_body(id: i64, financial_status: &str) -> String {
    format!(
        r##"{{
            "id": {id},
            "name": "#{id}",
            "created_at": "2026-01-10T15:00:00Z",
            "updated_at": "2026-01-10T15:05:00Z",
            "financial_status": "{financial_status}",
            "currency": "USD",
            "subtotal_price": "93.00",
            "total_price": "100.00",
            "total_tax": "7.00",
            "total_discounts": "0.00",
            "tax_lines": [{{"title": "State Tax", "rate": 0.07, "price": "7.00"}}]
        }}"##
    )
}

async fn new_db() -> (SqliteDatabase, IntegrationContext) {
    prepare_test_env();
    let db = SqliteDatabase::new_with_url("sqlite::memory:", 1).await.unwrap();
    let integration = db.create_integration(1, SHOP, "shpat_test").await.unwrap();
    (db.clone(), IntegrationContext::new(integration.organization_id, integration.id))
}

macro_rules! test_app {
    ($db:expr) => {{
        let hmac = HmacMiddlewareFactory::new(
            HMAC_HEADER,
            Secret::new(SECRET.to_string()),
            Some(Secret::new(FALLBACK.to_string())),
            true,
        );
        test::init_service(
            App::new()
                .app_data(web::Data::new(LedgerFlowApi::new($db.clone(), EventProducers::default())))
                .app_data(web::Data::new(SyncTrackerApi::new($db.clone())))
                .service(
                    web::scope("/shopify").wrap(hmac).service(ShopifyWebhookRoute::<SqliteDatabase>::new()),
                ),
        )
        .await
    }};
}

fn signed_request(topic: &str, body: &str, secret: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/shopify/webhook")
        .insert_header((TOPIC_HEADER, topic))
        .insert_header((SHOP_HEADER, SHOP))
        .insert_header((HMAC_HEADER, calculate_hmac(secret, body.as_bytes())))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.to_string())
}

async fn ledger_has(db: &SqliteDatabase, ctx: &IntegrationContext, external_id: &str) -> bool {
    db.fetch_transaction(&ctx.key(external_id.parse().unwrap())).await.unwrap().is_some()
}

#[actix_web::test]
async fn a_signed_create_event_lands_in_the_ledger() {
    let (db, ctx) = new_db().await;
    let app = test_app!(db);
    let body = order_body(1001, "paid");

    let resp = signed_request("orders/create", &body, SECRET).send_request(&app).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let reply: JsonResponse = test::read_body_json(resp).await;
    assert!(reply.success);

    let record = db.fetch_transaction(&ctx.key("1001".parse().unwrap())).await.unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(record.order_number, "#1001");
}

#[actix_web::test]
async fn an_invalid_signature_is_rejected_without_processing() {
    let (db, ctx) = new_db().await;
    let app = test_app!(db);
    let body = order_body(1002, "paid");

    let resp = signed_request("orders/create", &body, "wrong-secret").send_request(&app).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(!ledger_has(&db, &ctx, "1002").await, "a rejected delivery must not mutate anything");
}

#[actix_web::test]
async fn the_fallback_secret_is_accepted_during_rotation() {
    let (db, ctx) = new_db().await;
    let app = test_app!(db);
    let body = order_body(1003, "paid");

    let resp = signed_request("orders/create", &body, FALLBACK).send_request(&app).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(db.fetch_transaction(&ctx.key("1003".parse().unwrap())).await.unwrap().is_some());
}

#[actix_web::test]
async fn a_missing_signature_header_is_a_bad_request() {
    let (db, _) = new_db().await;
    let app = test_app!(db);
    let resp = test::TestRequest::post()
        .uri("/shopify/webhook")
        .insert_header((TOPIC_HEADER, "orders/create"))
        .insert_header((SHOP_HEADER, SHOP))
        .set_payload(order_body(1004, "paid"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn a_missing_topic_header_is_a_bad_request() {
    let (db, _) = new_db().await;
    let app = test_app!(db);
    let body = order_body(1005, "paid");
    let resp = test::TestRequest::post()
        .uri("/shopify/webhook")
        .insert_header((SHOP_HEADER, SHOP))
        .insert_header((HMAC_HEADER, calculate_hmac(SECRET, body.as_bytes())))
        .set_payload(body)
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unrecognized_topics_are_acknowledged_with_zero_mutation() {
    let (db, ctx) = new_db().await;
    let app = test_app!(db);
    let body = r#"{"id": 5, "title": "A product"}"#;

    let resp = signed_request("products/update", body, SECRET).send_request(&app).await;
    assert_eq!(resp.status(), StatusCode::OK, "an unhandled topic must not look like a failed delivery");
    let reply: JsonResponse = test::read_body_json(resp).await;
    assert!(reply.success);
    assert!(!ledger_has(&db, &ctx, "5").await);
}

#[actix_web::test]
async fn a_cancel_after_create_transitions_the_status() {
    let (db, ctx) = new_db().await;
    let app = test_app!(db);
    signed_request("orders/create", &order_body(1006, "paid"), SECRET).send_request(&app).await;

    let cancel_body = r##"{
            "id": 1006, "name": "#1006", "created_at": "2026-01-10T15:00:00Z",
            "updated_at": "2026-01-10T16:00:00Z", "cancelled_at": "2026-01-10T16:00:00Z",
            "financial_status": "voided", "currency": "USD",
            "subtotal_price": "93.00", "total_price": "100.00", "total_tax": "7.00", "total_discounts": "0.00"
        }"##;
    let resp = signed_request("orders/cancelled", cancel_body, SECRET).send_request(&app).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let record = db.fetch_transaction(&ctx.key("1006".parse().unwrap())).await.unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Cancelled);
}

#[actix_web::test]
async fn deliveries_for_unknown_shops_are_acknowledged_not_retried() {
    let (db, ctx) = new_db().await;
    let app = test_app!(db);
    let body = order_body(1007, "paid");
    let resp = test::TestRequest::post()
        .uri("/shopify/webhook")
        .insert_header((TOPIC_HEADER, "orders/create"))
        .insert_header((SHOP_HEADER, "other-shop.myshopify.com"))
        .insert_header((HMAC_HEADER, calculate_hmac(SECRET, body.as_bytes())))
        .set_payload(body)
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let reply: JsonResponse = test::read_body_json(resp).await;
    assert!(!reply.success);
    assert!(!ledger_has(&db, &ctx, "1007").await);
}
