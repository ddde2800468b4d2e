//! Webhook subscription reconciliation.
//!
//! Live ingestion only works while the remote webhook registrations exist and point at this server. Registrations
//! drift: merchants reinstall apps, URLs change, the platform prunes subscriptions that fail too often. The
//! reconciler detects that drift and heals it: verify, delete the broken and extraneous registrations, re-create
//! the required ones at the canonical URL, then verify again and persist the outcome.

use std::{collections::HashMap, time::Duration};

use chrono::Utc;
use log::*;
use shopify_sync::{retry::CircuitBreaker, GuardedAdmin, ShopifyApi, WebhookAdmin, REQUIRED_WEBHOOK_TOPICS};
use tax_ledger_engine::{
    db_types::{NewWebhookSubscription, SubscriptionStatus, TopicHealth, WebhookHealthReport},
    traits::{IntegrationManagement, WebhookMirror},
    SqliteDatabase,
    SyncTrackerApi,
};
use tokio::task::JoinHandle;

use crate::{config::ServerConfig, errors::ServerError};

#[derive(Debug, Clone)]
struct Classification {
    per_topic: Vec<TopicHealth>,
    /// Remote subscription ids that should not exist: wrong-URL registrations for required topics, duplicates, and
    /// topics this engine never subscribes to.
    extraneous: Vec<i64>,
}

impl Classification {
    fn is_healthy(&self) -> bool {
        self.per_topic.iter().all(|t| t.status == SubscriptionStatus::Healthy) && self.extraneous.is_empty()
    }
}

pub struct SubscriptionReconciler<B> {
    tracker: SyncTrackerApi<B>,
    canonical_address: String,
    check_interval: Duration,
}

impl<B> SubscriptionReconciler<B>
where B: IntegrationManagement + WebhookMirror + Clone
{
    pub fn new(tracker: SyncTrackerApi<B>, canonical_address: String, check_interval: Duration) -> Self {
        Self { tracker, canonical_address, check_interval }
    }

    /// One verify-heal-reverify cycle.
    ///
    /// Healing only runs when verification finds something wrong. Individual delete/create failures are logged and
    /// skipped so one broken registration cannot block healing the rest. The resulting report and the per-topic
    /// snapshot are persisted on the integration either way.
    pub async fn ensure_health<A: WebhookAdmin>(
        &self,
        integration_id: i64,
        admin: &A,
    ) -> Result<WebhookHealthReport, ServerError> {
        // Cheap credential probe, so a revoked token is flagged on the integration instead of surfacing as
        // "every webhook is missing"
        match admin.get_shop().await {
            Ok(shop) => trace!("📡️ Probed shop {} ({})", shop.myshopify_domain, shop.id),
            Err(e) => {
                if e.is_permanent() {
                    self.tracker
                        .mark_sync_error(integration_id, &format!("The platform rejected our credentials: {e}"))
                        .await?;
                }
                return Err(e.into());
            },
        }
        let mut classification = self.verify(admin).await?;
        if !classification.is_healthy() {
            info!(
                "📡️ Webhook subscriptions for integration {integration_id} have drifted. Healing ({} broken/extra)",
                classification.extraneous.len()
            );
            self.heal(admin, &classification).await;
            classification = self.verify(admin).await?;
        }
        let report = WebhookHealthReport::from_topics(classification.per_topic.clone(), Utc::now());
        let next_check =
            Utc::now() + chrono::Duration::from_std(self.check_interval).unwrap_or_else(|_| chrono::Duration::minutes(15));
        self.tracker.record_webhook_health(integration_id, &report, next_check).await?;
        self.persist_snapshot(integration_id, &report).await?;
        info!("📡️ Webhook health for integration {integration_id}: {}", report.overall_status);
        Ok(report)
    }

    async fn verify<A: WebhookAdmin>(&self, admin: &A) -> Result<Classification, ServerError> {
        let remote = admin.fetch_webhooks().await?;
        trace!("📡️ Remote reports {} webhook subscriptions", remote.len());
        let mut per_topic = Vec::with_capacity(REQUIRED_WEBHOOK_TOPICS.len());
        let mut extraneous = Vec::new();
        for topic in REQUIRED_WEBHOOK_TOPICS {
            let candidates = remote.iter().filter(|w| w.topic == topic).collect::<Vec<_>>();
            match candidates.iter().find(|w| w.address == self.canonical_address) {
                Some(good) => {
                    extraneous.extend(candidates.iter().filter(|w| w.id != good.id).map(|w| w.id));
                    per_topic.push(TopicHealth {
                        topic: topic.to_string(),
                        status: SubscriptionStatus::Healthy,
                        address: Some(good.address.clone()),
                        remote_id: Some(good.id),
                    });
                },
                None if !candidates.is_empty() => {
                    extraneous.extend(candidates.iter().map(|w| w.id));
                    per_topic.push(TopicHealth {
                        topic: topic.to_string(),
                        status: SubscriptionStatus::Unhealthy,
                        address: candidates.first().map(|w| w.address.clone()),
                        remote_id: candidates.first().map(|w| w.id),
                    });
                },
                None => {
                    per_topic.push(TopicHealth {
                        topic: topic.to_string(),
                        status: SubscriptionStatus::Missing,
                        address: None,
                        remote_id: None,
                    });
                },
            }
        }
        extraneous.extend(
            remote.iter().filter(|w| !REQUIRED_WEBHOOK_TOPICS.contains(&w.topic.as_str())).map(|w| w.id),
        );
        Ok(Classification { per_topic, extraneous })
    }

    async fn heal<A: WebhookAdmin>(&self, admin: &A, classification: &Classification) {
        for id in &classification.extraneous {
            if let Err(e) = admin.delete_webhook(*id).await {
                warn!("📡️ Could not delete subscription {id}: {e}. Continuing");
            }
        }
        for topic in classification.per_topic.iter().filter(|t| t.status != SubscriptionStatus::Healthy) {
            match admin.install_webhook(&self.canonical_address, &topic.topic).await {
                Ok(webhook) => debug!("📡️ Registered {} at {} (id {})", topic.topic, webhook.address, webhook.id),
                Err(e) => warn!("📡️ Could not register {}: {e}. Continuing", topic.topic),
            }
        }
    }

    /// Mirror the verified state, carrying the consecutive-failure counter forward: a topic that is still broken
    /// after healing counts one more failed check, a healthy one resets.
    async fn persist_snapshot(
        &self,
        integration_id: i64,
        report: &WebhookHealthReport,
    ) -> Result<(), ServerError> {
        let previous = self.tracker.subscription_snapshot(integration_id).await?;
        let failures =
            previous.into_iter().map(|s| (s.topic, s.consecutive_failures)).collect::<HashMap<_, _>>();
        let subs = report
            .per_topic
            .iter()
            .map(|t| NewWebhookSubscription {
                topic: t.topic.clone(),
                remote_id: t.remote_id,
                address: t.address.clone(),
                status: t.status,
                consecutive_failures: if t.status == SubscriptionStatus::Healthy {
                    0
                } else {
                    failures.get(&t.topic).copied().unwrap_or(0) + 1
                },
            })
            .collect::<Vec<_>>();
        self.tracker.replace_subscription_snapshot(integration_id, &subs).await?;
        Ok(())
    }
}

/// Consecutive failed remote calls before an integration's circuit breaker opens.
const RECONCILE_BREAKER_THRESHOLD: u32 = 3;

/// Periodically re-checks webhook health for every connected integration. Do not await the returned JoinHandle, as
/// it runs indefinitely.
pub fn start_reconciler_worker(db: SqliteDatabase, config: ServerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tracker = SyncTrackerApi::new(db);
        let reconciler = SubscriptionReconciler::new(
            tracker.clone(),
            config.canonical_webhook_address(),
            config.webhook_check_interval,
        );
        // One breaker per integration, kept across cycles. A shop whose remote keeps failing is cut off until the
        // cool-down elapses instead of being hammered on every pass.
        let mut breakers: HashMap<i64, CircuitBreaker> = HashMap::new();
        let mut timer = tokio::time::interval(config.webhook_check_interval);
        info!("📡️ Webhook reconciliation worker started");
        loop {
            timer.tick().await;
            let integrations = match tracker.connected_integrations().await {
                Ok(integrations) => integrations,
                Err(e) => {
                    error!("📡️ Could not list integrations: {e}");
                    continue;
                },
            };
            for integration in integrations {
                if let Some(next) = integration.webhook_next_check_at {
                    if next > Utc::now() {
                        continue;
                    }
                }
                let api_config =
                    config.shopify_config.api_config_for(&integration.shop_domain, integration.credentials());
                let api = match ShopifyApi::new(api_config) {
                    Ok(api) => api,
                    Err(e) => {
                        error!("📡️ Could not build API client for {}: {e}", integration.shop_domain);
                        continue;
                    },
                };
                let breaker = breakers
                    .entry(integration.id)
                    .or_insert_with(|| CircuitBreaker::new(RECONCILE_BREAKER_THRESHOLD, config.webhook_check_interval));
                let admin = GuardedAdmin::new(&api, breaker);
                match reconciler.ensure_health(integration.id, &admin).await {
                    Ok(report) => {
                        debug!("📡️ Integration {} webhook health: {}", integration.id, report.overall_status)
                    },
                    Err(e) => error!("📡️ Reconciliation failed for integration {}: {e}", integration.id),
                }
            }
        }
    })
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering},
        Mutex,
    };

    use shopify_sync::{Shop, ShopifyApiError, Webhook};
    use tax_ledger_engine::{db_types::WebhookOverallStatus, test_utils::prepare_test_env};

    use super::*;

    const CANONICAL: &str = "https://tax.example.com/shopify/webhook";

    struct FakeAdmin {
        webhooks: Mutex<Vec<Webhook>>,
        next_id: AtomicI64,
        deletes: AtomicUsize,
        installs: AtomicUsize,
        shop_calls: AtomicUsize,
        fail_deletes: bool,
        fail_installs: bool,
        fail_shop: bool,
    }

    impl FakeAdmin {
        fn new(webhooks: Vec<Webhook>) -> Self {
            let next = webhooks.iter().map(|w| w.id).max().unwrap_or(0) + 1;
            Self {
                webhooks: Mutex::new(webhooks),
                next_id: AtomicI64::new(next),
                deletes: AtomicUsize::new(0),
                installs: AtomicUsize::new(0),
                shop_calls: AtomicUsize::new(0),
                fail_deletes: false,
                fail_installs: false,
                fail_shop: false,
            }
        }

        fn with_failing_deletes(mut self) -> Self {
            self.fail_deletes = true;
            self
        }

        fn with_failing_installs(mut self) -> Self {
            self.fail_installs = true;
            self
        }

        fn with_revoked_credentials(mut self) -> Self {
            self.fail_shop = true;
            self
        }

        fn webhook(id: i64, topic: &str, address: &str) -> Webhook {
            Webhook { id, topic: topic.to_string(), address: address.to_string(), format: Some("json".into()) }
        }
    }

    impl WebhookAdmin for FakeAdmin {
        async fn fetch_webhooks(&self) -> Result<Vec<Webhook>, ShopifyApiError> {
            Ok(self.webhooks.lock().unwrap().clone())
        }

        async fn install_webhook(&self, address: &str, topic: &str) -> Result<Webhook, ShopifyApiError> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            if self.fail_installs {
                return Err(ShopifyApiError::QueryError { status: 422, message: "no thanks".into() });
            }
            let webhook = FakeAdmin::webhook(self.next_id.fetch_add(1, Ordering::SeqCst), topic, address);
            self.webhooks.lock().unwrap().push(webhook.clone());
            Ok(webhook)
        }

        async fn delete_webhook(&self, id: i64) -> Result<(), ShopifyApiError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_deletes {
                return Err(ShopifyApiError::QueryError { status: 500, message: "boom".into() });
            }
            self.webhooks.lock().unwrap().retain(|w| w.id != id);
            Ok(())
        }

        async fn get_shop(&self) -> Result<Shop, ShopifyApiError> {
            self.shop_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_shop {
                return Err(ShopifyApiError::QueryError { status: 401, message: "invalid token".into() });
            }
            Ok(Shop::default())
        }
    }

    async fn reconciler() -> (SubscriptionReconciler<SqliteDatabase>, i64, SqliteDatabase) {
        prepare_test_env();
        let db = SqliteDatabase::new_with_url("sqlite::memory:", 1).await.unwrap();
        let integration = db.create_integration(1, "example.myshopify.com", "shpat_test").await.unwrap();
        let tracker = SyncTrackerApi::new(db.clone());
        let reconciler =
            SubscriptionReconciler::new(tracker, CANONICAL.to_string(), Duration::from_secs(900));
        (reconciler, integration.id, db)
    }

    #[tokio::test]
    async fn drifted_subscriptions_converge_in_one_cycle() {
        // 2 of 5 topics missing, one pointing at a stale URL
        let admin = FakeAdmin::new(vec![
            FakeAdmin::webhook(1, "orders/create", CANONICAL),
            FakeAdmin::webhook(2, "orders/updated", "https://old.example.com/webhook"),
            FakeAdmin::webhook(3, "refunds/create", CANONICAL),
        ]);
        let (reconciler, integration_id, db) = reconciler().await;

        let report = reconciler.ensure_health(integration_id, &admin).await.unwrap();
        assert_eq!(report.overall_status, WebhookOverallStatus::Healthy);
        assert!(report.per_topic.iter().all(|t| t.status == SubscriptionStatus::Healthy));

        let remote = admin.webhooks.lock().unwrap().clone();
        assert_eq!(remote.len(), REQUIRED_WEBHOOK_TOPICS.len());
        assert!(remote.iter().all(|w| w.address == CANONICAL));

        // The snapshot and the health report were persisted on the integration
        let integration = db.fetch_integration(integration_id).await.unwrap().unwrap();
        assert!(integration.webhook_health.unwrap_or_default().contains("Healthy"));
        assert!(integration.webhook_next_check_at.is_some());
        let snapshot = db.fetch_subscription_snapshot(integration_id).await.unwrap();
        assert_eq!(snapshot.len(), REQUIRED_WEBHOOK_TOPICS.len());
        assert!(snapshot.iter().all(|s| s.consecutive_failures == 0));
    }

    #[tokio::test]
    async fn a_healthy_integration_is_left_alone() {
        let webhooks =
            REQUIRED_WEBHOOK_TOPICS.iter().enumerate().map(|(i, t)| FakeAdmin::webhook(i as i64 + 1, *t, CANONICAL)).collect();
        let admin = FakeAdmin::new(webhooks);
        let (reconciler, integration_id, _db) = reconciler().await;

        let report = reconciler.ensure_health(integration_id, &admin).await.unwrap();
        assert_eq!(report.overall_status, WebhookOverallStatus::Healthy);
        assert_eq!(admin.deletes.load(Ordering::SeqCst), 0);
        assert_eq!(admin.installs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unrecognized_subscriptions_are_pruned() {
        let mut webhooks: Vec<Webhook> =
            REQUIRED_WEBHOOK_TOPICS.iter().enumerate().map(|(i, t)| FakeAdmin::webhook(i as i64 + 1, *t, CANONICAL)).collect();
        webhooks.push(FakeAdmin::webhook(99, "products/update", CANONICAL));
        let admin = FakeAdmin::new(webhooks);
        let (reconciler, integration_id, _db) = reconciler().await;

        let report = reconciler.ensure_health(integration_id, &admin).await.unwrap();
        assert_eq!(report.overall_status, WebhookOverallStatus::Healthy);
        assert!(admin.webhooks.lock().unwrap().iter().all(|w| w.topic != "products/update"));
    }

    #[tokio::test]
    async fn a_failed_delete_does_not_block_the_rest_of_the_heal() {
        let admin = FakeAdmin::new(vec![FakeAdmin::webhook(
            1,
            "orders/updated",
            "https://old.example.com/webhook",
        )])
        .with_failing_deletes();
        let (reconciler, integration_id, _db) = reconciler().await;

        let report = reconciler.ensure_health(integration_id, &admin).await.unwrap();
        // The stale registration could not be deleted, but every required topic now has a canonical registration,
        // so the integration is healthy regardless.
        assert_eq!(report.overall_status, WebhookOverallStatus::Healthy);
        assert_eq!(admin.installs.load(Ordering::SeqCst), REQUIRED_WEBHOOK_TOPICS.len());
    }

    #[tokio::test]
    async fn revoked_credentials_flag_the_integration_for_reconnection() {
        let admin = FakeAdmin::new(vec![]).with_revoked_credentials();
        let (reconciler, integration_id, db) = reconciler().await;

        let result = reconciler.ensure_health(integration_id, &admin).await;
        assert!(result.is_err());
        assert_eq!(admin.installs.load(Ordering::SeqCst), 0, "healing must not run with a dead credential");

        let integration = db.fetch_integration(integration_id).await.unwrap().unwrap();
        assert_eq!(integration.sync_status, tax_ledger_engine::db_types::SyncStatus::Error);
        assert!(integration.sync_error.unwrap_or_default().contains("credentials"));
    }

    #[tokio::test]
    async fn a_tripped_breaker_stops_touching_the_remote() {
        let admin = FakeAdmin::new(vec![]).with_revoked_credentials();
        let (reconciler, integration_id, _db) = reconciler().await;
        let breaker = CircuitBreaker::new(1, Duration::from_secs(600));
        let guarded = GuardedAdmin::new(&admin, &breaker);

        assert!(reconciler.ensure_health(integration_id, &guarded).await.is_err());
        let probes = admin.shop_calls.load(Ordering::SeqCst);
        assert_eq!(probes, 1);

        // The breaker is open now; the next cycle must fail without a single network call
        assert!(reconciler.ensure_health(integration_id, &guarded).await.is_err());
        assert_eq!(admin.shop_calls.load(Ordering::SeqCst), probes);
    }

    #[tokio::test]
    async fn consecutive_failures_accumulate_while_a_topic_stays_broken() {
        // A remote that refuses registrations entirely: every topic stays Missing through each cycle
        let admin = FakeAdmin::new(vec![]).with_failing_installs();
        let (reconciler, integration_id, db) = reconciler().await;

        let report = reconciler.ensure_health(integration_id, &admin).await.unwrap();
        assert_eq!(report.overall_status, WebhookOverallStatus::Failed);
        reconciler.ensure_health(integration_id, &admin).await.unwrap();

        let snapshot = db.fetch_subscription_snapshot(integration_id).await.unwrap();
        assert!(snapshot.iter().all(|s| s.consecutive_failures == 2), "two failed checks must be counted");
    }
}
