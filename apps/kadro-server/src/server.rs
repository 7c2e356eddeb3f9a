//! HTTP surface: the marketplace landing page, the webhook endpoint and a
//! health probe.
//!
//! The landing endpoint always answers with a redirect; a buyer arriving
//! from the marketplace must end up on a page, never on a JSON error. The
//! webhook endpoint always answers `200` for structurally valid payloads
//! so the marketplace stops redelivering; processing failures are audited
//! inside the processor.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use kadro_marketplace::{process_landing, MarketplaceApi, WebhookEvent, WebhookProcessor};
use kadro_store_memory::MemoryStore;
use kadro_tenant::TenantService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TenantService<MemoryStore>>,
    pub marketplace: Arc<dyn MarketplaceApi>,
    pub processor: Arc<WebhookProcessor<MemoryStore>>,
    /// Buyers land here after a successful purchase.
    pub onboarding_url: String,
    /// Buyers land here when the purchase flow fails.
    pub error_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/marketplace/landing", get(landing))
        .route("/marketplace/webhook", post(webhook))
        .route("/marketplace/health", get(health))
        .with_state(state)
}

#[derive(Deserialize)]
struct LandingQuery {
    token: Option<String>,
}

fn error_redirect(error_url: &str, message: &str) -> Redirect {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    Redirect::to(&format!("{}?message={}", error_url, encoded))
}

async fn landing(State(state): State<AppState>, Query(query): Query<LandingQuery>) -> Response {
    let token = match query.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => {
            return error_redirect(&state.error_url, "missing purchase token").into_response();
        }
    };

    match process_landing(state.service.as_ref(), state.marketplace.as_ref(), token).await {
        Ok(tenant) => {
            info!(tenant_code = %tenant.code, "marketplace landing succeeded");
            Redirect::to(&format!(
                "{}?tenant={}&activated=true",
                state.onboarding_url, tenant.code
            ))
            .into_response()
        }
        Err(err) => {
            warn!(error = %err, "marketplace landing failed");
            error_redirect(&state.error_url, &err.to_string()).into_response()
        }
    }
}

async fn webhook(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> Json<serde_json::Value> {
    state.processor.process(event).await;
    Json(serde_json::json!({ "status": "ok" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kadro_audit::MemoryAuditSink;
    use kadro_marketplace::{MockMarketplaceApi, ResolvedSubscription};
    use kadro_storage::TenantStatus;
    use kadro_tenant::{PlanCatalog, TrialPolicy};

    struct TestApp {
        base_url: String,
        state: AppState,
        mock: Arc<MockMarketplaceApi>,
    }

    async fn spawn_app() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let service = Arc::new(TenantService::new(
            store,
            audit.clone(),
            Arc::new(PlanCatalog::new(vec![], vec![])),
            TrialPolicy::default(),
        ));
        let mock = Arc::new(MockMarketplaceApi::new());
        let marketplace: Arc<dyn MarketplaceApi> = mock.clone();
        let processor = Arc::new(WebhookProcessor::new(
            service.clone(),
            marketplace.clone(),
            audit,
        ));
        let state = AppState {
            service,
            marketplace,
            processor,
            onboarding_url: "https://app.kadro.test/onboarding".to_string(),
            error_url: "https://app.kadro.test/purchase-error".to_string(),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestApp {
            base_url: format!("http://{}", addr),
            state,
            mock,
        }
    }

    fn client() -> reqwest::Client {
        // Redirects stay visible to the assertions.
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    fn resolved(sub_id: &str) -> ResolvedSubscription {
        ResolvedSubscription {
            subscription_id: sub_id.to_string(),
            subscription_name: "Acme GmbH".to_string(),
            offer_id: "kadro-hr".to_string(),
            plan_id: "pro".to_string(),
            quantity: Some(50),
            purchaser_tenant_id: None,
            purchaser_email: Some("buyer@acme.test".to_string()),
        }
    }

    #[tokio::test]
    async fn health_reports_version() {
        let app = spawn_app().await;

        let body: serde_json::Value = client()
            .get(format!("{}/marketplace/health", app.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn landing_redirects_to_onboarding() {
        let app = spawn_app().await;
        app.mock.register_token("tok_1", resolved("sub_1")).await;

        let response = client()
            .get(format!("{}/marketplace/landing?token=tok_1", app.base_url))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::SEE_OTHER);
        let location = response.headers()["location"].to_str().unwrap();
        let tenant = app
            .state
            .service
            .get_tenant_by_external_subscription_id("sub_1")
            .await
            .unwrap();
        assert_eq!(tenant.status, TenantStatus::Active);
        assert_eq!(
            location,
            format!(
                "https://app.kadro.test/onboarding?tenant={}&activated=true",
                tenant.code
            )
        );
    }

    #[tokio::test]
    async fn failed_landing_redirects_to_error_page() {
        let app = spawn_app().await;

        let response = client()
            .get(format!("{}/marketplace/landing?token=tok_bad", app.base_url))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::SEE_OTHER);
        let location = response.headers()["location"].to_str().unwrap();
        assert!(location.starts_with("https://app.kadro.test/purchase-error?message="));
    }

    #[tokio::test]
    async fn missing_token_redirects_to_error_page() {
        let app = spawn_app().await;

        let response = client()
            .get(format!("{}/marketplace/landing", app.base_url))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::SEE_OTHER);
        let location = response.headers()["location"].to_str().unwrap();
        assert!(location.contains("missing%20purchase%20token") || location.contains("missing+purchase+token"));
    }

    #[tokio::test]
    async fn webhook_answers_ok_even_for_unknown_subscriptions() {
        let app = spawn_app().await;

        let response = client()
            .post(format!("{}/marketplace/webhook", app.base_url))
            .json(&serde_json::json!({
                "id": "op_1",
                "subscriptionId": "sub_unknown",
                "action": "Suspend",
                "status": "InProgress",
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");

        // Acked as Failure so the marketplace stops retrying.
        let ops = app.mock.operations().await;
        assert_eq!(ops.len(), 1);
    }

    #[tokio::test]
    async fn webhook_drives_the_suspend_transition() {
        let app = spawn_app().await;
        app.mock.register_token("tok_1", resolved("sub_1")).await;
        client()
            .get(format!("{}/marketplace/landing?token=tok_1", app.base_url))
            .send()
            .await
            .unwrap();

        let response = client()
            .post(format!("{}/marketplace/webhook", app.base_url))
            .json(&serde_json::json!({
                "id": "op_1",
                "subscriptionId": "sub_1",
                "action": "Suspend",
                "status": "InProgress",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let tenant = app
            .state
            .service
            .get_tenant_by_external_subscription_id("sub_1")
            .await
            .unwrap();
        assert_eq!(tenant.status, TenantStatus::Suspended);
    }
}
