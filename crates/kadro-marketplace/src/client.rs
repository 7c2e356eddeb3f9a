//! HTTP implementation of [`MarketplaceApi`].
//!
//! Authenticates with a client-credentials bearer token that is cached
//! and refreshed shortly before expiry. Every request carries the
//! configured timeout; the marketplace is an external dependency and must
//! never be able to hang a request handler.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use kadro_tenant::UsageEvent;

use crate::{
    MarketplaceApi, MarketplaceConfig, MarketplaceError, OperationOutcome, RemoteSubscription,
    ResolvedSubscription, MAX_USAGE_EVENTS_PER_CALL,
};

const API_VERSION: &str = "2024-04-01";
/// Refresh the cached token this long before it actually expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct HttpMarketplaceClient {
    http: reqwest::Client,
    config: MarketplaceConfig,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveResponse {
    id: String,
    subscription_name: Option<String>,
    offer_id: String,
    plan_id: String,
    quantity: Option<u32>,
    subscription: Option<ResolveDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveDetail {
    purchaser: Option<Purchaser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Purchaser {
    tenant_id: Option<String>,
    email_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionResponse {
    id: String,
    plan_id: String,
    saas_subscription_status: String,
    quantity: Option<u32>,
}

fn token_stale(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) >= expires_at
}

impl HttpMarketplaceClient {
    pub fn new(config: MarketplaceConfig) -> Result<Self, MarketplaceError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(MarketplaceError::NotConfigured(
                "marketplace credentials are empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MarketplaceError::Protocol(e.to_string()))?;
        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    fn api_url(&self, path: &str) -> Result<Url, MarketplaceError> {
        self.config
            .api_base_url
            .join(path)
            .map_err(|e| MarketplaceError::Protocol(format!("bad url {}: {}", path, e)))
    }

    async fn bearer_token(&self) -> Result<String, MarketplaceError> {
        let now = Utc::now();
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token_stale(token.expires_at, now) {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref() {
            if !token_stale(token.expires_at, now) {
                return Ok(token.token.clone());
            }
        }

        let token_url = self
            .config
            .auth_base_url
            .join(&format!(
                "{}/oauth2/v2.0/token",
                self.config.directory_tenant_id
            ))
            .map_err(|e| MarketplaceError::Auth(format!("bad token url: {}", e)))?;
        let scope = format!(
            "{}/.default",
            self.config.api_base_url.origin().ascii_serialization()
        );

        let response = self
            .http
            .post(token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarketplaceError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MarketplaceError::Auth(format!(
                "token endpoint answered {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MarketplaceError::Auth(e.to_string()))?;
        debug!(expires_in = token.expires_in, "marketplace token refreshed");

        let entry = CachedToken {
            token: token.access_token.clone(),
            expires_at: now + Duration::seconds(token.expires_in),
        };
        *cached = Some(entry);
        Ok(token.access_token)
    }

    async fn check(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, MarketplaceError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(MarketplaceError::Protocol(format!(
            "{} answered {}: {}",
            context, status, body
        )))
    }
}

#[async_trait]
impl MarketplaceApi for HttpMarketplaceClient {
    async fn resolve_subscription(
        &self,
        purchase_token: &str,
    ) -> Result<ResolvedSubscription, MarketplaceError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .post(self.api_url("subscriptions/resolve")?)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .header("x-ms-marketplace-token", purchase_token)
            .send()
            .await
            .map_err(|e| MarketplaceError::Protocol(e.to_string()))?;
        let response = self.check(response, "resolve").await?;

        let resolved: ResolveResponse = response
            .json()
            .await
            .map_err(|e| MarketplaceError::Protocol(e.to_string()))?;
        let purchaser = resolved.subscription.and_then(|s| s.purchaser);
        Ok(ResolvedSubscription {
            subscription_name: resolved
                .subscription_name
                .unwrap_or_else(|| resolved.id.clone()),
            subscription_id: resolved.id,
            offer_id: resolved.offer_id,
            plan_id: resolved.plan_id,
            quantity: resolved.quantity,
            purchaser_tenant_id: purchaser.as_ref().and_then(|p| p.tenant_id.clone()),
            purchaser_email: purchaser.and_then(|p| p.email_id),
        })
    }

    async fn activate_subscription(
        &self,
        subscription_id: &str,
        plan_id: &str,
        quantity: Option<u32>,
    ) -> Result<(), MarketplaceError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .post(self.api_url(&format!("subscriptions/{}/activate", subscription_id))?)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .json(&serde_json::json!({
                "planId": plan_id,
                "quantity": quantity,
            }))
            .send()
            .await
            .map_err(|e| MarketplaceError::Protocol(e.to_string()))?;
        self.check(response, "activate").await?;
        Ok(())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, MarketplaceError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .get(self.api_url(&format!("subscriptions/{}", subscription_id))?)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| MarketplaceError::Protocol(e.to_string()))?;
        let response = self.check(response, "get subscription").await?;

        let sub: SubscriptionResponse = response
            .json()
            .await
            .map_err(|e| MarketplaceError::Protocol(e.to_string()))?;
        Ok(RemoteSubscription {
            id: sub.id,
            plan_id: sub.plan_id,
            status: sub.saas_subscription_status,
            quantity: sub.quantity,
        })
    }

    async fn update_operation_status(
        &self,
        subscription_id: &str,
        operation_id: &str,
        outcome: OperationOutcome,
    ) -> Result<(), MarketplaceError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .patch(self.api_url(&format!(
                "subscriptions/{}/operations/{}",
                subscription_id, operation_id
            ))?)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .json(&serde_json::json!({ "status": outcome.as_str() }))
            .send()
            .await
            .map_err(|e| MarketplaceError::Protocol(e.to_string()))?;
        self.check(response, "update operation").await?;
        Ok(())
    }

    async fn report_usage(&self, events: &[UsageEvent]) -> Result<(), MarketplaceError> {
        if events.len() > MAX_USAGE_EVENTS_PER_CALL {
            return Err(MarketplaceError::InvalidRequest(format!(
                "{} usage events in one call, max is {}",
                events.len(),
                MAX_USAGE_EVENTS_PER_CALL
            )));
        }
        if events.is_empty() {
            return Ok(());
        }

        let token = self.bearer_token().await?;
        let url = self
            .config
            .metering_base_url
            .join("batchUsageEvent")
            .map_err(|e| MarketplaceError::Protocol(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .json(&serde_json::json!({ "request": events }))
            .send()
            .await
            .map_err(|e| MarketplaceError::Protocol(e.to_string()))?;
        self.check(response, "report usage").await?;
        Ok(())
    }
}
