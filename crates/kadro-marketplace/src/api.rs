//! The marketplace API surface and the mock used in development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use kadro_tenant::UsageEvent;

use crate::{MarketplaceError, MAX_USAGE_EVENTS_PER_CALL};

/// A purchase token resolved into its subscription.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSubscription {
    /// Subscription id on the marketplace side
    pub subscription_id: String,
    pub subscription_name: String,
    pub offer_id: String,
    pub plan_id: String,
    pub quantity: Option<u32>,
    /// Purchaser's tenant id in the marketplace's identity system
    pub purchaser_tenant_id: Option<String>,
    pub purchaser_email: Option<String>,
}

/// A subscription as the marketplace currently sees it.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSubscription {
    pub id: String,
    pub plan_id: String,
    /// Marketplace-side status string ("Subscribed", "Suspended", ...)
    pub status: String,
    pub quantity: Option<u32>,
}

/// Acknowledgement for a webhook-initiated operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationOutcome {
    Success,
    Failure,
}

impl OperationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationOutcome::Success => "Success",
            OperationOutcome::Failure => "Failure",
        }
    }
}

/// Marketplace protocol operations, for dependency injection.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Exchange a landing-page purchase token for the subscription it
    /// represents.
    async fn resolve_subscription(
        &self,
        purchase_token: &str,
    ) -> Result<ResolvedSubscription, MarketplaceError>;

    /// Tell the marketplace the tenant is provisioned and billing may
    /// start. Skipping this leaves the purchase in limbo on their side.
    async fn activate_subscription(
        &self,
        subscription_id: &str,
        plan_id: &str,
        quantity: Option<u32>,
    ) -> Result<(), MarketplaceError>;

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, MarketplaceError>;

    /// Acknowledge an `InProgress` webhook operation. Without the ack the
    /// marketplace redelivers indefinitely.
    async fn update_operation_status(
        &self,
        subscription_id: &str,
        operation_id: &str,
        outcome: OperationOutcome,
    ) -> Result<(), MarketplaceError>;

    /// Report a batch of usage events. At most
    /// [`MAX_USAGE_EVENTS_PER_CALL`] per call; larger slices are rejected
    /// with `InvalidRequest`, chunking is the caller's job.
    async fn report_usage(&self, events: &[UsageEvent]) -> Result<(), MarketplaceError>;
}

#[derive(Default)]
struct MockState {
    tokens: HashMap<String, ResolvedSubscription>,
    activations: Vec<(String, String)>,
    operations: Vec<(String, String, OperationOutcome)>,
    usage_calls: Vec<usize>,
    fail_activate: bool,
}

/// Mock marketplace for development and testing.
///
/// Tokens registered via [`MockMarketplaceApi::register_token`] resolve;
/// everything else fails the way the real marketplace would.
#[derive(Default)]
pub struct MockMarketplaceApi {
    state: RwLock<MockState>,
}

impl MockMarketplaceApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_token(&self, token: &str, resolved: ResolvedSubscription) {
        self.state
            .write()
            .await
            .tokens
            .insert(token.to_string(), resolved);
    }

    /// Make the next activation calls fail, for saga tests.
    pub async fn fail_activations(&self, fail: bool) {
        self.state.write().await.fail_activate = fail;
    }

    /// (subscription_id, plan_id) pairs activated so far.
    pub async fn activations(&self) -> Vec<(String, String)> {
        self.state.read().await.activations.clone()
    }

    /// (subscription_id, operation_id, outcome) acks so far.
    pub async fn operations(&self) -> Vec<(String, String, OperationOutcome)> {
        self.state.read().await.operations.clone()
    }

    /// Sizes of the usage batches received so far.
    pub async fn usage_calls(&self) -> Vec<usize> {
        self.state.read().await.usage_calls.clone()
    }
}

#[async_trait]
impl MarketplaceApi for MockMarketplaceApi {
    async fn resolve_subscription(
        &self,
        purchase_token: &str,
    ) -> Result<ResolvedSubscription, MarketplaceError> {
        self.state
            .read()
            .await
            .tokens
            .get(purchase_token)
            .cloned()
            .ok_or_else(|| MarketplaceError::Protocol("invalid purchase token".to_string()))
    }

    async fn activate_subscription(
        &self,
        subscription_id: &str,
        plan_id: &str,
        _quantity: Option<u32>,
    ) -> Result<(), MarketplaceError> {
        let mut state = self.state.write().await;
        if state.fail_activate {
            return Err(MarketplaceError::Protocol(
                "activation refused".to_string(),
            ));
        }
        state
            .activations
            .push((subscription_id.to_string(), plan_id.to_string()));
        info!(%subscription_id, %plan_id, "mock subscription activated");
        Ok(())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, MarketplaceError> {
        let state = self.state.read().await;
        let resolved = state
            .tokens
            .values()
            .find(|r| r.subscription_id == subscription_id)
            .ok_or_else(|| MarketplaceError::Protocol("subscription not found".to_string()))?;
        Ok(RemoteSubscription {
            id: resolved.subscription_id.clone(),
            plan_id: resolved.plan_id.clone(),
            status: "Subscribed".to_string(),
            quantity: resolved.quantity,
        })
    }

    async fn update_operation_status(
        &self,
        subscription_id: &str,
        operation_id: &str,
        outcome: OperationOutcome,
    ) -> Result<(), MarketplaceError> {
        self.state.write().await.operations.push((
            subscription_id.to_string(),
            operation_id.to_string(),
            outcome,
        ));
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
        self.state.write().await.usage_calls.push(events.len());
        Ok(())
    }
}
