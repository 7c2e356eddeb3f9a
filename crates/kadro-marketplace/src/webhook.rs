//! Marketplace webhook handling.
//!
//! Webhooks arrive at-least-once and out of band; the processor applies
//! the lifecycle transition they describe, acknowledges `InProgress`
//! operations, and audits everything. Errors never escape to the HTTP
//! layer: the endpoint must answer 200 for every structurally valid
//! payload or the marketplace keeps redelivering a poison event forever.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use kadro_audit::{AuditAction, AuditEvent, AuditSeverity, AuditSink};
use kadro_storage::Store;
use kadro_tenant::{LifecycleError, TenantService};

use crate::{MarketplaceApi, OperationOutcome};

/// Lifecycle action carried by a webhook.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum WebhookAction {
    Suspend,
    Reinstate,
    Unsubscribe,
    ChangePlan,
    ChangeQuantity,
    Renew,
    /// Anything we do not recognize. Audited, never acted on.
    Unknown(String),
}

impl From<String> for WebhookAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Suspend" => WebhookAction::Suspend,
            "Reinstate" => WebhookAction::Reinstate,
            "Unsubscribe" => WebhookAction::Unsubscribe,
            "ChangePlan" => WebhookAction::ChangePlan,
            "ChangeQuantity" => WebhookAction::ChangeQuantity,
            "Renew" => WebhookAction::Renew,
            _ => WebhookAction::Unknown(s),
        }
    }
}

impl std::fmt::Display for WebhookAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WebhookAction::Suspend => "Suspend",
            WebhookAction::Reinstate => "Reinstate",
            WebhookAction::Unsubscribe => "Unsubscribe",
            WebhookAction::ChangePlan => "ChangePlan",
            WebhookAction::ChangeQuantity => "ChangeQuantity",
            WebhookAction::Renew => "Renew",
            WebhookAction::Unknown(s) => s,
        };
        write!(f, "{}", s)
    }
}

/// Incoming webhook payload, camelCase on the wire.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    /// Operation id; doubles as the ack handle for `InProgress` events.
    pub id: String,
    pub activity_id: Option<String>,
    pub publisher_id: Option<String>,
    pub offer_id: Option<String>,
    pub plan_id: Option<String>,
    pub quantity: Option<u32>,
    pub subscription_id: String,
    pub time_stamp: Option<DateTime<Utc>>,
    pub action: WebhookAction,
    /// Marketplace operation status ("InProgress", "Succeeded", ...).
    pub status: Option<String>,
}

impl WebhookEvent {
    fn needs_ack(&self) -> bool {
        self.status.as_deref() == Some("InProgress")
    }
}

/// Applies webhook events to local tenant state.
pub struct WebhookProcessor<S: Store> {
    service: Arc<TenantService<S>>,
    client: Arc<dyn MarketplaceApi>,
    audit: Arc<dyn AuditSink>,
}

impl<S: Store> WebhookProcessor<S> {
    pub fn new(
        service: Arc<TenantService<S>>,
        client: Arc<dyn MarketplaceApi>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            service,
            client,
            audit,
        }
    }

    /// Process one webhook. Infallible by contract: every failure is
    /// audited and swallowed here.
    pub async fn process(&self, event: WebhookEvent) {
        self.audit_best_effort(
            AuditEvent::builder("marketplace", AuditAction::WebhookReceived)
                .resource("webhook", &event.id)
                .details(serde_json::json!({
                    "action": event.action.to_string(),
                    "subscriptionId": event.subscription_id,
                    "status": event.status,
                }))
                .build(),
        )
        .await;

        let applied = self.apply(&event).await;

        if event.needs_ack() {
            let outcome = if applied.is_ok() {
                OperationOutcome::Success
            } else {
                OperationOutcome::Failure
            };
            if let Err(err) = self
                .client
                .update_operation_status(&event.subscription_id, &event.id, outcome)
                .await
            {
                warn!(
                    operation_id = %event.id,
                    error = %err,
                    "failed to acknowledge webhook operation"
                );
            }
        }

        if let Err(err) = applied {
            warn!(
                operation_id = %event.id,
                subscription_id = %event.subscription_id,
                action = %event.action,
                error = %err,
                "webhook could not be applied"
            );
            self.audit_best_effort(
                AuditEvent::builder("marketplace", AuditAction::WebhookFailed)
                    .severity(AuditSeverity::Critical)
                    .resource("webhook", &event.id)
                    .reason(err.to_string())
                    .details(serde_json::json!({
                        "action": event.action.to_string(),
                        "subscriptionId": event.subscription_id,
                    }))
                    .build(),
            )
            .await;
        }
    }

    async fn apply(&self, event: &WebhookEvent) -> Result<(), LifecycleError> {
        match &event.action {
            WebhookAction::Suspend => {
                let tenant = self
                    .service
                    .get_tenant_by_external_subscription_id(&event.subscription_id)
                    .await?;
                self.service
                    .suspend_tenant(&tenant.id, "marketplace suspend", "marketplace")
                    .await?;
                Ok(())
            }
            WebhookAction::Reinstate => {
                let tenant = self
                    .service
                    .get_tenant_by_external_subscription_id(&event.subscription_id)
                    .await?;
                self.service.activate_tenant(&tenant.id, "marketplace").await?;
                Ok(())
            }
            WebhookAction::Unsubscribe => {
                let tenant = self
                    .service
                    .get_tenant_by_external_subscription_id(&event.subscription_id)
                    .await?;
                self.service.cancel_tenant(&tenant.id, "marketplace").await?;
                Ok(())
            }
            // Plan and term changes are audit-only for now; the resolved
            // subscription is re-read on the next landing or billing pass.
            WebhookAction::ChangePlan
            | WebhookAction::ChangeQuantity
            | WebhookAction::Renew => {
                info!(
                    action = %event.action,
                    subscription_id = %event.subscription_id,
                    "webhook action recorded without local transition"
                );
                Ok(())
            }
            WebhookAction::Unknown(action) => {
                warn!(
                    %action,
                    subscription_id = %event.subscription_id,
                    "unknown webhook action"
                );
                Ok(())
            }
        }
    }

    async fn audit_best_effort(&self, event: AuditEvent) {
        if let Err(err) = self.audit.record(event).await {
            warn!(error = %err, "failed to record audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockMarketplaceApi;
    use kadro_audit::{AuditFilter, MemoryAuditSink};
    use kadro_storage::TenantStatus;
    use kadro_tenant::{MarketplacePurchase, NewTenant, PlanCatalog, TrialPolicy};
    use kadro_store_memory::MemoryStore;

    struct Harness {
        processor: WebhookProcessor<MemoryStore>,
        service: Arc<TenantService<MemoryStore>>,
        client: Arc<MockMarketplaceApi>,
        audit: Arc<MemoryAuditSink>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let client = Arc::new(MockMarketplaceApi::new());
        let service = Arc::new(TenantService::new(
            store,
            audit.clone(),
            Arc::new(PlanCatalog::new(vec![], vec![])),
            TrialPolicy::default(),
        ));
        let processor = WebhookProcessor::new(service.clone(), client.clone(), audit.clone());
        Harness {
            processor,
            service,
            client,
            audit,
        }
    }

    async fn active_tenant(h: &Harness, ext_sub: &str) -> kadro_storage::Tenant {
        let tenant = h
            .service
            .create_tenant(
                NewTenant {
                    name: "Acme".into(),
                    contact_email: "ops@acme.test".into(),
                    country: "DE".into(),
                    marketplace: Some(MarketplacePurchase {
                        external_subscription_id: ext_sub.into(),
                        external_tenant_id: None,
                        plan_id: "pro".into(),
                        offer_id: "kadro-hr".into(),
                    }),
                },
                "test",
            )
            .await
            .unwrap();
        h.service.activate_tenant(&tenant.id, "test").await.unwrap()
    }

    fn suspend_event(sub: &str, op: &str) -> WebhookEvent {
        serde_json::from_value(serde_json::json!({
            "id": op,
            "activityId": "act_1",
            "publisherId": "pub",
            "offerId": "kadro-hr",
            "planId": "pro",
            "subscriptionId": sub,
            "timeStamp": Utc::now(),
            "action": "Suspend",
            "status": "InProgress",
        }))
        .unwrap()
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(WebhookAction::from("Suspend".to_string()), WebhookAction::Suspend);
        assert_eq!(
            WebhookAction::from("Transfer".to_string()),
            WebhookAction::Unknown("Transfer".to_string())
        );
    }

    #[tokio::test]
    async fn suspend_webhook_suspends_and_acks() {
        let h = harness();
        let tenant = active_tenant(&h, "sub_123").await;

        h.processor.process(suspend_event("sub_123", "op_1")).await;

        let tenant = h.service.get_tenant(&tenant.id).await.unwrap();
        assert_eq!(tenant.status, TenantStatus::Suspended);

        let ops = h.client.operations().await;
        assert_eq!(
            ops,
            vec![(
                "sub_123".to_string(),
                "op_1".to_string(),
                OperationOutcome::Success
            )]
        );

        // Exactly one critical event: the suspension itself.
        let critical = h
            .audit
            .count(AuditFilter::new().severity(AuditSeverity::Critical))
            .await
            .unwrap();
        assert_eq!(critical, 1);
    }

    #[tokio::test]
    async fn duplicate_suspend_delivery_is_idempotent() {
        let h = harness();
        let tenant = active_tenant(&h, "sub_123").await;

        h.processor.process(suspend_event("sub_123", "op_1")).await;
        h.processor.process(suspend_event("sub_123", "op_1")).await;

        let tenant = h.service.get_tenant(&tenant.id).await.unwrap();
        assert_eq!(tenant.status, TenantStatus::Suspended);

        // One tenant.suspended event, not two; both deliveries acked.
        let suspended = h
            .audit
            .count(AuditFilter::new().action(AuditAction::TenantSuspended))
            .await
            .unwrap();
        assert_eq!(suspended, 1);
        assert_eq!(h.client.operations().await.len(), 2);
    }

    #[tokio::test]
    async fn reinstate_reactivates() {
        let h = harness();
        let tenant = active_tenant(&h, "sub_123").await;
        h.processor.process(suspend_event("sub_123", "op_1")).await;

        let mut event = suspend_event("sub_123", "op_2");
        event.action = WebhookAction::Reinstate;
        h.processor.process(event).await;

        let tenant = h.service.get_tenant(&tenant.id).await.unwrap();
        assert_eq!(tenant.status, TenantStatus::Active);
    }

    #[tokio::test]
    async fn unsubscribe_cancels() {
        let h = harness();
        let tenant = active_tenant(&h, "sub_123").await;

        let mut event = suspend_event("sub_123", "op_1");
        event.action = WebhookAction::Unsubscribe;
        h.processor.process(event).await;

        let tenant = h.service.get_tenant(&tenant.id).await.unwrap();
        assert_eq!(tenant.status, TenantStatus::Cancelled);
    }

    #[tokio::test]
    async fn unknown_subscription_fails_loudly_but_not_fatally() {
        let h = harness();

        h.processor.process(suspend_event("sub_missing", "op_1")).await;

        // Acked as Failure so the marketplace stops redelivering.
        let ops = h.client.operations().await;
        assert_eq!(ops[0].2, OperationOutcome::Failure);

        let failed = h
            .audit
            .count(AuditFilter::new().action(AuditAction::WebhookFailed))
            .await
            .unwrap();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn audit_only_actions_touch_nothing() {
        let h = harness();
        let tenant = active_tenant(&h, "sub_123").await;

        for action in ["ChangePlan", "ChangeQuantity", "Renew", "Transfer"] {
            let mut event = suspend_event("sub_123", "op_x");
            event.action = WebhookAction::from(action.to_string());
            event.status = None;
            h.processor.process(event).await;
        }

        let tenant = h.service.get_tenant(&tenant.id).await.unwrap();
        assert_eq!(tenant.status, TenantStatus::Active);
        // No acks without InProgress status.
        assert!(h.client.operations().await.is_empty());

        let received = h
            .audit
            .count(AuditFilter::new().action(AuditAction::WebhookReceived))
            .await
            .unwrap();
        assert_eq!(received, 4);
    }
}
