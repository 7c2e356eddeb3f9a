//! The tenant lifecycle service.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::warn;

use kadro_audit::{AuditAction, AuditEvent, AuditSeverity, AuditSink};
use kadro_storage::{
    BillingCycle, CreateMeteringRecordParams, CreateSubscriptionParams, CreateTenantParams,
    FeatureOverride, MeteringDimension, MeteringRecord, Store, Subscription, SubscriptionStatus,
    Tenant, TenantId, TenantStatus,
};

use crate::{LifecycleError, PlanCatalog, TrialPolicy};

const CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const CODE_LEN: usize = 10;

/// Input for creating a tenant.
#[derive(Clone, Debug)]
pub struct NewTenant {
    pub name: String,
    pub contact_email: String,
    pub country: String,
    /// Present when the tenant originates from a marketplace purchase.
    pub marketplace: Option<MarketplacePurchase>,
}

/// Marketplace purchase context attached to a new tenant.
#[derive(Clone, Debug)]
pub struct MarketplacePurchase {
    pub external_subscription_id: String,
    pub external_tenant_id: Option<String>,
    pub plan_id: String,
    pub offer_id: String,
}

/// Drives all tenant state changes.
///
/// Transitions are idempotent: asking for the state the tenant is already
/// in succeeds without a write and without a second audit event. Everything
/// else goes through a compare-and-swap on the tenant version, so two
/// concurrent writers resolve to one winner and one `Conflict`.
///
/// Audit appends happen after the committed write and are best-effort; a
/// failing sink is logged and never rolls anything back.
pub struct TenantService<S: Store> {
    store: Arc<S>,
    audit: Arc<dyn AuditSink>,
    catalog: Arc<PlanCatalog>,
    trial_policy: TrialPolicy,
}

fn transition_allowed(from: TenantStatus, to: TenantStatus) -> bool {
    use TenantStatus::*;
    matches!(
        (from, to),
        (Trial, Active)
            | (Trial, Suspended)
            | (Trial, Expired)
            | (Trial, Cancelled)
            | (PendingSetup, Active)
            | (PendingSetup, Cancelled)
            | (Active, Suspended)
            | (Active, Cancelled)
            | (Suspended, Active)
            | (Suspended, Cancelled)
            | (Expired, Active)
            | (Expired, Cancelled)
    )
}

fn generate_tenant_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

impl<S: Store> TenantService<S> {
    pub fn new(
        store: Arc<S>,
        audit: Arc<dyn AuditSink>,
        catalog: Arc<PlanCatalog>,
        trial_policy: TrialPolicy,
    ) -> Self {
        Self {
            store,
            audit,
            catalog,
            trial_policy,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub fn trial_policy(&self) -> TrialPolicy {
        self.trial_policy
    }

    async fn audit_best_effort(&self, event: AuditEvent) {
        if let Err(err) = self.audit.record(event).await {
            warn!(error = %err, "failed to record audit event");
        }
    }

    /// Create a tenant. Self-signups start as `Trial` with a trial clock;
    /// marketplace purchases start as `PendingSetup` and carry the purchase
    /// identifiers for later reconciliation.
    pub async fn create_tenant(
        &self,
        new_tenant: NewTenant,
        actor: &str,
    ) -> Result<Tenant, LifecycleError> {
        let (status, trial_ends_at, source) = match &new_tenant.marketplace {
            Some(_) => (TenantStatus::PendingSetup, None, "marketplace"),
            None => (
                TenantStatus::Trial,
                Some(Utc::now() + Duration::days(self.trial_policy.trial_days)),
                "self_signup",
            ),
        };

        let params = CreateTenantParams {
            code: generate_tenant_code(),
            name: new_tenant.name,
            contact_email: new_tenant.contact_email,
            country: new_tenant.country,
            status,
            trial_ends_at,
            external_subscription_id: new_tenant
                .marketplace
                .as_ref()
                .map(|m| m.external_subscription_id.clone()),
            external_tenant_id: new_tenant
                .marketplace
                .as_ref()
                .and_then(|m| m.external_tenant_id.clone()),
            purchase_plan_id: new_tenant.marketplace.as_ref().map(|m| m.plan_id.clone()),
            purchase_offer_id: new_tenant.marketplace.as_ref().map(|m| m.offer_id.clone()),
        };

        let tenant = self.store.create_tenant(&params).await?;

        self.audit_best_effort(
            AuditEvent::builder(actor, AuditAction::TenantCreated)
                .tenant_id(Some(&tenant.id))
                .resource("tenant", tenant.id.to_string())
                .details(serde_json::json!({
                    "code": tenant.code,
                    "status": tenant.status.as_str(),
                    "source": source,
                }))
                .build(),
        )
        .await;

        Ok(tenant)
    }

    async fn transition(
        &self,
        tenant_id: &TenantId,
        target: TenantStatus,
        actor: &str,
        action: AuditAction,
        severity: AuditSeverity,
        reason: Option<&str>,
    ) -> Result<Tenant, LifecycleError> {
        let tenant = self.store.get_tenant(tenant_id).await?;

        // Re-applying the current state is a no-op, not an error, and does
        // not produce a second audit event.
        if tenant.status == target {
            return Ok(tenant);
        }
        if !transition_allowed(tenant.status, target) {
            return Err(LifecycleError::InvalidTransition {
                from: tenant.status,
                to: target,
            });
        }

        let now = Utc::now();
        let mut updated = tenant.clone();
        updated.status = target;
        match target {
            TenantStatus::Active => {
                updated.activated_at = Some(now);
                updated.suspended_at = None;
            }
            TenantStatus::Suspended => updated.suspended_at = Some(now),
            TenantStatus::Cancelled => updated.cancelled_at = Some(now),
            _ => {}
        }

        let committed = self.store.update_tenant(&updated, tenant.version).await?;

        let mut builder = AuditEvent::builder(actor, action)
            .severity(severity)
            .tenant_id(Some(&committed.id))
            .resource("tenant", committed.id.to_string())
            .details(serde_json::json!({
                "from": tenant.status.as_str(),
                "to": target.as_str(),
            }));
        if let Some(reason) = reason {
            builder = builder.reason(reason);
        }
        self.audit_best_effort(builder.build()).await;

        Ok(committed)
    }

    /// Activate a tenant. Legal from `Trial`, `PendingSetup`, `Suspended`,
    /// and `Expired` (a lapsed trial that completed checkout).
    pub async fn activate_tenant(
        &self,
        tenant_id: &TenantId,
        actor: &str,
    ) -> Result<Tenant, LifecycleError> {
        self.transition(
            tenant_id,
            TenantStatus::Active,
            actor,
            AuditAction::TenantActivated,
            AuditSeverity::Info,
            None,
        )
        .await
    }

    /// Suspend a tenant, typically on a payment failure. Legal from
    /// `Active` and `Trial`.
    pub async fn suspend_tenant(
        &self,
        tenant_id: &TenantId,
        reason: &str,
        actor: &str,
    ) -> Result<Tenant, LifecycleError> {
        self.transition(
            tenant_id,
            TenantStatus::Suspended,
            actor,
            AuditAction::TenantSuspended,
            AuditSeverity::Critical,
            Some(reason),
        )
        .await
    }

    /// Cancel a tenant. Terminal; also cancels the active subscription.
    pub async fn cancel_tenant(
        &self,
        tenant_id: &TenantId,
        actor: &str,
    ) -> Result<Tenant, LifecycleError> {
        let tenant = self
            .transition(
                tenant_id,
                TenantStatus::Cancelled,
                actor,
                AuditAction::TenantCancelled,
                AuditSeverity::Critical,
                None,
            )
            .await?;

        if let Some(sub) = self.store.get_active_subscription(tenant_id).await? {
            self.store
                .set_subscription_status(&sub.id, SubscriptionStatus::Cancelled)
                .await?;
            self.audit_best_effort(
                AuditEvent::builder(actor, AuditAction::SubscriptionCancelled)
                    .tenant_id(Some(&tenant.id))
                    .subscription_id(Some(&sub.id))
                    .resource("subscription", sub.id.to_string())
                    .reason("tenant cancelled")
                    .build(),
            )
            .await;
        }

        Ok(tenant)
    }

    /// Move a lapsed trial to `Expired`. Used by the trial monitor.
    pub async fn expire_trial(
        &self,
        tenant_id: &TenantId,
        actor: &str,
    ) -> Result<Tenant, LifecycleError> {
        self.transition(
            tenant_id,
            TenantStatus::Expired,
            actor,
            AuditAction::TenantTrialExpired,
            AuditSeverity::Warning,
            Some("trial period ended without activation"),
        )
        .await
    }

    /// Create a subscription for a tenant on a catalog plan. A second
    /// active subscription is rejected with `Conflict`.
    pub async fn create_subscription(
        &self,
        tenant_id: &TenantId,
        plan_code: &str,
        external_subscription_id: Option<String>,
        actor: &str,
    ) -> Result<Subscription, LifecycleError> {
        let tenant = self.store.get_tenant(tenant_id).await?;
        let plan = self
            .catalog
            .get_by_code(plan_code)
            .ok_or_else(|| LifecycleError::UnknownPlan(plan_code.to_string()))?;

        let now = Utc::now();
        let next_billing = match plan.billing_cycle {
            BillingCycle::Monthly => now + Duration::days(30),
            BillingCycle::Quarterly => now + Duration::days(90),
            BillingCycle::Annually => now + Duration::days(365),
        };

        let sub = self
            .store
            .create_subscription(&CreateSubscriptionParams {
                tenant_id: tenant.id,
                plan_id: plan.id,
                start_date: now,
                end_date: None,
                external_subscription_id,
                next_billing_date: Some(next_billing),
            })
            .await?;

        self.audit_best_effort(
            AuditEvent::builder(actor, AuditAction::SubscriptionCreated)
                .tenant_id(Some(&tenant.id))
                .subscription_id(Some(&sub.id))
                .resource("subscription", sub.id.to_string())
                .details(serde_json::json!({ "plan": plan.code }))
                .build(),
        )
        .await;

        Ok(sub)
    }

    /// The tenant's active subscription with lazy end-date expiry: a
    /// subscription whose end date has passed is flipped to `Expired` on
    /// read and treated as absent.
    pub async fn get_active_subscription(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, LifecycleError> {
        match self.store.get_active_subscription(tenant_id).await? {
            Some(sub) if sub.is_past_end(Utc::now()) => {
                self.store
                    .set_subscription_status(&sub.id, SubscriptionStatus::Expired)
                    .await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Resolve whether a feature is available to a tenant.
    ///
    /// Resolution order: explicit override, then the active plan's module
    /// set, then the trial set for `Trial`/`PendingSetup` tenants, then
    /// denied.
    pub async fn is_feature_enabled(
        &self,
        tenant_id: &TenantId,
        feature_code: &str,
    ) -> Result<bool, LifecycleError> {
        let tenant = self.store.get_tenant(tenant_id).await?;

        if let Some(ov) = self
            .store
            .get_feature_override(tenant_id, feature_code)
            .await?
        {
            if ov.is_override {
                return Ok(ov.enabled);
            }
        }

        if let Some(sub) = self.get_active_subscription(tenant_id).await? {
            if let Some(plan) = self.catalog.get(&sub.plan_id) {
                return Ok(plan.has_module(feature_code));
            }
        }

        if matches!(
            tenant.status,
            TenantStatus::Trial | TenantStatus::PendingSetup
        ) {
            return Ok(self.catalog.trial_includes(feature_code));
        }

        Ok(false)
    }

    /// Force a feature on or off for one tenant, beating plan entitlement.
    pub async fn set_feature_override(
        &self,
        tenant_id: &TenantId,
        feature_code: &str,
        enabled: bool,
        actor: &str,
    ) -> Result<(), LifecycleError> {
        let tenant = self.store.get_tenant(tenant_id).await?;
        self.store
            .upsert_feature_override(&FeatureOverride {
                tenant_id: tenant.id,
                feature_code: feature_code.to_string(),
                enabled,
                is_override: true,
                updated_at: Utc::now(),
            })
            .await?;

        self.audit_best_effort(
            AuditEvent::builder(actor, AuditAction::FeatureOverridden)
                .tenant_id(Some(&tenant.id))
                .resource("feature", feature_code)
                .details(serde_json::json!({ "enabled": enabled }))
                .build(),
        )
        .await;

        Ok(())
    }

    pub async fn get_tenant(&self, tenant_id: &TenantId) -> Result<Tenant, LifecycleError> {
        Ok(self.store.get_tenant(tenant_id).await?)
    }

    pub async fn get_tenant_by_code(&self, code: &str) -> Result<Tenant, LifecycleError> {
        Ok(self.store.get_tenant_by_code(code).await?)
    }

    pub async fn get_tenant_by_external_subscription_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Tenant, LifecycleError> {
        Ok(self
            .store
            .get_tenant_by_external_subscription(external_subscription_id)
            .await?)
    }

    /// Trial tenants whose clock runs out before `cutoff`.
    pub async fn expiring_trials(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Tenant>, LifecycleError> {
        Ok(self.store.list_trials_ending_before(cutoff).await?)
    }

    /// Record billable usage for later batch reporting. Requires an active
    /// subscription; trial usage is not billed.
    pub async fn record_usage(
        &self,
        tenant_id: &TenantId,
        dimension: MeteringDimension,
        quantity: f64,
        effective_start_time: DateTime<Utc>,
    ) -> Result<MeteringRecord, LifecycleError> {
        let sub = self
            .get_active_subscription(tenant_id)
            .await?
            .ok_or(LifecycleError::NoActiveSubscription)?;

        Ok(self
            .store
            .insert_metering_record(&CreateMeteringRecordParams {
                tenant_id: *tenant_id,
                subscription_id: sub.id,
                dimension,
                quantity,
                effective_start_time,
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kadro_audit::{AuditFilter, MemoryAuditSink};
    use kadro_storage::{Plan, PlanId, PlanLimits};
    use kadro_store_memory::MemoryStore;
    use uuid::Uuid;

    fn catalog() -> PlanCatalog {
        PlanCatalog::new(
            vec![
                Plan {
                    id: PlanId(Uuid::new_v4()),
                    code: "starter".into(),
                    billing_cycle: BillingCycle::Monthly,
                    modules: vec!["career_progression".into()],
                    limits: PlanLimits {
                        max_users: 25,
                        storage_gb: 10,
                        api_calls_per_month: 50_000,
                    },
                    rate_limit_tier: 1,
                },
                Plan {
                    id: PlanId(Uuid::new_v4()),
                    code: "pro".into(),
                    billing_cycle: BillingCycle::Annually,
                    modules: vec!["career_progression".into(), "performance".into()],
                    limits: PlanLimits {
                        max_users: 200,
                        storage_gb: 100,
                        api_calls_per_month: 1_000_000,
                    },
                    rate_limit_tier: 2,
                },
            ],
            vec!["career_progression".into(), "performance".into()],
        )
    }

    struct Harness {
        service: TenantService<MemoryStore>,
        store: Arc<MemoryStore>,
        audit: Arc<MemoryAuditSink>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let service = TenantService::new(
            store.clone(),
            audit.clone(),
            Arc::new(catalog()),
            TrialPolicy::default(),
        );
        Harness {
            service,
            store,
            audit,
        }
    }

    fn self_signup() -> NewTenant {
        NewTenant {
            name: "Acme GmbH".into(),
            contact_email: "ops@acme.test".into(),
            country: "DE".into(),
            marketplace: None,
        }
    }

    fn marketplace_signup(sub_id: &str) -> NewTenant {
        NewTenant {
            name: "Globex Inc".into(),
            contact_email: "it@globex.test".into(),
            country: "US".into(),
            marketplace: Some(MarketplacePurchase {
                external_subscription_id: sub_id.into(),
                external_tenant_id: Some("ext-tenant-1".into()),
                plan_id: "pro".into(),
                offer_id: "kadro-hr".into(),
            }),
        }
    }

    #[tokio::test]
    async fn self_signup_starts_a_trial() {
        let h = harness();
        let before = Utc::now();
        let tenant = h.service.create_tenant(self_signup(), "signup").await.unwrap();

        assert_eq!(tenant.status, TenantStatus::Trial);
        assert_eq!(tenant.code.len(), CODE_LEN);
        let ends = tenant.trial_ends_at.expect("trial clock set");
        assert!(ends >= before + Duration::days(7));
        assert!(ends <= Utc::now() + Duration::days(7));

        // Trial set applies without any subscription.
        assert!(h
            .service
            .is_feature_enabled(&tenant.id, "performance")
            .await
            .unwrap());
        assert!(!h
            .service
            .is_feature_enabled(&tenant.id, "payroll")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn marketplace_purchase_starts_pending_setup() {
        let h = harness();
        let tenant = h
            .service
            .create_tenant(marketplace_signup("sub_123"), "marketplace")
            .await
            .unwrap();

        assert_eq!(tenant.status, TenantStatus::PendingSetup);
        assert!(tenant.trial_ends_at.is_none());
        assert_eq!(tenant.external_subscription_id.as_deref(), Some("sub_123"));
        assert_eq!(tenant.purchase_plan_id.as_deref(), Some("pro"));

        let found = h
            .service
            .get_tenant_by_external_subscription_id("sub_123")
            .await
            .unwrap();
        assert_eq!(found.id, tenant.id);
    }

    #[tokio::test]
    async fn activate_is_idempotent_and_audits_once() {
        let h = harness();
        let tenant = h.service.create_tenant(self_signup(), "signup").await.unwrap();

        let activated = h.service.activate_tenant(&tenant.id, "system").await.unwrap();
        assert_eq!(activated.status, TenantStatus::Active);
        assert!(activated.activated_at.is_some());

        // Second activation: same state back, no extra write, no extra audit.
        let again = h.service.activate_tenant(&tenant.id, "system").await.unwrap();
        assert_eq!(again.version, activated.version);

        let events = h
            .audit
            .count(AuditFilter::new().action(AuditAction::TenantActivated))
            .await
            .unwrap();
        assert_eq!(events, 1);
    }

    #[tokio::test]
    async fn suspend_and_reinstate() {
        let h = harness();
        let tenant = h.service.create_tenant(self_signup(), "signup").await.unwrap();
        h.service.activate_tenant(&tenant.id, "system").await.unwrap();

        let suspended = h
            .service
            .suspend_tenant(&tenant.id, "payment failed", "marketplace")
            .await
            .unwrap();
        assert_eq!(suspended.status, TenantStatus::Suspended);
        assert!(suspended.suspended_at.is_some());

        // Reinstating clears the suspension timestamp.
        let reinstated = h.service.activate_tenant(&tenant.id, "marketplace").await.unwrap();
        assert!(reinstated.suspended_at.is_none());

        // Trials can be suspended too (payment failure during checkout),
        // but a tenant mid-marketplace-setup cannot.
        let trial = h.service.create_tenant(self_signup(), "signup").await.unwrap();
        h.service
            .suspend_tenant(&trial.id, "payment failed", "marketplace")
            .await
            .unwrap();

        let pending = h
            .service
            .create_tenant(marketplace_signup("sub_suspend"), "marketplace")
            .await
            .unwrap();
        let err = h
            .service
            .suspend_tenant(&pending.id, "payment failed", "marketplace")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: TenantStatus::PendingSetup,
                to: TenantStatus::Suspended,
            }
        ));
    }

    #[tokio::test]
    async fn cancel_is_terminal_and_cascades() {
        let h = harness();
        let tenant = h.service.create_tenant(self_signup(), "signup").await.unwrap();
        h.service.activate_tenant(&tenant.id, "system").await.unwrap();
        h.service
            .create_subscription(&tenant.id, "starter", None, "system")
            .await
            .unwrap();

        h.service.cancel_tenant(&tenant.id, "admin").await.unwrap();

        let sub = h.store.get_active_subscription(&tenant.id).await.unwrap();
        assert!(sub.is_none(), "active subscription should be cancelled");

        let err = h.service.activate_tenant(&tenant.id, "admin").await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: TenantStatus::Cancelled,
                ..
            }
        ));

        let cascade_events = h
            .audit
            .count(AuditFilter::new().action(AuditAction::SubscriptionCancelled))
            .await
            .unwrap();
        assert_eq!(cascade_events, 1);
    }

    #[tokio::test]
    async fn expired_trial_can_reactivate() {
        let h = harness();
        let tenant = h.service.create_tenant(self_signup(), "signup").await.unwrap();

        let expired = h.service.expire_trial(&tenant.id, "trial-monitor").await.unwrap();
        assert_eq!(expired.status, TenantStatus::Expired);

        // No entitlements while expired.
        assert!(!h
            .service
            .is_feature_enabled(&tenant.id, "performance")
            .await
            .unwrap());

        let reactivated = h.service.activate_tenant(&tenant.id, "marketplace").await.unwrap();
        assert_eq!(reactivated.status, TenantStatus::Active);
    }

    #[tokio::test]
    async fn second_active_subscription_conflicts() {
        let h = harness();
        let tenant = h.service.create_tenant(self_signup(), "signup").await.unwrap();
        h.service.activate_tenant(&tenant.id, "system").await.unwrap();

        h.service
            .create_subscription(&tenant.id, "starter", None, "system")
            .await
            .unwrap();
        let err = h
            .service
            .create_subscription(&tenant.id, "pro", None, "system")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict));
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let h = harness();
        let tenant = h.service.create_tenant(self_signup(), "signup").await.unwrap();
        let err = h
            .service
            .create_subscription(&tenant.id, "enterprise", None, "system")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownPlan(_)));
    }

    #[tokio::test]
    async fn subscription_expires_lazily_on_read() {
        let h = harness();
        let tenant = h.service.create_tenant(self_signup(), "signup").await.unwrap();
        h.service.activate_tenant(&tenant.id, "system").await.unwrap();

        // Bypass the service to plant a subscription already past its end.
        let plan_id = h.service.catalog().get_by_code("starter").unwrap().id;
        let sub = h
            .store
            .create_subscription(&CreateSubscriptionParams {
                tenant_id: tenant.id,
                plan_id,
                start_date: Utc::now() - Duration::days(40),
                end_date: Some(Utc::now() - Duration::days(2)),
                external_subscription_id: None,
                next_billing_date: None,
            })
            .await
            .unwrap();

        assert!(h
            .service
            .get_active_subscription(&tenant.id)
            .await
            .unwrap()
            .is_none());
        let stored = h.store.get_subscription(&sub.id).await.unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn feature_resolution_prefers_override_then_plan() {
        let h = harness();
        let tenant = h.service.create_tenant(self_signup(), "signup").await.unwrap();
        h.service.activate_tenant(&tenant.id, "system").await.unwrap();
        h.service
            .create_subscription(&tenant.id, "starter", None, "system")
            .await
            .unwrap();

        // Plan "starter" has no performance module.
        assert!(!h
            .service
            .is_feature_enabled(&tenant.id, "performance")
            .await
            .unwrap());

        h.service
            .set_feature_override(&tenant.id, "performance", true, "operator")
            .await
            .unwrap();
        assert!(h
            .service
            .is_feature_enabled(&tenant.id, "performance")
            .await
            .unwrap());

        // Overrides can also take a plan feature away.
        h.service
            .set_feature_override(&tenant.id, "career_progression", false, "operator")
            .await
            .unwrap();
        assert!(!h
            .service
            .is_feature_enabled(&tenant.id, "career_progression")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn record_usage_requires_subscription() {
        let h = harness();
        let tenant = h.service.create_tenant(self_signup(), "signup").await.unwrap();

        let err = h
            .service
            .record_usage(&tenant.id, MeteringDimension::ApiCalls, 100.0, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NoActiveSubscription));

        h.service.activate_tenant(&tenant.id, "system").await.unwrap();
        h.service
            .create_subscription(&tenant.id, "starter", None, "system")
            .await
            .unwrap();
        let record = h
            .service
            .record_usage(&tenant.id, MeteringDimension::ApiCalls, 100.0, Utc::now())
            .await
            .unwrap();
        assert_eq!(record.quantity, 100.0);
    }
}
