//! In-memory [`Store`] implementation.
//!
//! This implementation is suitable for:
//! - Single server deployments
//! - Development and testing
//!
//! All maps live behind a single `RwLock` so cross-map invariants (tenant
//! version checks, one-active-subscription-per-tenant) hold without
//! per-entry coordination.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use kadro_storage::{
    CreateMeteringRecordParams, CreateSubscriptionParams, CreateTenantParams, FeatureOverride,
    MeteringRecord, MeteringRecordId, MeteringStatus, Store, StoreError, Subscription,
    SubscriptionId, SubscriptionStatus, Tenant, TenantId, TenantStatus,
};

#[derive(Default)]
struct Inner {
    tenants: HashMap<TenantId, Tenant>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    overrides: HashMap<(TenantId, String), FeatureOverride>,
    metering: HashMap<MeteringRecordId, MeteringRecord>,
    /// Insertion order for metering, so pending listing is oldest-first.
    metering_order: Vec<MeteringRecordId>,
}

/// In-memory store. Cheap to clone via `Arc` at the call sites.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_tenant(&self, params: &CreateTenantParams) -> Result<Tenant, StoreError> {
        let mut inner = self.inner.write().await;

        if inner.tenants.values().any(|t| t.code == params.code) {
            return Err(StoreError::AlreadyExists);
        }
        if let Some(ext) = &params.external_subscription_id {
            if inner
                .tenants
                .values()
                .any(|t| t.external_subscription_id.as_deref() == Some(ext.as_str()))
            {
                return Err(StoreError::AlreadyExists);
            }
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: TenantId(Uuid::new_v4()),
            code: params.code.clone(),
            name: params.name.clone(),
            contact_email: params.contact_email.clone(),
            country: params.country.clone(),
            status: params.status,
            external_subscription_id: params.external_subscription_id.clone(),
            external_tenant_id: params.external_tenant_id.clone(),
            purchase_plan_id: params.purchase_plan_id.clone(),
            purchase_offer_id: params.purchase_offer_id.clone(),
            version: 1,
            created_at: now,
            updated_at: now,
            trial_ends_at: params.trial_ends_at,
            activated_at: None,
            suspended_at: None,
            cancelled_at: None,
        };
        inner.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn get_tenant(&self, id: &TenantId) -> Result<Tenant, StoreError> {
        let inner = self.inner.read().await;
        inner.tenants.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_tenant_by_code(&self, code: &str) -> Result<Tenant, StoreError> {
        let inner = self.inner.read().await;
        inner
            .tenants
            .values()
            .find(|t| t.code == code)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_tenant_by_external_subscription(
        &self,
        external_subscription_id: &str,
    ) -> Result<Tenant, StoreError> {
        let inner = self.inner.read().await;
        inner
            .tenants
            .values()
            .find(|t| t.external_subscription_id.as_deref() == Some(external_subscription_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_tenant(
        &self,
        tenant: &Tenant,
        expected_version: u64,
    ) -> Result<Tenant, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner.tenants.get_mut(&tenant.id).ok_or(StoreError::NotFound)?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict);
        }
        let mut updated = tenant.clone();
        updated.version = expected_version + 1;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn list_tenants_by_status(
        &self,
        status: TenantStatus,
    ) -> Result<Vec<Tenant>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tenants
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn list_trials_ending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Tenant>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .tenants
            .values()
            .filter(|t| {
                t.status == TenantStatus::Trial
                    && matches!(t.trial_ends_at, Some(end) if end < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn create_subscription(
        &self,
        params: &CreateSubscriptionParams,
    ) -> Result<Subscription, StoreError> {
        let mut inner = self.inner.write().await;

        if inner
            .subscriptions
            .values()
            .any(|s| s.tenant_id == params.tenant_id && s.status == SubscriptionStatus::Active)
        {
            return Err(StoreError::Conflict);
        }

        let now = Utc::now();
        let sub = Subscription {
            id: SubscriptionId(Uuid::new_v4()),
            tenant_id: params.tenant_id,
            plan_id: params.plan_id,
            status: SubscriptionStatus::Active,
            start_date: params.start_date,
            end_date: params.end_date,
            external_subscription_id: params.external_subscription_id.clone(),
            next_billing_date: params.next_billing_date,
            created_at: now,
            updated_at: now,
        };
        inner.subscriptions.insert(sub.id, sub.clone());
        Ok(sub)
    }

    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Subscription, StoreError> {
        let inner = self.inner.read().await;
        inner
            .subscriptions
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_active_subscription(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .values()
            .find(|s| s.tenant_id == *tenant_id && s.status == SubscriptionStatus::Active)
            .cloned())
    }

    async fn set_subscription_status(
        &self,
        id: &SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let sub = inner.subscriptions.get_mut(id).ok_or(StoreError::NotFound)?;
        sub.status = status;
        sub.updated_at = Utc::now();
        Ok(())
    }

    async fn list_subscriptions(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Subscription>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .values()
            .filter(|s| s.tenant_id == *tenant_id)
            .cloned()
            .collect())
    }

    async fn upsert_feature_override(&self, ov: &FeatureOverride) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .overrides
            .insert((ov.tenant_id, ov.feature_code.clone()), ov.clone());
        Ok(())
    }

    async fn get_feature_override(
        &self,
        tenant_id: &TenantId,
        feature_code: &str,
    ) -> Result<Option<FeatureOverride>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .overrides
            .get(&(*tenant_id, feature_code.to_string()))
            .cloned())
    }

    async fn list_feature_overrides(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<FeatureOverride>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .overrides
            .values()
            .filter(|ov| ov.tenant_id == *tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_metering_record(
        &self,
        params: &CreateMeteringRecordParams,
    ) -> Result<MeteringRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let record = MeteringRecord {
            id: MeteringRecordId(Uuid::new_v4()),
            tenant_id: params.tenant_id,
            subscription_id: params.subscription_id,
            dimension: params.dimension,
            quantity: params.quantity,
            effective_start_time: params.effective_start_time,
            status: MeteringStatus::Pending,
            error: None,
            attempts: 0,
            last_attempt_at: None,
            created_at: Utc::now(),
        };
        inner.metering.insert(record.id, record.clone());
        inner.metering_order.push(record.id);
        Ok(record)
    }

    async fn get_metering_record(
        &self,
        id: &MeteringRecordId,
    ) -> Result<MeteringRecord, StoreError> {
        let inner = self.inner.read().await;
        inner.metering.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn list_pending_metering(
        &self,
        limit: usize,
    ) -> Result<Vec<MeteringRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .metering_order
            .iter()
            .filter_map(|id| inner.metering.get(id))
            .filter(|r| r.status == MeteringStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_rejected_metering(
        &self,
        max_attempts: u32,
    ) -> Result<Vec<MeteringRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .metering_order
            .iter()
            .filter_map(|id| inner.metering.get(id))
            .filter(|r| r.status == MeteringStatus::Rejected && r.attempts < max_attempts)
            .cloned()
            .collect())
    }

    async fn mark_metering_reported(
        &self,
        ids: &[MeteringRecordId],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for id in ids {
            let record = inner.metering.get_mut(id).ok_or(StoreError::NotFound)?;
            record.status = MeteringStatus::Reported;
            record.error = None;
            record.last_attempt_at = Some(at);
        }
        Ok(())
    }

    async fn mark_metering_rejected(
        &self,
        ids: &[MeteringRecordId],
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for id in ids {
            let record = inner.metering.get_mut(id).ok_or(StoreError::NotFound)?;
            record.status = MeteringStatus::Rejected;
            record.error = Some(error.to_string());
            record.attempts += 1;
            record.last_attempt_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kadro_storage::{MeteringDimension, PlanId};

    fn tenant_params(code: &str) -> CreateTenantParams {
        CreateTenantParams {
            code: code.to_string(),
            name: "Acme".to_string(),
            contact_email: "ops@acme.test".to_string(),
            country: "DE".to_string(),
            status: TenantStatus::Trial,
            trial_ends_at: Some(Utc::now() + Duration::days(7)),
            external_subscription_id: None,
            external_tenant_id: None,
            purchase_plan_id: None,
            purchase_offer_id: None,
        }
    }

    #[tokio::test]
    async fn create_and_lookup_tenant() {
        let store = MemoryStore::new();
        let tenant = store.create_tenant(&tenant_params("abc123")).await.unwrap();

        let by_id = store.get_tenant(&tenant.id).await.unwrap();
        assert_eq!(by_id.code, "abc123");

        let by_code = store.get_tenant_by_code("abc123").await.unwrap();
        assert_eq!(by_code.id, tenant.id);

        assert!(matches!(
            store.get_tenant_by_code("missing").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_tenant_code_rejected() {
        let store = MemoryStore::new();
        store.create_tenant(&tenant_params("abc123")).await.unwrap();
        assert!(matches!(
            store.create_tenant(&tenant_params("abc123")).await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn duplicate_external_subscription_rejected() {
        let store = MemoryStore::new();
        let mut params = tenant_params("one");
        params.external_subscription_id = Some("sub_123".to_string());
        store.create_tenant(&params).await.unwrap();

        let mut params2 = tenant_params("two");
        params2.external_subscription_id = Some("sub_123".to_string());
        assert!(matches!(
            store.create_tenant(&params2).await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn stale_version_write_conflicts() {
        let store = MemoryStore::new();
        let tenant = store.create_tenant(&tenant_params("abc123")).await.unwrap();

        let mut first = tenant.clone();
        first.status = TenantStatus::Active;
        let updated = store.update_tenant(&first, tenant.version).await.unwrap();
        assert_eq!(updated.version, tenant.version + 1);

        // Second writer still holds the old version.
        let mut second = tenant.clone();
        second.status = TenantStatus::Suspended;
        assert!(matches!(
            store.update_tenant(&second, tenant.version).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn single_active_subscription_enforced() {
        let store = MemoryStore::new();
        let tenant = store.create_tenant(&tenant_params("abc123")).await.unwrap();
        let params = CreateSubscriptionParams {
            tenant_id: tenant.id,
            plan_id: PlanId(Uuid::new_v4()),
            start_date: Utc::now(),
            end_date: None,
            external_subscription_id: None,
            next_billing_date: None,
        };

        let sub = store.create_subscription(&params).await.unwrap();
        assert!(matches!(
            store.create_subscription(&params).await,
            Err(StoreError::Conflict)
        ));

        // After cancelling, a new active subscription is allowed.
        store
            .set_subscription_status(&sub.id, SubscriptionStatus::Cancelled)
            .await
            .unwrap();
        store.create_subscription(&params).await.unwrap();
    }

    #[tokio::test]
    async fn trials_ending_before_cutoff() {
        let store = MemoryStore::new();
        let mut soon = tenant_params("soon");
        soon.trial_ends_at = Some(Utc::now() + Duration::days(1));
        let mut late = tenant_params("late");
        late.trial_ends_at = Some(Utc::now() + Duration::days(30));
        store.create_tenant(&soon).await.unwrap();
        store.create_tenant(&late).await.unwrap();

        let ending = store
            .list_trials_ending_before(Utc::now() + Duration::days(2))
            .await
            .unwrap();
        assert_eq!(ending.len(), 1);
        assert_eq!(ending[0].code, "soon");
    }

    #[tokio::test]
    async fn metering_lifecycle() {
        let store = MemoryStore::new();
        let tenant = store.create_tenant(&tenant_params("abc123")).await.unwrap();
        let sub_id = SubscriptionId(Uuid::new_v4());

        let record = store
            .insert_metering_record(&CreateMeteringRecordParams {
                tenant_id: tenant.id,
                subscription_id: sub_id,
                dimension: MeteringDimension::ApiCalls,
                quantity: 42.0,
                effective_start_time: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(record.status, MeteringStatus::Pending);

        let pending = store.list_pending_metering(10).await.unwrap();
        assert_eq!(pending.len(), 1);

        let now = Utc::now();
        store
            .mark_metering_rejected(&[record.id], "boom", now)
            .await
            .unwrap();
        let rejected = store.get_metering_record(&record.id).await.unwrap();
        assert_eq!(rejected.status, MeteringStatus::Rejected);
        assert_eq!(rejected.attempts, 1);
        assert_eq!(rejected.error.as_deref(), Some("boom"));

        // Still retryable below the attempt budget, not above it.
        assert_eq!(store.list_rejected_metering(5).await.unwrap().len(), 1);
        assert_eq!(store.list_rejected_metering(1).await.unwrap().len(), 0);

        store
            .mark_metering_reported(&[record.id], now)
            .await
            .unwrap();
        let reported = store.get_metering_record(&record.id).await.unwrap();
        assert_eq!(reported.status, MeteringStatus::Reported);
        assert!(reported.error.is_none());
    }

    #[tokio::test]
    async fn pending_listing_is_oldest_first_and_bounded() {
        let store = MemoryStore::new();
        let tenant = store.create_tenant(&tenant_params("abc123")).await.unwrap();
        let sub_id = SubscriptionId(Uuid::new_v4());

        let mut ids = Vec::new();
        for i in 0..5 {
            let r = store
                .insert_metering_record(&CreateMeteringRecordParams {
                    tenant_id: tenant.id,
                    subscription_id: sub_id,
                    dimension: MeteringDimension::ApiCalls,
                    quantity: i as f64,
                    effective_start_time: Utc::now(),
                })
                .await
                .unwrap();
            ids.push(r.id);
        }

        let pending = store.list_pending_metering(3).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].id, ids[0]);
        assert_eq!(pending[2].id, ids[2]);
    }

    #[tokio::test]
    async fn feature_override_upsert_and_get() {
        let store = MemoryStore::new();
        let tenant = store.create_tenant(&tenant_params("abc123")).await.unwrap();

        let ov = FeatureOverride {
            tenant_id: tenant.id,
            feature_code: "payroll".to_string(),
            enabled: true,
            is_override: true,
            updated_at: Utc::now(),
        };
        store.upsert_feature_override(&ov).await.unwrap();

        let got = store
            .get_feature_override(&tenant.id, "payroll")
            .await
            .unwrap()
            .expect("override present");
        assert!(got.enabled);

        assert!(store
            .get_feature_override(&tenant.id, "missing")
            .await
            .unwrap()
            .is_none());
    }
}
