//! The storage trait the tenant core depends on.

use chrono::{DateTime, Utc};

use crate::{
    CreateMeteringRecordParams, CreateSubscriptionParams, CreateTenantParams, FeatureOverride,
    MeteringRecord, MeteringRecordId, StoreError, Subscription, SubscriptionId,
    SubscriptionStatus, Tenant, TenantId, TenantStatus,
};

/// Storage contract for tenants, subscriptions, overrides, and metering.
///
/// Tenant rows carry a version counter; [`Store::update_tenant`] must reject
/// writes whose expected version is stale with [`StoreError::Conflict`].
/// That check is the only mutual exclusion the core relies on — everything
/// else is read-only reference data or append-only.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────── Tenants ─────────────────────────────────

    /// Create a tenant (fails with `AlreadyExists` on a duplicate code or
    /// duplicate external subscription id).
    async fn create_tenant(&self, params: &CreateTenantParams) -> Result<Tenant, StoreError>;

    async fn get_tenant(&self, id: &TenantId) -> Result<Tenant, StoreError>;

    async fn get_tenant_by_code(&self, code: &str) -> Result<Tenant, StoreError>;

    async fn get_tenant_by_external_subscription(
        &self,
        external_subscription_id: &str,
    ) -> Result<Tenant, StoreError>;

    /// Write back a modified tenant. `expected_version` must equal the stored
    /// version or the write fails with `Conflict`; on success the stored
    /// version is bumped and the updated row returned.
    async fn update_tenant(
        &self,
        tenant: &Tenant,
        expected_version: u64,
    ) -> Result<Tenant, StoreError>;

    async fn list_tenants_by_status(
        &self,
        status: TenantStatus,
    ) -> Result<Vec<Tenant>, StoreError>;

    /// Trial tenants whose `trial_ends_at` is before `cutoff`.
    async fn list_trials_ending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Tenant>, StoreError>;

    // ─────────────────────────────── Subscriptions ───────────────────────────────

    /// Create a subscription. Fails with `Conflict` if the tenant already has
    /// an `Active` one.
    async fn create_subscription(
        &self,
        params: &CreateSubscriptionParams,
    ) -> Result<Subscription, StoreError>;

    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Subscription, StoreError>;

    /// The tenant's `Active` subscription, if any. Does not apply lazy
    /// end-date expiry; that is the service's job.
    async fn get_active_subscription(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, StoreError>;

    async fn set_subscription_status(
        &self,
        id: &SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError>;

    async fn list_subscriptions(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<Subscription>, StoreError>;

    // ────────────────────────────── Feature overrides ──────────────────────────────

    async fn upsert_feature_override(&self, ov: &FeatureOverride) -> Result<(), StoreError>;

    async fn get_feature_override(
        &self,
        tenant_id: &TenantId,
        feature_code: &str,
    ) -> Result<Option<FeatureOverride>, StoreError>;

    async fn list_feature_overrides(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<FeatureOverride>, StoreError>;

    // ──────────────────────────────── Metering ────────────────────────────────

    async fn insert_metering_record(
        &self,
        params: &CreateMeteringRecordParams,
    ) -> Result<MeteringRecord, StoreError>;

    async fn get_metering_record(
        &self,
        id: &MeteringRecordId,
    ) -> Result<MeteringRecord, StoreError>;

    /// Oldest `Pending` records first, up to `limit`.
    async fn list_pending_metering(&self, limit: usize)
        -> Result<Vec<MeteringRecord>, StoreError>;

    /// `Rejected` records with fewer than `max_attempts` failed attempts.
    /// Cool-down filtering is the batcher's concern.
    async fn list_rejected_metering(
        &self,
        max_attempts: u32,
    ) -> Result<Vec<MeteringRecord>, StoreError>;

    /// Flip records to `Reported` and clear any error.
    async fn mark_metering_reported(
        &self,
        ids: &[MeteringRecordId],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Flip records to `Rejected`, attach the error, and bump attempts.
    async fn mark_metering_rejected(
        &self,
        ids: &[MeteringRecordId],
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
