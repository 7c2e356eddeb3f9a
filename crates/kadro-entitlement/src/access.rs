//! Tenant access gate and ownership guard.

use chrono::Utc;

use kadro_storage::{Store, StoreError, Tenant, TenantId, TenantStatus, UserId};

use crate::{AccessError, Role};

/// The caller's identity as resolved by the authentication layer.
#[derive(Clone, Debug)]
pub struct UserContext {
    pub user_id: UserId,
    pub role: Role,
    /// Absent for platform staff; present for every tenant user.
    pub tenant_id: Option<TenantId>,
}

/// Gate every tenant-scoped request through this before any role check.
///
/// Checks run in a fixed order so the caller learns the narrowest
/// applicable failure: existence, then standing, then payment. A tenant
/// that is both cancelled and unpaid reads as `Forbidden`, not
/// `PaymentRequired`.
///
/// Returns the tenant on success so callers do not re-fetch it.
pub async fn validate_tenant_access<S: Store + ?Sized>(
    store: &S,
    tenant_id: &TenantId,
) -> Result<Tenant, AccessError> {
    let tenant = match store.get_tenant(tenant_id).await {
        Ok(tenant) => tenant,
        Err(StoreError::NotFound) => return Err(AccessError::NotFound),
        Err(err) => return Err(err.into()),
    };

    match tenant.status {
        TenantStatus::Cancelled => {
            return Err(AccessError::Forbidden("tenant is cancelled".to_string()));
        }
        TenantStatus::Suspended => {
            return Err(AccessError::Forbidden("tenant is suspended".to_string()));
        }
        TenantStatus::Expired => {
            return Err(AccessError::PaymentRequired(
                "trial has expired".to_string(),
            ));
        }
        // Trials and marketplace tenants mid-activation are not expected
        // to carry a subscription yet.
        TenantStatus::Trial | TenantStatus::PendingSetup => return Ok(tenant),
        TenantStatus::Active => {}
    }

    let subscription = store.get_active_subscription(tenant_id).await?;
    match subscription {
        Some(sub) if !sub.is_past_end(Utc::now()) => Ok(tenant),
        _ => Err(AccessError::PaymentRequired(
            "no active subscription".to_string(),
        )),
    }
}

/// Reject any request touching a resource owned by a different tenant.
pub fn validate_resource_ownership(
    resource_tenant: &TenantId,
    request_tenant: &TenantId,
    resource_type: &str,
) -> Result<(), AccessError> {
    if resource_tenant == request_tenant {
        Ok(())
    } else {
        Err(AccessError::Forbidden(format!(
            "{} belongs to another tenant",
            resource_type
        )))
    }
}
