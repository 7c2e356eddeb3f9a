//! The marketplace landing saga.
//!
//! A buyer lands on our site carrying a purchase token. The saga resolves
//! the token, finds or creates the tenant, activates the subscription on
//! the marketplace side and then activates the tenant locally. There is no
//! rollback: a remote activation failure leaves the tenant in
//! `PendingSetup`, which is valid and inspectable, and the error surfaces
//! to the buyer.

use thiserror::Error;
use tracing::info;

use kadro_storage::Store;
use kadro_tenant::{LifecycleError, MarketplacePurchase, NewTenant, TenantService};

use crate::{MarketplaceApi, MarketplaceError};

#[derive(Debug, Error)]
pub enum LandingError {
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Run the landing saga for one purchase token.
///
/// Idempotent across repeated landings: a token whose subscription already
/// maps to a tenant reactivates that tenant instead of creating a second
/// one.
pub async fn process_landing<S: Store>(
    service: &TenantService<S>,
    client: &dyn MarketplaceApi,
    purchase_token: &str,
) -> Result<kadro_storage::Tenant, LandingError> {
    let resolved = client.resolve_subscription(purchase_token).await?;

    let tenant = match service
        .get_tenant_by_external_subscription_id(&resolved.subscription_id)
        .await
    {
        Ok(tenant) => {
            info!(
                tenant_code = %tenant.code,
                subscription_id = %resolved.subscription_id,
                "landing matched an existing tenant"
            );
            tenant
        }
        Err(LifecycleError::NotFound) => {
            service
                .create_tenant(
                    NewTenant {
                        name: resolved.subscription_name.clone(),
                        contact_email: resolved.purchaser_email.clone().unwrap_or_default(),
                        country: String::new(),
                        marketplace: Some(MarketplacePurchase {
                            external_subscription_id: resolved.subscription_id.clone(),
                            external_tenant_id: resolved.purchaser_tenant_id.clone(),
                            plan_id: resolved.plan_id.clone(),
                            offer_id: resolved.offer_id.clone(),
                        }),
                    },
                    "marketplace",
                )
                .await?
        }
        Err(other) => return Err(other.into()),
    };

    // The marketplace will not bill until we confirm activation. Do this
    // before the local transition so a failure leaves us in PendingSetup
    // rather than Active-but-unbilled.
    client
        .activate_subscription(&resolved.subscription_id, &resolved.plan_id, resolved.quantity)
        .await?;

    let tenant = service.activate_tenant(&tenant.id, "marketplace").await?;
    info!(
        tenant_code = %tenant.code,
        subscription_id = %resolved.subscription_id,
        "landing completed"
    );
    Ok(tenant)
}
