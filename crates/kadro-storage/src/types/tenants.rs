//! Tenant records and the lifecycle status enum.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TenantId;

/// Tenant lifecycle status.
///
/// `Cancelled` is terminal. `Expired` (a trial that lapsed without
/// activation) is terminal for access purposes but reactivatable: a
/// completed checkout moves the tenant back to `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Trial,
    PendingSetup,
    Active,
    Suspended,
    Cancelled,
    Expired,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Trial => "trial",
            TenantStatus::PendingSetup => "pending_setup",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Cancelled => "cancelled",
            TenantStatus::Expired => "expired",
        }
    }

    /// Whether the tenant may enter the platform at all.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            TenantStatus::Trial | TenantStatus::PendingSetup | TenantStatus::Active
        )
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(TenantStatus::Trial),
            "pending_setup" => Ok(TenantStatus::PendingSetup),
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "cancelled" => Ok(TenantStatus::Cancelled),
            "expired" => Ok(TenantStatus::Expired),
            _ => Err(format!("invalid tenant status: {}", s)),
        }
    }
}

/// Tenant record (billing and isolation unit).
///
/// `version` is bumped by the store on every successful update and checked
/// against the caller's expected version, serializing concurrent
/// transitions on a single tenant.
#[derive(Clone, Debug)]
pub struct Tenant {
    pub id: TenantId,
    /// Externally stable, URL-safe code used in links and onboarding.
    pub code: String,
    pub name: String,
    pub contact_email: String,
    pub country: String,
    pub status: TenantStatus,
    /// Subscription id on the marketplace side, if purchased there.
    pub external_subscription_id: Option<String>,
    /// Purchaser tenant id on the marketplace side.
    pub external_tenant_id: Option<String>,
    pub purchase_plan_id: Option<String>,
    pub purchase_offer_id: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Parameters for creating a tenant
#[derive(Clone, Debug)]
pub struct CreateTenantParams {
    pub code: String,
    pub name: String,
    pub contact_email: String,
    pub country: String,
    pub status: TenantStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub external_subscription_id: Option<String>,
    pub external_tenant_id: Option<String>,
    pub purchase_plan_id: Option<String>,
    pub purchase_offer_id: Option<String>,
}

/// Per-tenant feature override; `is_override = true` beats plan entitlement.
#[derive(Clone, Debug)]
pub struct FeatureOverride {
    pub tenant_id: TenantId,
    pub feature_code: String,
    pub enabled: bool,
    pub is_override: bool,
    pub updated_at: DateTime<Utc>,
}
