//! Plan reference data.
//!
//! Plans are immutable from a tenant's perspective; the catalog is loaded
//! once at startup and shared read-only across all callers.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PlanId;

/// Billing cycle for a plan
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Annually,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Annually => "annually",
        }
    }
}

impl FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "quarterly" => Ok(BillingCycle::Quarterly),
            "annually" => Ok(BillingCycle::Annually),
            _ => Err(format!("invalid billing cycle: {}", s)),
        }
    }
}

/// Usage limits per plan
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_users: u32,
    pub storage_gb: u32,
    pub api_calls_per_month: u64,
}

/// Plan record (reference data)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub code: String,
    pub billing_cycle: BillingCycle,
    /// Module codes enabled by this plan, in display order.
    pub modules: Vec<String>,
    pub limits: PlanLimits,
    pub rate_limit_tier: u8,
}

impl Plan {
    pub fn has_module(&self, feature_code: &str) -> bool {
        self.modules.iter().any(|m| m == feature_code)
    }
}
