//! Subscription records.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PlanId, SubscriptionId, TenantId};

/// Subscription status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    /// End date passed; flipped lazily when the subscription is read.
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            _ => Err(format!("invalid subscription status: {}", s)),
        }
    }
}

/// Subscription record. At most one per tenant may be `Active`.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub tenant_id: TenantId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    /// None = open-ended.
    pub end_date: Option<DateTime<Utc>>,
    pub external_subscription_id: Option<String>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Whether the end date has passed as of `now`.
    pub fn is_past_end(&self, now: DateTime<Utc>) -> bool {
        matches!(self.end_date, Some(end) if end <= now)
    }
}

/// Parameters for creating a subscription
#[derive(Clone, Debug)]
pub struct CreateSubscriptionParams {
    pub tenant_id: TenantId,
    pub plan_id: PlanId,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub external_subscription_id: Option<String>,
    pub next_billing_date: Option<DateTime<Utc>>,
}
