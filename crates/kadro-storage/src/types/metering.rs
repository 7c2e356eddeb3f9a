//! Usage metering records.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MeteringRecordId, SubscriptionId, TenantId};

/// Billable usage dimension reported to the marketplace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeteringDimension {
    ActiveUsers,
    StorageGb,
    ApiCalls,
    AiRequests,
    LicenseVerifications,
}

impl MeteringDimension {
    /// Dimension code on the marketplace wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeteringDimension::ActiveUsers => "active_users",
            MeteringDimension::StorageGb => "storage_gb",
            MeteringDimension::ApiCalls => "api_calls",
            MeteringDimension::AiRequests => "ai_requests",
            MeteringDimension::LicenseVerifications => "license_verifications",
        }
    }
}

impl std::fmt::Display for MeteringDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MeteringDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active_users" => Ok(MeteringDimension::ActiveUsers),
            "storage_gb" => Ok(MeteringDimension::StorageGb),
            "api_calls" => Ok(MeteringDimension::ApiCalls),
            "ai_requests" => Ok(MeteringDimension::AiRequests),
            "license_verifications" => Ok(MeteringDimension::LicenseVerifications),
            _ => Err(format!("invalid metering dimension: {}", s)),
        }
    }
}

/// Reporting status of a metering record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeteringStatus {
    Pending,
    Reported,
    /// Batch call failed; retryable until the attempt budget runs out.
    Rejected,
}

impl MeteringStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeteringStatus::Pending => "pending",
            MeteringStatus::Reported => "reported",
            MeteringStatus::Rejected => "rejected",
        }
    }
}

/// Usage metering record
#[derive(Clone, Debug)]
pub struct MeteringRecord {
    pub id: MeteringRecordId,
    pub tenant_id: TenantId,
    pub subscription_id: SubscriptionId,
    pub dimension: MeteringDimension,
    pub quantity: f64,
    pub effective_start_time: DateTime<Utc>,
    pub status: MeteringStatus,
    pub error: Option<String>,
    /// Failed report attempts so far.
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a metering record
#[derive(Clone, Debug)]
pub struct CreateMeteringRecordParams {
    pub tenant_id: TenantId,
    pub subscription_id: SubscriptionId,
    pub dimension: MeteringDimension,
    pub quantity: f64,
    pub effective_start_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_roundtrip() {
        for dim in [
            MeteringDimension::ActiveUsers,
            MeteringDimension::StorageGb,
            MeteringDimension::ApiCalls,
            MeteringDimension::AiRequests,
            MeteringDimension::LicenseVerifications,
        ] {
            let parsed: MeteringDimension = dim.as_str().parse().unwrap();
            assert_eq!(dim, parsed);
        }
    }

    #[test]
    fn test_dimension_parse_invalid() {
        assert!("seats".parse::<MeteringDimension>().is_err());
    }
}
