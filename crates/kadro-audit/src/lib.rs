//! Audit logging abstraction for kadro.
//!
//! This crate defines the `AuditSink` trait for persisting audit events
//! and the types representing auditable actions in the tenant core.

mod memory;

pub use memory::MemoryAuditSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use kadro_storage::{SubscriptionId, TenantId};

/// Unique identifier for an audit event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEventId(pub Uuid);

impl AuditEventId {
    /// Generate a new audit event ID using UUID v7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditEventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AuditEventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Categories of auditable actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Tenant lifecycle
    TenantCreated,
    TenantActivated,
    TenantSuspended,
    TenantCancelled,
    TenantTrialExpired,

    // Subscriptions
    SubscriptionCreated,
    SubscriptionCancelled,

    // Entitlements
    FeatureOverridden,

    // Marketplace protocol
    WebhookReceived,
    WebhookFailed,
    UsageReported,
    UsageRejected,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::TenantCreated => "tenant.created",
            AuditAction::TenantActivated => "tenant.activated",
            AuditAction::TenantSuspended => "tenant.suspended",
            AuditAction::TenantCancelled => "tenant.cancelled",
            AuditAction::TenantTrialExpired => "tenant.trial_expired",
            AuditAction::SubscriptionCreated => "subscription.created",
            AuditAction::SubscriptionCancelled => "subscription.cancelled",
            AuditAction::FeatureOverridden => "feature.overridden",
            AuditAction::WebhookReceived => "webhook.received",
            AuditAction::WebhookFailed => "webhook.failed",
            AuditAction::UsageReported => "usage.reported",
            AuditAction::UsageRejected => "usage.rejected",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tenant.created" => Ok(AuditAction::TenantCreated),
            "tenant.activated" => Ok(AuditAction::TenantActivated),
            "tenant.suspended" => Ok(AuditAction::TenantSuspended),
            "tenant.cancelled" => Ok(AuditAction::TenantCancelled),
            "tenant.trial_expired" => Ok(AuditAction::TenantTrialExpired),
            "subscription.created" => Ok(AuditAction::SubscriptionCreated),
            "subscription.cancelled" => Ok(AuditAction::SubscriptionCancelled),
            "feature.overridden" => Ok(AuditAction::FeatureOverridden),
            "webhook.received" => Ok(AuditAction::WebhookReceived),
            "webhook.failed" => Ok(AuditAction::WebhookFailed),
            "usage.reported" => Ok(AuditAction::UsageReported),
            "usage.rejected" => Ok(AuditAction::UsageRejected),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

/// Severity of an audit event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    /// Something needs operator attention, e.g. a webhook the system could
    /// not apply.
    Critical,
}

impl std::fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AuditSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AuditSeverity::Info),
            "warning" => Ok(AuditSeverity::Warning),
            "critical" => Ok(AuditSeverity::Critical),
            _ => Err(format!("Unknown audit severity: {}", s)),
        }
    }
}

/// An audit log entry representing a single auditable action.
///
/// Uses raw UUIDs for serialization compatibility. Use the builder
/// to construct events from typed IDs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for this audit entry
    pub id: AuditEventId,
    /// When the action occurred
    pub timestamp: DateTime<Utc>,
    /// Who performed the action ("system", "marketplace", "trial-monitor",
    /// or a user id)
    pub actor: String,
    /// The action that was performed
    pub action: AuditAction,
    pub severity: AuditSeverity,
    /// Tenant context (if applicable)
    pub tenant_id: Option<Uuid>,
    /// Subscription context (if applicable)
    pub subscription_id: Option<Uuid>,
    /// Type of resource affected (e.g., "tenant", "subscription", "webhook")
    pub resource_type: String,
    /// Identifier of the affected resource
    pub resource_id: String,
    /// Error message or additional context
    pub reason: Option<String>,
    /// Additional details as JSON (e.g., webhook payload, old/new status)
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    /// Create a new audit event builder
    pub fn builder(actor: impl Into<String>, action: AuditAction) -> AuditEventBuilder {
        AuditEventBuilder::new(actor, action)
    }

    /// Get the tenant ID as a typed ID (if present)
    pub fn get_tenant_id(&self) -> Option<TenantId> {
        self.tenant_id.map(TenantId)
    }

    /// Get the subscription ID as a typed ID (if present)
    pub fn get_subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription_id.map(SubscriptionId)
    }
}

/// Builder for constructing audit events
pub struct AuditEventBuilder {
    actor: String,
    action: AuditAction,
    severity: AuditSeverity,
    tenant_id: Option<Uuid>,
    subscription_id: Option<Uuid>,
    resource_type: String,
    resource_id: String,
    reason: Option<String>,
    details: Option<serde_json::Value>,
}

impl AuditEventBuilder {
    pub fn new(actor: impl Into<String>, action: AuditAction) -> Self {
        Self {
            actor: actor.into(),
            action,
            severity: AuditSeverity::Info,
            tenant_id: None,
            subscription_id: None,
            resource_type: String::new(),
            resource_id: String::new(),
            reason: None,
            details: None,
        }
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn tenant_id(mut self, tenant_id: Option<&TenantId>) -> Self {
        self.tenant_id = tenant_id.map(|t| t.0);
        self
    }

    pub fn subscription_id(mut self, subscription_id: Option<&SubscriptionId>) -> Self {
        self.subscription_id = subscription_id.map(|s| s.0);
        self
    }

    pub fn resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = resource_type.into();
        self.resource_id = resource_id.into();
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: AuditEventId::new(),
            timestamp: Utc::now(),
            actor: self.actor,
            action: self.action,
            severity: self.severity,
            tenant_id: self.tenant_id,
            subscription_id: self.subscription_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            reason: self.reason,
            details: self.details,
        }
    }
}

/// Filter for querying audit events
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    /// Filter by tenant ID
    pub tenant_id: Option<TenantId>,
    /// Filter by action
    pub action: Option<AuditAction>,
    /// Filter by severity
    pub severity: Option<AuditSeverity>,
    /// Filter by start timestamp (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// Filter by end timestamp (exclusive)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of results to return
    pub limit: Option<u32>,
    /// Number of results to skip (for pagination)
    pub offset: Option<u32>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant_id(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Error type for audit sink operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("audit event not found: {0}")]
    NotFound(AuditEventId),
}

/// Trait for audit event persistence.
///
/// Implementations store audit events and provide query capabilities
/// for compliance and operator review.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    ///
    /// This is called after each auditable operation commits. Failures to
    /// record should be logged by the caller but must not fail the main
    /// operation.
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Query audit events with optional filters.
    ///
    /// Returns events matching the filter criteria, ordered by timestamp descending.
    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError>;

    /// Get a specific audit event by ID.
    async fn get(&self, id: AuditEventId) -> Result<AuditEvent, AuditError>;

    /// Count audit events matching the filter criteria.
    async fn count(&self, filter: AuditFilter) -> Result<u64, AuditError>;
}
