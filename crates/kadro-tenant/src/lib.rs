//! Tenant lifecycle core for kadro.
//!
//! This crate owns the tenant state machine, plan/feature entitlement
//! resolution, usage metering batching, and trial expiration. It is
//! storage-agnostic: everything runs against the [`kadro_storage::Store`]
//! trait and appends to an [`kadro_audit::AuditSink`].

mod catalog;
mod metering;
mod service;
mod trial;

pub use catalog::{PlanCatalog, TrialPolicy};
pub use metering::{
    BatchOutcome, MeteringBatcher, UsageEvent, UsageReportError, UsageReporter,
};
pub use service::{MarketplacePurchase, NewTenant, TenantService};
pub use trial::{MemoryTrialNotifier, SweepOutcome, TrialMonitor, TrialNotification, TrialNotifier};

use thiserror::Error;

use kadro_storage::{StoreError, TenantStatus};

/// Errors from tenant lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("tenant not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    /// Concurrent writer won the version race. Safe to retry; marketplace
    /// webhooks redeliver on their own.
    #[error("conflict: concurrent update")]
    Conflict,

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: TenantStatus,
        to: TenantStatus,
    },

    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    #[error("no active subscription")]
    NoActiveSubscription,

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => LifecycleError::NotFound,
            StoreError::AlreadyExists => LifecycleError::AlreadyExists,
            StoreError::Conflict => LifecycleError::Conflict,
            StoreError::Backend(msg) => LifecycleError::Storage(msg),
        }
    }
}
