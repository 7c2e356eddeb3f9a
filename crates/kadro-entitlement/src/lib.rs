//! Role and permission resolution for kadro.
//!
//! Permissions are a total function of role: every role maps to a fixed
//! static set, nothing is implicit, and there is no inheritance between
//! roles. Unknown or missing context always resolves to "denied".
//!
//! The crate also carries the tenant access gate used in front of every
//! tenant-scoped request. The gate checks, in order: the tenant exists,
//! the tenant is in good standing, the tenant is paid up, and only then
//! the caller's role. The ordering is observable through the error the
//! caller gets back.

mod access;
mod roles;

pub use access::{validate_resource_ownership, validate_tenant_access, UserContext};
pub use roles::{
    can_access_cross_tenant, has_all_permissions, has_any_permission, has_permission,
    has_tenant_permission, permissions_for_role, require_permission, Permission, Role,
};

use thiserror::Error;

use kadro_storage::StoreError;

/// Access control failure taxonomy.
///
/// The variant distinguishes "you cannot see this" (`NotFound`), "you may
/// not do this" (`Forbidden` / `PermissionDenied`), and "pay first"
/// (`PaymentRequired`). Callers map these onto their transport directly.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("payment required: {0}")]
    PaymentRequired(String),

    #[error("permission denied: {permission}")]
    PermissionDenied { permission: Permission },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("external service error: {0}")]
    External(String),
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AccessError::NotFound,
            StoreError::Conflict | StoreError::AlreadyExists => {
                AccessError::Conflict(err.to_string())
            }
            StoreError::Backend(msg) => AccessError::External(msg),
        }
    }
}
