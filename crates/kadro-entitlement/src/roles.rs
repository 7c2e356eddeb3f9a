//! The role and permission vocabulary and the static role table.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::access::UserContext;
use crate::AccessError;

/// Roles a user can hold. One role per user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Tenant-scoped administrator. Full control within their own tenant,
    /// never across tenants.
    SuperAdmin,
    HrManager,
    DepartmentManager,
    Recruiter,
    Employee,
    /// Platform staff. Not bound to any tenant; the only role eligible for
    /// cross-tenant access.
    PlatformOperator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::HrManager => "hr_manager",
            Role::DepartmentManager => "department_manager",
            Role::Recruiter => "recruiter",
            Role::Employee => "employee",
            Role::PlatformOperator => "platform_operator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "hr_manager" => Ok(Role::HrManager),
            "department_manager" => Ok(Role::DepartmentManager),
            "recruiter" => Ok(Role::Recruiter),
            "employee" => Ok(Role::Employee),
            "platform_operator" => Ok(Role::PlatformOperator),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// Resource:action permission pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    CareerView,
    CareerManage,
    PerformanceView,
    PerformanceManage,
    PlacementView,
    PlacementManage,
    EmployeeView,
    EmployeeManage,
    TenantManage,
    BillingManage,
    AuditView,
    ReportView,
    ReportExport,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::CareerView => "career:view",
            Permission::CareerManage => "career:manage",
            Permission::PerformanceView => "performance:view",
            Permission::PerformanceManage => "performance:manage",
            Permission::PlacementView => "placement:view",
            Permission::PlacementManage => "placement:manage",
            Permission::EmployeeView => "employee:view",
            Permission::EmployeeManage => "employee:manage",
            Permission::TenantManage => "tenant:manage",
            Permission::BillingManage => "billing:manage",
            Permission::AuditView => "audit:view",
            Permission::ReportView => "report:view",
            Permission::ReportExport => "report:export",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "career:view" => Ok(Permission::CareerView),
            "career:manage" => Ok(Permission::CareerManage),
            "performance:view" => Ok(Permission::PerformanceView),
            "performance:manage" => Ok(Permission::PerformanceManage),
            "placement:view" => Ok(Permission::PlacementView),
            "placement:manage" => Ok(Permission::PlacementManage),
            "employee:view" => Ok(Permission::EmployeeView),
            "employee:manage" => Ok(Permission::EmployeeManage),
            "tenant:manage" => Ok(Permission::TenantManage),
            "billing:manage" => Ok(Permission::BillingManage),
            "audit:view" => Ok(Permission::AuditView),
            "report:view" => Ok(Permission::ReportView),
            "report:export" => Ok(Permission::ReportExport),
            _ => Err(format!("unknown permission: {}", s)),
        }
    }
}

/// The full permission set for a role.
///
/// A `match` so adding a role without deciding its permissions is a
/// compile error.
pub fn permissions_for_role(role: Role) -> &'static [Permission] {
    match role {
        Role::SuperAdmin => &[
            Permission::CareerView,
            Permission::CareerManage,
            Permission::PerformanceView,
            Permission::PerformanceManage,
            Permission::PlacementView,
            Permission::PlacementManage,
            Permission::EmployeeView,
            Permission::EmployeeManage,
            Permission::TenantManage,
            Permission::BillingManage,
            Permission::AuditView,
            Permission::ReportView,
            Permission::ReportExport,
        ],
        Role::HrManager => &[
            Permission::CareerView,
            Permission::CareerManage,
            Permission::PerformanceView,
            Permission::PerformanceManage,
            Permission::PlacementView,
            Permission::PlacementManage,
            Permission::EmployeeView,
            Permission::EmployeeManage,
            Permission::ReportView,
            Permission::ReportExport,
        ],
        Role::DepartmentManager => &[
            Permission::CareerView,
            Permission::CareerManage,
            Permission::PerformanceView,
            Permission::PerformanceManage,
            Permission::EmployeeView,
            Permission::ReportView,
        ],
        Role::Recruiter => &[
            Permission::PlacementView,
            Permission::PlacementManage,
            Permission::EmployeeView,
        ],
        Role::Employee => &[Permission::CareerView, Permission::PerformanceView],
        Role::PlatformOperator => &[
            Permission::TenantManage,
            Permission::BillingManage,
            Permission::AuditView,
        ],
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    permissions_for_role(role).contains(&permission)
}

pub fn has_any_permission(role: Role, permissions: &[Permission]) -> bool {
    permissions.iter().any(|p| has_permission(role, *p))
}

pub fn has_all_permissions(role: Role, permissions: &[Permission]) -> bool {
    permissions.iter().all(|p| has_permission(role, *p))
}

/// Check a permission and fail with the permission named in the error.
pub fn require_permission(role: Role, permission: Permission) -> Result<(), AccessError> {
    if has_permission(role, permission) {
        Ok(())
    } else {
        Err(AccessError::PermissionDenied { permission })
    }
}

/// Tenant-scoped permission check. Fails closed: a user with no tenant
/// binding has no tenant-scoped permissions at all, whatever their role.
pub fn has_tenant_permission(user: &UserContext, permission: Permission) -> bool {
    user.tenant_id.is_some() && has_permission(user.role, permission)
}

/// Whether a user may touch resources outside their own tenant.
///
/// Only an unbound `PlatformOperator` qualifies. A tenant-bound
/// `SuperAdmin` is an administrator of one tenant, not of the platform.
pub fn can_access_cross_tenant(user: &UserContext) -> bool {
    user.role == Role::PlatformOperator && user.tenant_id.is_none()
}
