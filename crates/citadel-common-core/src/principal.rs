//! The authenticated principal.

use crate::{Error, TenantId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse role carried by a principal.
///
/// Role checks are thin route guards; data confinement is enforced by the
/// tenant binding and database policies, never by the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator working across tenants.
    PlatformAdmin,
    /// Administrator of a single tenant.
    TenantAdmin,
    /// Regular tenant user.
    Member,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlatformAdmin => "platform_admin",
            Self::TenantAdmin => "tenant_admin",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform_admin" => Ok(Self::PlatformAdmin),
            "tenant_admin" => Ok(Self::TenantAdmin),
            "member" => Ok(Self::Member),
            other => Err(Error::UnknownRole(other.to_string())),
        }
    }
}

/// Identity produced by authentication and consumed, never re-verified, by the
/// tenant scope.
///
/// `tenant_id` is absent for principals acting without tenant context, such as
/// a platform administrator on global endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub tenant_id: Option<TenantId>,
    pub role: Role,
}

impl Principal {
    /// Principal bound to a tenant.
    pub fn tenant(user_id: UserId, tenant_id: TenantId, role: Role) -> Self {
        Self {
            user_id,
            tenant_id: Some(tenant_id),
            role,
        }
    }

    /// Principal without tenant context.
    pub fn global(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            tenant_id: None,
            role,
        }
    }

    pub fn is_platform_admin(&self) -> bool {
        self.role == Role::PlatformAdmin
    }

    /// Same identity acting inside another tenant.
    pub fn assume_tenant(&self, tenant_id: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..self.clone()
        }
    }
}
