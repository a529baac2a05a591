//! Authentication types.

use chrono::Utc;
use citadel_common_core::{Principal, Role, TenantId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Tenant the user belongs to; absent for platform operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub role: Role,
    pub token_type: TokenType,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
    /// JWT ID (for revocation).
    pub jti: String,
}

/// Token type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

impl Claims {
    /// Create new access token claims.
    pub fn new_access(principal: &Principal, expires_in: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: principal.user_id.as_uuid().to_string(),
            tenant_id: principal.tenant_id.map(|t| t.setting_value()),
            role: principal.role,
            token_type: TokenType::Access,
            iat: now,
            exp: now + expires_in,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Check if token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// The principal these claims describe, if the identifiers parse.
    pub fn principal(&self) -> Option<Principal> {
        let user_id = UserId::parse(&self.sub).ok()?;
        match &self.tenant_id {
            Some(tenant) => {
                let tenant_id = TenantId::parse(tenant).ok()?;
                Some(Principal::tenant(user_id, tenant_id, self.role))
            }
            None => Some(Principal::global(user_id, self.role)),
        }
    }
}
