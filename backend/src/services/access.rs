//! Access policy checked by the sale orchestrator before it reserves stock

use std::collections::HashMap;

use pharmaflow_shared::{Permission, Role};

use crate::error::{SaleError, SaleResult};

/// Decides whether an actor may perform an action
pub trait AccessPolicy: Send + Sync {
    fn authorize(&self, actor_id: i64, permission: Permission) -> SaleResult<()>;
}

/// Policy for callers whose authorization gate already ran upstream
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn authorize(&self, _actor_id: i64, _permission: Permission) -> SaleResult<()> {
        Ok(())
    }
}

/// Role-based policy over a fixed actor directory
#[derive(Debug, Clone, Default)]
pub struct RoleAccessPolicy {
    roles: HashMap<i64, Role>,
}

impl RoleAccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `role` to `actor_id`
    pub fn with_role(mut self, actor_id: i64, role: Role) -> Self {
        self.roles.insert(actor_id, role);
        self
    }

    pub fn role_of(&self, actor_id: i64) -> Option<Role> {
        self.roles.get(&actor_id).copied()
    }
}

impl AccessPolicy for RoleAccessPolicy {
    fn authorize(&self, actor_id: i64, permission: Permission) -> SaleResult<()> {
        match self.role_of(actor_id) {
            Some(role) if role.has_permission(permission) => Ok(()),
            Some(role) => Err(SaleError::InsufficientPermissions(format!(
                "role {} lacks {}",
                role.as_str(),
                permission.as_str()
            ))),
            None => Err(SaleError::InsufficientPermissions(format!(
                "unknown actor {}",
                actor_id
            ))),
        }
    }
}
