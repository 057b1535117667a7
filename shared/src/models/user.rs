//! Role and permission models

use serde::{Deserialize, Serialize};

/// Staff roles of the pharmacy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    Pharmacist,
    Researcher,
}

/// Permissions checked before an operation runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    InventoryRead,
    InventoryCreate,
    InventoryUpdate,
    InventoryDelete,
    SalesRead,
    SalesCreate,
    SalesCancel,
    UsersRead,
    UsersCreate,
    UsersUpdate,
    UsersDelete,
    TrialsRead,
    TrialsCreate,
    TrialsUpdate,
    ReportsGenerate,
    AuditRead,
}

impl Permission {
    /// Permission name as stored in the permissions table
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::InventoryRead => "inventory_read",
            Permission::InventoryCreate => "inventory_create",
            Permission::InventoryUpdate => "inventory_update",
            Permission::InventoryDelete => "inventory_delete",
            Permission::SalesRead => "sales_read",
            Permission::SalesCreate => "sales_create",
            Permission::SalesCancel => "sales_cancel",
            Permission::UsersRead => "users_read",
            Permission::UsersCreate => "users_create",
            Permission::UsersUpdate => "users_update",
            Permission::UsersDelete => "users_delete",
            Permission::TrialsRead => "trials_read",
            Permission::TrialsCreate => "trials_create",
            Permission::TrialsUpdate => "trials_update",
            Permission::ReportsGenerate => "reports_generate",
            Permission::AuditRead => "audit_read",
        }
    }

    /// Resource part of the permission name, used for audit records
    pub fn resource(&self) -> &'static str {
        let name = self.as_str();
        name.split('_').next().unwrap_or(name)
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Pharmacist => "pharmacist",
            Role::Researcher => "researcher",
        }
    }

    /// Permissions granted to the role
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Manager => &[
                InventoryRead,
                InventoryCreate,
                InventoryUpdate,
                InventoryDelete,
                SalesRead,
                SalesCreate,
                SalesCancel,
                UsersRead,
                UsersCreate,
                UsersUpdate,
                UsersDelete,
                TrialsRead,
                TrialsCreate,
                TrialsUpdate,
                ReportsGenerate,
                AuditRead,
            ],
            Role::Pharmacist => &[
                InventoryRead,
                InventoryUpdate,
                SalesRead,
                SalesCreate,
                TrialsRead,
            ],
            Role::Researcher => &[
                InventoryRead,
                SalesRead,
                TrialsRead,
                TrialsCreate,
                TrialsUpdate,
            ],
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}
