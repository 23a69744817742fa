/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Two roles exist on the floor. Operators read reference data and record
 * production; administrators manage everything else. Routes are guarded by
 * permission strings so a role's reach is declared in one table.
 */

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

pub mod permissions {
    pub const REFERENCE_READ: &str = "reference:read";
    pub const REFERENCE_WRITE: &str = "reference:write";
    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_WRITE: &str = "orders:write";
    pub const ORDERS_IMPORT: &str = "orders:import";
    pub const TRACKING_READ: &str = "tracking:read";
    pub const TRACKING_WRITE: &str = "tracking:write";
    pub const USERS_MANAGE: &str = "users:manage";
    pub const DASHBOARD_READ: &str = "dashboard:read";
}

const OPERATOR_PERMISSIONS: &[&str] = &[
    permissions::REFERENCE_READ,
    permissions::ORDERS_READ,
    permissions::TRACKING_READ,
    permissions::TRACKING_WRITE,
];

const ADMIN_PERMISSIONS: &[&str] = &[
    permissions::REFERENCE_READ,
    permissions::REFERENCE_WRITE,
    permissions::ORDERS_READ,
    permissions::ORDERS_WRITE,
    permissions::ORDERS_IMPORT,
    permissions::TRACKING_READ,
    permissions::TRACKING_WRITE,
    permissions::USERS_MANAGE,
    permissions::DASHBOARD_READ,
];

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[sea_orm(string_value = "OPERATOR")]
    Operator,
    #[sea_orm(string_value = "ADMIN")]
    Admin,
}

impl Role {
    pub fn permissions(self) -> &'static [&'static str] {
        match self {
            Role::Operator => OPERATOR_PERMISSIONS,
            Role::Admin => ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(self, permission: &str) -> bool {
        self.permissions().contains(&permission)
    }

    /// Administrators must always authenticate with a password.
    pub fn requires_password(self) -> bool {
        matches!(self, Role::Admin)
    }
}
