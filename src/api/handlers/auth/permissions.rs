//! Roles, hierarchical levels and derived permissions.
//!
//! Nothing here is persisted. A [`Permissions`] value is recomputed from the
//! employee role, level and organizational scope every time it is needed, using
//! the organization tree from [`OrgDirectory`] to expand franchise scopes into
//! their centers.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

use crate::api::error::{ApiError, StatsKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Director,
    Manager,
    Technician,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Director => "DIRECTOR",
            Self::Manager => "MANAGER",
            Self::Technician => "TECHNICIAN",
            Self::Assistant => "ASSISTANT",
        }
    }

    /// Position in the hierarchy, higher ranks outrank lower ones.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Admin => 5,
            Self::Director => 4,
            Self::Manager => 3,
            Self::Technician => 2,
            Self::Assistant => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ADMIN" => Ok(Self::Admin),
            "DIRECTOR" => Ok(Self::Director),
            "MANAGER" => Ok(Self::Manager),
            "TECHNICIAN" => Ok(Self::Technician),
            "ASSISTANT" => Ok(Self::Assistant),
            other => Err(ApiError::InvalidRole {
                role: Some(other.to_string()),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Headquarters,
    Franchise,
    Center,
}

impl Level {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Headquarters => "HEADQUARTERS",
            Self::Franchise => "FRANCHISE",
            Self::Center => "CENTER",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "HEADQUARTERS" => Ok(Self::Headquarters),
            "FRANCHISE" => Ok(Self::Franchise),
            "CENTER" => Ok(Self::Center),
            other => Err(ApiError::InvalidLevel {
                level: Some(other.to_string()),
            }),
        }
    }
}

/// Where an employee sits in the organization tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    pub site_id: Option<i64>,
    pub franchise_id: Option<i64>,
    pub center_id: Option<i64>,
}

/// A franchise and the centers it operates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FranchiseUnit {
    pub id: i64,
    pub center_ids: Vec<i64>,
}

/// Read access to the organization tree.
#[async_trait]
pub trait OrgDirectory: Send + Sync {
    /// Every franchise with its centers, ordered by franchise id.
    async fn franchises(&self) -> Result<Vec<FranchiseUnit>>;
}

/// Capability flags and access perimeter of an employee.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub can_manage_franchises: bool,
    pub can_manage_centers: bool,
    pub can_manage_employees: bool,
    pub can_create_dossiers: bool,
    pub can_edit_dossiers: bool,
    pub can_delete_dossiers: bool,
    pub can_view_all_dossiers: bool,
    pub can_manage_stock: bool,
    pub can_view_stats: bool,
    pub can_view_all_stats: bool,
    pub accessible_center_ids: Vec<i64>,
    pub accessible_franchise_ids: Vec<i64>,
}

impl Permissions {
    #[must_use]
    pub fn can_access_center(&self, center_id: i64) -> bool {
        self.accessible_center_ids.contains(&center_id)
    }

    #[must_use]
    pub fn can_access_franchise(&self, franchise_id: i64) -> bool {
        self.accessible_franchise_ids.contains(&franchise_id)
    }
}

/// Derive the permission set of an employee.
///
/// Headquarters reaches every franchise and center, a franchise level employee
/// reaches its franchise and the centers under it, a center level employee
/// reaches only its own center. A missing scope id yields an empty perimeter.
#[must_use]
pub fn derive_permissions(
    role: Role,
    level: Level,
    scope: Scope,
    franchises: &[FranchiseUnit],
) -> Permissions {
    use Role::{Admin, Assistant, Director, Manager, Technician};

    let headquarters = level == Level::Headquarters;
    let above_center = matches!(level, Level::Headquarters | Level::Franchise);

    let (accessible_franchise_ids, accessible_center_ids) = match level {
        Level::Headquarters => (
            franchises.iter().map(|franchise| franchise.id).collect(),
            franchises
                .iter()
                .flat_map(|franchise| franchise.center_ids.iter().copied())
                .collect(),
        ),
        Level::Franchise => match scope.franchise_id {
            Some(franchise_id) => (
                vec![franchise_id],
                franchises
                    .iter()
                    .filter(|franchise| franchise.id == franchise_id)
                    .flat_map(|franchise| franchise.center_ids.iter().copied())
                    .collect(),
            ),
            None => (Vec::new(), Vec::new()),
        },
        Level::Center => (Vec::new(), scope.center_id.into_iter().collect()),
    };

    Permissions {
        can_manage_franchises: role == Admin && headquarters,
        can_manage_centers: matches!(role, Admin | Director) && above_center,
        can_manage_employees: matches!(role, Admin | Director | Manager),
        can_create_dossiers: true,
        can_edit_dossiers: role != Assistant,
        can_delete_dossiers: matches!(role, Admin | Director),
        can_view_all_dossiers: matches!(role, Admin | Director | Manager),
        can_manage_stock: matches!(role, Admin | Director | Manager | Technician),
        can_view_stats: matches!(role, Admin | Director | Manager),
        can_view_all_stats: matches!(role, Admin | Director) && headquarters,
        accessible_center_ids,
        accessible_franchise_ids,
    }
}

/// Fail with `INSUFFICIENT_ROLE` unless `role` is one of `allowed`.
pub fn require_role(role: Role, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(ApiError::InsufficientRole {
            required: allowed.to_vec(),
            current: Some(role),
        })
    }
}

pub fn ensure_center_access(permissions: &Permissions, center_id: i64) -> Result<(), ApiError> {
    if permissions.can_access_center(center_id) {
        Ok(())
    } else {
        Err(ApiError::CenterAccessDenied {
            center_id: Some(center_id),
            center_name: None,
        })
    }
}

pub fn ensure_franchise_access(
    permissions: &Permissions,
    franchise_id: i64,
) -> Result<(), ApiError> {
    if permissions.can_access_franchise(franchise_id) {
        Ok(())
    } else {
        Err(ApiError::FranchiseAccessDenied {
            franchise_id: Some(franchise_id),
            franchise_name: None,
        })
    }
}

/// Check access to a statistics family.
///
/// Global statistics need `can_view_all_stats`; center and franchise statistics
/// need `can_view_stats` plus the target in the perimeter. Employee statistics
/// are always readable by the employee themself.
pub fn ensure_stats_access(
    permissions: &Permissions,
    kind: StatsKind,
    target_id: Option<i64>,
    self_id: i64,
) -> Result<(), ApiError> {
    let allowed = match kind {
        StatsKind::Global => permissions.can_view_all_stats,
        StatsKind::Franchise => {
            permissions.can_view_stats
                && target_id.is_some_and(|id| permissions.can_access_franchise(id))
        }
        StatsKind::Center => {
            permissions.can_view_stats
                && target_id.is_some_and(|id| permissions.can_access_center(id))
        }
        StatsKind::Employee => target_id == Some(self_id) || permissions.can_view_stats,
    };

    if allowed {
        Ok(())
    } else {
        Err(ApiError::StatsAccessDenied {
            kind: Some(kind),
            target_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorKind;

    fn tree() -> Vec<FranchiseUnit> {
        vec![
            FranchiseUnit {
                id: 1,
                center_ids: vec![10, 11],
            },
            FranchiseUnit {
                id: 2,
                center_ids: vec![20],
            },
        ]
    }

    fn scope(franchise_id: Option<i64>, center_id: Option<i64>) -> Scope {
        Scope {
            site_id: Some(1),
            franchise_id,
            center_id,
        }
    }

    #[test]
    fn roles_and_levels_parse_database_values() {
        assert_eq!("ADMIN".parse::<Role>().ok(), Some(Role::Admin));
        assert_eq!("ASSISTANT".parse::<Role>().ok(), Some(Role::Assistant));
        assert_eq!("CENTER".parse::<Level>().ok(), Some(Level::Center));

        let err = "admin".parse::<Role>().err();
        assert_eq!(err.map(|err| err.kind()), Some(ErrorKind::InvalidRole));

        let err = "REGION".parse::<Level>().err();
        assert!(matches!(
            err,
            Some(ApiError::InvalidLevel { level: Some(ref level) }) if level == "REGION"
        ));
    }

    #[test]
    fn headquarters_admin_reaches_everything() {
        let permissions = derive_permissions(Role::Admin, Level::Headquarters, scope(None, None), &tree());

        assert!(permissions.can_manage_franchises);
        assert!(permissions.can_manage_centers);
        assert!(permissions.can_view_all_stats);
        assert_eq!(permissions.accessible_franchise_ids, vec![1, 2]);
        assert_eq!(permissions.accessible_center_ids, vec![10, 11, 20]);
    }

    #[test]
    fn franchise_director_reaches_its_centers_only() {
        let permissions =
            derive_permissions(Role::Director, Level::Franchise, scope(Some(1), None), &tree());

        assert!(!permissions.can_manage_franchises);
        assert!(permissions.can_manage_centers);
        assert!(permissions.can_delete_dossiers);
        assert!(!permissions.can_view_all_stats);
        assert_eq!(permissions.accessible_franchise_ids, vec![1]);
        assert_eq!(permissions.accessible_center_ids, vec![10, 11]);
        assert!(ensure_center_access(&permissions, 20).is_err());
        assert!(ensure_franchise_access(&permissions, 1).is_ok());
    }

    #[test]
    fn center_assistant_has_minimal_rights() {
        let permissions =
            derive_permissions(Role::Assistant, Level::Center, scope(Some(1), Some(11)), &tree());

        assert_eq!(
            permissions,
            Permissions {
                can_create_dossiers: true,
                accessible_center_ids: vec![11],
                ..Permissions::default()
            }
        );
    }

    #[test]
    fn technician_manages_stock_but_not_employees() {
        let permissions =
            derive_permissions(Role::Technician, Level::Center, scope(None, Some(10)), &tree());
        assert!(permissions.can_manage_stock);
        assert!(permissions.can_edit_dossiers);
        assert!(!permissions.can_manage_employees);
        assert!(!permissions.can_view_stats);
    }

    #[test]
    fn missing_scope_yields_empty_perimeter() {
        let permissions = derive_permissions(Role::Manager, Level::Franchise, Scope::default(), &tree());
        assert!(permissions.accessible_center_ids.is_empty());
        assert!(permissions.accessible_franchise_ids.is_empty());
    }

    #[test]
    fn require_role_reports_allowed_and_current() {
        assert!(require_role(Role::Manager, &[Role::Admin, Role::Manager]).is_ok());

        match require_role(Role::Assistant, &[Role::Admin]) {
            Err(ApiError::InsufficientRole { required, current }) => {
                assert_eq!(required, vec![Role::Admin]);
                assert_eq!(current, Some(Role::Assistant));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn center_denial_carries_the_center_id() {
        let permissions = Permissions::default();
        match ensure_center_access(&permissions, 42) {
            Err(ApiError::CenterAccessDenied { center_id, .. }) => assert_eq!(center_id, Some(42)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn stats_access_follows_perimeter() {
        let director = derive_permissions(Role::Director, Level::Franchise, scope(Some(1), None), &tree());
        assert!(ensure_stats_access(&director, StatsKind::Center, Some(10), 7).is_ok());
        assert!(ensure_stats_access(&director, StatsKind::Franchise, Some(2), 7).is_err());
        assert!(ensure_stats_access(&director, StatsKind::Global, None, 7).is_err());

        let assistant = derive_permissions(Role::Assistant, Level::Center, scope(None, Some(10)), &tree());
        assert!(ensure_stats_access(&assistant, StatsKind::Employee, Some(7), 7).is_ok());
        match ensure_stats_access(&assistant, StatsKind::Employee, Some(8), 7) {
            Err(ApiError::StatsAccessDenied { kind, target_id }) => {
                assert_eq!(kind, Some(StatsKind::Employee));
                assert_eq!(target_id, Some(8));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
