//! Who may install and debug plugins in a workspace

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audience allowed to perform a plugin action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Everyone,
    Admins,
    Noone,
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionType::Everyone => write!(f, "everyone"),
            PermissionType::Admins => write!(f, "admins"),
            PermissionType::Noone => write!(f, "noone"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub install_permission: PermissionType,
    pub debug_permission: PermissionType,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            install_permission: PermissionType::Everyone,
            debug_permission: PermissionType::Everyone,
        }
    }
}

/// The caller's role in the current workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    Owner,
    Admin,
    Editor,
    Normal,
    DatasetOperator,
}

impl WorkspaceRole {
    pub fn is_manager(self) -> bool {
        matches!(self, WorkspaceRole::Owner | WorkspaceRole::Admin)
    }
}

impl fmt::Display for WorkspaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkspaceRole::Owner => "owner",
            WorkspaceRole::Admin => "admin",
            WorkspaceRole::Editor => "editor",
            WorkspaceRole::Normal => "normal",
            WorkspaceRole::DatasetOperator => "dataset_operator",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkspaceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(WorkspaceRole::Owner),
            "admin" => Ok(WorkspaceRole::Admin),
            "editor" => Ok(WorkspaceRole::Editor),
            "normal" => Ok(WorkspaceRole::Normal),
            "dataset_operator" => Ok(WorkspaceRole::DatasetOperator),
            other => Err(format!("unknown workspace role '{}'", other)),
        }
    }
}

fn allowed(permission: PermissionType, role: WorkspaceRole) -> bool {
    if role.is_manager() {
        permission != PermissionType::Noone
    } else {
        permission == PermissionType::Everyone
    }
}

impl Permissions {
    /// May install, upgrade, uninstall and watch tasks
    pub fn can_manage(&self, role: WorkspaceRole) -> bool {
        allowed(self.install_permission, role)
    }

    pub fn can_debug(&self, role: WorkspaceRole) -> bool {
        allowed(self.debug_permission, role)
    }
}

/// Whether `role` may manage plugins under `permissions`
pub fn can_manage(permissions: &Permissions, role: WorkspaceRole) -> bool {
    permissions.can_manage(role)
}

/// Whether `role` may debug plugins under `permissions`
pub fn can_debug(permissions: &Permissions, role: WorkspaceRole) -> bool {
    permissions.can_debug(role)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(install: PermissionType) -> Permissions {
        Permissions {
            install_permission: install,
            debug_permission: PermissionType::Noone,
        }
    }

    #[test]
    fn test_managers_blocked_only_by_noone() {
        assert!(perms(PermissionType::Admins).can_manage(WorkspaceRole::Owner));
        assert!(perms(PermissionType::Everyone).can_manage(WorkspaceRole::Admin));
        assert!(!perms(PermissionType::Noone).can_manage(WorkspaceRole::Owner));
        assert!(!perms(PermissionType::Admins).can_debug(WorkspaceRole::Owner));
    }

    #[test]
    fn test_members_need_everyone() {
        assert!(perms(PermissionType::Everyone).can_manage(WorkspaceRole::Editor));
        assert!(!perms(PermissionType::Admins).can_manage(WorkspaceRole::Normal));
    }

    #[test]
    fn test_free_functions_match_methods() {
        let p = Permissions {
            install_permission: PermissionType::Admins,
            debug_permission: PermissionType::Everyone,
        };
        assert!(can_manage(&p, WorkspaceRole::Admin));
        assert!(!can_manage(&p, WorkspaceRole::Editor));
        assert!(can_debug(&p, WorkspaceRole::Editor));
        assert!(!can_debug(&Permissions { debug_permission: PermissionType::Noone, ..p }, WorkspaceRole::Owner));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("dataset_operator".parse(), Ok(WorkspaceRole::DatasetOperator));
        assert!("root".parse::<WorkspaceRole>().is_err());
    }
}
