//! Role-based access rules.
//!
//! `None` stands for a user without a profile; it is denied everything.

use crate::errors::ApiError;
use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListLogs,
    ViewLog,
    CreateLog,
    UpdateLog,
    DeleteLog,
    ViewDashboard,
    ManageUsers,
}

/// How far a granted action reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only records owned by the actor.
    Own,
    /// Every record.
    All,
}

pub fn scope(role: Option<Role>, action: Action) -> Option<Scope> {
    use Action::*;

    let role = role?;
    match (role, action) {
        (Role::Caregiver, ListLogs | ViewLog | CreateLog | UpdateLog | DeleteLog | ViewDashboard) => Some(Scope::Own),
        (Role::Caregiver, ManageUsers) => None,

        (Role::Clinician, ListLogs | ViewLog) => Some(Scope::All),
        (Role::Clinician, _) => None,

        (Role::Admin, ViewDashboard) => None,
        (Role::Admin, _) => Some(Scope::All),
    }
}

/// Returns the granted scope or a 403.
pub fn require(role: Option<Role>, action: Action) -> Result<Scope, ApiError> {
    scope(role, action).ok_or_else(|| {
        ApiError::Forbidden("You do not have permission to perform this action.".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use Action::*;

    const LOG_ACTIONS: [Action; 5] = [ListLogs, ViewLog, CreateLog, UpdateLog, DeleteLog];

    #[test]
    fn caregiver_is_limited_to_own_records() {
        for action in LOG_ACTIONS {
            assert_eq!(scope(Some(Role::Caregiver), action), Some(Scope::Own));
        }
        assert_eq!(scope(Some(Role::Caregiver), ViewDashboard), Some(Scope::Own));
        assert_eq!(scope(Some(Role::Caregiver), ManageUsers), None);
    }

    #[test]
    fn clinician_reads_everything_and_writes_nothing() {
        assert_eq!(scope(Some(Role::Clinician), ListLogs), Some(Scope::All));
        assert_eq!(scope(Some(Role::Clinician), ViewLog), Some(Scope::All));
        for action in [CreateLog, UpdateLog, DeleteLog, ViewDashboard, ManageUsers] {
            assert_eq!(scope(Some(Role::Clinician), action), None);
        }
    }

    #[test]
    fn admin_has_full_access_except_caregiver_dashboard() {
        for action in LOG_ACTIONS {
            assert_eq!(scope(Some(Role::Admin), action), Some(Scope::All));
        }
        assert_eq!(scope(Some(Role::Admin), ManageUsers), Some(Scope::All));
        assert_eq!(scope(Some(Role::Admin), ViewDashboard), None);
    }

    #[test]
    fn missing_role_is_denied() {
        for action in LOG_ACTIONS {
            assert!(matches!(require(None, action), Err(ApiError::Forbidden(_))));
        }
    }
}
