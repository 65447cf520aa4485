//! Role-based authorization.

use std::fmt::{self, Display};

use crate::error::{Error, Result};
use crate::model::db::user::Role;
use crate::token::StaffClaims;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Votes,
    Questions,
    Passwords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Decrypt,
}

impl Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Votes => "votes",
            Self::Questions => "questions",
            Self::Passwords => "passwords",
        };
        write!(f, "{name}")
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Decrypt => "decrypt",
        };
        write!(f, "{name}")
    }
}

/// Decides whether a staff user may perform an action on a kind of resource.
pub trait Authorize: Send + Sync {
    fn authorize(&self, subject: &StaffClaims, resource: Resource, action: Action) -> bool;

    /// As [`Authorize::authorize`], but as an [`Error::Forbidden`] on denial.
    fn require(&self, subject: &StaffClaims, resource: Resource, action: Action) -> Result<()> {
        if self.authorize(subject, resource, action) {
            Ok(())
        } else {
            warn!(
                "Denied {action} on {resource} to user {} ({})",
                subject.id, subject.account
            );
            Err(Error::Forbidden(format!("{action} {resource}")))
        }
    }
}

/// Fixed policy: admins may do anything, creators may manage their own votes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RolePolicy;

impl RolePolicy {
    fn role_permits(role: Role, resource: Resource, action: Action) -> bool {
        use Action::*;
        use Resource::*;
        match role {
            Role::Admin => true,
            Role::Creator => matches!(
                (resource, action),
                (Votes, Read)
                    | (Votes, Create)
                    | (Questions, Read)
                    | (Passwords, Read)
                    | (Passwords, Create)
                    | (Passwords, Decrypt)
            ),
            Role::Voter => false,
        }
    }
}

impl Authorize for RolePolicy {
    fn authorize(&self, subject: &StaffClaims, resource: Resource, action: Action) -> bool {
        subject
            .roles
            .iter()
            .any(|role| Self::role_permits(*role, resource, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::mongodb::RowId;

    fn staff(roles: Vec<Role>) -> StaffClaims {
        StaffClaims {
            id: RowId(1),
            account: "someone".into(),
            roles,
        }
    }

    #[test]
    fn admin_may_do_anything() {
        let admin = staff(vec![Role::Admin]);
        assert!(RolePolicy.authorize(&admin, Resource::Questions, Action::Create));
        assert!(RolePolicy.authorize(&admin, Resource::Passwords, Action::Decrypt));
    }

    #[test]
    fn creator_permissions() {
        let creator = staff(vec![Role::Creator]);
        assert!(RolePolicy.authorize(&creator, Resource::Votes, Action::Read));
        assert!(RolePolicy.authorize(&creator, Resource::Questions, Action::Read));
        assert!(RolePolicy.authorize(&creator, Resource::Passwords, Action::Read));
        assert!(RolePolicy.authorize(&creator, Resource::Passwords, Action::Create));
        assert!(RolePolicy.authorize(&creator, Resource::Passwords, Action::Decrypt));
        assert!(!RolePolicy.authorize(&creator, Resource::Questions, Action::Create));
        assert!(!RolePolicy.authorize(&creator, Resource::Votes, Action::Decrypt));
    }

    #[test]
    fn no_roles_no_access() {
        let nobody = staff(vec![]);
        assert!(!RolePolicy.authorize(&nobody, Resource::Votes, Action::Read));
        let err = RolePolicy
            .require(&nobody, Resource::Votes, Action::Read)
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }
}
