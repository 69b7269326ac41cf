//! crates/mangati_core/src/access.rs
//!
//! The access policy evaluator.
//!
//! Every protected operation declares a [`Rule`]. Given the caller reconstructed
//! from a verified bearer token, the rule and the state of the target resource,
//! [`authorize`] runs the checks in a fixed order:
//!
//! 1. authentication: a caller must be present,
//! 2. role: the caller's role claims must intersect the rule's allowed roles,
//! 3. ownership: the caller authored the resource, or holds `Admin`,
//! 4. visibility: unapproved content is reported as missing to everyone except
//!    admins and its writer-author.
//!
//! The first failing check decides the outcome. The evaluator has no side effects.

use uuid::Uuid;

use crate::domain::ChapterStatus;
use crate::role::Role;

//=========================================================================================
// Caller
//=========================================================================================

/// The authenticated caller, as carried by verified token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    /// Role claim values exactly as they appear in the token.
    pub role_claims: Vec<String>,
}

impl Caller {
    /// Case-sensitive: a claim of `"ADMIN"` does not confer `Role::Admin`.
    pub fn has_role(&self, role: Role) -> bool {
        self.role_claims.iter().any(|claim| claim == role.as_str())
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// The recognized roles among the caller's claims.
    pub fn roles(&self) -> Vec<Role> {
        self.role_claims
            .iter()
            .filter_map(|claim| Role::from_claim(claim))
            .collect()
    }
}

//=========================================================================================
// Rules and Resources
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("You do not have permission to perform this action")]
    Forbidden,
    /// Used for moderation-hidden content so its existence is not disclosed.
    #[error("Not found")]
    NotFound,
}

/// Resource-dependent check attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCheck {
    None,
    Ownership,
    Visibility,
}

/// Declarative access requirements of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub authenticated: bool,
    /// Empty means no role requirement.
    pub allowed_roles: &'static [Role],
    pub check: ResourceCheck,
}

impl Rule {
    pub const PUBLIC: Rule = Rule {
        authenticated: false,
        allowed_roles: &[],
        check: ResourceCheck::None,
    };

    pub const SIGNED_IN: Rule = Rule {
        authenticated: true,
        allowed_roles: &[],
        check: ResourceCheck::None,
    };

    pub const fn roles(allowed_roles: &'static [Role]) -> Rule {
        Rule {
            authenticated: true,
            allowed_roles,
            check: ResourceCheck::None,
        }
    }

    pub const fn owned(self) -> Rule {
        Rule {
            check: ResourceCheck::Ownership,
            ..self
        }
    }

    pub const fn moderated(self) -> Rule {
        Rule {
            check: ResourceCheck::Visibility,
            ..self
        }
    }
}

/// The parts of a resource's state the evaluator looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceState {
    pub author_id: Option<Uuid>,
    pub moderation: Option<ChapterStatus>,
}

impl ResourceState {
    pub fn authored_by(author_id: Uuid) -> Self {
        Self {
            author_id: Some(author_id),
            moderation: None,
        }
    }

    pub fn moderated(author_id: Uuid, status: ChapterStatus) -> Self {
        Self {
            author_id: Some(author_id),
            moderation: Some(status),
        }
    }
}

/// Declared rules of the protected operations.
pub mod rules {
    use super::Rule;
    use crate::role::Role;

    pub const WRITERS: &[Role] = &[Role::Writer, Role::Admin];
    pub const ADMINS: &[Role] = &[Role::Admin];

    pub const CREATE_SERIES: Rule = Rule::roles(WRITERS);
    pub const MODIFY_SERIES: Rule = Rule::roles(WRITERS).owned();
    pub const CREATE_CHAPTER: Rule = Rule::roles(WRITERS).owned();
    pub const DELETE_CHAPTER: Rule = Rule::roles(WRITERS).owned();
    pub const MODERATE_CHAPTER: Rule = Rule::roles(ADMINS);
    pub const READ_CHAPTER: Rule = Rule::PUBLIC.moderated();
    pub const CREATE_TAG: Rule = Rule::roles(WRITERS);
    pub const CREATE_LANGUAGE: Rule = Rule::roles(ADMINS);
    pub const ASSIGN_SUBSCRIPTION: Rule = Rule::roles(ADMINS);
}

//=========================================================================================
// Evaluation
//=========================================================================================

/// Runs the resource-independent checks (authentication and role).
///
/// Handlers call this before touching the repository so that a caller without
/// the right role is turned away without learning whether the target exists.
pub fn check_roles(caller: Option<&Caller>, rule: &Rule) -> Result<(), AccessError> {
    let needs_caller = rule.authenticated || !rule.allowed_roles.is_empty();
    match caller {
        None if needs_caller => Err(AccessError::Unauthenticated),
        None => Ok(()),
        Some(caller) => {
            if rule.allowed_roles.is_empty() || caller.has_any_role(rule.allowed_roles) {
                Ok(())
            } else {
                Err(AccessError::Forbidden)
            }
        }
    }
}

/// Runs every check of `rule` against `resource`, in order.
pub fn authorize(
    caller: Option<&Caller>,
    rule: &Rule,
    resource: &ResourceState,
) -> Result<(), AccessError> {
    check_roles(caller, rule)?;

    match rule.check {
        ResourceCheck::None => Ok(()),
        ResourceCheck::Ownership => {
            let caller = caller.ok_or(AccessError::Unauthenticated)?;
            if is_author(caller, resource) || caller.is_admin() {
                Ok(())
            } else {
                Err(AccessError::Forbidden)
            }
        }
        ResourceCheck::Visibility => {
            if is_visible(caller, resource) {
                Ok(())
            } else {
                Err(AccessError::NotFound)
            }
        }
    }
}

/// Whether moderated content may be shown to `caller`.
pub fn is_visible(caller: Option<&Caller>, resource: &ResourceState) -> bool {
    match resource.moderation {
        None | Some(ChapterStatus::Approved) => true,
        Some(_) => match caller {
            None => false,
            Some(caller) => {
                caller.is_admin() || (caller.has_role(Role::Writer) && is_author(caller, resource))
            }
        },
    }
}

fn is_author(caller: &Caller, resource: &ResourceState) -> bool {
    resource.author_id == Some(caller.user_id)
}
