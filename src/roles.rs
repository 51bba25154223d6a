use std::collections::BTreeSet;

use crate::{
    auth::Identity,
    error::AppResult,
    models::{Role, RoleAssignment},
    repository::Repository,
};

/// Dashboard precedence, highest first. Adding a tier means adding one entry here.
pub const ROLE_PRECEDENCE: [Role; 3] = [Role::Admin, Role::Faculty, Role::Student];

/// ResolvedRoles
///
/// Outcome of one role resolution: every distinct role held by an identity and
/// the single primary role used for dashboard selection. Recomputed per request,
/// never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRoles {
    pub roles: BTreeSet<Role>,
    pub primary_role: Option<Role>,
}

impl ResolvedRoles {
    /// Builds the resolution from raw assignment rows. Row order is irrelevant
    /// and duplicates collapse.
    pub fn from_assignments<'a, I>(assignments: I) -> Self
    where
        I: IntoIterator<Item = &'a RoleAssignment>,
    {
        Self::from_roles(assignments.into_iter().map(|a| a.role))
    }

    pub fn from_roles<I>(roles: I) -> Self
    where
        I: IntoIterator<Item = Role>,
    {
        let roles: BTreeSet<Role> = roles.into_iter().collect();
        let primary_role = primary_role(&roles);
        Self {
            roles,
            primary_role,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Held roles listed highest precedence first.
    pub fn by_precedence(&self) -> Vec<Role> {
        ROLE_PRECEDENCE
            .iter()
            .copied()
            .filter(|role| self.roles.contains(role))
            .collect()
    }
}

/// Picks the first role of `ROLE_PRECEDENCE` present in `roles`.
pub fn primary_role(roles: &BTreeSet<Role>) -> Option<Role> {
    ROLE_PRECEDENCE.iter().fold(None, |chosen, candidate| {
        chosen.or_else(|| roles.contains(candidate).then_some(*candidate))
    })
}

/// resolve
///
/// Reads every role assignment of `identity` and derives its primary role.
/// A storage failure propagates as `AppError::LookupFailure`; an identity with
/// no rows resolves successfully with `primary_role == None`.
pub async fn resolve(repo: &dyn Repository, identity: &Identity) -> AppResult<ResolvedRoles> {
    let assignments = repo.get_role_assignments(identity.id).await?;
    let resolved = ResolvedRoles::from_assignments(&assignments);

    tracing::debug!(
        user_id = %identity.id,
        roles = ?resolved.roles,
        primary_role = ?resolved.primary_role,
        "resolved role assignments"
    );

    Ok(resolved)
}
