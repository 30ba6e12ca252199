//! Builds an [`Ability`] for one user from their effective permissions.

use std::collections::HashSet;

use libsql::Connection;
use tracing::debug;

use super::ability::Ability;
use super::resolver::Resolver;
use super::rule::Rule;
use super::store::{self, StoredPermission, User};
use crate::Result;

/// Direct permissions followed by role permissions, deduplicated by name.
/// The first occurrence of a name wins.
pub fn effective_permissions(user: &User) -> Vec<&StoredPermission> {
    let mut seen = HashSet::new();
    user.all_permissions()
        .filter(|p| seen.insert(p.name.as_str()))
        .collect()
}

/// Resolve each effective permission into a concrete rule.
///
/// Stored rules are used as-is unless the permission is still registered
/// with a condition function, in which case the function's output is merged
/// into a copy of the rule's conditions.
pub fn resolve_rules(resolver: &Resolver, user: &User) -> Vec<Rule> {
    effective_permissions(user)
        .into_iter()
        .map(|permission| {
            let mut rule = permission.rule.clone();
            if let Some(condition_fn) = resolver
                .permission(&permission.name)
                .and_then(|declared| declared.condition_fn())
            {
                let computed = (**condition_fn)(user);
                rule.conditions
                    .get_or_insert_with(Default::default)
                    .extend(computed);
            }
            rule
        })
        .collect()
}

pub fn build(resolver: &Resolver, user: &User) -> Ability {
    Ability::new(resolve_rules(resolver, user))
}

/// Load `user_id` from the store and build its ability.
///
/// Returns `None` when the user does not exist; callers must deny.
pub async fn load(
    conn: &Connection,
    resolver: &Resolver,
    user_id: &str,
) -> Result<Option<(User, Ability)>> {
    let Some(user) = store::load_user(conn, user_id).await? else {
        debug!(user_id, "Ability requested for unknown user");
        return Ok(None);
    };
    let ability = build(resolver, &user);
    Ok(Some((user, ability)))
}
