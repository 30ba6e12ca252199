//! Boot-time reconciliation of declared roles and permissions.
//!
//! Runs once per boot inside a single transaction:
//!
//! 1. Upsert declared roles (flag `systemed`), prune systemed roles no longer declared.
//! 2. Upsert declared permissions, prune undeclared ones except the system permission.
//! 3. Replace each non-admin role's permission links with its declared list.
//! 4. Link the admin role to exactly the system permission.
//! 5. Give the configured super-admin account exactly the admin role.
//!
//! Any failure rolls the whole transaction back. Concurrent boots of several
//! instances are not coordinated.

use std::collections::HashMap;

use libsql::Connection;
use tracing::{error, info, warn};

use super::resolver::{ADMIN_ROLE, Resolver, SYSTEM_PERMISSION};
use super::store;
use crate::Result;

/// Row-level changes made by one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub roles_inserted: usize,
    pub roles_pruned: usize,
    pub permissions_inserted: usize,
    pub permissions_updated: usize,
    pub permissions_pruned: usize,
    pub links_added: usize,
    pub links_removed: usize,
    pub super_admin_assigned: bool,
}

impl SyncReport {
    /// Whether the run changed any declaration rows or links.
    pub fn is_noop(&self) -> bool {
        self.roles_inserted == 0
            && self.roles_pruned == 0
            && self.permissions_inserted == 0
            && self.permissions_updated == 0
            && self.permissions_pruned == 0
            && self.links_added == 0
            && self.links_removed == 0
    }
}

/// Reconcile the store with the resolver inside one transaction.
pub async fn synchronize(
    conn: &Connection,
    resolver: &Resolver,
    super_admin: Option<&str>,
) -> Result<SyncReport> {
    let tx = conn.transaction().await?;
    match reconcile(&tx, resolver, super_admin).await {
        Ok(report) => {
            tx.commit().await?;
            Ok(report)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback after failed sync also failed: {rollback}");
            }
            Err(e)
        }
    }
}

/// Boot entry point: reconcile and log, never fail the boot.
pub async fn run(
    conn: &Connection,
    resolver: &Resolver,
    super_admin: Option<&str>,
) -> Option<SyncReport> {
    match synchronize(conn, resolver, super_admin).await {
        Ok(report) => {
            info!(
                roles_inserted = report.roles_inserted,
                roles_pruned = report.roles_pruned,
                permissions_inserted = report.permissions_inserted,
                permissions_updated = report.permissions_updated,
                permissions_pruned = report.permissions_pruned,
                super_admin = report.super_admin_assigned,
                "Synchronized roles and permissions"
            );
            Some(report)
        }
        Err(e) => {
            error!("Role and permission sync failed, changes rolled back: {e}");
            None
        }
    }
}

async fn reconcile(
    conn: &Connection,
    resolver: &Resolver,
    super_admin: Option<&str>,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    // Roles
    let mut role_ids: HashMap<&str, String> = HashMap::new();
    for role in resolver.roles() {
        let stored = match store::find_role(conn, &role.name).await? {
            Some(existing) => {
                if !existing.systemed {
                    store::set_systemed(conn, &existing.id, true).await?;
                }
                existing
            }
            None => {
                report.roles_inserted += 1;
                store::insert_role(conn, role, true).await?
            }
        };
        role_ids.insert(role.name.as_str(), stored.id);
    }
    for stale in store::list_roles(conn).await? {
        if stale.systemed && resolver.role(&stale.name).is_none() {
            store::delete_role(conn, &stale.id).await?;
            report.roles_pruned += 1;
        }
    }

    // Permissions
    let mut permission_ids: HashMap<&str, String> = HashMap::new();
    for permission in resolver.permissions() {
        let id = match store::find_permission(conn, &permission.name).await? {
            Some(existing) => {
                if store::update_permission(conn, &existing, permission).await? {
                    report.permissions_updated += 1;
                }
                existing.id
            }
            None => {
                report.permissions_inserted += 1;
                store::insert_permission(conn, permission).await?.id
            }
        };
        permission_ids.insert(permission.name.as_str(), id);
    }
    for stale in store::list_permissions(conn).await? {
        if stale.name != SYSTEM_PERMISSION && resolver.permission(&stale.name).is_none() {
            store::delete_permission(conn, &stale.id).await?;
            report.permissions_pruned += 1;
        }
    }

    // Role links
    for role in resolver.roles() {
        let Some(role_id) = role_ids.get(role.name.as_str()) else {
            continue;
        };
        let wanted: Vec<String> = if role.name == ADMIN_ROLE {
            permission_ids
                .get(SYSTEM_PERMISSION)
                .cloned()
                .into_iter()
                .collect()
        } else {
            role.permissions
                .iter()
                .filter_map(|name| {
                    let id = permission_ids.get(name.as_str());
                    if id.is_none() {
                        warn!(
                            role = %role.name,
                            permission = %name,
                            "Role references an undeclared permission"
                        );
                    }
                    id.cloned()
                })
                .collect()
        };
        let (added, removed) = store::set_role_permissions(conn, role_id, &wanted).await?;
        report.links_added += added;
        report.links_removed += removed;
    }

    // Super admin
    if let Some(login) = super_admin {
        match store::find_user_id(conn, login).await? {
            Some(user_id) => {
                if let Some(admin_id) = role_ids.get(ADMIN_ROLE) {
                    store::set_user_roles(conn, &user_id, std::slice::from_ref(admin_id)).await?;
                    report.super_admin_assigned = true;
                }
            }
            None => warn!(super_admin = %login, "Configured super admin does not exist"),
        }
    }

    Ok(report)
}
