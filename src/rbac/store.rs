//! Permission store over libsql.
//!
//! Functions take a [`Connection`] so they run unchanged inside a
//! transaction (a `libsql::Transaction` derefs to its connection).
//! Link tables keep insertion order through their rowid, which is the order
//! effective permissions are resolved in.

use libsql::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::resolver::{Permission, RoleDef};
use super::rule::Rule;
use crate::Result;

/// A persisted permission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPermission {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub rule: Rule,
}

/// A persisted role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRole {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Declared in code and eligible for pruning.
    pub systemed: bool,
    #[serde(default)]
    pub permissions: Vec<StoredPermission>,
}

/// A user with roles and direct permissions expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    /// Application attributes, available to dynamic conditions.
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub roles: Vec<StoredRole>,
    /// Directly assigned permissions.
    #[serde(default)]
    pub permissions: Vec<StoredPermission>,
}

impl User {
    /// Direct permissions followed by role permissions in assignment order.
    pub fn all_permissions(&self) -> impl Iterator<Item = &StoredPermission> {
        self.permissions
            .iter()
            .chain(self.roles.iter().flat_map(|r| r.permissions.iter()))
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

const ROLE_COLUMNS: &str = "id, name, label, description, systemed";
const PERMISSION_COLUMNS: &str = "id, name, label, description, rule";

fn role_from_row(row: &Row) -> Result<StoredRole> {
    Ok(StoredRole {
        id: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
        label: row.get::<Option<String>>(2)?,
        description: row.get::<Option<String>>(3)?,
        systemed: row.get::<i64>(4)? != 0,
        permissions: Vec::new(),
    })
}

fn permission_from_row(row: &Row) -> Result<StoredPermission> {
    let rule = row.get::<String>(4)?;
    Ok(StoredPermission {
        id: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
        label: row.get::<Option<String>>(2)?,
        description: row.get::<Option<String>>(3)?,
        rule: serde_json::from_str(&rule)?,
    })
}

async fn collect<T>(
    mut rows: libsql::Rows,
    parse: impl Fn(&Row) -> Result<T>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        out.push(parse(&row)?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

pub async fn find_role(conn: &Connection, name: &str) -> Result<Option<StoredRole>> {
    let rows = conn
        .query(
            &format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = ?1"),
            params![name],
        )
        .await?;
    Ok(collect(rows, role_from_row).await?.into_iter().next())
}

pub async fn list_roles(conn: &Connection) -> Result<Vec<StoredRole>> {
    let rows = conn
        .query(&format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY rowid"), ())
        .await?;
    collect(rows, role_from_row).await
}

pub async fn insert_role(conn: &Connection, role: &RoleDef, systemed: bool) -> Result<StoredRole> {
    let id = new_id();
    conn.execute(
        "INSERT INTO roles (id, name, label, description, systemed) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id.as_str(),
            role.name.as_str(),
            role.label.clone(),
            role.description.clone(),
            systemed as i64
        ],
    )
    .await?;
    Ok(StoredRole {
        id,
        name: role.name.clone(),
        label: role.label.clone(),
        description: role.description.clone(),
        systemed,
        permissions: Vec::new(),
    })
}

pub async fn set_systemed(conn: &Connection, role_id: &str, systemed: bool) -> Result<()> {
    conn.execute(
        "UPDATE roles SET systemed = ?1 WHERE id = ?2",
        params![systemed as i64, role_id],
    )
    .await?;
    Ok(())
}

pub async fn delete_role(conn: &Connection, role_id: &str) -> Result<()> {
    conn.execute("DELETE FROM role_permissions WHERE role_id = ?1", params![role_id])
        .await?;
    conn.execute("DELETE FROM user_roles WHERE role_id = ?1", params![role_id])
        .await?;
    conn.execute("DELETE FROM roles WHERE id = ?1", params![role_id])
        .await?;
    Ok(())
}

/// Permissions linked to a role, in link order.
pub async fn role_permissions(conn: &Connection, role_id: &str) -> Result<Vec<StoredPermission>> {
    let rows = conn
        .query(
            "SELECT p.id, p.name, p.label, p.description, p.rule
             FROM role_permissions rp JOIN permissions p ON p.id = rp.permission_id
             WHERE rp.role_id = ?1 ORDER BY rp.rowid",
            params![role_id],
        )
        .await?;
    collect(rows, permission_from_row).await
}

/// Replace a role's permission links with exactly `permission_ids`.
///
/// Links already present are kept in place. Returns (added, removed).
pub async fn set_role_permissions(
    conn: &Connection,
    role_id: &str,
    permission_ids: &[String],
) -> Result<(usize, usize)> {
    let current: Vec<String> = role_permissions(conn, role_id)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    let mut removed = 0;
    for id in current.iter().filter(|id| !permission_ids.contains(id)) {
        conn.execute(
            "DELETE FROM role_permissions WHERE role_id = ?1 AND permission_id = ?2",
            params![role_id, id.as_str()],
        )
        .await?;
        removed += 1;
    }

    let mut added = 0;
    for id in permission_ids.iter().filter(|id| !current.contains(id)) {
        added += conn
            .execute(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?1, ?2)",
                params![role_id, id.as_str()],
            )
            .await? as usize;
    }

    Ok((added, removed))
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

pub async fn find_permission(conn: &Connection, name: &str) -> Result<Option<StoredPermission>> {
    let rows = conn
        .query(
            &format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE name = ?1"),
            params![name],
        )
        .await?;
    Ok(collect(rows, permission_from_row).await?.into_iter().next())
}

pub async fn list_permissions(conn: &Connection) -> Result<Vec<StoredPermission>> {
    let rows = conn
        .query(
            &format!("SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY rowid"),
            (),
        )
        .await?;
    collect(rows, permission_from_row).await
}

pub async fn insert_permission(
    conn: &Connection,
    permission: &Permission,
) -> Result<StoredPermission> {
    let id = new_id();
    let rule = serde_json::to_string(&permission.rule)?;
    conn.execute(
        "INSERT INTO permissions (id, name, label, description, rule) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id.as_str(),
            permission.name.as_str(),
            permission.label.clone(),
            permission.description.clone(),
            rule
        ],
    )
    .await?;
    Ok(StoredPermission {
        id,
        name: permission.name.clone(),
        label: permission.label.clone(),
        description: permission.description.clone(),
        rule: permission.rule.clone(),
    })
}

/// Overwrite the stored fields of permission `id` with the declaration.
///
/// Returns whether anything changed.
pub async fn update_permission(
    conn: &Connection,
    existing: &StoredPermission,
    permission: &Permission,
) -> Result<bool> {
    if existing.rule == permission.rule
        && existing.label == permission.label
        && existing.description == permission.description
    {
        return Ok(false);
    }
    let rule = serde_json::to_string(&permission.rule)?;
    conn.execute(
        "UPDATE permissions SET label = ?1, description = ?2, rule = ?3 WHERE id = ?4",
        params![
            permission.label.clone(),
            permission.description.clone(),
            rule,
            existing.id.as_str()
        ],
    )
    .await?;
    Ok(true)
}

pub async fn delete_permission(conn: &Connection, permission_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM role_permissions WHERE permission_id = ?1",
        params![permission_id],
    )
    .await?;
    conn.execute(
        "DELETE FROM user_permissions WHERE permission_id = ?1",
        params![permission_id],
    )
    .await?;
    conn.execute("DELETE FROM permissions WHERE id = ?1", params![permission_id])
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Create a user and return its id.
pub async fn insert_user(
    conn: &Connection,
    username: &str,
    email: Option<&str>,
    attributes: &Value,
) -> Result<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO users (id, username, email, attributes) VALUES (?1, ?2, ?3, ?4)",
        params![
            id.as_str(),
            username,
            email.map(str::to_string),
            serde_json::to_string(attributes)?
        ],
    )
    .await?;
    Ok(id)
}

/// Look up a user id by username or email.
pub async fn find_user_id(conn: &Connection, login: &str) -> Result<Option<String>> {
    let mut rows = conn
        .query(
            "SELECT id FROM users WHERE username = ?1 OR email = ?1 LIMIT 1",
            params![login],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(row.get::<String>(0)?)),
        None => Ok(None),
    }
}

pub async fn assign_role(conn: &Connection, user_id: &str, role_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?1, ?2)",
        params![user_id, role_id],
    )
    .await?;
    Ok(())
}

pub async fn grant_permission(conn: &Connection, user_id: &str, permission_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_permissions (user_id, permission_id) VALUES (?1, ?2)",
        params![user_id, permission_id],
    )
    .await?;
    Ok(())
}

/// Replace a user's role assignment with exactly `role_ids`.
pub async fn set_user_roles(conn: &Connection, user_id: &str, role_ids: &[String]) -> Result<()> {
    conn.execute("DELETE FROM user_roles WHERE user_id = ?1", params![user_id])
        .await?;
    for role_id in role_ids {
        assign_role(conn, user_id, role_id).await?;
    }
    Ok(())
}

/// Load a user with direct permissions and roles (each with its permissions).
pub async fn load_user(conn: &Connection, user_id: &str) -> Result<Option<User>> {
    let mut rows = conn
        .query(
            "SELECT id, username, email, attributes FROM users WHERE id = ?1",
            params![user_id],
        )
        .await?;
    let Some(row) = rows.next().await? else {
        return Ok(None);
    };
    let attributes = row.get::<String>(3)?;
    let mut user = User {
        id: row.get::<String>(0)?,
        username: row.get::<String>(1)?,
        email: row.get::<Option<String>>(2)?,
        attributes: serde_json::from_str(&attributes)?,
        roles: Vec::new(),
        permissions: Vec::new(),
    };

    let rows = conn
        .query(
            "SELECT p.id, p.name, p.label, p.description, p.rule
             FROM user_permissions up JOIN permissions p ON p.id = up.permission_id
             WHERE up.user_id = ?1 ORDER BY up.rowid",
            params![user_id],
        )
        .await?;
    user.permissions = collect(rows, permission_from_row).await?;

    let rows = conn
        .query(
            "SELECT r.id, r.name, r.label, r.description, r.systemed
             FROM user_roles ur JOIN roles r ON r.id = ur.role_id
             WHERE ur.user_id = ?1 ORDER BY ur.rowid",
            params![user_id],
        )
        .await?;
    let mut roles = collect(rows, role_from_row).await?;
    for role in &mut roles {
        role.permissions = role_permissions(conn, &role.id).await?;
    }
    user.roles = roles;

    Ok(Some(user))
}
