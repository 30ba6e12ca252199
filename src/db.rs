//! Database connection abstraction.
//!
//! Supports multiple backends:
//! - Local SQLite file: `path/to/db.sqlite` or `file:path` or `sqlite://path`
//! - In-memory: `:memory:`
//! - Remote Turso: `libsql://...` or `https://...` (requires TURSO_AUTH_TOKEN env var)

use std::sync::Arc;

use libsql::{Builder, Connection, Database};

/// Shared database handle.
///
/// Holds the database and one long-lived connection. An in-memory database
/// only exists for the connection that created it, so every caller shares
/// that connection; other backends open a connection per [`session`](Self::session).
#[derive(Clone)]
pub struct Handle {
    db: Arc<Database>,
    conn: Connection,
    shared: bool,
}

impl Handle {
    /// The handle's connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// A handle for one unit of work, such as a request.
    ///
    /// File and remote databases get a fresh connection so a transaction
    /// opened by one request never captures another request's statements.
    /// In-memory databases return a clone sharing the single connection.
    pub fn session(&self) -> crate::Result<Handle> {
        if self.shared {
            return Ok(self.clone());
        }
        Ok(Handle {
            db: Arc::clone(&self.db),
            conn: self.db.connect()?,
            shared: false,
        })
    }

    /// The underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// Connect to the database.
///
/// # URL formats
/// - Local file: `mydata.db`, `file:path/to/db.sqlite`, `sqlite://path`
/// - In-memory: `:memory:`
/// - Remote Turso: `libsql://your-db.turso.io` (requires `TURSO_AUTH_TOKEN` env var)
pub async fn connect(url: &str) -> crate::Result<Handle> {
    let shared = url == ":memory:";
    let db = if url.starts_with("libsql://") || url.starts_with("https://") {
        let token = std::env::var("TURSO_AUTH_TOKEN").map_err(|_| {
            crate::Error::Internal("TURSO_AUTH_TOKEN not set for remote database".into())
        })?;
        Builder::new_remote(url.to_string(), token).build().await?
    } else if shared {
        Builder::new_local(":memory:").build().await?
    } else {
        // Local file - strip sqlite:// or file: prefix if present
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("file:"))
            .unwrap_or(url);
        Builder::new_local(path).build().await?
    };

    let conn = db.connect()?;
    Ok(Handle {
        db: Arc::new(db),
        conn,
        shared,
    })
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS roles (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        label TEXT,
        description TEXT,
        systemed INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS permissions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        label TEXT,
        description TEXT,
        rule TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT UNIQUE,
        attributes TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS role_permissions (
        role_id TEXT NOT NULL,
        permission_id TEXT NOT NULL,
        PRIMARY KEY (role_id, permission_id)
    )",
    "CREATE TABLE IF NOT EXISTS user_roles (
        user_id TEXT NOT NULL,
        role_id TEXT NOT NULL,
        PRIMARY KEY (user_id, role_id)
    )",
    "CREATE TABLE IF NOT EXISTS user_permissions (
        user_id TEXT NOT NULL,
        permission_id TEXT NOT NULL,
        PRIMARY KEY (user_id, permission_id)
    )",
];

/// Create the permission store tables if they do not exist.
pub async fn migrate(conn: &Connection) -> crate::Result<()> {
    for statement in SCHEMA {
        conn.execute(statement, ()).await?;
    }
    Ok(())
}

// Re-export commonly used libsql types for convenience
pub use libsql::{Connection as DbConnection, Database as Db, Row, params};
