//! Warden - modular HTTP server library with role-based access control.
//!
//! Warden provides the infrastructure for building modular API servers whose
//! routes are guarded by declared permissions:
//!
//! - **Config**: Layered configuration (file → env → explicit overrides)
//! - **Database**: libsql/Turso connection and schema bootstrap
//! - **Auth**: JWT token creation and validation, header or cookie transport
//! - **RBAC**: Permission/role registry, boot-time sync, per-request abilities
//! - **Router**: HTTP routing with per-route access declarations
//! - **Server**: Hyper-based HTTP server with a request guard
//! - **Module**: Trait for pluggable feature modules
//!
//! # Example
//!
//! ```ignore
//! use warden::rbac::{Action, PermissionDef, Registration, RoleDef, USER_ROLE, checker};
//! use warden::{Access, App, Loader, Method, Module, Router};
//!
//! struct Posts;
//!
//! impl Module for Posts {
//!     fn name(&self) -> &'static str { "posts" }
//!
//!     fn register(&self) -> Registration {
//!         Registration::new()
//!             .permission(PermissionDef::new("post.read", Action::Read, "Post"))
//!             .role(RoleDef::new(USER_ROLE).permissions(["post.read"]))
//!     }
//!
//!     fn routes(&self, router: &mut Router) {
//!         router.route_with(
//!             Method::GET,
//!             "/api/posts",
//!             Access::new().check(checker::can(Action::Read, "Post")),
//!             |_ctx| async move { warden::response::ok(&warden::json!([])) },
//!         );
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> warden::Result<()> {
//!     let config = Loader::new("MYAPP").load(None, Default::default())?;
//!     App::new(config).module(Posts).run().await
//! }
//! ```

pub mod app;
pub mod auth;
pub mod config;
pub mod container;
pub mod db;
pub mod error;
pub mod guard;
pub mod module;
pub mod rbac;
pub mod response;
pub mod router;
pub mod server;

// Re-export main types at crate root
pub use app::App;
pub use config::{Config, Loader, Overrides};
pub use container::Container;
pub use db::Handle as DbHandle;
pub use error::{Error, Result};
pub use module::Module;
pub use rbac::{Ability, Action, Instance, Subject};
pub use router::{Access, Context, Router};

// Re-export commonly used dependencies for convenience
pub use hyper::Method;
pub use serde_json::json;
