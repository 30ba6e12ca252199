//! Module trait for pluggable feature modules.
//!
//! A module contributes routes and, optionally, the permissions and roles
//! its routes rely on.
//!
//! # Example
//!
//! ```ignore
//! use warden::rbac::{Action, PermissionDef, Registration, RoleDef, USER_ROLE};
//! use warden::{Access, Module, Router};
//!
//! pub struct Posts;
//!
//! impl Module for Posts {
//!     fn name(&self) -> &'static str {
//!         "posts"
//!     }
//!
//!     fn register(&self) -> Registration {
//!         Registration::new()
//!             .permission(PermissionDef::new("post.read", Action::Read, "Post"))
//!             .role(RoleDef::new(USER_ROLE).permissions(["post.read"]))
//!     }
//!
//!     fn routes(&self, router: &mut Router) {
//!         router.route_with(
//!             warden::Method::GET,
//!             "/posts",
//!             Access::new().check(warden::rbac::checker::can(Action::Read, "Post")),
//!             |_ctx| async move { warden::response::ok(&serde_json::json!([])) },
//!         );
//!     }
//! }
//! ```

use crate::rbac::Registration;
use crate::router::Router;

/// A pluggable feature module.
///
/// Modules register their routes with the router and can hold their own state.
/// The state is captured in closures when registering routes.
pub trait Module: Send + Sync {
    /// Module name for identification and logging.
    fn name(&self) -> &'static str;

    /// Permissions and roles this module declares.
    ///
    /// Called once at startup, before any route is registered.
    fn register(&self) -> Registration {
        Registration::new()
    }

    /// Register routes with the router.
    fn routes(&self, router: &mut Router);
}
