//! Role-based access control.
//!
//! - [`resolver`]: permissions and roles declared by feature modules
//! - [`sync`]: boot-time reconciliation of declarations into the store
//! - [`store`]: persisted roles, permissions and user assignments
//! - [`builder`]: per-request [`Ability`] construction
//! - [`checker`]: route-level predicates evaluated against an ability

pub mod ability;
pub mod builder;
pub mod checker;
pub mod condition;
pub mod resolver;
pub mod rule;
pub mod store;
pub mod sync;

pub use ability::{Ability, Instance};
pub use checker::{Checker, SharedChecker};
pub use resolver::{
    ADMIN_ROLE, PermissionDef, Registration, Resolver, ResolverBuilder, RoleDef,
    SYSTEM_PERMISSION, USER_ROLE,
};
pub use rule::{ALL, Action, ConditionMap, Rule, Subject, SubjectRef};
pub use store::User;
pub use sync::SyncReport;
