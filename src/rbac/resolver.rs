//! Registry of declared permissions and roles.
//!
//! Feature modules hand in [`Registration`]s during startup. The
//! [`ResolverBuilder`] folds them in a fixed order and is then frozen into a
//! [`Resolver`], which is read-only for the life of the server.
//!
//! Permissions are deduplicated by name with the first declaration winning.
//! Roles with the same name are deep-merged, the later declaration winning
//! on conflicting keys.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::rule::{
    ALL, Action, ConditionFn, ConditionMap, Conditions, Rule, RuleDef, SubjectSpec,
};
use super::store::User;

/// Default role every account is expected to hold. Empty until extended.
pub const USER_ROLE: &str = "user";

/// Role with unrestricted access.
pub const ADMIN_ROLE: &str = "admin";

/// Wildcard permission granted only to [`ADMIN_ROLE`].
pub const SYSTEM_PERMISSION: &str = "system.manage";

/// A permission as declared by a feature module.
#[derive(Debug, Clone)]
pub struct PermissionDef {
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub rule: RuleDef,
}

impl PermissionDef {
    pub fn new(name: impl Into<String>, action: Action, subject: impl Into<SubjectSpec>) -> Self {
        Self {
            name: name.into(),
            label: None,
            description: None,
            rule: RuleDef::new(action, subject),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fixed conditions, stored with the rule.
    pub fn conditions(mut self, conditions: ConditionMap) -> Self {
        self.rule.conditions = Conditions::Static(conditions);
        self
    }

    /// Conditions computed from the acting user at request time.
    pub fn when<F>(mut self, f: F) -> Self
    where
        F: Fn(&User) -> ConditionMap + Send + Sync + 'static,
    {
        self.rule.conditions = Conditions::Dynamic(Arc::new(f));
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Turn the grant into a prohibition.
    pub fn inverted(mut self) -> Self {
        self.rule.inverted = true;
        self
    }
}

/// A normalized permission held by the resolver.
#[derive(Clone)]
pub struct Permission {
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Static rule with the subject normalized. This is what gets persisted.
    pub rule: Rule,
    dynamic: Option<ConditionFn>,
}

impl Permission {
    fn from_def(def: PermissionDef) -> Self {
        let (rule, dynamic) = def.rule.split();
        Self {
            name: def.name,
            label: def.label,
            description: def.description,
            rule,
            dynamic,
        }
    }

    /// The per-user condition function, if the permission declares one.
    pub fn condition_fn(&self) -> Option<&ConditionFn> {
        self.dynamic.as_ref()
    }
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permission")
            .field("name", &self.name)
            .field("rule", &self.rule)
            .field("dynamic", &self.dynamic.is_some())
            .finish()
    }
}

/// A role declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Names of granted permissions, in declaration order.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Free-form attributes, merged key-wise.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl RoleDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn permissions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.grant(name.into());
        }
        self
    }

    fn grant(&mut self, name: String) {
        if !self.permissions.contains(&name) {
            self.permissions.push(name);
        }
    }

    /// Deep-merge `other` into `self`. Scalars from `other` win, permission
    /// lists are unioned in order, `meta` objects merge recursively.
    pub fn merge(&mut self, other: RoleDef) {
        if other.label.is_some() {
            self.label = other.label;
        }
        if other.description.is_some() {
            self.description = other.description;
        }
        for name in other.permissions {
            self.grant(name);
        }
        for (key, value) in other.meta {
            match self.meta.get_mut(&key) {
                Some(existing) => merge_value(existing, value),
                None => {
                    self.meta.insert(key, value);
                }
            }
        }
    }
}

fn merge_value(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// Everything one feature module contributes.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub permissions: Vec<PermissionDef>,
    pub roles: Vec<RoleDef>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permission(mut self, permission: PermissionDef) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn role(mut self, role: RoleDef) -> Self {
        self.roles.push(role);
        self
    }
}

/// Mutable registry used during startup.
#[derive(Debug)]
pub struct ResolverBuilder {
    permissions: Vec<Permission>,
    roles: Vec<RoleDef>,
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverBuilder {
    /// A registry holding the built-in `user` and `admin` roles and the
    /// wildcard system permission.
    pub fn new() -> Self {
        let mut builder = Self {
            permissions: Vec::new(),
            roles: Vec::new(),
        };
        builder.add_roles([
            RoleDef::new(USER_ROLE)
                .label("User")
                .description("Default role for signed-in accounts"),
            RoleDef::new(ADMIN_ROLE)
                .label("Administrator")
                .description("Unrestricted access")
                .permissions([SYSTEM_PERMISSION]),
        ]);
        builder.add_permissions([PermissionDef::new(SYSTEM_PERMISSION, Action::Manage, ALL)
            .label("Manage everything")]);
        builder
    }

    /// Append permissions not already registered under the same name.
    pub fn add_permissions(&mut self, defs: impl IntoIterator<Item = PermissionDef>) -> &mut Self {
        for def in defs {
            if self.permissions.iter().any(|p| p.name == def.name) {
                debug!(permission = %def.name, "Ignoring duplicate permission");
                continue;
            }
            self.permissions.push(Permission::from_def(def));
        }
        self
    }

    /// Append roles, merging into an existing role of the same name.
    pub fn add_roles(&mut self, roles: impl IntoIterator<Item = RoleDef>) -> &mut Self {
        for role in roles {
            match self.roles.iter_mut().find(|r| r.name == role.name) {
                Some(existing) => existing.merge(role),
                None => self.roles.push(role),
            }
        }
        self
    }

    pub fn register(&mut self, registration: Registration) -> &mut Self {
        self.add_permissions(registration.permissions);
        self.add_roles(registration.roles);
        self
    }

    pub fn build(self) -> Resolver {
        let index = self
            .permissions
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        Resolver {
            permissions: self.permissions,
            roles: self.roles,
            index,
        }
    }
}

/// Frozen registry of declared permissions and roles.
#[derive(Debug)]
pub struct Resolver {
    permissions: Vec<Permission>,
    roles: Vec<RoleDef>,
    index: HashMap<String, usize>,
}

impl Default for Resolver {
    fn default() -> Self {
        ResolverBuilder::new().build()
    }
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn roles(&self) -> &[RoleDef] {
        &self.roles
    }

    pub fn permission(&self, name: &str) -> Option<&Permission> {
        self.index.get(name).map(|&i| &self.permissions[i])
    }

    pub fn role(&self, name: &str) -> Option<&RoleDef> {
        self.roles.iter().find(|r| r.name == name)
    }
}
