//! Rule vocabulary: actions, subjects, conditions.
//!
//! A [`Rule`] is the serializable half of a permission: what gets persisted
//! and what an [`Ability`](super::Ability) evaluates. A [`RuleDef`] is the
//! declaration a feature module writes, which may additionally carry a
//! per-user condition function that is never persisted.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::store::User;

/// Wildcard subject matching every subject type.
pub const ALL: &str = "all";

/// Field filter applied to a subject instance, keyed by dotted path.
pub type ConditionMap = Map<String, Value>;

/// Produces a condition map for the acting user at ability-build time.
pub type ConditionFn = Arc<dyn Fn(&User) -> ConditionMap + Send + Sync>;

/// Action a rule grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    /// Matches every action.
    Manage,
    Owner,
    Other,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Manage => "manage",
            Action::Owner => "owner",
            Action::Other => "other",
        }
    }

    /// Whether a rule granting `self` covers a request for `requested`.
    pub fn covers(self, requested: Action) -> bool {
        self == Action::Manage || self == requested
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "manage" => Ok(Action::Manage),
            "owner" => Ok(Action::Owner),
            "other" => Ok(Action::Other),
            _ => Err(crate::Error::BadRequest(format!("Unknown action: {s}"))),
        }
    }
}

/// A type that can be named as a rule subject.
///
/// `MODEL_NAME` overrides the Rust type name, e.g. when the persisted model
/// is called differently from the struct.
pub trait Subject {
    const MODEL_NAME: Option<&'static str> = None;

    /// Canonical subject name for this type.
    fn subject_name() -> String
    where
        Self: Sized,
    {
        SubjectRef::of::<Self>().name()
    }
}

/// A subject as written in a declaration, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectRef {
    /// A plain subject name, including [`ALL`].
    Name(String),
    /// A type reference with an optional declared model name.
    Type {
        model_name: Option<&'static str>,
        type_name: &'static str,
    },
}

impl SubjectRef {
    pub fn of<T: Subject>() -> Self {
        SubjectRef::Type {
            model_name: T::MODEL_NAME,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Extract the canonical name: declared model name, else the bare type
    /// name, else the string itself.
    pub fn name(&self) -> String {
        match self {
            SubjectRef::Name(name) => name.clone(),
            SubjectRef::Type {
                model_name: Some(model),
                ..
            } => (*model).to_string(),
            SubjectRef::Type {
                model_name: None,
                type_name,
            } => short_type_name(type_name).to_string(),
        }
    }
}

impl From<&str> for SubjectRef {
    fn from(name: &str) -> Self {
        SubjectRef::Name(name.to_string())
    }
}

impl From<String> for SubjectRef {
    fn from(name: String) -> Self {
        SubjectRef::Name(name)
    }
}

fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

/// Declared subject: one reference or a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectSpec {
    One(SubjectRef),
    Many(Vec<SubjectRef>),
}

impl SubjectSpec {
    pub fn normalize(&self) -> Subjects {
        match self {
            SubjectSpec::One(subject) => Subjects::One(subject.name()),
            SubjectSpec::Many(subjects) => {
                Subjects::Many(subjects.iter().map(SubjectRef::name).collect())
            }
        }
    }
}

impl From<SubjectRef> for SubjectSpec {
    fn from(subject: SubjectRef) -> Self {
        SubjectSpec::One(subject)
    }
}

impl From<&str> for SubjectSpec {
    fn from(name: &str) -> Self {
        SubjectSpec::One(name.into())
    }
}

impl From<String> for SubjectSpec {
    fn from(name: String) -> Self {
        SubjectSpec::One(name.into())
    }
}

impl From<Vec<SubjectRef>> for SubjectSpec {
    fn from(subjects: Vec<SubjectRef>) -> Self {
        SubjectSpec::Many(subjects)
    }
}

/// Normalized subject as persisted and evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subjects {
    One(String),
    Many(Vec<String>),
}

impl Subjects {
    pub fn contains(&self, subject: &str) -> bool {
        match self {
            Subjects::One(name) => name == ALL || name == subject,
            Subjects::Many(names) => names.iter().any(|n| n == ALL || n == subject),
        }
    }
}

/// Serializable rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub action: Action,
    pub subject: Subjects,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inverted: bool,
}

impl Rule {
    pub fn new(action: Action, subject: impl Into<String>) -> Self {
        Self {
            action,
            subject: Subjects::One(subject.into()),
            conditions: None,
            fields: None,
            inverted: false,
        }
    }
}

/// Condition source of a declared rule.
#[derive(Clone, Default)]
pub enum Conditions {
    #[default]
    None,
    /// Fixed conditions, persisted with the rule.
    Static(ConditionMap),
    /// Computed from the acting user when the ability is built.
    Dynamic(ConditionFn),
}

impl fmt::Debug for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conditions::None => f.write_str("None"),
            Conditions::Static(map) => f.debug_tuple("Static").field(map).finish(),
            Conditions::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A rule as declared by a feature module.
#[derive(Debug, Clone)]
pub struct RuleDef {
    pub action: Action,
    pub subject: SubjectSpec,
    pub conditions: Conditions,
    pub fields: Option<Vec<String>>,
    pub inverted: bool,
}

impl RuleDef {
    pub fn new(action: Action, subject: impl Into<SubjectSpec>) -> Self {
        Self {
            action,
            subject: subject.into(),
            conditions: Conditions::None,
            fields: None,
            inverted: false,
        }
    }

    /// Normalize into the static rule plus the dynamic condition function, if any.
    pub fn split(&self) -> (Rule, Option<ConditionFn>) {
        let (conditions, dynamic) = match &self.conditions {
            Conditions::None => (None, None),
            Conditions::Static(map) => (Some(map.clone()), None),
            Conditions::Dynamic(f) => (None, Some(Arc::clone(f))),
        };
        let rule = Rule {
            action: self.action,
            subject: self.subject.normalize(),
            conditions,
            fields: self.fields.clone(),
            inverted: self.inverted,
        };
        (rule, dynamic)
    }
}
