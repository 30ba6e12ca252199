//! Capability queries over a rule set.
//!
//! Rules are consulted from last to first; the first rule that matches the
//! action, subject, field and conditions decides. A matching inverted rule
//! denies, anything else allows. No matching rule denies.

use serde::Serialize;
use serde_json::Value;

use super::condition;
use super::rule::{Action, Rule, Subject};

/// A concrete subject instance: its subject name and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub subject: String,
    pub attributes: Value,
}

impl Instance {
    pub fn new(subject: impl Into<String>, attributes: Value) -> Self {
        Self {
            subject: subject.into(),
            attributes,
        }
    }

    /// Build an instance from a typed value.
    pub fn of<T: Subject + Serialize>(value: &T) -> crate::Result<Self> {
        Ok(Self {
            subject: T::subject_name(),
            attributes: serde_json::to_value(value)?,
        })
    }
}

/// What a check is made against.
enum Target<'a> {
    Type(&'a str),
    Instance(&'a Instance),
}

impl Target<'_> {
    fn subject(&self) -> &str {
        match self {
            Target::Type(subject) => subject,
            Target::Instance(instance) => &instance.subject,
        }
    }
}

/// Queryable set of rules built for one caller.
#[derive(Debug, Clone, Default)]
pub struct Ability {
    rules: Vec<Rule>,
}

impl Ability {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules applying to `action` on `subject`, highest precedence first.
    pub fn relevant_rules<'a>(
        &'a self,
        action: Action,
        subject: &'a str,
    ) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules
            .iter()
            .rev()
            .filter(move |rule| rule.action.covers(action) && rule.subject.contains(subject))
    }

    /// Whether `action` is allowed on some instances of `subject`.
    pub fn can(&self, action: Action, subject: &str) -> bool {
        self.decide(action, Target::Type(subject), None)
    }

    /// Whether `action` is allowed on this particular instance.
    pub fn can_instance(&self, action: Action, instance: &Instance) -> bool {
        self.decide(action, Target::Instance(instance), None)
    }

    /// Whether `action` is allowed on `field` of `subject`.
    pub fn can_field(&self, action: Action, subject: &str, field: &str) -> bool {
        self.decide(action, Target::Type(subject), Some(field))
    }

    pub fn cannot(&self, action: Action, subject: &str) -> bool {
        !self.can(action, subject)
    }

    fn decide(&self, action: Action, target: Target<'_>, field: Option<&str>) -> bool {
        self.relevant_rules(action, target.subject())
            .find(|rule| matches_field(rule, field) && matches_conditions(rule, &target))
            .is_some_and(|rule| !rule.inverted)
    }
}

fn matches_field(rule: &Rule, field: Option<&str>) -> bool {
    match (&rule.fields, field) {
        (None, _) => true,
        (Some(_), None) => !rule.inverted,
        (Some(fields), Some(field)) => fields.iter().any(|f| f == field),
    }
}

fn matches_conditions(rule: &Rule, target: &Target<'_>) -> bool {
    let Some(conditions) = &rule.conditions else {
        return true;
    };
    match target {
        // Without an instance a conditional rule may still apply to some
        // instances, but it cannot prove a denial.
        Target::Type(_) => !rule.inverted,
        Target::Instance(instance) => condition::matches(conditions, &instance.attributes),
    }
}
