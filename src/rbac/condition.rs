//! Condition matching against subject instances.
//!
//! Conditions are a map from dotted attribute path to an expected value.
//! The expected value is either a literal (equality) or an operator object
//! such as `{ "$in": [1, 2] }`. Arrays encountered along a path fan out:
//! the condition holds if any element satisfies it.

use std::cmp::Ordering;

use serde_json::Value;

use super::rule::ConditionMap;

/// Whether `instance` satisfies every entry of `conditions`.
pub fn matches(conditions: &ConditionMap, instance: &Value) -> bool {
    conditions
        .iter()
        .all(|(path, expected)| field_matches(&lookup(instance, path), expected))
}

fn field_matches(found: &[&Value], expected: &Value) -> bool {
    match operators(expected) {
        Some(ops) => ops.iter().all(|(op, arg)| apply(op, found, arg)),
        None => found.iter().any(|value| equals(value, expected)),
    }
}

/// Returns the operator entries when `value` is an operator object.
fn operators(value: &Value) -> Option<Vec<(&str, &Value)>> {
    let object = value.as_object()?;
    if object.is_empty() || !object.keys().all(|k| k.starts_with('$')) {
        return None;
    }
    Some(object.iter().map(|(k, v)| (k.as_str(), v)).collect())
}

fn apply(op: &str, found: &[&Value], arg: &Value) -> bool {
    match op {
        "$eq" => found.iter().any(|v| equals(v, arg)),
        "$ne" => !found.iter().any(|v| equals(v, arg)),
        "$in" => match arg.as_array() {
            Some(options) => options.iter().any(|o| found.iter().any(|v| equals(v, o))),
            None => false,
        },
        "$nin" => match arg.as_array() {
            Some(options) => !options.iter().any(|o| found.iter().any(|v| equals(v, o))),
            None => false,
        },
        "$gt" => found.iter().any(|v| compare(v, arg) == Some(Ordering::Greater)),
        "$gte" => found
            .iter()
            .any(|v| matches!(compare(v, arg), Some(Ordering::Greater | Ordering::Equal))),
        "$lt" => found.iter().any(|v| compare(v, arg) == Some(Ordering::Less)),
        "$lte" => found
            .iter()
            .any(|v| matches!(compare(v, arg), Some(Ordering::Less | Ordering::Equal))),
        "$exists" => {
            let present = found.iter().any(|v| !v.is_null());
            arg.as_bool().unwrap_or(true) == present
        }
        _ => {
            tracing::warn!("Unsupported condition operator {op}");
            false
        }
    }
}

/// Equality with array membership: `["a", "b"]` equals `"a"`.
fn equals(value: &Value, expected: &Value) -> bool {
    if value == expected {
        return true;
    }
    if let (Some(a), Some(b)) = (value.as_f64(), expected.as_f64()) {
        return a == b;
    }
    match value {
        Value::Array(items) if !expected.is_array() => items.iter().any(|i| equals(i, expected)),
        _ => false,
    }
}

fn compare(value: &Value, other: &Value) -> Option<Ordering> {
    match (value, other) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Collect every value reachable at `path`, fanning out over arrays.
fn lookup<'a>(root: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![root];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(child) = map.get(segment) {
                        next.push(child);
                    }
                }
                Value::Array(items) => {
                    if let Ok(index) = segment.parse::<usize>() {
                        if let Some(child) = items.get(index) {
                            next.push(child);
                        }
                    } else {
                        next.extend(items.iter().filter_map(|item| item.get(segment)));
                    }
                }
                _ => {}
            }
        }
        if next.is_empty() {
            return next;
        }
        current = next;
    }
    current
}
