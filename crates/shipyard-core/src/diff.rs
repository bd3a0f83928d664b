//! Desired vs current state comparison
//!
//! Provides [`ResourceDiff`], a structural comparison of two JSON documents.
//!
//! # Invariants
//! - A missing current state is a change affecting the root path
//! - The fingerprint depends only on the differing values, so the same
//!   drift observed on two checks yields the same fingerprint

use std::collections::BTreeMap;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Difference between a resource's desired and current state
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDiff {
    desired: Value,
    current: Option<Value>,
    changes: BTreeMap<String, (Value, Value)>,
}

impl ResourceDiff {
    /// Compare desired against current
    #[must_use]
    pub fn new(desired: Value, current: Option<Value>) -> Self {
        let mut changes = BTreeMap::new();
        match &current {
            Some(current) => collect_changes("", &desired, current, &mut changes),
            None => {
                changes.insert(String::from("/"), (desired.clone(), Value::Null));
            }
        }
        Self {
            desired,
            current,
            changes,
        }
    }

    /// Desired state
    #[inline]
    #[must_use]
    pub fn desired(&self) -> &Value {
        &self.desired
    }

    /// Current state, `None` when the resource does not exist
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    /// Anything differs
    #[inline]
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// The resource does not exist yet
    #[inline]
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.current.is_none()
    }

    /// Paths (JSON pointer style) whose values differ
    pub fn affected_paths(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    /// Differences as `{path: {desired, current}}`
    #[must_use]
    pub fn delta_json(&self) -> Value {
        let delta: serde_json::Map<String, Value> = self
            .changes
            .iter()
            .map(|(path, (desired, current))| {
                (
                    path.clone(),
                    json!({ "desired": desired, "current": current }),
                )
            })
            .collect();
        Value::Object(delta)
    }

    /// SHA-256 of the delta, hex encoded
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.delta_json().to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn collect_changes(
    path: &str,
    desired: &Value,
    current: &Value,
    changes: &mut BTreeMap<String, (Value, Value)>,
) {
    match (desired, current) {
        (Value::Object(want), Value::Object(have)) => {
            for (key, value) in want {
                let child = format!("{path}/{key}");
                match have.get(key) {
                    Some(existing) => collect_changes(&child, value, existing, changes),
                    None => {
                        changes.insert(child, (value.clone(), Value::Null));
                    }
                }
            }
            for (key, value) in have {
                if !want.contains_key(key) {
                    changes.insert(format!("{path}/{key}"), (Value::Null, value.clone()));
                }
            }
        }
        (Value::Array(want), Value::Array(have)) if want.len() == have.len() => {
            for (i, (w, h)) in want.iter().zip(have.iter()).enumerate() {
                collect_changes(&format!("{path}/{i}"), w, h, changes);
            }
        }
        _ if desired == current => {}
        _ => {
            let key = if path.is_empty() { "/" } else { path };
            changes.insert(key.to_string(), (desired.clone(), current.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identical_documents_have_no_changes() {
        let spec = json!({"capacity": {"min": 1, "max": 3}, "tags": ["a", "b"]});
        let diff = ResourceDiff::new(spec.clone(), Some(spec));
        assert!(!diff.has_changes());
        assert!(!diff.is_missing());
        assert_eq!(diff.affected_paths().count(), 0);
    }

    #[test]
    fn nested_changes_are_reported_by_path() {
        let diff = ResourceDiff::new(
            json!({"capacity": {"min": 1, "max": 3}, "image": "fnord:2.0"}),
            Some(json!({"capacity": {"min": 1, "max": 2}, "image": "fnord:2.0", "stale": true})),
        );
        let paths: Vec<&str> = diff.affected_paths().collect();
        assert_eq!(paths, ["/capacity/max", "/stale"]);
        assert_eq!(
            diff.delta_json()["/capacity/max"],
            json!({"desired": 3, "current": 2})
        );
    }

    #[test]
    fn missing_current_is_a_root_change() {
        let diff = ResourceDiff::new(json!({"image": "fnord:1.0"}), None);
        assert!(diff.is_missing());
        assert!(diff.has_changes());
        assert_eq!(diff.affected_paths().collect::<Vec<_>>(), ["/"]);
    }

    #[test]
    fn fingerprint_is_stable_for_the_same_drift() {
        let a = ResourceDiff::new(json!({"image": "fnord:2.0"}), Some(json!({"image": "fnord:1.0"})));
        let b = ResourceDiff::new(json!({"image": "fnord:2.0"}), Some(json!({"image": "fnord:1.0"})));
        let c = ResourceDiff::new(json!({"image": "fnord:3.0"}), Some(json!({"image": "fnord:1.0"})));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
