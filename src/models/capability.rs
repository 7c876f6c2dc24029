use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A set of capability strings (e.g. `iam.token.create`).
///
/// Ordered so that serialized tokens and audit payloads are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff every element of `required` is held.
    pub fn has_all(&self, required: &CapabilitySet) -> bool {
        required.0.is_subset(&self.0)
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    /// Set union; duplicates collapse.
    pub fn union(&self, other: &CapabilitySet) -> CapabilitySet {
        CapabilitySet(self.0.union(&other.0).cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        CapabilitySet(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for CapabilitySet {
    fn from(v: Vec<String>) -> Self {
        v.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_all_subset() {
        let held: CapabilitySet = ["a", "b", "c"].into_iter().collect();
        let required: CapabilitySet = ["a", "c"].into_iter().collect();
        assert!(held.has_all(&required));
        assert!(!required.has_all(&held));
    }

    #[test]
    fn test_empty_requirement_always_held() {
        let held = CapabilitySet::new();
        assert!(held.has_all(&CapabilitySet::new()));
    }

    #[test]
    fn test_union_collapses_duplicates() {
        let a: CapabilitySet = ["a", "b"].into_iter().collect();
        let b: CapabilitySet = ["b", "c"].into_iter().collect();
        let u = a.union(&b);
        assert_eq!(u.to_vec(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let set: CapabilitySet = ["x", "y"].into_iter().collect();
        assert_eq!(serde_json::to_value(&set).unwrap(), serde_json::json!(["x", "y"]));
    }
}
