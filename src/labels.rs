//! Label sets
//!
//! A [`LabelSet`] is always kept sorted by label name, so two label sets built
//! from the same pairs in a different order compare (and encode) equal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label attached to every bucket row of a histogram.
pub const BUCKET_LABEL: &str = "le";

/// Label a buffered gauge adds to tell writer processes apart.
pub const GAUGE_INDEX_LABEL: &str = "gauge_index";

/// A concrete assignment of values to label names.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a label set from `(name, value)` pairs. Later duplicates win.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Label names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this set with one more label.
    pub fn with(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut labels = self.clone();
        labels.insert(name, value);
        labels
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl From<BTreeMap<String, String>> for LabelSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Prometheus label name grammar: `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Prometheus metric name grammar: `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_are_sorted() {
        let labels = LabelSet::from_pairs([("zone", "eu"), ("app", "api")]);
        let names: Vec<_> = labels.names().collect();
        assert_eq!(names, vec!["app", "zone"]);
    }

    #[test]
    fn test_order_insensitive_equality() {
        let a = LabelSet::from_pairs([("a", "1"), ("b", "2")]);
        let b = LabelSet::from_pairs([("b", "2"), ("a", "1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_with_does_not_mutate() {
        let base = LabelSet::from_pairs([("a", "1")]);
        let extended = base.with(BUCKET_LABEL, "5");
        assert_eq!(base.len(), 1);
        assert_eq!(extended.get("le"), Some("5"));
    }

    #[test]
    fn test_label_name_grammar() {
        assert!(is_valid_label_name("method"));
        assert!(is_valid_label_name("_private"));
        assert!(is_valid_label_name("code2"));
        assert!(!is_valid_label_name(""));
        assert!(!is_valid_label_name("2xx"));
        assert!(!is_valid_label_name("has-dash"));
        assert!(!is_valid_label_name("job:name"));
    }

    #[test]
    fn test_metric_name_grammar() {
        assert!(is_valid_metric_name("http_requests_total"));
        assert!(is_valid_metric_name("job:request_rate:5m"));
        assert!(!is_valid_metric_name(""));
        assert!(!is_valid_metric_name("1st"));
        assert!(!is_valid_metric_name("bad name"));
    }
}
