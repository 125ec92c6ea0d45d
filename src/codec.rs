//! Store key codec
//!
//! A value key is `{name}{suffix}:{base64(json(labels))}`. The JSON object is
//! written with keys in sorted order, so set-equal label maps always map to
//! the same key. The base64 alphabet never contains `:`, which lets
//! [`decode`] split on the last separator even when the metric name itself
//! contains colons.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::BTreeMap;

use crate::error::CodecError;
use crate::labels::LabelSet;

/// Separates the metric name from the encoded labels.
pub const SEPARATOR: char = ':';

/// Encode a metric name, label set and optional suffix into a store key.
pub fn encode(name: &str, labels: &LabelSet, suffix: Option<&str>) -> String {
    let object: serde_json::Map<String, serde_json::Value> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    let json = serde_json::Value::Object(object).to_string();

    format!(
        "{}{}{}{}",
        name,
        suffix.unwrap_or(""),
        SEPARATOR,
        STANDARD.encode(json.as_bytes())
    )
}

/// Decode a store key back into `(name + suffix, labels)`.
pub fn decode(key: &str) -> Result<(String, LabelSet), CodecError> {
    let (name, packed) = key
        .rsplit_once(SEPARATOR)
        .ok_or_else(|| CodecError::MissingSeparator(key.to_string()))?;

    let bytes = STANDARD
        .decode(packed)
        .map_err(|e| CodecError::Base64(e.to_string()))?;
    let labels: BTreeMap<String, String> =
        serde_json::from_slice(&bytes).map_err(|e| CodecError::Json(e.to_string()))?;

    Ok((name.to_string(), LabelSet::from(labels)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_equal_labels_share_a_key() {
        let a = LabelSet::from_pairs([("method", "GET"), ("status", "200")]);
        let b = LabelSet::from_pairs([("status", "200"), ("method", "GET")]);
        assert_eq!(encode("http_total", &a, None), encode("http_total", &b, None));
    }

    #[test]
    fn test_different_labels_differ() {
        let a = LabelSet::from_pairs([("method", "GET")]);
        let b = LabelSet::from_pairs([("method", "POST")]);
        let c = LabelSet::from_pairs([("verb", "GET")]);
        assert_ne!(encode("m", &a, None), encode("m", &b, None));
        assert_ne!(encode("m", &a, None), encode("m", &c, None));
    }

    #[test]
    fn test_round_trip() {
        let labels = LabelSet::from_pairs([
            ("path", "/api/v1:items"),
            ("quote", "say \"hi\""),
            ("unicode", "héllo ✓"),
        ]);
        let key = encode("requests", &labels, None);
        let (name, decoded) = decode(&key).unwrap();
        assert_eq!(name, "requests");
        assert_eq!(decoded, labels);
    }

    #[test]
    fn test_empty_labels_round_trip() {
        let key = encode("uptime", &LabelSet::new(), None);
        let (name, decoded) = decode(&key).unwrap();
        assert_eq!(name, "uptime");
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_suffix_joins_name() {
        let labels = LabelSet::from_pairs([("route", "/")]);
        let key = encode("latency", &labels, Some("_sum"));
        assert!(key.starts_with("latency_sum:"));
        let (name, decoded) = decode(&key).unwrap();
        assert_eq!(name, "latency_sum");
        assert_eq!(decoded, labels);
    }

    #[test]
    fn test_colon_in_metric_name() {
        let labels = LabelSet::from_pairs([("job", "api")]);
        let key = encode("job:requests:rate5m", &labels, None);
        let (name, decoded) = decode(&key).unwrap();
        assert_eq!(name, "job:requests:rate5m");
        assert_eq!(decoded, labels);
    }

    #[test]
    fn test_decode_rejects_malformed_keys() {
        assert!(matches!(
            decode("no_separator"),
            Err(CodecError::MissingSeparator(_))
        ));
        assert!(matches!(decode("name:!!!"), Err(CodecError::Base64(_))));

        let not_json = format!("name:{}", STANDARD.encode("not json"));
        assert!(matches!(decode(&not_json), Err(CodecError::Json(_))));

        let not_strings = format!("name:{}", STANDARD.encode(r#"{"le":1}"#));
        assert!(matches!(decode(&not_strings), Err(CodecError::Json(_))));
    }
}
