//! Prometheus text exposition helpers

use std::fmt::Write as FmtWrite;

use crate::labels::LabelSet;
use crate::metrics::MetricKind;

/// Content type of the exposition document.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// `# HELP` and `# TYPE` lines of one metric block.
pub fn header(name: &str, documentation: &str, kind: MetricKind) -> String {
    format!(
        "# HELP {} {}\n# TYPE {} {}",
        name,
        escape_help(documentation),
        name,
        kind.as_str()
    )
}

/// One sample line: `name{labels} value`.
pub fn sample_line(name: &str, labels: &LabelSet, value: &str) -> String {
    format!("{}{} {}", name, format_labels(labels), value)
}

/// `{a="1",b="2"}` in label name order, or nothing for an empty set.
pub fn format_labels(labels: &LabelSet) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut buf = String::from("{");
    for (i, (name, value)) in labels.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        let _ = write!(buf, "{}=\"{}\"", name, escape_label_value(value));
    }
    buf.push('}');
    buf
}

pub fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a sample value, rendering integers without decimal.
pub fn format_value(val: f64) -> String {
    if val.is_nan() {
        "NaN".to_string()
    } else if val.is_infinite() {
        let inf = if val > 0.0 { "+Inf" } else { "-Inf" };
        inf.to_string()
    } else if val == val.floor() && val.abs() < 1e15 {
        format!("{}", val as i64)
    } else {
        format!("{}", val)
    }
}

/// Format a histogram bucket bound for the `le` label.
pub fn format_bound(v: f64) -> String {
    format_value(v)
}

/// Normalize a raw stored value for output. Integers pass through untouched
/// so large counters keep full precision.
pub fn normalize_value(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.parse::<i64>().is_ok() {
        return Some(raw.to_string());
    }
    raw.parse::<f64>().ok().map(format_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_label_value_quotes() {
        let escaped = escape_label_value("say \"hello\"");
        assert_eq!(escaped, "say \\\"hello\\\"");
    }

    #[test]
    fn test_escape_label_value_backslash() {
        let escaped = escape_label_value("path\\to\\thing");
        assert_eq!(escaped, "path\\\\to\\\\thing");
    }

    #[test]
    fn test_escape_label_value_newline() {
        let escaped = escape_label_value("line1\nline2");
        assert_eq!(escaped, "line1\\nline2");
    }

    #[test]
    fn test_format_labels_sorted() {
        let labels = LabelSet::from_pairs([("status", "200"), ("method", "GET")]);
        assert_eq!(format_labels(&labels), "{method=\"GET\",status=\"200\"}");
    }

    #[test]
    fn test_format_labels_empty() {
        assert_eq!(format_labels(&LabelSet::new()), "");
    }

    #[test]
    fn test_sample_line() {
        let labels = LabelSet::from_pairs([("dir", "in")]);
        assert_eq!(sample_line("bytes_total", &labels, "150"), "bytes_total{dir=\"in\"} 150");
        assert_eq!(sample_line("up", &LabelSet::new(), "1"), "up 1");
    }

    #[test]
    fn test_header() {
        assert_eq!(
            header("jobs", "Jobs run\nper worker", MetricKind::Counter),
            "# HELP jobs Jobs run\\nper worker\n# TYPE jobs counter"
        );
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(-3.0), "-3");
        assert_eq!(format_value(2.75), "2.75");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(f64::NAN), "NaN");
    }

    #[test]
    fn test_format_bound_integer() {
        assert_eq!(format_bound(1.0), "1");
        assert_eq!(format_bound(10.0), "10");
    }

    #[test]
    fn test_format_bound_float() {
        assert_eq!(format_bound(0.5), "0.5");
        assert_eq!(format_bound(2.5), "2.5");
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("8").as_deref(), Some("8"));
        assert_eq!(normalize_value("100.0").as_deref(), Some("100"));
        assert_eq!(normalize_value("7.5").as_deref(), Some("7.5"));
        assert_eq!(
            normalize_value("9223372036854775807").as_deref(),
            Some("9223372036854775807")
        );
        assert_eq!(normalize_value("abc"), None);
    }
}
