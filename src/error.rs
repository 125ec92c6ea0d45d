//! Error types
//!
//! Usage errors are returned to the caller. Store errors never cross the
//! metric operation boundary: they are logged and dropped there.

use thiserror::Error;

/// Programming mistakes detected at call time.
#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("metric {metric}: expected labels [{expected}], got [{got}]")]
    LabelMismatch {
        metric: String,
        expected: String,
        got: String,
    },

    #[error("invalid label name: {0:?}")]
    InvalidLabelName(String),

    #[error("label name declared twice: {0:?}")]
    DuplicateLabelName(String),

    #[error("label name is reserved for this metric kind: {0:?}")]
    ReservedLabelName(String),

    #[error("invalid metric name: {0:?}")]
    InvalidMetricName(String),

    #[error("metric already registered: {0}")]
    DuplicateMetric(String),

    #[error("invalid buckets for {metric}: {reason}")]
    InvalidBuckets { metric: String, reason: String },

    #[error("metric {metric}: value must be finite, got {value}")]
    NonFiniteValue { metric: String, value: f64 },

    #[error("invalid descriptor for {metric}: {reason}")]
    InvalidDescriptor { metric: String, reason: String },
}

/// Failures reported by a [`Store`](crate::store::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("wrong value type at {key}: {reason}")]
    WrongType { key: String, reason: String },

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Key decoding failures.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("key has no label separator: {0:?}")]
    MissingSeparator(String),

    #[error("label payload is not valid base64: {0}")]
    Base64(String),

    #[error("label payload is not a JSON string map: {0}")]
    Json(String),
}

/// Configuration and descriptor file loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),
}
