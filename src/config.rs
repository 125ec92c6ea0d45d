//! Configuration
//!
//! Every struct deserializes with defaults for missing fields, so an empty
//! JSON5 document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::metrics::MetricDescriptor;

/// Registry and refresher tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Minimum spacing between two refresh passes, in seconds
    #[serde(default = "default_refresh_period_secs")]
    pub refresh_period_secs: u64,

    /// Refresher tick granularity, in milliseconds
    #[serde(default = "default_refresh_tick_ms")]
    pub refresh_tick_ms: u64,

    /// TTL of buffered gauge values in the store, in seconds
    #[serde(default = "default_gauge_expire_secs")]
    pub gauge_expire_secs: u64,

    /// Shared counter handing out per-process gauge indexes
    #[serde(default = "default_gauge_index_key")]
    pub gauge_index_key: String,
}

fn default_refresh_period_secs() -> u64 {
    30
}

fn default_refresh_tick_ms() -> u64 {
    1000
}

fn default_gauge_expire_secs() -> u64 {
    60
}

fn default_gauge_index_key() -> String {
    "GLOBAL_GAUGE_INDEX".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_period_secs: default_refresh_period_secs(),
            refresh_tick_ms: default_refresh_tick_ms(),
            gauge_expire_secs: default_gauge_expire_secs(),
            gauge_index_key: default_gauge_index_key(),
        }
    }
}

impl RegistryConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_period_secs)
    }

    pub fn refresh_tick(&self) -> Duration {
        Duration::from_millis(self.refresh_tick_ms.max(1))
    }

    pub fn gauge_expire(&self) -> Duration {
        Duration::from_secs(self.gauge_expire_secs)
    }
}

/// Redis connection settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisConfig {
    /// Full connection URL; overrides host/port/db/password when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Hostname
    #[serde(default = "default_host")]
    pub host: String,

    /// Port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database number
    #[serde(default = "default_db")]
    pub db: u32,

    /// Password
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_db() -> u32 {
    0
}

fn default_timeout() -> u64 {
    30
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            db: default_db(),
            password: None,
            timeout: default_timeout(),
        }
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisConfig {
    /// Connection URL for the `redis` client.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Configuration file of the `promstore` exporter binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExporterConfig {
    /// Address the HTTP endpoint binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Metrics to render, in output order
    #[serde(default)]
    pub metrics: Vec<MetricDescriptor>,
}

fn default_listen() -> String {
    "127.0.0.1:9464".to_string()
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            redis: RedisConfig::default(),
            logging: LoggingConfig::default(),
            registry: RegistryConfig::default(),
            metrics: Vec::new(),
        }
    }
}

impl ExporterConfig {
    /// Parse a JSON5 document.
    pub fn from_json5(text: &str) -> Result<Self, ConfigError> {
        json5::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a JSON5 file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json5(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;
    use std::io::Write;

    #[test]
    fn test_registry_config_default() {
        let config = RegistryConfig::default();
        assert_eq!(config.refresh_period(), Duration::from_secs(30));
        assert_eq!(config.refresh_tick(), Duration::from_secs(1));
        assert_eq!(config.gauge_expire(), Duration::from_secs(60));
        assert_eq!(config.gauge_index_key, "GLOBAL_GAUGE_INDEX");
    }

    #[test]
    fn test_refresh_tick_never_zero() {
        let config = RegistryConfig {
            refresh_tick_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.refresh_tick(), Duration::from_millis(1));
    }

    #[test]
    fn test_redis_url() {
        let mut config = RedisConfig::default();
        assert_eq!(config.connection_url(), "redis://localhost:6379/0");

        config.password = Some("hunter2".to_string());
        config.db = 3;
        assert_eq!(config.connection_url(), "redis://:hunter2@localhost:6379/3");

        config.url = Some("redis://cache:6380/1".to_string());
        assert_eq!(config.connection_url(), "redis://cache:6380/1");
    }

    #[test]
    fn test_redis_debug_hides_password() {
        let config = RedisConfig {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_exporter_config_empty_document() {
        let config = ExporterConfig::from_json5("{}").unwrap();
        assert_eq!(config.listen, "127.0.0.1:9464");
        assert_eq!(config.redis, RedisConfig::default());
        assert!(config.metrics.is_empty());
    }

    #[test]
    fn test_exporter_config_json5() {
        let text = r#"{
            // scrape endpoint
            listen: "0.0.0.0:9100",
            redis: { host: "redis", port: 6380 },
            registry: { refreshPeriodSecs: 10 },
            metrics: [
                {
                    metricType: "histogram",
                    metricName: "job_seconds",
                    description: "Job duration",
                    labelNames: ["queue"],
                    buckets: [0.5, 1, 5],
                },
            ],
        }"#;
        let config = ExporterConfig::from_json5(text).unwrap();
        assert_eq!(config.listen, "0.0.0.0:9100");
        assert_eq!(config.redis.host, "redis");
        assert_eq!(config.redis.port, 6380);
        assert_eq!(config.registry.refresh_period_secs, 10);
        assert_eq!(config.registry.refresh_tick_ms, 1000);
        assert_eq!(config.metrics.len(), 1);
        assert_eq!(config.metrics[0].metric_type, MetricKind::Histogram);
        assert_eq!(config.metrics[0].buckets, Some(vec![0.5, 1.0, 5.0]));
    }

    #[test]
    fn test_exporter_config_parse_error() {
        let err = ExporterConfig::from_json5("{ listen: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_exporter_config_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ listen: \"127.0.0.1:1234\" }}").unwrap();
        let config = ExporterConfig::load(file.path()).unwrap();
        assert_eq!(config.listen, "127.0.0.1:1234");
    }

    #[test]
    fn test_exporter_config_missing_file() {
        let err = ExporterConfig::load(Path::new("/nonexistent/promstore.json5")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
