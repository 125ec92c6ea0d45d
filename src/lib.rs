//! promstore
//!
//! Prometheus metrics shared by many processes through a key-value store.
//! Every process writes updates straight to the store; any process can
//! render the aggregate in the Prometheus text exposition format.

pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod group;
pub mod labels;
pub mod logging;
pub mod metrics;
pub mod refresher;
pub mod registry;
pub mod render;
pub mod server;
pub mod store;
pub mod timer;

pub use config::{ExporterConfig, RedisConfig, RegistryConfig};
pub use error::{CodecError, ConfigError, MetricsError, StoreError};
pub use labels::LabelSet;
pub use metrics::{
    CommonGauge, Counter, Gauge, GaugeMode, GaugeOptions, Histogram, Metric, MetricDescriptor,
    MetricKind, Summary,
};
pub use registry::Registry;
pub use store::{Batch, MemoryStore, RedisStore, Store};
pub use timer::Timer;
