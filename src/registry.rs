//! Metric registry
//!
//! Owns the metrics of one process, the store they share and the refresher
//! that keeps buffered gauges alive. Rendering reads the store, so a
//! registry in any process renders the aggregate of every process.

use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RegistryConfig;
use crate::error::MetricsError;
use crate::metrics::{
    CommonGauge, Counter, Gauge, GaugeMode, GaugeOptions, Histogram, Metric, MetricDescriptor,
    MetricKind, Summary,
};
use crate::refresher::Refresher;
use crate::render;
use crate::store::Store;

#[derive(Debug)]
pub struct Registry {
    store: Arc<dyn Store>,
    config: RegistryConfig,
    /// Registration order is output order
    metrics: RwLock<Vec<Metric>>,
    refresher: Arc<Refresher>,
}

impl Registry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, RegistryConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: RegistryConfig) -> Self {
        let refresher = Arc::new(Refresher::from_config(&config));
        Self {
            store,
            config,
            metrics: RwLock::new(Vec::new()),
            refresher,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn refresher(&self) -> &Arc<Refresher> {
        &self.refresher
    }

    pub fn register_counter(
        &self,
        name: &str,
        documentation: &str,
        label_names: &[&str],
    ) -> Result<Arc<Counter>, MetricsError> {
        let counter = Arc::new(Counter::new(name, documentation, label_names, self.store())?);
        self.add_metric(counter.clone().into())?;
        Ok(counter)
    }

    /// Buffered gauge with the registry's default expire and index key.
    ///
    /// Buffered values are only kept alive by the refresher. Call
    /// [`Registry::start`] once the registry is set up, otherwise every
    /// series expires `expire` after its last update.
    pub fn register_gauge(
        &self,
        name: &str,
        documentation: &str,
        label_names: &[&str],
    ) -> Result<Arc<Gauge>, MetricsError> {
        self.register_gauge_with(name, documentation, label_names, GaugeOptions::from_config(&self.config))
    }

    pub fn register_gauge_with(
        &self,
        name: &str,
        documentation: &str,
        label_names: &[&str],
        options: GaugeOptions,
    ) -> Result<Arc<Gauge>, MetricsError> {
        let gauge = Gauge::new(
            name,
            documentation,
            label_names,
            options,
            self.store(),
            Some(self.refresher.clone()),
        )?;
        self.add_metric(gauge.clone().into())?;
        Ok(gauge)
    }

    pub fn register_common_gauge(
        &self,
        name: &str,
        documentation: &str,
        label_names: &[&str],
        expire: Option<Duration>,
    ) -> Result<Arc<CommonGauge>, MetricsError> {
        let gauge = Arc::new(CommonGauge::new(
            name,
            documentation,
            label_names,
            expire,
            self.store(),
        )?);
        self.add_metric(gauge.clone().into())?;
        Ok(gauge)
    }

    pub fn register_histogram(
        &self,
        name: &str,
        documentation: &str,
        label_names: &[&str],
        buckets: &[f64],
    ) -> Result<Arc<Histogram>, MetricsError> {
        let histogram = Arc::new(Histogram::new(
            name,
            documentation,
            label_names,
            buckets,
            self.store(),
        )?);
        self.add_metric(histogram.clone().into())?;
        Ok(histogram)
    }

    pub fn register_summary(
        &self,
        name: &str,
        documentation: &str,
        label_names: &[&str],
    ) -> Result<Arc<Summary>, MetricsError> {
        let summary = Arc::new(Summary::new(name, documentation, label_names, self.store())?);
        self.add_metric(summary.clone().into())?;
        Ok(summary)
    }

    /// Build and register the metric a descriptor describes.
    pub fn register_descriptor(&self, desc: &MetricDescriptor) -> Result<Metric, MetricsError> {
        let invalid = |reason: &str| MetricsError::InvalidDescriptor {
            metric: desc.metric_name.clone(),
            reason: reason.to_string(),
        };
        let name = desc.metric_name.as_str();
        let doc = desc.description.as_str();
        let labels: Vec<&str> = desc.label_names.iter().map(String::as_str).collect();

        if desc.metric_type != MetricKind::Histogram && desc.buckets.is_some() {
            return Err(invalid("only histograms take buckets"));
        }
        if desc.metric_type != MetricKind::Gauge && (desc.expire.is_some() || desc.gauge_mode.is_some()) {
            return Err(invalid("only gauges take expire or gaugeMode"));
        }

        let metric: Metric = match desc.metric_type {
            MetricKind::Counter => self.register_counter(name, doc, &labels)?.into(),
            MetricKind::Summary => self.register_summary(name, doc, &labels)?.into(),
            MetricKind::Histogram => {
                let buckets = desc
                    .buckets
                    .as_deref()
                    .ok_or_else(|| invalid("histogram requires buckets"))?;
                self.register_histogram(name, doc, &labels, buckets)?.into()
            }
            MetricKind::Gauge => match desc.gauge_mode.unwrap_or(GaugeMode::Direct) {
                GaugeMode::Direct => {
                    let expire = desc.expire.map(Duration::from_secs);
                    self.register_common_gauge(name, doc, &labels, expire)?.into()
                }
                GaugeMode::Buffered => {
                    let mut options = GaugeOptions::from_config(&self.config);
                    if let Some(secs) = desc.expire {
                        options.expire = Duration::from_secs(secs);
                    }
                    self.register_gauge_with(name, doc, &labels, options)?.into()
                }
            },
        };
        Ok(metric)
    }

    /// Add a metric. A name already taken, or one that collides with the
    /// `_bucket`/`_count`/`_sum` series of a histogram or summary, is
    /// rejected and the earlier registration stays.
    pub fn add_metric(&self, metric: Metric) -> Result<(), MetricsError> {
        let mut metrics = self.metrics.write();
        if metrics.iter().any(|m| m.conflicts_with(&metric)) {
            return Err(MetricsError::DuplicateMetric(metric.name().to_string()));
        }
        tracing::debug!(metric = %metric.name(), kind = metric.kind().as_str(), "metric registered");
        metrics.push(metric);
        Ok(())
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.metrics.read().clone()
    }

    pub fn descriptors(&self) -> Vec<MetricDescriptor> {
        self.metrics.read().iter().map(Metric::descriptor).collect()
    }

    pub fn add_refresh_function<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.refresher.add(callback);
    }

    /// Start the refresher on the current tokio runtime.
    pub fn start(&self) {
        self.refresher.start();
    }

    /// One block per metric: `# HELP`, `# TYPE`, then sorted sample lines.
    /// A metric whose collection fails renders its header only.
    pub async fn collect_all(&self) -> Vec<String> {
        let metrics = self.metrics();
        let mut blocks = Vec::with_capacity(metrics.len());

        for metric in &metrics {
            let mut block = render::header(metric.name(), metric.documentation(), metric.kind());
            match metric.collect().await {
                Ok(mut lines) => {
                    lines.sort();
                    for line in lines {
                        block.push('\n');
                        block.push_str(&line);
                    }
                }
                Err(e) => {
                    tracing::error!(metric = %metric.name(), error = %e, "failed to collect metric");
                }
            }
            blocks.push(block);
        }
        blocks
    }

    /// The full exposition document.
    pub async fn render(&self) -> String {
        let blocks = self.collect_all().await;
        if blocks.is_empty() {
            return String::new();
        }
        let mut output = blocks.join("\n");
        output.push('\n');
        output
    }

    /// Stop refreshing, withdraw buffered gauge series and forget every
    /// metric.
    pub async fn stop(&self) {
        self.refresher.stop();
        let metrics = std::mem::take(&mut *self.metrics.write());
        for metric in &metrics {
            metric.cleanup().await;
        }
        tracing::debug!(count = metrics.len(), "registry stopped");
    }
}
