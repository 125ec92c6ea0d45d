//! Metric kinds
//!
//! Each kind turns an update into one batch of store commands and knows how
//! to collect its own sample lines. [`Metric`] is the tagged union the
//! registry stores and renders.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::codec;
use crate::error::{MetricsError, StoreError};
use crate::group::GroupIndex;
use crate::labels::{is_valid_label_name, is_valid_metric_name, LabelSet};
use crate::render;
use crate::store::{Batch, Store};

pub mod common_gauge;
pub mod counter;
pub mod gauge;
pub mod histogram;
pub mod summary;

pub use common_gauge::{CommonGauge, CommonGaugeHandle};
pub use counter::{Counter, CounterHandle};
pub use gauge::{Gauge, GaugeHandle, GaugeOptions};
pub use histogram::{Histogram, HistogramHandle};
pub use summary::{Summary, SummaryHandle};

/// Exposition type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

/// Which gauge write path a gauge descriptor maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeMode {
    /// Locally buffered, periodically refreshed, one series per process
    Buffered,
    /// Written straight to the store, optionally with a TTL
    Direct,
}

/// Serializable description of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDescriptor {
    pub metric_type: MetricKind,
    pub metric_name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_names: Vec<String>,
    /// Histogram bucket upper bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<f64>>,
    /// Gauge write path; direct when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gauge_mode: Option<GaugeMode>,
    /// Gauge value TTL in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<u64>,
}

impl MetricDescriptor {
    pub fn new(metric_type: MetricKind, metric_name: &str, description: &str) -> Self {
        Self {
            metric_type,
            metric_name: metric_name.to_string(),
            description: description.to_string(),
            label_names: Vec::new(),
            buckets: None,
            gauge_mode: None,
            expire: None,
        }
    }

    pub fn with_label_names(mut self, label_names: &[&str]) -> Self {
        self.label_names = label_names.iter().map(|s| s.to_string()).collect();
        self.label_names.sort();
        self
    }
}

/// A collected sample, value already normalized for output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Sample {
    pub(crate) name: String,
    pub(crate) labels: LabelSet,
    pub(crate) value: String,
}

impl Sample {
    pub(crate) fn render(&self) -> String {
        render::sample_line(&self.name, &self.labels, &self.value)
    }
}

/// State shared by every metric kind: identity, declared labels and the
/// store handle.
#[derive(Debug)]
pub(crate) struct MetricCore {
    name: String,
    documentation: String,
    label_names: Vec<String>,
    group: GroupIndex,
    store: Arc<dyn Store>,
}

impl MetricCore {
    /// Validate names and build the core. `reserved` lists label names the
    /// kind adds on its own and callers may not declare.
    pub(crate) fn new(
        name: &str,
        documentation: &str,
        label_names: &[&str],
        reserved: &[&str],
        store: Arc<dyn Store>,
    ) -> Result<Self, MetricsError> {
        if !is_valid_metric_name(name) {
            return Err(MetricsError::InvalidMetricName(name.to_string()));
        }

        let mut seen = BTreeSet::new();
        for label in label_names {
            if !is_valid_label_name(label) {
                return Err(MetricsError::InvalidLabelName(label.to_string()));
            }
            if reserved.contains(label) {
                return Err(MetricsError::ReservedLabelName(label.to_string()));
            }
            if !seen.insert(*label) {
                return Err(MetricsError::DuplicateLabelName(label.to_string()));
            }
        }

        Ok(Self {
            name: name.to_string(),
            documentation: documentation.to_string(),
            label_names: label_names.iter().map(|s| s.to_string()).collect(),
            group: GroupIndex::for_metric(name),
            store,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn documentation(&self) -> &str {
        &self.documentation
    }

    /// Label names in declaration order.
    pub(crate) fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub(crate) fn store(&self) -> &dyn Store {
        &*self.store
    }

    pub(crate) fn group(&self) -> &GroupIndex {
        &self.group
    }

    pub(crate) fn key(&self, labels: &LabelSet, suffix: Option<&str>) -> String {
        codec::encode(&self.name, labels, suffix)
    }

    pub(crate) fn descriptor(&self, kind: MetricKind) -> MetricDescriptor {
        let mut label_names = self.label_names.clone();
        label_names.sort();
        MetricDescriptor {
            label_names,
            ..MetricDescriptor::new(kind, &self.name, &self.documentation)
        }
    }

    /// The label keys must be exactly the declared label names.
    pub(crate) fn check_labels(&self, labels: &LabelSet) -> Result<(), MetricsError> {
        let expected: BTreeSet<&str> = self.label_names.iter().map(String::as_str).collect();
        let got: BTreeSet<&str> = labels.names().collect();
        if expected != got {
            return Err(MetricsError::LabelMismatch {
                metric: self.name.clone(),
                expected: expected.into_iter().collect::<Vec<_>>().join(", "),
                got: got.into_iter().collect::<Vec<_>>().join(", "),
            });
        }
        Ok(())
    }

    pub(crate) fn labels_from_pairs(&self, pairs: &[(&str, &str)]) -> Result<LabelSet, MetricsError> {
        let labels = LabelSet::from_pairs(pairs.iter().copied());
        self.check_labels(&labels)?;
        Ok(labels)
    }

    /// Label values given positionally, in declaration order.
    pub(crate) fn labels_from_values(&self, values: &[&str]) -> Result<LabelSet, MetricsError> {
        if values.len() != self.label_names.len() {
            return Err(MetricsError::LabelMismatch {
                metric: self.name.clone(),
                expected: self.label_names.join(", "),
                got: format!("{} positional values", values.len()),
            });
        }
        Ok(self
            .label_names
            .iter()
            .map(String::as_str)
            .zip(values.iter().copied())
            .collect())
    }

    pub(crate) fn check_finite(&self, value: f64) -> Result<(), MetricsError> {
        if !value.is_finite() {
            return Err(MetricsError::NonFiniteValue {
                metric: self.name.clone(),
                value,
            });
        }
        Ok(())
    }

    /// Run a write batch. Store failures are logged and swallowed; the
    /// return value only tells whether the write landed.
    pub(crate) async fn execute(&self, op: &'static str, batch: Batch) -> bool {
        match self.store.execute(batch).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(metric = %self.name, op, error = %e, "store write failed, update dropped");
                false
            }
        }
    }

    /// Read every group member that still has a value. Members without a
    /// value have expired and are pruned from the index.
    pub(crate) async fn collect_samples(&self) -> Result<Vec<Sample>, StoreError> {
        let members = self.group.members(self.store()).await?;
        let mut samples = Vec::with_capacity(members.len());
        let mut expired = Vec::new();

        for key in members {
            let (name, labels) = match codec::decode(&key) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(metric = %self.name, key = %key, error = %e, "skipping undecodable group member");
                    continue;
                }
            };

            match self.store.get(&key).await? {
                Some(raw) => match render::normalize_value(&raw) {
                    Some(value) => samples.push(Sample {
                        name,
                        labels,
                        value,
                    }),
                    None => {
                        tracing::warn!(metric = %self.name, key = %key, value = %raw, "skipping non-numeric value");
                    }
                },
                None => expired.push(key),
            }
        }

        if let Err(e) = self.group.prune(self.store(), expired).await {
            tracing::warn!(metric = %self.name, error = %e, "failed to prune expired group members");
        }

        Ok(samples)
    }

    /// Collect and render with no kind-specific additions.
    pub(crate) async fn collect_lines(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .collect_samples()
            .await?
            .iter()
            .map(Sample::render)
            .collect())
    }
}

/// A registered metric of any kind.
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    CommonGauge(Arc<CommonGauge>),
    Histogram(Arc<Histogram>),
    Summary(Arc<Summary>),
}

impl Metric {
    fn core(&self) -> &MetricCore {
        match self {
            Metric::Counter(m) => m.core(),
            Metric::Gauge(m) => m.core(),
            Metric::CommonGauge(m) => m.core(),
            Metric::Histogram(m) => m.core(),
            Metric::Summary(m) => m.core(),
        }
    }

    pub fn name(&self) -> &str {
        self.core().name()
    }

    pub fn documentation(&self) -> &str {
        self.core().documentation()
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) | Metric::CommonGauge(_) => MetricKind::Gauge,
            Metric::Histogram(_) => MetricKind::Histogram,
            Metric::Summary(_) => MetricKind::Summary,
        }
    }

    pub fn descriptor(&self) -> MetricDescriptor {
        match self {
            Metric::Counter(m) => m.core().descriptor(MetricKind::Counter),
            Metric::Gauge(m) => m.descriptor(),
            Metric::CommonGauge(m) => m.descriptor(),
            Metric::Histogram(m) => m.descriptor(),
            Metric::Summary(m) => m.core().descriptor(MetricKind::Summary),
        }
    }

    /// Series names this metric writes under. Their store keys must not
    /// overlap with another metric's.
    pub fn series_names(&self) -> Vec<String> {
        let name = self.name();
        let suffixes: &[&str] = match self {
            Metric::Histogram(_) => &["_bucket", "_count", "_sum"],
            Metric::Summary(_) => &["_count", "_sum"],
            _ => &[""],
        };
        suffixes.iter().map(|suffix| format!("{name}{suffix}")).collect()
    }

    /// Whether this metric and `other` could write the same store key, or
    /// share a name.
    pub fn conflicts_with(&self, other: &Metric) -> bool {
        if self.name() == other.name() {
            return true;
        }
        let ours = self.series_names();
        let theirs = other.series_names();
        ours.iter().any(|n| n == other.name() || theirs.contains(n))
            || theirs.iter().any(|n| n == self.name())
    }

    /// Sample lines of this metric, unsorted.
    pub async fn collect(&self) -> Result<Vec<String>, StoreError> {
        match self {
            Metric::Histogram(m) => m.collect().await,
            _ => self.core().collect_lines().await,
        }
    }

    /// Withdraw this process's contributions. Only buffered gauges hold any.
    pub async fn cleanup(&self) {
        if let Metric::Gauge(gauge) = self {
            gauge.cleanup().await;
        }
    }
}

impl From<Arc<Counter>> for Metric {
    fn from(m: Arc<Counter>) -> Self {
        Metric::Counter(m)
    }
}

impl From<Arc<Gauge>> for Metric {
    fn from(m: Arc<Gauge>) -> Self {
        Metric::Gauge(m)
    }
}

impl From<Arc<CommonGauge>> for Metric {
    fn from(m: Arc<CommonGauge>) -> Self {
        Metric::CommonGauge(m)
    }
}

impl From<Arc<Histogram>> for Metric {
    fn from(m: Arc<Histogram>) -> Self {
        Metric::Histogram(m)
    }
}

impl From<Arc<Summary>> for Metric {
    fn from(m: Arc<Summary>) -> Self {
        Metric::Summary(m)
    }
}
