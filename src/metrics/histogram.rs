//! Shared histogram
//!
//! Bucket counters are cumulative: an observation increments every bucket
//! whose bound is at least the observed value. Rows a label group has never
//! touched are filled in with zeros at collection time, so every group
//! always shows every bucket.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{MetricsError, StoreError};
use crate::labels::{LabelSet, BUCKET_LABEL};
use crate::metrics::{MetricCore, MetricDescriptor, MetricKind, Sample};
use crate::render;
use crate::store::{Batch, Store};
use crate::timer::Timer;

#[derive(Debug)]
pub struct Histogram {
    core: MetricCore,
    /// Upper bounds, largest first
    buckets: Vec<f64>,
}

impl Histogram {
    pub(crate) fn new(
        name: &str,
        documentation: &str,
        label_names: &[&str],
        buckets: &[f64],
        store: Arc<dyn Store>,
    ) -> Result<Self, MetricsError> {
        let core = MetricCore::new(name, documentation, label_names, &[BUCKET_LABEL], store)?;
        let buckets = validate_buckets(name, buckets)?;
        Ok(Self { core, buckets })
    }

    pub(crate) fn core(&self) -> &MetricCore {
        &self.core
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Bucket bounds in ascending order.
    pub fn buckets(&self) -> Vec<f64> {
        self.buckets.iter().rev().copied().collect()
    }

    pub(crate) fn descriptor(&self) -> MetricDescriptor {
        MetricDescriptor {
            buckets: Some(self.buckets()),
            ..self.core.descriptor(MetricKind::Histogram)
        }
    }

    pub fn with_labels(&self, pairs: &[(&str, &str)]) -> Result<HistogramHandle<'_>, MetricsError> {
        let labels = self.core.labels_from_pairs(pairs)?;
        Ok(HistogramHandle {
            histogram: self,
            labels,
        })
    }

    pub fn with_label_values(&self, values: &[&str]) -> Result<HistogramHandle<'_>, MetricsError> {
        let labels = self.core.labels_from_values(values)?;
        Ok(HistogramHandle {
            histogram: self,
            labels,
        })
    }

    pub async fn observe(&self, value: f64, labels: &LabelSet) -> Result<(), MetricsError> {
        self.core.check_labels(labels)?;
        self.core.check_finite(value)?;
        self.record(value, labels).await;
        Ok(())
    }

    fn bucket_key(&self, labels: &LabelSet, bound: f64) -> String {
        self.core
            .key(&labels.with(BUCKET_LABEL, render::format_bound(bound)), Some("_bucket"))
    }

    async fn record(&self, value: f64, labels: &LabelSet) {
        let bucket_keys: Vec<String> = self
            .buckets
            .iter()
            .take_while(|bound| **bound >= value)
            .map(|bound| self.bucket_key(labels, *bound))
            .collect();
        let count_key = self.core.key(labels, Some("_count"));
        let sum_key = self.core.key(labels, Some("_sum"));

        let mut members = bucket_keys.clone();
        members.push(count_key.clone());
        members.push(sum_key.clone());

        let mut batch = self.core.group().register(Batch::atomic(), members);
        for key in bucket_keys {
            batch = batch.incr_by(key, 1);
        }
        let batch = batch.incr_by(count_key, 1).incr_by_float(sum_key, value);
        self.core.execute("observe", batch).await;
    }

    /// Stored rows plus zero rows for every bucket, `_sum` and `_count` a
    /// label group is missing.
    ///
    /// The empty label group is only synthesized for histograms without
    /// label names. A labelled histogram that has seen no observations
    /// yields no rows, since an empty label set is not a valid series for it.
    pub(crate) async fn collect(&self) -> Result<Vec<String>, StoreError> {
        let samples = self.core.collect_samples().await?;

        let name = self.core.name();
        let bucket_name = format!("{}_bucket", name);
        let sum_name = format!("{}_sum", name);
        let count_name = format!("{}_count", name);

        let present: HashSet<(&str, &LabelSet)> = samples
            .iter()
            .map(|s| (s.name.as_str(), &s.labels))
            .collect();

        let mut groups: BTreeSet<LabelSet> = samples
            .iter()
            .map(|s| {
                let mut labels = s.labels.clone();
                labels.remove(BUCKET_LABEL);
                labels
            })
            .collect();
        if self.core.label_names().is_empty() {
            groups.insert(LabelSet::new());
        }

        let mut lines: Vec<String> = samples.iter().map(Sample::render).collect();
        for group in &groups {
            for bound in &self.buckets {
                let labels = group.with(BUCKET_LABEL, render::format_bound(*bound));
                if !present.contains(&(bucket_name.as_str(), &labels)) {
                    lines.push(render::sample_line(&bucket_name, &labels, "0"));
                }
            }
            for row in [&sum_name, &count_name] {
                if !present.contains(&(row.as_str(), group)) {
                    lines.push(render::sample_line(row, group, "0"));
                }
            }
        }
        Ok(lines)
    }
}

fn validate_buckets(metric: &str, buckets: &[f64]) -> Result<Vec<f64>, MetricsError> {
    let invalid = |reason: &str| MetricsError::InvalidBuckets {
        metric: metric.to_string(),
        reason: reason.to_string(),
    };

    if buckets.is_empty() {
        return Err(invalid("at least one bucket is required"));
    }
    if buckets.iter().any(|b| b.is_nan()) {
        return Err(invalid("bucket bound is NaN"));
    }
    if buckets.iter().any(|b| *b == f64::NEG_INFINITY) {
        return Err(invalid("bucket bound is -Inf"));
    }

    let mut sorted = buckets.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    if sorted.windows(2).any(|w| w[0] == w[1]) {
        return Err(invalid("bucket bounds must be distinct"));
    }
    Ok(sorted)
}

/// A [`Histogram`] with its labels already bound.
#[derive(Debug)]
pub struct HistogramHandle<'a> {
    histogram: &'a Histogram,
    labels: LabelSet,
}

impl HistogramHandle<'_> {
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub async fn observe(&self, value: f64) -> Result<(), MetricsError> {
        self.histogram.core.check_finite(value)?;
        self.histogram.record(value, &self.labels).await;
        Ok(())
    }

    /// Observe a duration in seconds.
    pub async fn observe_duration(&self, elapsed: Duration) {
        self.histogram.record(elapsed.as_secs_f64(), &self.labels).await;
    }

    /// Await `fut` and observe how long it took.
    pub async fn time<F: Future>(&self, fut: F) -> F::Output {
        let timer = Timer::start();
        let output = fut.await;
        self.observe_duration(timer.stop()).await;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn sorted(mut lines: Vec<String>) -> Vec<String> {
        lines.sort();
        lines
    }

    #[test]
    fn test_bucket_validation() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let build = |buckets: &[f64]| Histogram::new("h", "", &[], buckets, store.clone());

        assert!(matches!(build(&[]), Err(MetricsError::InvalidBuckets { .. })));
        assert!(matches!(build(&[1.0, f64::NAN]), Err(MetricsError::InvalidBuckets { .. })));
        assert!(matches!(build(&[1.0, 1.0]), Err(MetricsError::InvalidBuckets { .. })));
        assert!(matches!(
            build(&[f64::NEG_INFINITY]),
            Err(MetricsError::InvalidBuckets { .. })
        ));

        let h = build(&[5.0, f64::INFINITY, 1.0]).unwrap();
        assert_eq!(h.buckets(), vec![1.0, 5.0, f64::INFINITY]);
    }

    #[test]
    fn test_le_label_is_reserved() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let err = Histogram::new("h", "", &["le"], &[1.0], store).unwrap_err();
        assert_eq!(err, MetricsError::ReservedLabelName("le".to_string()));
    }

    #[tokio::test]
    async fn test_observations_are_cumulative() {
        let store = Arc::new(MemoryStore::new());
        let h = Histogram::new("latency", "Latency", &[], &[1.0, 5.0, 10.0], store.clone()).unwrap();
        let handle = h.with_labels(&[]).unwrap();
        handle.observe(0.5).await.unwrap();
        handle.observe(7.0).await.unwrap();

        assert_eq!(
            sorted(h.collect().await.unwrap()),
            vec![
                "latency_bucket{le=\"1\"} 1",
                "latency_bucket{le=\"10\"} 2",
                "latency_bucket{le=\"5\"} 1",
                "latency_count 2",
                "latency_sum 7.5",
            ]
        );
    }

    #[tokio::test]
    async fn test_value_on_bound_counts() {
        let store = Arc::new(MemoryStore::new());
        let h = Histogram::new("h", "", &[], &[1.0, 5.0], store.clone()).unwrap();
        h.with_labels(&[]).unwrap().observe(5.0).await.unwrap();

        let lines = sorted(h.collect().await.unwrap());
        assert!(lines.contains(&"h_bucket{le=\"5\"} 1".to_string()));
        assert!(lines.contains(&"h_bucket{le=\"1\"} 0".to_string()));
    }

    #[tokio::test]
    async fn test_value_above_every_bound() {
        let store = Arc::new(MemoryStore::new());
        let h = Histogram::new("h", "", &[], &[1.0, f64::INFINITY], store.clone()).unwrap();
        h.with_labels(&[]).unwrap().observe(50.0).await.unwrap();

        assert_eq!(
            sorted(h.collect().await.unwrap()),
            vec![
                "h_bucket{le=\"+Inf\"} 1",
                "h_bucket{le=\"1\"} 0",
                "h_count 1",
                "h_sum 50",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_unlabelled_histogram_renders_zeros() {
        let store = Arc::new(MemoryStore::new());
        let h = Histogram::new("h", "", &[], &[0.5, 2.5], store).unwrap();

        assert_eq!(
            sorted(h.collect().await.unwrap()),
            vec![
                "h_bucket{le=\"0.5\"} 0",
                "h_bucket{le=\"2.5\"} 0",
                "h_count 0",
                "h_sum 0",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_labelled_histogram_renders_nothing() {
        let store = Arc::new(MemoryStore::new());
        let h = Histogram::new("h", "", &["route"], &[1.0], store).unwrap();
        assert!(h.collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_each_label_group_is_completed() {
        let store = Arc::new(MemoryStore::new());
        let h = Histogram::new("h", "", &["route"], &[1.0, 5.0], store.clone()).unwrap();
        h.with_label_values(&["/a"]).unwrap().observe(0.1).await.unwrap();
        h.with_label_values(&["/b"]).unwrap().observe(3.0).await.unwrap();

        assert_eq!(
            sorted(h.collect().await.unwrap()),
            vec![
                "h_bucket{le=\"1\",route=\"/a\"} 1",
                "h_bucket{le=\"1\",route=\"/b\"} 0",
                "h_bucket{le=\"5\",route=\"/a\"} 1",
                "h_bucket{le=\"5\",route=\"/b\"} 1",
                "h_count{route=\"/a\"} 1",
                "h_count{route=\"/b\"} 1",
                "h_sum{route=\"/a\"} 0.1",
                "h_sum{route=\"/b\"} 3",
            ]
        );
    }

    #[tokio::test]
    async fn test_store_failure_drops_observation() {
        let store = Arc::new(MemoryStore::new());
        let h = Histogram::new("h", "", &[], &[1.0, 5.0], store.clone()).unwrap();
        store.set_unavailable(true);
        h.with_labels(&[]).unwrap().observe(0.5).await.unwrap();
        store.set_unavailable(false);

        assert!(store.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_observes_elapsed() {
        let store = Arc::new(MemoryStore::new());
        let h = Histogram::new("h", "", &[], &[1.0, 5.0], store.clone()).unwrap();
        let handle = h.with_labels(&[]).unwrap();

        let out = handle
            .time(async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                42
            })
            .await;
        assert_eq!(out, 42);

        let lines = sorted(h.collect().await.unwrap());
        assert!(lines.contains(&"h_bucket{le=\"1\"} 0".to_string()));
        assert!(lines.contains(&"h_bucket{le=\"5\"} 1".to_string()));
        assert!(lines.contains(&"h_count 1".to_string()));
    }

    #[test]
    fn test_descriptor_lists_buckets_ascending() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let h = Histogram::new("h", "Help", &["route"], &[10.0, 1.0], store).unwrap();
        let desc = h.descriptor();
        assert_eq!(desc.metric_type, MetricKind::Histogram);
        assert_eq!(desc.buckets, Some(vec![1.0, 10.0]));
        assert_eq!(desc.label_names, vec!["route"]);
    }
}
