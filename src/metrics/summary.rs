//! Shared summary: running sum and count, no quantiles

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::MetricsError;
use crate::labels::LabelSet;
use crate::metrics::MetricCore;
use crate::store::{Batch, Store};
use crate::timer::Timer;

#[derive(Debug)]
pub struct Summary {
    core: MetricCore,
}

impl Summary {
    pub(crate) fn new(
        name: &str,
        documentation: &str,
        label_names: &[&str],
        store: Arc<dyn Store>,
    ) -> Result<Self, MetricsError> {
        Ok(Self {
            core: MetricCore::new(name, documentation, label_names, &[], store)?,
        })
    }

    pub(crate) fn core(&self) -> &MetricCore {
        &self.core
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn with_labels(&self, pairs: &[(&str, &str)]) -> Result<SummaryHandle<'_>, MetricsError> {
        let labels = self.core.labels_from_pairs(pairs)?;
        Ok(SummaryHandle { summary: self, labels })
    }

    pub fn with_label_values(&self, values: &[&str]) -> Result<SummaryHandle<'_>, MetricsError> {
        let labels = self.core.labels_from_values(values)?;
        Ok(SummaryHandle { summary: self, labels })
    }

    pub async fn observe(&self, value: f64, labels: &LabelSet) -> Result<(), MetricsError> {
        self.core.check_labels(labels)?;
        self.core.check_finite(value)?;
        self.record(value, labels).await;
        Ok(())
    }

    async fn record(&self, value: f64, labels: &LabelSet) {
        let sum_key = self.core.key(labels, Some("_sum"));
        let count_key = self.core.key(labels, Some("_count"));
        let batch = self
            .core
            .group()
            .register(Batch::new(), vec![sum_key.clone(), count_key.clone()])
            .incr_by_float(sum_key, value)
            .incr_by(count_key, 1);
        self.core.execute("observe", batch).await;
    }
}

/// A [`Summary`] with its labels already bound.
#[derive(Debug)]
pub struct SummaryHandle<'a> {
    summary: &'a Summary,
    labels: LabelSet,
}

impl SummaryHandle<'_> {
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub async fn observe(&self, value: f64) -> Result<(), MetricsError> {
        self.summary.core.check_finite(value)?;
        self.summary.record(value, &self.labels).await;
        Ok(())
    }

    /// Observe a duration in seconds.
    pub async fn observe_duration(&self, elapsed: Duration) {
        self.summary.record(elapsed.as_secs_f64(), &self.labels).await;
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

    #[tokio::test]
    async fn test_observe_sum_and_count() {
        let store = Arc::new(MemoryStore::new());
        let summary = Summary::new("payload_bytes", "Payload size", &["kind"], store.clone()).unwrap();
        let handle = summary.with_labels(&[("kind", "json")]).unwrap();
        handle.observe(3.0).await.unwrap();
        handle.observe(7.0).await.unwrap();

        let mut lines = summary.core().collect_lines().await.unwrap();
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "payload_bytes_count{kind=\"json\"} 2",
                "payload_bytes_sum{kind=\"json\"} 10",
            ]
        );
    }

    #[tokio::test]
    async fn test_non_finite_rejected() {
        let store = Arc::new(MemoryStore::new());
        let summary = Summary::new("s", "", &[], store.clone()).unwrap();
        let err = summary
            .observe(f64::NAN, &LabelSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::NonFiniteValue { .. }));
        assert!(store.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time() {
        let store = Arc::new(MemoryStore::new());
        let summary = Summary::new("s", "", &[], store.clone()).unwrap();
        summary
            .with_labels(&[])
            .unwrap()
            .time(tokio::time::sleep(Duration::from_millis(250)))
            .await;

        let mut lines = summary.core().collect_lines().await.unwrap();
        lines.sort();
        assert_eq!(lines, vec!["s_count 1", "s_sum 0.25"]);
    }
}
