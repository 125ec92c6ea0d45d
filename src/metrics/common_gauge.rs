//! Direct gauge
//!
//! Every update goes straight to the store; there is no local buffer and no
//! refresh. Series optionally expire after a TTL.

use std::sync::Arc;
use std::time::Duration;

use crate::error::MetricsError;
use crate::labels::LabelSet;
use crate::metrics::{MetricCore, MetricDescriptor, MetricKind};
use crate::store::{Batch, Store};

#[derive(Debug)]
pub struct CommonGauge {
    core: MetricCore,
    expire: Option<Duration>,
}

impl CommonGauge {
    pub(crate) fn new(
        name: &str,
        documentation: &str,
        label_names: &[&str],
        expire: Option<Duration>,
        store: Arc<dyn Store>,
    ) -> Result<Self, MetricsError> {
        Ok(Self {
            core: MetricCore::new(name, documentation, label_names, &[], store)?,
            expire,
        })
    }

    pub(crate) fn core(&self) -> &MetricCore {
        &self.core
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Default TTL applied when a call gives none.
    pub fn expire(&self) -> Option<Duration> {
        self.expire
    }

    pub(crate) fn descriptor(&self) -> MetricDescriptor {
        MetricDescriptor {
            expire: self.expire.map(|d| d.as_secs()),
            ..self.core.descriptor(MetricKind::Gauge)
        }
    }

    pub fn with_labels(&self, pairs: &[(&str, &str)]) -> Result<CommonGaugeHandle<'_>, MetricsError> {
        let labels = self.core.labels_from_pairs(pairs)?;
        Ok(CommonGaugeHandle { gauge: self, labels })
    }

    pub fn with_label_values(&self, values: &[&str]) -> Result<CommonGaugeHandle<'_>, MetricsError> {
        let labels = self.core.labels_from_values(values)?;
        Ok(CommonGaugeHandle { gauge: self, labels })
    }

    pub async fn set(
        &self,
        value: f64,
        labels: &LabelSet,
        ttl: Option<Duration>,
    ) -> Result<(), MetricsError> {
        self.core.check_labels(labels)?;
        self.write_set(value, labels, ttl).await
    }

    pub async fn inc(
        &self,
        value: f64,
        labels: &LabelSet,
        ttl: Option<Duration>,
    ) -> Result<(), MetricsError> {
        self.core.check_labels(labels)?;
        self.write_delta("inc", value, labels, ttl).await
    }

    pub async fn dec(
        &self,
        value: f64,
        labels: &LabelSet,
        ttl: Option<Duration>,
    ) -> Result<(), MetricsError> {
        self.core.check_labels(labels)?;
        self.write_delta("dec", -value, labels, ttl).await
    }

    async fn write_set(&self, value: f64, labels: &LabelSet, ttl: Option<Duration>) -> Result<(), MetricsError> {
        self.core.check_finite(value)?;
        let key = self.core.key(labels, None);
        let batch = self
            .core
            .group()
            .register(Batch::new(), vec![key.clone()])
            .set(key, value.to_string(), ttl.or(self.expire));
        self.core.execute("set", batch).await;
        Ok(())
    }

    async fn write_delta(
        &self,
        op: &'static str,
        delta: f64,
        labels: &LabelSet,
        ttl: Option<Duration>,
    ) -> Result<(), MetricsError> {
        self.core.check_finite(delta)?;
        let key = self.core.key(labels, None);
        let mut batch = self
            .core
            .group()
            .register(Batch::new(), vec![key.clone()])
            .incr_by_float(key.clone(), delta);
        if let Some(ttl) = ttl.or(self.expire) {
            batch = batch.expire(key, ttl);
        }
        self.core.execute(op, batch).await;
        Ok(())
    }
}

/// A [`CommonGauge`] with its labels already bound.
#[derive(Debug)]
pub struct CommonGaugeHandle<'a> {
    gauge: &'a CommonGauge,
    labels: LabelSet,
}

impl CommonGaugeHandle<'_> {
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub async fn set(&self, value: f64) -> Result<(), MetricsError> {
        self.gauge.write_set(value, &self.labels, None).await
    }

    pub async fn inc(&self, value: f64) -> Result<(), MetricsError> {
        self.gauge.write_delta("inc", value, &self.labels, None).await
    }

    pub async fn dec(&self, value: f64) -> Result<(), MetricsError> {
        self.gauge.write_delta("dec", -value, &self.labels, None).await
    }

    pub async fn set_with_ttl(&self, value: f64, ttl: Duration) -> Result<(), MetricsError> {
        self.gauge.write_set(value, &self.labels, Some(ttl)).await
    }

    pub async fn inc_with_ttl(&self, value: f64, ttl: Duration) -> Result<(), MetricsError> {
        self.gauge.write_delta("inc", value, &self.labels, Some(ttl)).await
    }

    pub async fn dec_with_ttl(&self, value: f64, ttl: Duration) -> Result<(), MetricsError> {
        self.gauge.write_delta("dec", -value, &self.labels, Some(ttl)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_set_and_inc_without_ttl() {
        let store = Arc::new(MemoryStore::new());
        let gauge = CommonGauge::new("queue_depth", "Queued jobs", &["queue"], None, store.clone()).unwrap();
        let handle = gauge.with_labels(&[("queue", "default")]).unwrap();

        handle.set(4.0).await.unwrap();
        handle.inc(1.5).await.unwrap();
        handle.dec(0.5).await.unwrap();

        let key = gauge.core().key(handle.labels(), None);
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("5"));
        assert_eq!(store.ttl(&key), None);
    }

    #[tokio::test]
    async fn test_default_expire_applies() {
        let store = Arc::new(MemoryStore::new());
        let gauge = CommonGauge::new(
            "temp",
            "Temperature",
            &[],
            Some(Duration::from_secs(60)),
            store.clone(),
        )
        .unwrap();
        let handle = gauge.with_labels(&[]).unwrap();
        handle.inc(1.0).await.unwrap();

        let key = gauge.core().key(handle.labels(), None);
        assert!(store.ttl(&key).is_some());
    }

    #[tokio::test]
    async fn test_per_call_ttl_overrides_default() {
        let store = Arc::new(MemoryStore::new());
        let gauge = CommonGauge::new(
            "temp",
            "Temperature",
            &[],
            Some(Duration::from_secs(3600)),
            store.clone(),
        )
        .unwrap();
        let handle = gauge.with_labels(&[]).unwrap();
        handle.set_with_ttl(21.5, Duration::from_secs(5)).await.unwrap();

        let key = gauge.core().key(handle.labels(), None);
        let ttl = store.ttl(&key).unwrap();
        assert!(ttl <= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_series_is_pruned() {
        let store = Arc::new(MemoryStore::new());
        let gauge = CommonGauge::new("temp", "Temperature", &["room"], None, store.clone()).unwrap();
        gauge
            .with_labels(&[("room", "a")])
            .unwrap()
            .set_with_ttl(20.0, Duration::from_secs(1))
            .await
            .unwrap();
        gauge.with_labels(&[("room", "b")]).unwrap().set(18.0).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        let lines = gauge.core().collect_lines().await.unwrap();
        assert_eq!(lines, vec!["temp{room=\"b\"} 18"]);
        assert_eq!(gauge.core().group().members(&*store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_finite_rejected() {
        let store = Arc::new(MemoryStore::new());
        let gauge = CommonGauge::new("temp", "Temperature", &[], None, store.clone()).unwrap();
        let err = gauge.with_labels(&[]).unwrap().set(f64::NAN).await.unwrap_err();
        assert!(matches!(err, MetricsError::NonFiniteValue { .. }));
    }

    #[test]
    fn test_descriptor_carries_expire() {
        let store = Arc::new(MemoryStore::new());
        let gauge = CommonGauge::new("temp", "Temperature", &[], Some(Duration::from_secs(90)), store).unwrap();
        let desc = gauge.descriptor();
        assert_eq!(desc.metric_type, MetricKind::Gauge);
        assert_eq!(desc.expire, Some(90));
        assert_eq!(desc.gauge_mode, None);
    }
}
