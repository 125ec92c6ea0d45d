//! Buffered per-process gauge
//!
//! Each process writes its own series, tagged with a `gauge_index` label
//! handed out by a shared counter in the store. Values carry a TTL so a dead
//! process's series disappear; a live process keeps them alive by rewriting
//! its local buffer on every refresh pass.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};

use crate::config::RegistryConfig;
use crate::error::MetricsError;
use crate::labels::{LabelSet, GAUGE_INDEX_LABEL};
use crate::metrics::{GaugeMode, MetricCore, MetricDescriptor, MetricKind};
use crate::refresher::Refresher;
use crate::store::{Batch, Store};

/// Tuning of a buffered gauge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeOptions {
    /// TTL of every written value
    pub expire: Duration,
    /// Store key of the shared index counter
    pub gauge_index_key: String,
    /// Register with the refresher on first update
    pub refresh: bool,
}

impl GaugeOptions {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            expire: config.gauge_expire(),
            gauge_index_key: config.gauge_index_key.clone(),
            refresh: true,
        }
    }
}

impl Default for GaugeOptions {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default())
    }
}

enum Update {
    Delta(f64),
    Set(f64),
}

#[derive(Debug)]
pub struct Gauge {
    core: MetricCore,
    options: GaugeOptions,
    index: OnceCell<i64>,
    /// Last value this process wrote, per encoded key
    buffer: Mutex<BTreeMap<String, f64>>,
    refresher: Option<Arc<Refresher>>,
    refresh_registered: AtomicBool,
    this: Weak<Gauge>,
}

impl Gauge {
    pub(crate) fn new(
        name: &str,
        documentation: &str,
        label_names: &[&str],
        options: GaugeOptions,
        store: Arc<dyn Store>,
        refresher: Option<Arc<Refresher>>,
    ) -> Result<Arc<Self>, MetricsError> {
        let core = MetricCore::new(name, documentation, label_names, &[GAUGE_INDEX_LABEL], store)?;
        Ok(Arc::new_cyclic(|this| Self {
            core,
            options,
            index: OnceCell::new(),
            buffer: Mutex::new(BTreeMap::new()),
            refresher,
            refresh_registered: AtomicBool::new(false),
            this: this.clone(),
        }))
    }

    pub(crate) fn core(&self) -> &MetricCore {
        &self.core
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn options(&self) -> &GaugeOptions {
        &self.options
    }

    /// This process's index, once one has been obtained.
    pub fn gauge_index(&self) -> Option<i64> {
        self.index.get().copied()
    }

    pub(crate) fn descriptor(&self) -> MetricDescriptor {
        MetricDescriptor {
            gauge_mode: Some(GaugeMode::Buffered),
            expire: Some(self.options.expire.as_secs()),
            ..self.core.descriptor(MetricKind::Gauge)
        }
    }

    pub fn with_labels(&self, pairs: &[(&str, &str)]) -> Result<GaugeHandle<'_>, MetricsError> {
        let labels = self.core.labels_from_pairs(pairs)?;
        Ok(GaugeHandle { gauge: self, labels })
    }

    pub fn with_label_values(&self, values: &[&str]) -> Result<GaugeHandle<'_>, MetricsError> {
        let labels = self.core.labels_from_values(values)?;
        Ok(GaugeHandle { gauge: self, labels })
    }

    pub async fn inc(&self, value: f64, labels: &LabelSet) -> Result<(), MetricsError> {
        self.core.check_labels(labels)?;
        self.update("inc", Update::Delta(value), labels).await
    }

    pub async fn dec(&self, value: f64, labels: &LabelSet) -> Result<(), MetricsError> {
        self.core.check_labels(labels)?;
        self.update("dec", Update::Delta(-value), labels).await
    }

    pub async fn set(&self, value: f64, labels: &LabelSet) -> Result<(), MetricsError> {
        self.core.check_labels(labels)?;
        self.update("set", Update::Set(value), labels).await
    }

    /// Current buffered values, keyed by encoded store key.
    pub async fn buffered(&self) -> BTreeMap<String, f64> {
        self.buffer.lock().await.clone()
    }

    async fn update(&self, op: &'static str, update: Update, labels: &LabelSet) -> Result<(), MetricsError> {
        let value = match update {
            Update::Delta(v) | Update::Set(v) => v,
        };
        self.core.check_finite(value)?;

        let mut buffer = self.buffer.lock().await;
        let Some(index) = self.obtain_index().await else {
            return Ok(());
        };

        let key = self
            .core
            .key(&labels.with(GAUGE_INDEX_LABEL, index.to_string()), None);
        let ttl = self.options.expire;
        let batch = self.core.group().register(Batch::new(), vec![key.clone()]);
        let batch = match update {
            Update::Delta(delta) => {
                *buffer.entry(key.clone()).or_insert(0.0) += delta;
                batch.incr_by_float(key.clone(), delta).expire(key, ttl)
            }
            Update::Set(value) => {
                buffer.insert(key.clone(), value);
                batch.set(key, value.to_string(), Some(ttl))
            }
        };
        self.core.execute(op, batch).await;
        drop(buffer);

        self.register_refresh();
        Ok(())
    }

    /// Fetch the process index, retrying on the next update if the store
    /// call fails.
    async fn obtain_index(&self) -> Option<i64> {
        let store = self.core.store();
        let key = &self.options.gauge_index_key;
        match self
            .index
            .get_or_try_init(|| async { store.incr(key, 1).await })
            .await
        {
            Ok(index) => Some(*index),
            Err(e) => {
                tracing::error!(metric = %self.core.name(), error = %e, "failed to obtain gauge index, update dropped");
                None
            }
        }
    }

    fn register_refresh(&self) {
        if !self.options.refresh {
            return;
        }
        let Some(refresher) = &self.refresher else {
            return;
        };
        if self.refresh_registered.swap(true, Ordering::SeqCst) {
            return;
        }

        let gauge = self.this.clone();
        refresher.add(move || {
            let gauge = gauge.clone();
            async move {
                if let Some(gauge) = gauge.upgrade() {
                    gauge.refresh().await;
                }
            }
        });
        if refresher.is_running() {
            tracing::debug!(metric = %self.core.name(), "gauge registered for refresh");
        } else {
            tracing::warn!(
                metric = %self.core.name(),
                expire_secs = self.options.expire.as_secs(),
                "gauge registered for refresh but the refresher is not running; values will expire"
            );
        }
    }

    /// Rewrite every buffered value with a fresh TTL and re-register its key.
    pub async fn refresh(&self) {
        let buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            return;
        }
        let keys: Vec<String> = buffer.keys().cloned().collect();
        let mut batch = self.core.group().register(Batch::new(), keys);
        for (key, value) in buffer.iter() {
            batch = batch.set(key.clone(), value.to_string(), Some(self.options.expire));
        }
        self.core.execute("refresh", batch).await;
    }

    /// Remove this process's series from the store and empty the buffer.
    pub async fn cleanup(&self) {
        let mut buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            return;
        }
        let keys: Vec<String> = buffer.keys().cloned().collect();
        let batch = self
            .core
            .group()
            .unregister(Batch::new(), keys.clone())
            .del(keys);
        self.core.execute("cleanup", batch).await;
        buffer.clear();
    }
}

/// A [`Gauge`] with its labels already bound.
#[derive(Debug)]
pub struct GaugeHandle<'a> {
    gauge: &'a Gauge,
    labels: LabelSet,
}

impl GaugeHandle<'_> {
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub async fn inc(&self, value: f64) -> Result<(), MetricsError> {
        self.gauge.update("inc", Update::Delta(value), &self.labels).await
    }

    pub async fn dec(&self, value: f64) -> Result<(), MetricsError> {
        self.gauge.update("dec", Update::Delta(-value), &self.labels).await
    }

    pub async fn set(&self, value: f64) -> Result<(), MetricsError> {
        self.gauge.update("set", Update::Set(value), &self.labels).await
    }
}
