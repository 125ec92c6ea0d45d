//! Shared integer counter

use std::sync::Arc;

use crate::error::MetricsError;
use crate::labels::LabelSet;
use crate::metrics::MetricCore;
use crate::store::{Batch, Store};

/// Counter whose value lives in the store and is shared by every process
/// writing to it.
#[derive(Debug)]
pub struct Counter {
    core: MetricCore,
}

impl Counter {
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

    /// Bind label values by name.
    pub fn with_labels(&self, pairs: &[(&str, &str)]) -> Result<CounterHandle<'_>, MetricsError> {
        let labels = self.core.labels_from_pairs(pairs)?;
        Ok(CounterHandle {
            counter: self,
            labels,
        })
    }

    /// Bind label values positionally, in declaration order.
    pub fn with_label_values(&self, values: &[&str]) -> Result<CounterHandle<'_>, MetricsError> {
        let labels = self.core.labels_from_values(values)?;
        Ok(CounterHandle {
            counter: self,
            labels,
        })
    }

    /// Add `value` to the series identified by `labels`.
    pub async fn inc(&self, value: i64, labels: &LabelSet) -> Result<(), MetricsError> {
        self.core.check_labels(labels)?;
        self.inc_unchecked(value, labels).await;
        Ok(())
    }

    /// Overwrite the series identified by `labels`.
    pub async fn set(&self, value: i64, labels: &LabelSet) -> Result<(), MetricsError> {
        self.core.check_labels(labels)?;
        self.set_unchecked(value, labels).await;
        Ok(())
    }

    async fn inc_unchecked(&self, value: i64, labels: &LabelSet) {
        let key = self.core.key(labels, None);
        let batch = self
            .core
            .group()
            .register(Batch::new(), vec![key.clone()])
            .incr_by(key, value);
        self.core.execute("inc", batch).await;
    }

    async fn set_unchecked(&self, value: i64, labels: &LabelSet) {
        let key = self.core.key(labels, None);
        let batch = self
            .core
            .group()
            .register(Batch::new(), vec![key.clone()])
            .set(key, value.to_string(), None);
        self.core.execute("set", batch).await;
    }
}

/// A [`Counter`] with its labels already bound.
#[derive(Debug)]
pub struct CounterHandle<'a> {
    counter: &'a Counter,
    labels: LabelSet,
}

impl CounterHandle<'_> {
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub async fn inc(&self) {
        self.counter.inc_unchecked(1, &self.labels).await;
    }

    pub async fn inc_by(&self, value: i64) {
        self.counter.inc_unchecked(value, &self.labels).await;
    }

    pub async fn set(&self, value: i64) {
        self.counter.set_unchecked(value, &self.labels).await;
    }
}
