//! Periodic refresh executor
//!
//! Runs a list of async callbacks at most once per refresh period. The
//! background ticker wakes every `tick`; a tick that comes too soon after the
//! previous pass does nothing. Passes never overlap.

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::RegistryConfig;

/// A zero-argument async refresh callback.
pub type RefreshFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub struct Refresher {
    period: Duration,
    tick: Duration,
    callbacks: Mutex<Vec<RefreshFn>>,
    /// Held for the whole pass; also records when the last pass fired
    last_refresh: tokio::sync::Mutex<Option<Instant>>,
    /// Cancels the ticker task while it runs
    ticker: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher")
            .field("period", &self.period)
            .field("tick", &self.tick)
            .field("callbacks", &self.callbacks.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Refresher {
    pub fn new(period: Duration, tick: Duration) -> Self {
        Self {
            period,
            tick,
            callbacks: Mutex::new(Vec::new()),
            last_refresh: tokio::sync::Mutex::new(None),
            ticker: Mutex::new(None),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.refresh_period(), config.refresh_tick())
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Register a callback, run on every firing pass from now on.
    pub fn add<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: RefreshFn = Arc::new(move || callback().boxed());
        self.callbacks.lock().push(callback);
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().is_some()
    }

    /// Spawn the ticker on the current runtime. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }

        let cancel_token = CancellationToken::new();
        let cancelled = cancel_token.clone();
        let refresher = Arc::downgrade(self);
        let tick = self.tick;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(refresher) = refresher.upgrade() else {
                            break;
                        };
                        refresher.tick().await;
                    }
                }
            }
            tracing::debug!("refresher ticker exited");
        });

        tracing::debug!(period = ?self.period, tick = ?self.tick, "refresher started");
        *ticker = Some(cancel_token);
    }

    /// Halt the ticker and drop every callback.
    pub fn stop(&self) {
        if let Some(token) = self.ticker.lock().take() {
            token.cancel();
        }
        self.callbacks.lock().clear();
    }

    /// One ticker step. Returns whether a pass ran.
    pub async fn tick(&self) -> bool {
        let mut last_refresh = self.last_refresh.lock().await;
        let now = Instant::now();
        if let Some(last) = *last_refresh {
            if now.duration_since(last) < self.period {
                return false;
            }
        }
        *last_refresh = Some(now);
        self.run_callbacks().await;
        true
    }

    /// Run a pass now regardless of when the last one fired.
    pub async fn refresh_now(&self) {
        let mut last_refresh = self.last_refresh.lock().await;
        *last_refresh = Some(Instant::now());
        self.run_callbacks().await;
    }

    async fn run_callbacks(&self) {
        let callbacks: Vec<RefreshFn> = self.callbacks.lock().clone();
        if callbacks.is_empty() {
            return;
        }
        tracing::debug!(count = callbacks.len(), "running refresh callbacks");
        join_all(callbacks.iter().map(|callback| callback())).await;
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        if let Some(token) = self.ticker.get_mut().take() {
            token.cancel();
        }
    }
}
