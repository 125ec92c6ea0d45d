//! In-process store
//!
//! Mirrors the Redis semantics the metrics rely on: string values with
//! optional expiry, integer and float increments that keep an existing TTL,
//! and sets without expiry. A whole batch is applied under one lock, so every
//! batch is atomic here. Like Redis, a failing command does not roll back the
//! commands before it.
//!
//! Time is read from `tokio::time`, so tests can pause and advance the clock.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::{Batch, Command, Store};
use crate::error::StoreError;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Shared in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Remaining time to live of a key, `None` if missing or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut data = self.data.lock();
        live_entry(&mut data, key, now)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Whether a live (unexpired) key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut data = self.data.lock();
        live_entry(&mut data, key, now).is_some()
    }

    /// All live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let data = self.data.lock();
        let mut keys: Vec<String> = data
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

fn live_entry<'a>(
    data: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if data.get(key).is_some_and(|entry| entry.is_expired(now)) {
        data.remove(key);
    }
    data.get_mut(key)
}

fn wrong_type(key: &str, reason: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn read_string(entry: Option<&Entry>, key: &str) -> Result<Option<String>, StoreError> {
    match entry.map(|e| &e.value) {
        None => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.clone())),
        Some(Value::Set(_)) => Err(wrong_type(key, "expected a string, found a set")),
    }
}

fn incr_int(
    data: &mut HashMap<String, Entry>,
    key: &str,
    delta: i64,
    now: Instant,
) -> Result<i64, StoreError> {
    let entry = live_entry(data, key, now);
    let (current, expires_at) = match entry {
        None => (0, None),
        Some(entry) => {
            let current = match &entry.value {
                Value::Str(s) => s
                    .parse::<i64>()
                    .map_err(|_| wrong_type(key, "value is not an integer"))?,
                Value::Set(_) => return Err(wrong_type(key, "expected a string, found a set")),
            };
            (current, entry.expires_at)
        }
    };
    let next = current
        .checked_add(delta)
        .ok_or_else(|| wrong_type(key, "increment would overflow"))?;
    data.insert(
        key.to_string(),
        Entry {
            value: Value::Str(next.to_string()),
            expires_at,
        },
    );
    Ok(next)
}

fn incr_float(
    data: &mut HashMap<String, Entry>,
    key: &str,
    delta: f64,
    now: Instant,
) -> Result<f64, StoreError> {
    let entry = live_entry(data, key, now);
    let (current, expires_at) = match entry {
        None => (0.0, None),
        Some(entry) => {
            let current = match &entry.value {
                Value::Str(s) => s
                    .parse::<f64>()
                    .map_err(|_| wrong_type(key, "value is not a float"))?,
                Value::Set(_) => return Err(wrong_type(key, "expected a string, found a set")),
            };
            (current, entry.expires_at)
        }
    };
    let next = current + delta;
    if !next.is_finite() {
        return Err(wrong_type(key, "increment would produce NaN or Infinity"));
    }
    data.insert(
        key.to_string(),
        Entry {
            value: Value::Str(next.to_string()),
            expires_at,
        },
    );
    Ok(next)
}

fn apply(data: &mut HashMap<String, Entry>, command: Command, now: Instant) -> Result<(), StoreError> {
    match command {
        Command::Set { key, value, ttl } => {
            data.insert(
                key,
                Entry {
                    value: Value::Str(value),
                    expires_at: ttl.map(|ttl| now + ttl),
                },
            );
        }
        Command::IncrBy { key, delta } => {
            incr_int(data, &key, delta, now)?;
        }
        Command::IncrByFloat { key, delta } => {
            incr_float(data, &key, delta, now)?;
        }
        Command::Expire { key, ttl } => {
            if let Some(entry) = live_entry(data, &key, now) {
                entry.expires_at = Some(now + ttl);
            }
        }
        Command::Del { keys } => {
            for key in keys {
                data.remove(&key);
            }
        }
        Command::SAdd { key, members } => {
            let entry = live_entry(data, &key, now);
            match entry {
                Some(Entry {
                    value: Value::Set(set),
                    ..
                }) => set.extend(members),
                Some(_) => return Err(wrong_type(&key, "expected a set, found a string")),
                None => {
                    data.insert(
                        key,
                        Entry {
                            value: Value::Set(members.into_iter().collect()),
                            expires_at: None,
                        },
                    );
                }
            }
        }
        Command::SRem { key, members } => {
            let now_empty = match live_entry(data, &key, now) {
                Some(Entry {
                    value: Value::Set(set),
                    ..
                }) => {
                    for member in &members {
                        set.remove(member);
                    }
                    set.is_empty()
                }
                Some(_) => return Err(wrong_type(&key, "expected a set, found a string")),
                None => false,
            };
            if now_empty {
                data.remove(&key);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let now = Instant::now();
        let mut data = self.data.lock();
        read_string(live_entry(&mut data, key, now).map(|e| &*e), key)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let now = Instant::now();
        let mut data = self.data.lock();
        match live_entry(&mut data, key, now).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(Value::Str(_)) => Err(wrong_type(key, "expected a set, found a string")),
        }
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.check_available()?;
        let now = Instant::now();
        let mut data = self.data.lock();
        incr_int(&mut data, key, delta, now)
    }

    async fn execute(&self, batch: Batch) -> Result<(), StoreError> {
        self.check_available()?;
        let now = Instant::now();
        let mut data = self.data.lock();
        for command in batch.into_commands() {
            apply(&mut data, command, now)?;
        }
        Ok(())
    }
}
