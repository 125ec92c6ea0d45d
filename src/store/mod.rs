//! Shared key-value store interface
//!
//! Metrics talk to the store only through [`Store`]. Writes are grouped into
//! a [`Batch`] so a value write and its group index registration travel
//! together; a batch marked atomic must be applied all-or-nothing with
//! respect to other clients.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// A single write command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    IncrBy {
        key: String,
        delta: i64,
    },
    IncrByFloat {
        key: String,
        delta: f64,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    Del {
        keys: Vec<String>,
    },
    SAdd {
        key: String,
        members: Vec<String>,
    },
    SRem {
        key: String,
        members: Vec<String>,
    },
}

/// An ordered sequence of write commands sent in one round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    commands: Vec<Command>,
    atomic: bool,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A batch the store must apply as one transaction.
    pub fn atomic() -> Self {
        Self {
            commands: Vec::new(),
            atomic: true,
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn push(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn set(self, key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) -> Self {
        self.push(Command::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        })
    }

    pub fn incr_by(self, key: impl Into<String>, delta: i64) -> Self {
        self.push(Command::IncrBy {
            key: key.into(),
            delta,
        })
    }

    pub fn incr_by_float(self, key: impl Into<String>, delta: f64) -> Self {
        self.push(Command::IncrByFloat {
            key: key.into(),
            delta,
        })
    }

    pub fn expire(self, key: impl Into<String>, ttl: Duration) -> Self {
        self.push(Command::Expire {
            key: key.into(),
            ttl,
        })
    }

    pub fn del(self, keys: Vec<String>) -> Self {
        self.push(Command::Del { keys })
    }

    pub fn sadd(self, key: impl Into<String>, members: Vec<String>) -> Self {
        self.push(Command::SAdd {
            key: key.into(),
            members,
        })
    }

    pub fn srem(self, key: impl Into<String>, members: Vec<String>) -> Self {
        self.push(Command::SRem {
            key: key.into(),
            members,
        })
    }
}

/// The operations metrics need from the shared store.
///
/// Implementations are shared by every metric of a registry and must
/// tolerate concurrent callers.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Read a string value. Expired or missing keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Members of a set; missing sets read as empty.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Atomically add `delta` to an integer value and return the result.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Apply every command of the batch in order.
    async fn execute(&self, batch: Batch) -> Result<(), StoreError>;
}
