//! Redis-backed store
//!
//! Uses one multiplexed async connection shared by every metric. Batches go
//! out as a single pipeline; atomic batches are wrapped in `MULTI`/`EXEC`.

use async_trait::async_trait;
use ::redis::aio::MultiplexedConnection;
use std::time::Duration;

use super::{Batch, Command, Store};
use crate::config::RedisConfig;
use crate::error::StoreError;

/// Redis client wrapper
#[derive(Clone)]
pub struct RedisStore {
    config: RedisConfig,
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("db", &self.config.db)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Open a connection, failing after the configured timeout.
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(config.connection_url())?;
        let conn = tokio::time::timeout(
            config.connect_timeout(),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            StoreError::Unavailable(format!(
                "connecting to {}:{} timed out after {}s",
                config.host, config.port, config.timeout
            ))
        })??;

        tracing::info!(host = %config.host, port = config.port, db = config.db, "connected to redis");
        Ok(Self { config, conn })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

/// Millisecond TTL argument; Redis rejects zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Translate a batch into a pipeline. Empty set/del commands are dropped
/// since Redis rejects them.
pub(crate) fn build_pipeline(batch: Batch) -> ::redis::Pipeline {
    let mut pipe = ::redis::pipe();
    if batch.is_atomic() {
        pipe.atomic();
    }

    for command in batch.into_commands() {
        match command {
            Command::Set { key, value, ttl } => {
                let cmd = pipe.cmd("SET").arg(key).arg(value);
                if let Some(ttl) = ttl {
                    cmd.arg("PX").arg(ttl_millis(ttl));
                }
                cmd.ignore();
            }
            Command::IncrBy { key, delta } => {
                pipe.cmd("INCRBY").arg(key).arg(delta).ignore();
            }
            Command::IncrByFloat { key, delta } => {
                pipe.cmd("INCRBYFLOAT").arg(key).arg(delta).ignore();
            }
            Command::Expire { key, ttl } => {
                pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)).ignore();
            }
            Command::Del { keys } => {
                if !keys.is_empty() {
                    pipe.cmd("DEL").arg(keys).ignore();
                }
            }
            Command::SAdd { key, members } => {
                if !members.is_empty() {
                    pipe.cmd("SADD").arg(key).arg(members).ignore();
                }
            }
            Command::SRem { key, members } => {
                if !members.is_empty() {
                    pipe.cmd("SREM").arg(key).arg(members).ignore();
                }
            }
        }
    }

    pipe
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = ::redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = ::redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = ::redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn execute(&self, batch: Batch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let pipe = build_pipeline(batch);
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(pipe: &::redis::Pipeline) -> String {
        String::from_utf8_lossy(&pipe.get_packed_pipeline()).into_owned()
    }

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(60)), 60_000);
    }

    #[test]
    fn test_pipeline_commands() {
        let batch = Batch::new()
            .sadd("m_group", vec!["m:e30=".to_string()])
            .set("m:e30=", "1.5", Some(Duration::from_secs(2)))
            .incr_by("c", 2);
        let wire = packed(&build_pipeline(batch));

        assert!(wire.contains("SADD"));
        assert!(wire.contains("m_group"));
        assert!(wire.contains("SET"));
        assert!(wire.contains("PX"));
        assert!(wire.contains("2000"));
        assert!(wire.contains("INCRBY"));
        assert!(!wire.contains("MULTI"));
    }

    #[test]
    fn test_atomic_pipeline_uses_transaction() {
        let batch = Batch::atomic().incr_by("b", 1).incr_by_float("s", 0.25);
        let wire = packed(&build_pipeline(batch));
        assert!(wire.contains("MULTI"));
        assert!(wire.contains("EXEC"));
        assert!(wire.contains("INCRBYFLOAT"));
    }

    #[test]
    fn test_empty_member_lists_are_dropped() {
        let batch = Batch::new()
            .sadd("g", Vec::new())
            .srem("g", Vec::new())
            .del(Vec::new());
        let wire = packed(&build_pipeline(batch));
        assert!(wire.is_empty());
    }
}
