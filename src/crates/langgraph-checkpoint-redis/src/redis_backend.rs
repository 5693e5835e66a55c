//! Redis implementation of [`KvBackend`]
//!
//! Connections come from a `deadpool-redis` pool. The pool's wait, create and
//! recycle timeouts are all set from
//! [`RedisSaverConfig::connection_timeout_ms`], so a dead server surfaces as a
//! [`BackendError`] instead of a hang. Pipelines run inside `MULTI`/`EXEC`.

use crate::backend::{BackendResult, KvBackend, KvOp, ScanPage};
use crate::config::RedisSaverConfig;
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolError, Runtime};
use langgraph_checkpoint::BackendError;
use redis::{AsyncCommands, RedisError};
use std::time::Duration;
use tracing::{debug, info};

/// [`KvBackend`] over a pooled Redis connection
#[derive(Clone)]
pub struct RedisKvBackend {
    pool: Pool,
    url: String,
}

impl std::fmt::Debug for RedisKvBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisKvBackend")
            .field("url", &self.url)
            .field("pool_size", &status.size)
            .field("pool_max_size", &status.max_size)
            .finish()
    }
}

impl RedisKvBackend {
    /// Build the pool and verify the server answers `PING`
    pub async fn connect(config: &RedisSaverConfig) -> BackendResult<Self> {
        let mut cfg = Config::from_url(&config.url);
        if cfg.pool.is_none() {
            cfg.pool = Some(deadpool_redis::PoolConfig::default());
        }
        if let Some(ref mut pool_config) = cfg.pool {
            let timeout = Some(Duration::from_millis(config.connection_timeout_ms));
            pool_config.max_size = config.max_connections;
            pool_config.timeouts.wait = timeout;
            pool_config.timeouts.create = timeout;
            pool_config.timeouts.recycle = timeout;
        }

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| BackendError::Connection(format!("failed to create Redis pool: {}", e)))?;

        let backend = Self {
            pool,
            url: config.url.clone(),
        };
        backend.ping().await?;
        info!(url = %backend.url, max_connections = config.max_connections, "connected to Redis");
        Ok(backend)
    }

    async fn connection(&self) -> BackendResult<Connection> {
        self.pool.get().await.map_err(pool_error)
    }
}

fn pool_error(err: PoolError) -> BackendError {
    match err {
        PoolError::Timeout(kind) => BackendError::Timeout(format!("Redis pool {:?} timeout", kind)),
        PoolError::Backend(err) => redis_error(err),
        other => BackendError::Connection(other.to_string()),
    }
}

fn redis_error(err: RedisError) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(err.to_string())
    } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        BackendError::Connection(err.to_string())
    } else {
        BackendError::Command(err.to_string())
    }
}

#[async_trait]
impl KvBackend for RedisKvBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(redis_error)
    }

    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> BackendResult<ScanPage> {
        let mut conn = self.connection().await?;
        let (cursor, keys) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async::<_, (u64, Vec<String>)>(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(ScanPage { cursor, keys })
    }

    async fn pipeline(&self, ops: Vec<KvOp>) -> BackendResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                KvOp::SetEx {
                    key,
                    value,
                    ttl_seconds,
                } => {
                    pipe.cmd("SETEX").arg(key).arg(*ttl_seconds).arg(value).ignore();
                }
                KvOp::Expire { key, ttl_seconds } => {
                    pipe.cmd("EXPIRE").arg(key).arg(*ttl_seconds).ignore();
                }
            }
        }

        debug!(ops = ops.len(), first_key = ops[0].key(), "executing Redis transaction");
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn ping(&self) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(redis_error)
    }
}
