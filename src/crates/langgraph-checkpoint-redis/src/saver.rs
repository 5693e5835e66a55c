//! Checkpoint repository over a TTL key-value store
//!
//! # Storage layout
//!
//! Every checkpoint is stored twice, in one atomic pipeline:
//!
//! ```text
//! checkpoint:{thread_id}:{checkpoint_id}  -> envelope(CheckpointTuple)
//! checkpoint:{thread_id}:latest           -> the same bytes
//! ```
//!
//! The latest pointer holds the full record rather than an ID, so resuming a
//! thread is a single `GET`. Both keys carry the configured TTL; `get_tuple`
//! slides it forward on both, so threads that keep being read stay alive and
//! abandoned ones expire.
//!
//! # Failure handling
//!
//! | Situation | `put` | `get_tuple` / `list` |
//! |-----------|-------|----------------------|
//! | Backend unreachable / timeout | `Err` | `Err` |
//! | Value cannot be encoded | `Err`, nothing written | n/a |
//! | Stored bytes do not decode | n/a | skipped, logged at `warn` |
//! | Envelope from a newer schema | n/a | `Err` |

use crate::backend::{KvBackend, KvOp};
use crate::config::RedisSaverConfig;
use crate::keys;
use crate::redis_backend::RedisKvBackend;
use async_trait::async_trait;
use futures::stream;
use langgraph_checkpoint::{
    envelope, Checkpoint, CheckpointCodec, CheckpointConfig, CheckpointError, CheckpointMetadata,
    CheckpointSaver, CheckpointStream, CheckpointTuple, Result, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// [`CheckpointSaver`] that persists checkpoints in a [`KvBackend`]
///
/// # Example
///
/// ```rust
/// use langgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver};
/// use langgraph_checkpoint_redis::{InMemoryKvBackend, RedisCheckpointSaver, RedisSaverConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> langgraph_checkpoint::Result<()> {
/// let backend = Arc::new(InMemoryKvBackend::new());
/// let saver = RedisCheckpointSaver::new(backend, &RedisSaverConfig::default())?;
///
/// let stored = saver
///     .put(
///         &CheckpointConfig::for_thread("u1"),
///         Checkpoint::empty().with_channel_value("msg", "hello"),
///         CheckpointMetadata::new().with_step(0),
///     )
///     .await?;
///
/// let latest = saver.get_tuple(&CheckpointConfig::for_thread("u1")).await?.unwrap();
/// assert_eq!(latest.config, stored);
/// # Ok(())
/// # }
/// ```
pub struct RedisCheckpointSaver<B: KvBackend> {
    backend: Arc<B>,
    codec: CheckpointCodec,
    ttl_seconds: u64,
    scan_count: usize,
    refresh_ttl_on_list: bool,
}

impl<B: KvBackend> std::fmt::Debug for RedisCheckpointSaver<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCheckpointSaver")
            .field("codec", &self.codec)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("scan_count", &self.scan_count)
            .field("refresh_ttl_on_list", &self.refresh_ttl_on_list)
            .finish()
    }
}

impl RedisCheckpointSaver<RedisKvBackend> {
    /// Connect to the Redis server named in `config`
    pub async fn connect(config: &RedisSaverConfig) -> Result<Self> {
        config.validate()?;
        let backend = RedisKvBackend::connect(config).await?;
        Self::new(Arc::new(backend), config)
    }
}

impl<B: KvBackend> RedisCheckpointSaver<B> {
    pub fn new(backend: Arc<B>, config: &RedisSaverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            codec: config.codec(),
            ttl_seconds: config.ttl_seconds,
            scan_count: config.scan_count,
            refresh_ttl_on_list: config.refresh_ttl_on_list,
        })
    }

    /// Replace the codec built from the config
    pub fn with_codec(mut self, codec: CheckpointCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn codec(&self) -> &CheckpointCodec {
        &self.codec
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Check that the backend is reachable
    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await.map_err(CheckpointError::from)
    }

    fn encode_record(&self, tuple: CheckpointTuple) -> Result<Vec<u8>> {
        envelope::wrap(self.codec.encode_tuple(tuple)?)
    }

    fn decode_record(&self, blob: &[u8]) -> Result<CheckpointTuple> {
        let unwrapped = envelope::unwrap(blob)?;
        if unwrapped.is_legacy() {
            debug!(format = ?unwrapped.format, "reading unversioned checkpoint record");
        }
        self.codec.decode(unwrapped.format, &unwrapped.payload)
    }

    /// Decode a stored record, turning dirty data into a logged miss
    fn read_record(&self, key: &str, blob: &[u8]) -> Result<Option<CheckpointTuple>> {
        match self.decode_record(blob) {
            Ok(tuple) => Ok(Some(tuple)),
            Err(err) if err.is_dirty_data() => {
                warn!(key = %key, error = %err, "skipping unreadable checkpoint record");
                Ok(None)
            }
            Err(err) => {
                error!(key = %key, error = %err, "checkpoint record cannot be read by this version");
                Err(err)
            }
        }
    }

    fn expire(&self, key: String) -> KvOp {
        KvOp::Expire {
            key,
            ttl_seconds: self.ttl_seconds,
        }
    }
}

fn require_thread_id(config: &CheckpointConfig) -> Result<&str> {
    match config.thread_id.as_deref() {
        Some(thread_id) if !thread_id.is_empty() => Ok(thread_id),
        _ => Err(CheckpointError::Invalid(
            "thread_id is required".to_string(),
        )),
    }
}

fn validate_checkpoint_id(checkpoint_id: &str) -> Result<()> {
    if checkpoint_id.is_empty() {
        return Err(CheckpointError::Invalid(
            "checkpoint id must not be empty".to_string(),
        ));
    }
    if keys::is_reserved_checkpoint_id(checkpoint_id) {
        return Err(reserved_id(checkpoint_id));
    }
    Ok(())
}

fn reserved_id(checkpoint_id: &str) -> CheckpointError {
    CheckpointError::Invalid(format!(
        "checkpoint id '{}' is reserved for the latest pointer",
        checkpoint_id
    ))
}

fn belongs_to(tuple: &CheckpointTuple, thread_id: &str, checkpoint_id: Option<&str>) -> bool {
    tuple.config.thread_id.as_deref() == Some(thread_id)
        && checkpoint_id.map_or(true, |id| tuple.checkpoint.id == id)
}

fn matches_filter(metadata: &CheckpointMetadata, filter: &HashMap<String, Value>) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.extra.get(key) == Some(expected))
}

#[async_trait]
impl<B: KvBackend + 'static> CheckpointSaver for RedisCheckpointSaver<B> {
    #[tracing::instrument(skip_all, fields(thread_id = ?config.thread_id, checkpoint_id = ?config.checkpoint_id))]
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = require_thread_id(config)?;
        let requested_id = config.checkpoint_id.as_deref();
        if let Some(checkpoint_id) = requested_id.filter(|id| keys::is_reserved_checkpoint_id(id)) {
            return Err(reserved_id(checkpoint_id));
        }

        let key = match requested_id {
            Some(checkpoint_id) => keys::checkpoint_key(thread_id, checkpoint_id),
            None => keys::latest_key(thread_id),
        };

        let Some(blob) = self.backend.get(&key).await? else {
            debug!(key = %key, "checkpoint not found");
            return Ok(None);
        };
        let Some(tuple) = self.read_record(&key, &blob)? else {
            return Ok(None);
        };
        if !belongs_to(&tuple, thread_id, requested_id) {
            warn!(key = %key, "stored record does not match its key, treating as missing");
            return Ok(None);
        }

        self.backend
            .pipeline(vec![
                self.expire(keys::latest_key(thread_id)),
                self.expire(keys::checkpoint_key(thread_id, &tuple.checkpoint.id)),
            ])
            .await?;

        debug!(key = %key, resolved_id = %tuple.checkpoint.id, "checkpoint loaded");
        Ok(Some(tuple))
    }

    #[tracing::instrument(skip_all, fields(thread_id = ?config.and_then(|c| c.thread_id.as_deref()), limit = ?limit))]
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        // Listing is scoped to one thread; there is no cross-thread scan.
        let Some(thread_id) = config
            .and_then(|c| c.thread_id.as_deref())
            .filter(|thread_id| !thread_id.is_empty())
        else {
            debug!("list called without a thread_id");
            return Ok(Box::pin(stream::empty::<Result<CheckpointTuple>>()));
        };

        let pattern = keys::scan_pattern(thread_id);
        let keys_found = self.backend.scan_keys(&pattern, self.scan_count).await?;

        let mut records = Vec::with_capacity(keys_found.len());
        for key in &keys_found {
            let Some(key_id) = keys::checkpoint_id_from_key(thread_id, key) else {
                continue;
            };
            // Keys can expire between the scan and the read.
            let Some(blob) = self.backend.get(key).await? else {
                continue;
            };
            let Some(tuple) = self.read_record(key, &blob)? else {
                continue;
            };
            // A thread named "a:b" shares the "checkpoint:a:" prefix with
            // thread "a"; the record says which one it belongs to.
            if !belongs_to(&tuple, thread_id, Some(key_id)) {
                debug!(key = %key, "skipping record of another thread");
                continue;
            }
            records.push(tuple);
        }

        records.sort_by(|a, b| b.checkpoint.id.cmp(&a.checkpoint.id));

        let before_id = before.and_then(|b| b.checkpoint_id.as_deref());
        let selected: Vec<CheckpointTuple> = records
            .into_iter()
            .filter(|tuple| before_id.map_or(true, |id| tuple.checkpoint.id.as_str() < id))
            .filter(|tuple| {
                filter
                    .as_ref()
                    .map_or(true, |filter| matches_filter(&tuple.metadata, filter))
            })
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        if self.refresh_ttl_on_list && !selected.is_empty() {
            let mut ops: Vec<KvOp> = selected
                .iter()
                .map(|tuple| self.expire(keys::checkpoint_key(thread_id, &tuple.checkpoint.id)))
                .collect();
            ops.push(self.expire(keys::latest_key(thread_id)));
            self.backend.pipeline(ops).await?;
        }

        debug!(scanned = keys_found.len(), returned = selected.len(), "listed checkpoints");
        Ok(Box::pin(stream::iter(selected.into_iter().map(Ok))))
    }

    #[tracing::instrument(skip_all, fields(thread_id = ?config.thread_id, checkpoint_id = %checkpoint.id))]
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let thread_id = require_thread_id(config)?;
        validate_checkpoint_id(&checkpoint.id)?;
        let checkpoint_id = checkpoint.id.clone();

        let resolved = CheckpointConfig {
            thread_id: Some(thread_id.to_string()),
            checkpoint_id: Some(checkpoint_id.clone()),
            checkpoint_ns: config.checkpoint_ns.clone(),
            extra: config.extra.clone(),
        };
        let parent_config = config.checkpoint_id.as_ref().map(|_| config.clone());
        let tuple = CheckpointTuple {
            config: resolved.clone(),
            checkpoint,
            metadata,
            parent_config,
        };

        let blob = self.encode_record(tuple).map_err(|err| {
            error!(error = %err, "failed to encode checkpoint, nothing written");
            err
        })?;
        let size = blob.len();

        self.backend
            .pipeline(vec![
                KvOp::SetEx {
                    key: keys::checkpoint_key(thread_id, &checkpoint_id),
                    value: blob.clone(),
                    ttl_seconds: self.ttl_seconds,
                },
                KvOp::SetEx {
                    key: keys::latest_key(thread_id),
                    value: blob,
                    ttl_seconds: self.ttl_seconds,
                },
            ])
            .await?;

        info!(bytes = size, ttl_seconds = self.ttl_seconds, "checkpoint stored");
        Ok(resolved)
    }
}
