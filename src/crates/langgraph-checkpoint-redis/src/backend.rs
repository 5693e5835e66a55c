//! Key-value backend adapter
//!
//! The checkpoint saver only needs four things from its store: point reads,
//! writes with expiry, paged key scans, and atomic pipelines. [`KvBackend`]
//! is that contract; [`RedisKvBackend`](crate::RedisKvBackend) and
//! [`InMemoryKvBackend`](crate::InMemoryKvBackend) implement it.
//!
//! Timeouts and connection handling belong to the adapter. Every failure is a
//! [`BackendError`] so the saver can propagate it without inspecting it.

use async_trait::async_trait;
use langgraph_checkpoint::BackendError;
use std::collections::BTreeSet;

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// One operation inside a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    /// `SETEX key ttl value`
    SetEx {
        key: String,
        value: Vec<u8>,
        ttl_seconds: u64,
    },
    /// `EXPIRE key ttl`; a no-op for missing keys
    Expire { key: String, ttl_seconds: u64 },
}

impl KvOp {
    pub fn key(&self) -> &str {
        match self {
            KvOp::SetEx { key, .. } | KvOp::Expire { key, .. } => key,
        }
    }
}

/// One page of a key scan. A `cursor` of 0 means the scan is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// TTL-capable key-value store
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Write a value that expires after `ttl_seconds`
    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> BackendResult<()>;

    /// Fetch one page of keys matching a glob `pattern`, starting at `cursor`
    /// (0 for the first page). `count` is a hint for the page size.
    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> BackendResult<ScanPage>;

    /// Execute `ops` atomically in a single round trip
    async fn pipeline(&self, ops: Vec<KvOp>) -> BackendResult<()>;

    /// Check connectivity
    async fn ping(&self) -> BackendResult<()>;

    /// Collect every key matching `pattern`, one `scan` call per page.
    ///
    /// Keys are returned deduplicated (a scan may report a key twice) and in
    /// byte order, which carries no meaning beyond determinism.
    async fn scan_keys(&self, pattern: &str, count: usize) -> BackendResult<Vec<String>> {
        let mut keys = BTreeSet::new();
        let mut cursor = 0;
        loop {
            let page = self.scan(pattern, cursor, count).await?;
            keys.extend(page.keys);
            if page.cursor == 0 {
                break;
            }
            cursor = page.cursor;
        }
        Ok(keys.into_iter().collect())
    }
}
