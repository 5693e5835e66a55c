//! Extensible checkpoint storage trait
//!
//! This module defines the **[`CheckpointSaver`]** trait - the interface the
//! agent runtime calls after every step (`put`) and when it resumes or audits
//! a thread (`get_tuple`, `list`).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  Agent runtime                             │
//! │  • put() after each step                    │
//! │  • get_tuple() to resume a thread           │
//! │  • list() to inspect history                │
//! └───────────────┬────────────────────────────┘
//!                 │ CheckpointSaver trait
//!                 ↓
//! ┌────────────────────────────────────────────┐
//! │  Storage backend                           │
//! │  • codec + envelope                         │
//! │  • TTL key-value store                      │
//! └────────────────────────────────────────────┘
//! ```
//!
//! # Contract
//!
//! - `put` is durability-critical: it returns the resolved config only once
//!   the checkpoint is stored, and any failure propagates.
//! - `get_tuple` and `list` favour availability: a stored record that cannot be
//!   decoded is reported as absent (and logged), while backend failures and
//!   unknown schema versions still propagate.
//! - `list` yields newest first, ordered by checkpoint ID.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`; the runtime calls them concurrently
//! from many tasks.

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple},
    error::Result,
    value::Value,
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// Type alias for async stream of checkpoint tuples
pub type CheckpointStream =
    Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send + 'static>>;

/// Core trait for implementing checkpoint storage backends
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Fetch just the checkpoint addressed by `config`
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        if let Some(tuple) = self.get_tuple(config).await? {
            Ok(Some(tuple.checkpoint))
        } else {
            Ok(None)
        }
    }

    /// Fetch a checkpoint tuple.
    ///
    /// With `config.checkpoint_id` set, that checkpoint is returned; otherwise
    /// the latest checkpoint of `config.thread_id`.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// List the checkpoints of `config.thread_id`, newest first.
    ///
    /// * `filter` - metadata `extra` entries every yielded checkpoint must match
    /// * `before` - only checkpoints strictly older than `before.checkpoint_id`.
    ///   This is an ID comparison, not a position: the ID need not be stored
    ///   (or still alive), and an unknown ID still yields everything that
    ///   sorts below it rather than nothing.
    /// * `limit` - maximum number of checkpoints yielded
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream>;

    /// Store a checkpoint and return the config addressing it.
    ///
    /// `config` carries the thread ID and, when the checkpoint continues an
    /// earlier one, that checkpoint's ID (recorded as the parent).
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig>;
}
