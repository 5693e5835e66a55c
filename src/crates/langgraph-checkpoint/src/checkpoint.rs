//! Core checkpoint data structures for resuming agent threads
//!
//! This module defines the types persisted after every agent step:
//! **[`Checkpoint`]**, **[`CheckpointConfig`]**, **[`CheckpointMetadata`]**, and
//! **[`CheckpointTuple`]**.
//!
//! # Overview
//!
//! - **State Snapshots** - channel values as a [`Value`] tree per channel
//! - **Ordered Identity** - checkpoint IDs sort in creation order
//! - **Metadata** - step number, source, parent IDs, custom data
//! - **Thread Isolation** - independent histories per conversation thread
//!
//! # Layout
//!
//! ```text
//! CheckpointTuple
//! ├─ config          thread_id="u1", checkpoint_id="0190..."
//! ├─ checkpoint
//! │   ├─ v, id, ts
//! │   ├─ channel_values   {"messages": [...], "cart": {...}}
//! │   ├─ channel_versions {"messages": Int(5)}
//! │   └─ versions_seen    {"agent": {"messages": Int(4)}}
//! ├─ metadata        source=Loop, step=5, parents={"": "0190..."}
//! └─ parent_config   config of the checkpoint this one was derived from
//! ```
//!
//! # Checkpoint IDs
//!
//! IDs produced by [`new_checkpoint_id`] are UUIDv7 strings. Their
//! lexicographic order is their creation order, which is what history
//! listings sort by. Callers supplying their own IDs must keep that property.
//!
//! # Wire stability
//!
//! Every type here is written positionally by the binary codec, so no field
//! is ever skipped or flattened during serialization. Adding a field is a
//! schema change and must bump the envelope version.
//!
//! ```rust
//! use langgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource, Value};
//! use std::collections::HashMap;
//!
//! let mut values = HashMap::new();
//! values.insert("msg".to_string(), Value::from("hello"));
//!
//! let checkpoint = Checkpoint::new("c1".to_string(), values, HashMap::new(), HashMap::new());
//! let metadata = CheckpointMetadata::new().with_source(CheckpointSource::Loop).with_step(0);
//! let config = CheckpointConfig::new().with_thread_id("u1".to_string());
//!
//! assert_eq!(checkpoint.id, "c1");
//! assert_eq!(metadata.step, Some(0));
//! assert_eq!(config.thread_id.as_deref(), Some("u1"));
//! ```

use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Checkpoint ID type
pub type CheckpointId = String;

/// Generate a checkpoint ID that sorts after every ID generated before it
/// in this process.
pub fn new_checkpoint_id() -> CheckpointId {
    Uuid::now_v7().to_string()
}

/// Channel version type - can be int, float, or string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ChannelVersion {
    Int(i64),
    Float(f64),
    String(String),
}

impl ChannelVersion {
    /// Get the next version. String versions are managed by their owner
    /// and have no successor.
    pub fn next(&self) -> Option<Self> {
        match self {
            ChannelVersion::Int(v) => Some(ChannelVersion::Int(v + 1)),
            ChannelVersion::Float(v) => Some(ChannelVersion::Float(v + 1.0)),
            ChannelVersion::String(_) => None,
        }
    }
}

/// Mapping from channel name to version
pub type ChannelVersions = HashMap<String, ChannelVersion>;

/// Metadata source type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Checkpoint created from the input of a run
    Input,
    /// Checkpoint created after an agent step
    Loop,
    /// Checkpoint created from a manual state update
    Update,
    /// Checkpoint created as a copy of another checkpoint
    Fork,
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    pub source: Option<CheckpointSource>,

    /// The step number of the checkpoint
    /// -1 for the first "input" checkpoint
    /// 0 for the first "loop" checkpoint
    /// n for the nth checkpoint afterwards
    pub step: Option<i32>,

    /// The IDs of the parent checkpoints
    /// Mapping from checkpoint namespace to checkpoint ID
    pub parents: Option<HashMap<String, String>>,

    /// Additional custom metadata
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    /// Create a new checkpoint metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the step number
    pub fn with_step(mut self, step: i32) -> Self {
        self.step = Some(step);
        self
    }

    /// Set parent checkpoints
    pub fn with_parents(mut self, parents: HashMap<String, String>) -> Self {
        self.parents = Some(parents);
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: String, value: impl Into<Value>) -> Self {
        self.extra.insert(key, value.into());
        self
    }
}

/// State snapshot at a given point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// The ID of the checkpoint (unique and monotonically increasing)
    pub id: CheckpointId,

    /// The timestamp of the checkpoint
    pub ts: DateTime<Utc>,

    /// The values of the channels at the time of the checkpoint
    pub channel_values: HashMap<String, Value>,

    /// The versions of the channels at the time of the checkpoint
    pub channel_versions: ChannelVersions,

    /// Map from node ID to map from channel name to version seen
    pub versions_seen: HashMap<String, ChannelVersions>,

    /// The channels that were updated in this checkpoint
    pub updated_channels: Option<Vec<String>>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a new checkpoint
    pub fn new(
        id: CheckpointId,
        channel_values: HashMap<String, Value>,
        channel_versions: ChannelVersions,
        versions_seen: HashMap<String, ChannelVersions>,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id,
            ts: Utc::now(),
            channel_values,
            channel_versions,
            versions_seen,
            updated_channels: None,
        }
    }

    /// Create an empty checkpoint with a fresh ordered ID
    pub fn empty() -> Self {
        Self::new(
            new_checkpoint_id(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        )
    }

    /// Set a single channel value
    pub fn with_channel_value(mut self, channel: impl Into<String>, value: impl Into<Value>) -> Self {
        self.channel_values.insert(channel.into(), value.into());
        self
    }

    /// Set the updated channels
    pub fn with_updated_channels(mut self, channels: Vec<String>) -> Self {
        self.updated_channels = Some(channels);
        self
    }
}

/// Configuration for checkpoint operations
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointConfig {
    /// Thread ID for grouping related checkpoints
    pub thread_id: Option<String>,

    /// Specific checkpoint ID to retrieve
    pub checkpoint_id: Option<CheckpointId>,

    /// Checkpoint namespace
    pub checkpoint_ns: Option<String>,

    /// Additional configuration
    pub extra: HashMap<String, Value>,
}

impl CheckpointConfig {
    /// Create a new checkpoint configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration addressing the latest checkpoint of a thread
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self::new().with_thread_id(thread_id.into())
    }

    /// Set the thread ID
    pub fn with_thread_id(mut self, thread_id: String) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    /// Set the checkpoint ID
    pub fn with_checkpoint_id(mut self, checkpoint_id: CheckpointId) -> Self {
        self.checkpoint_id = Some(checkpoint_id);
        self
    }

    /// Set the checkpoint namespace
    pub fn with_checkpoint_ns(mut self, checkpoint_ns: String) -> Self {
        self.checkpoint_ns = Some(checkpoint_ns);
        self
    }

    /// Add an extra configuration entry
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A tuple containing a checkpoint and its associated data.
///
/// This is also the stored record: `config` is the resolved configuration
/// the checkpoint was written under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointTuple {
    /// Configuration for this checkpoint
    pub config: CheckpointConfig,

    /// The checkpoint itself
    pub checkpoint: Checkpoint,

    /// Metadata associated with the checkpoint
    pub metadata: CheckpointMetadata,

    /// Parent configuration (if any)
    pub parent_config: Option<CheckpointConfig>,
}

impl CheckpointTuple {
    /// Create a new checkpoint tuple
    pub fn new(
        config: CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            config,
            checkpoint,
            metadata,
            parent_config: None,
        }
    }

    /// Set the parent configuration
    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_creation() {
        let checkpoint = Checkpoint::empty();
        assert_eq!(checkpoint.v, Checkpoint::CURRENT_VERSION);
        assert!(checkpoint.channel_values.is_empty());
        assert!(checkpoint.channel_versions.is_empty());
        assert!(checkpoint.versions_seen.is_empty());
    }

    #[test]
    fn test_checkpoint_ids_sort_in_creation_order() {
        let ids: Vec<_> = (0..64).map(|_| new_checkpoint_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_channel_version_increment() {
        assert_eq!(ChannelVersion::Int(1).next(), Some(ChannelVersion::Int(2)));
        assert_eq!(ChannelVersion::Float(1.0).next(), Some(ChannelVersion::Float(2.0)));
        assert_eq!(ChannelVersion::String("a".to_string()).next(), None);
    }

    #[test]
    fn test_checkpoint_metadata() {
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Input)
            .with_step(-1)
            .with_extra("key".to_string(), "value");

        assert_eq!(metadata.source, Some(CheckpointSource::Input));
        assert_eq!(metadata.step, Some(-1));
        assert_eq!(metadata.extra.get("key"), Some(&Value::from("value")));
    }

    #[test]
    fn test_checkpoint_config() {
        let config = CheckpointConfig::for_thread("thread-1")
            .with_checkpoint_id("checkpoint-1".to_string());

        assert_eq!(config.thread_id, Some("thread-1".to_string()));
        assert_eq!(config.checkpoint_id, Some("checkpoint-1".to_string()));
    }

    #[test]
    fn test_channel_value_builder() {
        let checkpoint = Checkpoint::empty().with_channel_value("msg", "hello");
        assert_eq!(checkpoint.channel_values.get("msg"), Some(&Value::from("hello")));
    }
}
