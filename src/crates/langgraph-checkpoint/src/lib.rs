//! # langgraph-checkpoint - State Persistence for Agent Threads
//!
//! **Checkpoint types, codec, and storage trait** for persisting and resuming
//! the execution state of a multi-step conversational agent.
//!
//! ## Overview
//!
//! A checkpoint is a snapshot of agent state taken after every step. This crate
//! defines what a checkpoint looks like and how it is turned into bytes; the
//! storage itself lives behind the [`CheckpointSaver`] trait (see the
//! `langgraph-checkpoint-redis` crate for the key-value implementation).
//!
//! ## Core Concepts
//!
//! ### 1. Data model
//!
//! - [`Checkpoint`] - channel values, versions, ordered ID, timestamp
//! - [`CheckpointMetadata`] - source, step, parents, custom entries
//! - [`CheckpointConfig`] - thread ID + checkpoint ID addressing
//! - [`CheckpointTuple`] - everything returned by a read
//!
//! ### 2. Dynamic values
//!
//! Channel values are [`Value`] trees: scalars, lists, maps, [`Message`]s,
//! opaque [`Value::Blob`]s and in-process [`Value::Foreign`] handles.
//!
//! ### 3. Codec and envelope
//!
//! - [`serializer::CheckpointCodec`] normalizes map keys, applies the
//!   [`UnknownTypePolicy`] to foreign values, encodes with bincode and falls
//!   back to JSON when bincode cannot encode a value
//! - [`envelope`] tags stored bytes with a schema version and refuses versions
//!   newer than this build
//!
//! ## Quick Start
//!
//! ```rust
//! use langgraph_checkpoint::{
//!     envelope, serializer::CheckpointCodec, Checkpoint, CheckpointConfig, CheckpointMetadata,
//!     CheckpointTuple, UnknownTypePolicy,
//! };
//!
//! let codec = CheckpointCodec::new(UnknownTypePolicy::Lenient);
//! let tuple = CheckpointTuple::new(
//!     CheckpointConfig::for_thread("u1"),
//!     Checkpoint::empty().with_channel_value("msg", "hello"),
//!     CheckpointMetadata::new().with_step(0),
//! );
//!
//! let blob = envelope::wrap(codec.encode_tuple(tuple.clone()).unwrap()).unwrap();
//! let unwrapped = envelope::unwrap(&blob).unwrap();
//! let restored: CheckpointTuple = codec.decode(unwrapped.format, &unwrapped.payload).unwrap();
//! assert_eq!(restored, tuple);
//! ```
//!
//! ## Module Organization
//!
//! - [`checkpoint`] - checkpoint data structures
//! - [`value`] - dynamic value tree and message shapes
//! - [`serializer`] - byte formats and the checkpoint codec
//! - [`envelope`] - schema versioning of stored blobs
//! - [`traits`] - [`CheckpointSaver`] and [`CheckpointStream`]
//! - [`error`] - [`CheckpointError`] and [`BackendError`]

pub mod checkpoint;
pub mod envelope;
pub mod error;
pub mod serializer;
pub mod traits;
pub mod value;

// Re-export main types
pub use checkpoint::{
    new_checkpoint_id, ChannelVersion, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointId,
    CheckpointMetadata, CheckpointSource, CheckpointTuple,
};
pub use error::{BackendError, CheckpointError, Result};
pub use serializer::{CheckpointCodec, PayloadFormat, SerializerProtocol, UnknownTypePolicy};
pub use traits::{CheckpointSaver, CheckpointStream};
pub use value::{Foreign, MapKey, Message, MessageRole, ToolCall, Value};
