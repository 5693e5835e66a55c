//! # langgraph-checkpoint-redis - Redis Checkpoint Storage
//!
//! A [`CheckpointSaver`](langgraph_checkpoint::CheckpointSaver) that keeps
//! agent checkpoints in Redis with a sliding expiry.
//!
//! ## Overview
//!
//! - Every `put` writes the checkpoint and the thread's latest pointer in one
//!   `MULTI`/`EXEC` transaction, both with the configured TTL.
//! - `get_tuple` resolves the latest checkpoint with one `GET` and refreshes
//!   the TTL of both keys.
//! - `list` walks the thread's keys with cursor-based `SCAN`, never `KEYS`,
//!   and yields checkpoints newest first.
//! - Records are schema-versioned envelopes; unreadable records are skipped
//!   with a warning instead of failing the read.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use langgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver};
//! use langgraph_checkpoint_redis::{RedisCheckpointSaver, RedisSaverConfig};
//!
//! # async fn run() -> langgraph_checkpoint::Result<()> {
//! let config = RedisSaverConfig::from_env()?;
//! let saver = RedisCheckpointSaver::connect(&config).await?;
//!
//! let stored = saver
//!     .put(
//!         &CheckpointConfig::for_thread("user-42"),
//!         Checkpoint::empty().with_channel_value("answer", 42i64),
//!         CheckpointMetadata::new().with_step(1),
//!     )
//!     .await?;
//! println!("stored {:?}", stored.checkpoint_id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! The saver is generic over [`KvBackend`]. [`RedisKvBackend`] talks to a real
//! server through a `deadpool-redis` pool; [`InMemoryKvBackend`] keeps
//! everything in process and follows the tokio clock, which makes TTL
//! behaviour testable with paused time.

pub mod backend;
pub mod config;
pub mod keys;
pub mod memory;
pub mod redis_backend;
pub mod saver;

pub use backend::{BackendResult, KvBackend, KvOp, ScanPage};
pub use config::RedisSaverConfig;
pub use memory::InMemoryKvBackend;
pub use redis_backend::RedisKvBackend;
pub use saver::RedisCheckpointSaver;
