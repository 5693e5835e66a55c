//! Serialization protocol and the checkpoint codec
//!
//! [`SerializerProtocol`] is the low-level byte format (JSON or bincode).
//! [`CheckpointCodec`] sits on top of it and is what storage backends use:
//!
//! 1. **Sanitize** - map keys are normalized to strings and every
//!    [`Value::Foreign`] is handled by the [`UnknownTypePolicy`] fixed at
//!    construction.
//! 2. **Encode** - bincode first. If bincode itself fails (size limit,
//!    sequences of unknown length from hand-written `Serialize` impls), the
//!    codec retries with JSON and logs the fallback. The format that
//!    succeeded is returned alongside the bytes so decoding never guesses.
//!
//! ```rust
//! use langgraph_checkpoint::serializer::{CheckpointCodec, PayloadFormat, UnknownTypePolicy};
//! use langgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
//!
//! let codec = CheckpointCodec::new(UnknownTypePolicy::Strict);
//! let tuple = CheckpointTuple::new(
//!     CheckpointConfig::for_thread("u1"),
//!     Checkpoint::empty().with_channel_value("msg", "hello"),
//!     CheckpointMetadata::new(),
//! );
//!
//! let encoded = codec.encode_tuple(tuple.clone()).unwrap();
//! assert_eq!(encoded.format, PayloadFormat::Bincode);
//! let decoded: CheckpointTuple = codec.decode(encoded.format, &encoded.bytes).unwrap();
//! assert_eq!(decoded, tuple);
//! ```

use crate::checkpoint::{CheckpointConfig, CheckpointTuple};
use crate::error::{CheckpointError, Result};
use crate::value::{unserializable_marker, MapKey, Message, Value};
use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Protocol for serializing and deserializing checkpoint data
///
/// Implementations can provide custom serialization strategies
/// (JSON, MessagePack, bincode, etc.)
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;
}

/// JSON-based serializer
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(CheckpointError::serialization)
    }

    fn loads<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        serde_json::from_slice(data).map_err(CheckpointError::deserialization)
    }
}

/// Binary serializer using bincode
///
/// Uses fixed-width integers and rejects trailing bytes, so a truncated or
/// padded record is reported as corrupt instead of half-decoded.
#[derive(Debug, Clone)]
pub struct BincodeSerializer {
    limit: u64,
}

impl BincodeSerializer {
    pub fn new() -> Self {
        Self { limit: u64::MAX }
    }

    /// Refuse to encode or decode payloads larger than `limit` bytes
    pub fn with_limit(limit: u64) -> Self {
        Self { limit }
    }

    fn options(&self) -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(self.limit)
    }
}

impl Default for BincodeSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerProtocol for BincodeSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        self.options()
            .serialize(value)
            .map_err(CheckpointError::serialization)
    }

    fn loads<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        self.options()
            .deserialize(data)
            .map_err(CheckpointError::deserialization)
    }
}

/// Wire format of an encoded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Bincode,
    Json,
}

/// What the codec does with a value it has no stored form for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTypePolicy {
    /// Abort the whole encode with [`CheckpointError::Serialization`]
    #[default]
    Strict,
    /// Replace the value with `"<unserializable:{type}>"` and log a warning
    Lenient,
}

impl std::str::FromStr for UnknownTypePolicy {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(CheckpointError::Config(format!(
                "unknown type policy '{}' (expected strict or lenient)",
                other
            ))),
        }
    }
}

/// Bytes plus the format they were written in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub format: PayloadFormat,
    pub bytes: Vec<u8>,
}

/// Codec used by checkpoint stores
#[derive(Debug, Clone)]
pub struct CheckpointCodec {
    policy: UnknownTypePolicy,
    json_fallback: bool,
    binary: BincodeSerializer,
    json: JsonSerializer,
}

impl CheckpointCodec {
    /// Create a codec with the given unknown-type policy and JSON fallback enabled
    pub fn new(policy: UnknownTypePolicy) -> Self {
        Self {
            policy,
            json_fallback: true,
            binary: BincodeSerializer::new(),
            json: JsonSerializer::new(),
        }
    }

    /// Enable or disable the JSON retry when bincode fails
    pub fn with_json_fallback(mut self, enabled: bool) -> Self {
        self.json_fallback = enabled;
        self
    }

    /// Cap the size of binary payloads
    pub fn with_binary_limit(mut self, limit: u64) -> Self {
        self.binary = BincodeSerializer::with_limit(limit);
        self
    }

    pub fn policy(&self) -> UnknownTypePolicy {
        self.policy
    }

    /// Encode any serializable value.
    ///
    /// Value trees must be sanitized first; [`encode_tuple`](Self::encode_tuple)
    /// does that for checkpoint records.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Encoded> {
        match self.binary.dumps(value) {
            Ok(bytes) => Ok(Encoded {
                format: PayloadFormat::Bincode,
                bytes,
            }),
            Err(err) if self.json_fallback => {
                warn!(error = %err, "binary encoding failed, retrying as JSON");
                let bytes = self.json.dumps(value)?;
                Ok(Encoded {
                    format: PayloadFormat::Json,
                    bytes,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Decode bytes written in `format`. Failures are dirty data.
    pub fn decode<T: DeserializeOwned>(&self, format: PayloadFormat, bytes: &[u8]) -> Result<T> {
        match format {
            PayloadFormat::Bincode => self.binary.loads(bytes),
            PayloadFormat::Json => self.json.loads(bytes),
        }
    }

    /// Sanitize and encode a checkpoint record
    pub fn encode_tuple(&self, tuple: CheckpointTuple) -> Result<Encoded> {
        let tuple = self.sanitize_tuple(tuple)?;
        let encoded = self.encode(&tuple)?;

        // JSON cannot carry every value bincode can (non-finite floats become
        // null), so a fallback payload must prove it reads back.
        if encoded.format == PayloadFormat::Json {
            self.json
                .loads::<CheckpointTuple>(&encoded.bytes)
                .map_err(|e| {
                    CheckpointError::Serialization(format!(
                        "JSON fallback produced an unreadable record: {}",
                        e
                    ))
                })?;
        }

        Ok(encoded)
    }

    /// Apply key normalization and the unknown-type policy to a whole record
    pub fn sanitize_tuple(&self, mut tuple: CheckpointTuple) -> Result<CheckpointTuple> {
        tuple.checkpoint.channel_values =
            self.sanitize_entries(tuple.checkpoint.channel_values, "channel_values")?;
        tuple.metadata.extra = self.sanitize_entries(tuple.metadata.extra, "metadata.extra")?;
        tuple.config = self.sanitize_config(tuple.config, "config")?;
        tuple.parent_config = tuple
            .parent_config
            .map(|parent| self.sanitize_config(parent, "parent_config"))
            .transpose()?;
        Ok(tuple)
    }

    /// Apply key normalization and the unknown-type policy to one value.
    ///
    /// `path` names the value in errors and warnings.
    pub fn sanitize_value(&self, value: Value, path: &str) -> Result<Value> {
        match value {
            Value::Foreign(foreign) => match self.policy {
                UnknownTypePolicy::Strict => Err(CheckpointError::Serialization(format!(
                    "value of type {} at {} has no serializable form",
                    foreign.type_name(),
                    path
                ))),
                UnknownTypePolicy::Lenient => {
                    warn!(
                        type_name = foreign.type_name(),
                        path,
                        "substituting marker for unserializable value"
                    );
                    Ok(Value::String(unserializable_marker(foreign.type_name())))
                }
            },
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| self.sanitize_value(item, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Value::Map(map) => {
                let mut out = BTreeMap::new();
                for (key, item) in map {
                    let key = key.normalized();
                    let child = format!("{}.{}", path, key);
                    let item = self.sanitize_value(item, &child)?;
                    if out.insert(MapKey::Str(key), item).is_some() {
                        return Err(CheckpointError::Serialization(format!(
                            "map keys collide at {} once normalized to strings",
                            child
                        )));
                    }
                }
                Ok(Value::Map(out))
            }
            Value::Message(message) => self.sanitize_message(message, path).map(Value::Message),
            other => Ok(other),
        }
    }

    fn sanitize_message(&self, mut message: Message, path: &str) -> Result<Message> {
        message.tool_calls = message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, mut call)| {
                call.args = self.sanitize_value(call.args, &format!("{}.tool_calls[{}].args", path, i))?;
                Ok(call)
            })
            .collect::<Result<Vec<_>>>()?;
        message.metadata = message
            .metadata
            .into_iter()
            .map(|(key, item)| {
                let item = self.sanitize_value(item, &format!("{}.metadata.{}", path, key))?;
                Ok((key, item))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(message)
    }

    fn sanitize_config(&self, mut config: CheckpointConfig, path: &str) -> Result<CheckpointConfig> {
        config.extra = self.sanitize_entries(config.extra, &format!("{}.extra", path))?;
        Ok(config)
    }

    fn sanitize_entries(
        &self,
        entries: HashMap<String, Value>,
        path: &str,
    ) -> Result<HashMap<String, Value>> {
        entries
            .into_iter()
            .map(|(key, item)| {
                let item = self.sanitize_value(item, &format!("{}.{}", path, key))?;
                Ok((key, item))
            })
            .collect()
    }
}

impl Default for CheckpointCodec {
    fn default() -> Self {
        Self::new(UnknownTypePolicy::default())
    }
}
