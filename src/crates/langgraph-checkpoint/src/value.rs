//! Dynamic value tree carried inside checkpoints
//!
//! Agent state is only partly known at compile time: channel values hold
//! conversation messages, scalars, nested maps, and occasionally handles to
//! in-process objects that have no stored form. [`Value`] models that as a
//! closed tagged union:
//!
//! - scalars, lists and maps for ordinary state
//! - [`Message`] for the conversational shapes the agent runtime produces
//! - [`Value::Blob`] for caller-owned types stored as raw bytes plus a type tag
//! - [`Value::Foreign`] for in-process handles, which the codec either rejects
//!   or replaces according to its [`UnknownTypePolicy`](crate::serializer::UnknownTypePolicy)
//!
//! Map keys are [`MapKey`]s. Integer and boolean keys are accepted in memory
//! but are always written as strings.

use crate::error::{CheckpointError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Map key of a [`Value::Map`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl MapKey {
    /// String form written to storage
    pub fn normalized(&self) -> String {
        match self {
            MapKey::Str(s) => s.clone(),
            MapKey::Int(i) => i.to_string(),
            MapKey::Bool(b) => b.to_string(),
        }
    }

    /// Borrow the key if it is already a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MapKey::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Str(s) => f.write_str(s),
            MapKey::Int(i) => write!(f, "{}", i),
            MapKey::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl Serialize for MapKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MapKey::Str(s) => serializer.serialize_str(s),
            other => serializer.serialize_str(&other.normalized()),
        }
    }
}

impl<'de> Deserialize<'de> for MapKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(MapKey::Str)
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::Str(s.to_string())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::Str(s)
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Int(i)
    }
}

impl From<bool> for MapKey {
    fn from(b: bool) -> Self {
        MapKey::Bool(b)
    }
}

/// Handle to an in-process object with no stored form
///
/// Equality is identity: two handles are equal when they point at the same
/// allocation.
#[derive(Clone)]
pub struct Foreign {
    type_name: String,
    handle: Arc<dyn Any + Send + Sync>,
}

impl Foreign {
    /// Wrap a value, tagging it with its Rust type name
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>().to_string(),
            handle: Arc::new(value),
        }
    }

    /// Wrap a value under an explicit type name
    pub fn named<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            handle: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.handle.downcast_ref::<T>()
    }
}

impl fmt::Debug for Foreign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Foreign({})", self.type_name)
    }
}

impl PartialEq for Foreign {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && std::ptr::eq(
                Arc::as_ptr(&self.handle) as *const (),
                Arc::as_ptr(&other.handle) as *const (),
            )
    }
}

/// Role of a conversational message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Human,
    Assistant,
    Tool,
    Custom(String),
}

/// Tool invocation requested by an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args: args.into(),
        }
    }
}

/// Conversational message stored in agent state
// Fields are never skipped on serialization: the binary format is positional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub name: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl Message {
    /// Create a message with the given role and content
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create a tool result message answering `tool_call_id`
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        let mut message = Self::new(MessageRole::Tool, content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A node in the checkpoint value tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
    Message(Message),
    /// Caller-owned data the codec does not model, stored verbatim
    Blob { type_name: String, data: Vec<u8> },
    /// In-process handle; never reaches storage as-is
    #[serde(skip)]
    Foreign(Foreign),
}

impl Value {
    /// Build a map value from string-keyed entries
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<MapKey>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Wrap an in-process object that cannot be stored
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Foreign(Foreign::new(value))
    }

    /// Store a caller-owned type as a JSON blob tagged with its type name
    pub fn blob_json<T: Serialize>(value: &T) -> Result<Self> {
        let data = serde_json::to_vec(value).map_err(CheckpointError::serialization)?;
        Ok(Value::Blob {
            type_name: std::any::type_name::<T>().to_string(),
            data,
        })
    }

    /// Decode a blob created by [`Value::blob_json`]
    pub fn decode_blob_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        match self {
            Value::Blob { data, .. } => {
                serde_json::from_slice(data).map_err(CheckpointError::deserialization)
            }
            other => Err(CheckpointError::Invalid(format!(
                "expected a blob, found {}",
                other.kind()
            ))),
        }
    }

    /// Short name of the variant, used in log fields and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Message(_) => "message",
            Value::Blob { .. } => "blob",
            Value::Foreign(_) => "foreign",
        }
    }

    /// Look up a string key in a map value
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(&MapKey::Str(key.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render as JSON for collaborators that speak JSON.
    ///
    /// Bytes and blobs become integer arrays and foreign handles become
    /// their marker string, so this is not a lossless inverse of
    /// `From<serde_json::Value>`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value as Json};

        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::String(s) => Json::String(s.clone()),
            Value::Bytes(bytes) => json!(bytes),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.normalized(), v.to_json()))
                    .collect(),
            ),
            Value::Message(message) => json!({
                "id": message.id,
                "role": message.role,
                "content": message.content,
                "name": message.name,
                "tool_calls": message
                    .tool_calls
                    .iter()
                    .map(|call| json!({"id": call.id, "name": call.name, "args": call.args.to_json()}))
                    .collect::<Vec<_>>(),
                "tool_call_id": message.tool_call_id,
                "metadata": message
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<serde_json::Map<_, _>>(),
            }),
            Value::Blob { type_name, data } => json!({"type": type_name, "data": data}),
            Value::Foreign(foreign) => Json::String(unserializable_marker(foreign.type_name())),
        }
    }
}

/// Marker substituted for a foreign value under the lenient policy
pub fn unserializable_marker(type_name: &str) -> String {
    format!("<unserializable:{}>", type_name)
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (MapKey::Str(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Self {
        Value::Message(message)
    }
}

impl From<Foreign> for Value {
    fn from(foreign: Foreign) -> Self {
        Value::Foreign(foreign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct RuntimeHandle;

    #[test]
    fn test_map_key_normalization() {
        assert_eq!(MapKey::from(7).normalized(), "7");
        assert_eq!(MapKey::from(true).normalized(), "true");
        assert_eq!(MapKey::from("msg").normalized(), "msg");
    }

    #[test]
    fn test_map_keys_serialize_as_strings() {
        let value = Value::map([(MapKey::Int(1), Value::from("one"))]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, json!({"Map": {"1": {"String": "one"}}}));
    }

    #[test]
    fn test_from_json() {
        let value = Value::from(json!({"msg": "hello", "n": 3, "ratio": 0.5, "tags": ["a"]}));
        assert_eq!(value.get("msg"), Some(&Value::from("hello")));
        assert_eq!(value.get("n").and_then(Value::as_i64), Some(3));
        assert_eq!(value.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(value.get("tags"), Some(&Value::List(vec![Value::from("a")])));
    }

    #[test]
    fn test_to_json_roundtrip_for_plain_data() {
        let original = json!({"msg": "hello", "nested": {"k": [1, 2, null]}});
        assert_eq!(Value::from(original.clone()).to_json(), original);
    }

    #[test]
    fn test_foreign_identity() {
        let a = Foreign::new(RuntimeHandle);
        let b = a.clone();
        let c = Foreign::new(RuntimeHandle);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.type_name().ends_with("RuntimeHandle"));
        assert!(a.downcast_ref::<RuntimeHandle>().is_some());
    }

    #[test]
    fn test_foreign_cannot_be_serialized_directly() {
        let value = Value::opaque(RuntimeHandle);
        assert!(serde_json::to_vec(&value).is_err());
        assert_eq!(value.kind(), "foreign");
    }

    #[test]
    fn test_blob_json() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Cart {
            items: Vec<String>,
        }

        let cart = Cart {
            items: vec!["voucher".to_string()],
        };
        let blob = Value::blob_json(&cart).unwrap();
        match &blob {
            Value::Blob { type_name, .. } => assert!(type_name.ends_with("Cart")),
            other => panic!("expected blob, got {:?}", other),
        }
        assert_eq!(blob.decode_blob_json::<Cart>().unwrap(), cart);
        assert!(Value::Null.decode_blob_json::<Cart>().is_err());
    }

    #[test]
    fn test_message_builders() {
        let msg = Message::assistant("looking up points")
            .with_id("m-1")
            .with_tool_calls(vec![ToolCall::new("call-1", "query_points", json!({"user": "u1"}))]);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.tool_calls[0].args.get("user"), Some(&Value::from("u1")));

        let reply = Message::tool("1200 points", "call-1");
        assert_eq!(reply.tool_call_id.as_deref(), Some("call-1"));
    }
}
