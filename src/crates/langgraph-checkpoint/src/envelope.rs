//! Versioned envelope around stored checkpoint payloads
//!
//! Layout of an envelope blob:
//!
//! ```text
//! ┌──────────┬───────────────────────────────────────────────┐
//! │ "CKPT"   │ bincode { schema_version, format, payload }   │
//! └──────────┴───────────────────────────────────────────────┘
//! ```
//!
//! Only `schema_version` is fixed across versions. [`unwrap`] reads it on its
//! own and checks it before touching the rest of the header, whose layout
//! belongs to that version.
//!
//! Blobs without the magic prefix were written before envelopes existed.
//! They are read as schema `v0`: the whole blob is the payload, JSON if it
//! starts with `{` or `[`, bincode otherwise.
//!
//! A schema version newer than [`CURRENT_SCHEMA_VERSION`] is refused with
//! [`CheckpointError::UnknownSchemaVersion`]. It is never decoded on a best
//! guess.

use crate::error::{CheckpointError, Result};
use crate::serializer::{BincodeSerializer, Encoded, PayloadFormat, SerializerProtocol};
use bincode::Options;
use serde::Serialize;

/// Prefix identifying a versioned envelope
pub const ENVELOPE_MAGIC: &[u8; 4] = b"CKPT";

/// Schema written by this build
pub const CURRENT_SCHEMA_VERSION: &str = "v1";

/// Schema assigned to blobs written before envelopes existed
pub const LEGACY_SCHEMA_VERSION: &str = "v0";

#[derive(Debug, Serialize)]
struct EnvelopeRepr {
    schema_version: String,
    format: PayloadFormat,
    payload: Vec<u8>,
}

/// A stored blob with its envelope removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped {
    pub schema_version: String,
    pub format: PayloadFormat,
    pub payload: Vec<u8>,
}

impl Unwrapped {
    pub fn is_legacy(&self) -> bool {
        self.schema_version == LEGACY_SCHEMA_VERSION
    }
}

/// Wrap an encoded payload in a current-version envelope
pub fn wrap(encoded: Encoded) -> Result<Vec<u8>> {
    wrap_with_version(encoded, CURRENT_SCHEMA_VERSION)
}

/// Wrap an encoded payload under an explicit schema version.
///
/// Only migration tooling should need this; [`unwrap`] still refuses
/// versions newer than [`CURRENT_SCHEMA_VERSION`].
pub fn wrap_with_version(encoded: Encoded, schema_version: &str) -> Result<Vec<u8>> {
    let repr = EnvelopeRepr {
        schema_version: schema_version.to_string(),
        format: encoded.format,
        payload: encoded.bytes,
    };
    let body = BincodeSerializer::new().dumps(&repr)?;

    let mut blob = Vec::with_capacity(ENVELOPE_MAGIC.len() + body.len());
    blob.extend_from_slice(ENVELOPE_MAGIC);
    blob.extend_from_slice(&body);
    Ok(blob)
}

/// Remove the envelope from a stored blob
pub fn unwrap(blob: &[u8]) -> Result<Unwrapped> {
    let Some(body) = blob.strip_prefix(ENVELOPE_MAGIC.as_slice()) else {
        return Ok(Unwrapped {
            schema_version: LEGACY_SCHEMA_VERSION.to_string(),
            format: sniff_legacy_format(blob),
            payload: blob.to_vec(),
        });
    };

    let (schema_version, rest) = read_schema_version(body)?;
    check_schema_version(&schema_version)?;

    let (format, payload): (PayloadFormat, Vec<u8>) =
        BincodeSerializer::new().loads(rest).map_err(|e| {
            CheckpointError::Deserialization(format!("unreadable envelope header: {}", e))
        })?;

    Ok(Unwrapped {
        schema_version,
        format,
        payload,
    })
}

/// Split the leading version tag off an envelope body
fn read_schema_version(body: &[u8]) -> Result<(String, &[u8])> {
    let unreadable =
        |e: bincode::Error| CheckpointError::Deserialization(format!("unreadable schema version: {}", e));
    let version: String = version_options().deserialize(body).map_err(unreadable)?;
    let consumed = version_options().serialized_size(&version).map_err(unreadable)?;
    let rest = usize::try_from(consumed)
        .ok()
        .and_then(|consumed| body.get(consumed..))
        .ok_or_else(|| CheckpointError::Deserialization("truncated envelope header".to_string()))?;
    Ok((version, rest))
}

/// Same integer encoding as the envelope, reading only a prefix
fn version_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Accept versions up to the current one; refuse newer or malformed tags
pub fn check_schema_version(version: &str) -> Result<()> {
    let unknown = || CheckpointError::UnknownSchemaVersion {
        found: version.to_string(),
        supported: CURRENT_SCHEMA_VERSION.to_string(),
    };

    let found = parse_version(version).ok_or_else(unknown)?;
    let supported = parse_version(CURRENT_SCHEMA_VERSION).ok_or_else(unknown)?;
    if found > supported {
        return Err(unknown());
    }
    Ok(())
}

fn parse_version(version: &str) -> Option<u32> {
    version.strip_prefix('v')?.parse().ok()
}

fn sniff_legacy_format(blob: &[u8]) -> PayloadFormat {
    match blob.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => PayloadFormat::Json,
        _ => PayloadFormat::Bincode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(bytes: &[u8]) -> Encoded {
        Encoded {
            format: PayloadFormat::Bincode,
            bytes: bytes.to_vec(),
        }
    }

    fn envelope_with_version(version: &str) -> Vec<u8> {
        wrap_with_version(encoded(&[1, 2, 3]), version).unwrap()
    }

    #[test]
    fn test_wrap_unwrap() {
        let blob = wrap(encoded(b"payload")).unwrap();
        assert!(blob.starts_with(ENVELOPE_MAGIC));

        let unwrapped = unwrap(&blob).unwrap();
        assert_eq!(unwrapped.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(unwrapped.format, PayloadFormat::Bincode);
        assert_eq!(unwrapped.payload, b"payload");
        assert!(!unwrapped.is_legacy());
    }

    #[test]
    fn test_legacy_blobs_are_accepted() {
        let unwrapped = unwrap(b"\x01\x00\x00\x00raw").unwrap();
        assert!(unwrapped.is_legacy());
        assert_eq!(unwrapped.format, PayloadFormat::Bincode);
        assert_eq!(unwrapped.payload, b"\x01\x00\x00\x00raw");

        let json = unwrap(b"  {\"config\": {}}").unwrap();
        assert!(json.is_legacy());
        assert_eq!(json.format, PayloadFormat::Json);
    }

    #[test]
    fn test_older_versions_are_accepted() {
        assert!(unwrap(&envelope_with_version("v0")).is_ok());
        assert!(unwrap(&envelope_with_version("v1")).is_ok());
    }

    #[test]
    fn test_newer_version_is_refused() {
        let err = unwrap(&envelope_with_version("v2")).unwrap_err();
        match err {
            CheckpointError::UnknownSchemaVersion { found, supported } => {
                assert_eq!(found, "v2");
                assert_eq!(supported, CURRENT_SCHEMA_VERSION);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_newer_header_layout_is_refused_not_skipped() {
        // A later schema may add header fields and payload formats this build
        // cannot parse; the version tag alone decides.
        let body = BincodeSerializer::new()
            .dumps(&("v2".to_string(), 2u32, vec![1u8, 2, 3], "zstd".to_string()))
            .unwrap();
        let mut blob = ENVELOPE_MAGIC.to_vec();
        blob.extend_from_slice(&body);

        let err = unwrap(&blob).unwrap_err();
        assert!(!err.is_dirty_data());
        assert!(matches!(
            err,
            CheckpointError::UnknownSchemaVersion { ref found, .. } if found == "v2"
        ));
    }

    #[test]
    fn test_current_header_with_unknown_format_is_dirty_data() {
        let body = BincodeSerializer::new()
            .dumps(&(CURRENT_SCHEMA_VERSION.to_string(), 7u32, vec![1u8]))
            .unwrap();
        let mut blob = ENVELOPE_MAGIC.to_vec();
        blob.extend_from_slice(&body);

        assert!(unwrap(&blob).unwrap_err().is_dirty_data());
    }

    #[test]
    fn test_malformed_version_is_refused() {
        let err = unwrap(&envelope_with_version("2024-01")).unwrap_err();
        assert!(matches!(err, CheckpointError::UnknownSchemaVersion { .. }));
    }

    #[test]
    fn test_truncated_header_is_dirty_data() {
        let blob = wrap(encoded(b"payload")).unwrap();
        let err = unwrap(&blob[..blob.len() - 3]).unwrap_err();
        assert!(err.is_dirty_data());
    }
}
