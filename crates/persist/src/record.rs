//! On-backend record layout.
//!
//! ```text
//! b"WVR1" | header length (u32 BE) | CBOR header | body
//! ```
//! The header is small and lets the store read versions and list worlds
//! without touching the body. The body is canonical JSON or a compressed
//! payload, and its SHA-256 is kept in the header.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use worldvault_compress::{Algorithm, CompressionResult};

use crate::StoreError;

/// Current record schema version.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"WVR1";
const PREFIX_LEN: usize = MAGIC.len() + 4;

/// Metadata stored in front of every world body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RecordHeader {
    pub schema: u32,
    pub id: String,
    pub name: String,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    pub algorithm: Algorithm,
    pub level: Option<u8>,
    pub original_size: usize,
    pub body_sha256: String,
}

/// Store-level metadata, written once when a backend is first opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreMeta {
    pub record_schema_version: u32,
    pub created_at: DateTime<Utc>,
}

/// A decoded record borrowing its body from the raw bytes.
pub(crate) struct Record<'a> {
    pub header: RecordHeader,
    pub body: &'a [u8],
}

impl Record<'_> {
    /// Describe the body as a compression result the engine can decode.
    pub fn to_compression_result(&self) -> CompressionResult {
        CompressionResult::from_payload(self.header.algorithm, self.header.level, self.body.to_vec())
    }
}

pub(crate) fn encode_record(header: &RecordHeader, body: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut cbor = Vec::new();
    ciborium::into_writer(header, &mut cbor).map_err(|e| StoreError::Encode(e.to_string()))?;
    let header_len = u32::try_from(cbor.len())
        .map_err(|_| StoreError::Encode("record header too large".into()))?;

    let mut out = Vec::with_capacity(PREFIX_LEN + cbor.len() + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&header_len.to_be_bytes());
    out.extend_from_slice(&cbor);
    out.extend_from_slice(body);
    Ok(out)
}

/// Parse a record and verify its body hash.
pub(crate) fn decode_record<'a>(key: &str, bytes: &'a [u8]) -> Result<Record<'a>, StoreError> {
    let corrupt = |reason: String| StoreError::CorruptRecord {
        key: key.to_string(),
        reason,
    };

    if bytes.len() < PREFIX_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt("missing record header".into()));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[MAGIC.len()..PREFIX_LEN]);
    let header_end = PREFIX_LEN
        .checked_add(u32::from_be_bytes(len_bytes) as usize)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| corrupt("header length exceeds record".into()))?;

    let header: RecordHeader = ciborium::from_reader(&bytes[PREFIX_LEN..header_end])
        .map_err(|e| corrupt(format!("CBOR header: {e}")))?;
    if header.schema != RECORD_SCHEMA_VERSION {
        return Err(StoreError::SchemaMismatch {
            found: header.schema,
            expected: RECORD_SCHEMA_VERSION,
        });
    }

    let body = &bytes[header_end..];
    let actual = sha256_hex(body);
    if actual != header.body_sha256 {
        return Err(corrupt(format!(
            "body hash {actual} does not match header {}",
            header.body_sha256
        )));
    }
    Ok(Record { header, body })
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
