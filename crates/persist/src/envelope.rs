//! Self-describing export container.
//!
//! ```json
//! {"format": "json", "version": "2.0", "worldState": {...}, "checksum": "<sha256>"}
//! {"format": "compressed_json", "version": "2.0",
//!  "compression": {"algorithm": "delta+gzip", "level": 9},
//!  "worldState": "<base64 payload>", "checksum": "<sha256>"}
//! ```
//! The checksum covers the canonical form of the world before compression,
//! so both formats of the same world carry the same checksum. Any change to
//! this layout must bump [`EXPORT_SCHEMA_VERSION`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use worldvault_compress::Algorithm;

use crate::ValidationError;
use crate::record::sha256_hex;

pub const EXPORT_SCHEMA_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "compressed_json")]
    Compressed,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "compressed" | "compressed_json" => Ok(Self::Compressed),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionInfo {
    pub algorithm: Algorithm,
    pub level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub format: ExportFormat,
    pub version: String,
    /// The world tree for `json`, a base64 string for `compressed_json`.
    pub world_state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionInfo>,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
}

/// Import behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Keep the envelope's world id instead of minting a fresh one.
    pub preserve_ids: bool,
    /// Require the minimum document shape before accepting the payload.
    pub validate_schema: bool,
    /// Copy an existing record under the target id aside before overwriting.
    pub create_backup: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            preserve_ids: false,
            validate_schema: true,
            create_backup: true,
        }
    }
}

/// SHA-256 hex over the canonical bytes of a world tree.
pub fn checksum(tree: &Value) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(&serde_json::to_vec(tree)?))
}

/// Minimum shape an imported world must have.
pub(crate) fn check_shape(tree: &Value) -> Result<(), ValidationError> {
    let root = tree
        .as_object()
        .ok_or_else(|| ValidationError::Schema("world state is not an object".into()))?;
    let id = root
        .get("metadata")
        .and_then(|m| m.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if id.is_empty() {
        return Err(ValidationError::Schema("metadata.id is missing or empty".into()));
    }
    for field in ["elements", "branches"] {
        if !root.get(field).is_some_and(Value::is_array) {
            return Err(ValidationError::Schema(format!("{field} must be an array")));
        }
    }
    Ok(())
}
