use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::CompressError;

/// Strategy requested by a caller.
///
/// Deserializing an unknown name yields the default strategy instead of an
/// error, so malformed configuration degrades gracefully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Strategy {
    None,
    Lz,
    Gzip,
    Delta,
    #[default]
    Hybrid,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::None,
        Strategy::Lz,
        Strategy::Gzip,
        Strategy::Delta,
        Strategy::Hybrid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz => "lz",
            Self::Gzip => "gzip",
            Self::Delta => "delta",
            Self::Hybrid => "hybrid",
        }
    }

    /// Parse a strategy name, falling back to the default for unknown names.
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_else(|err: CompressError| {
            tracing::warn!(%err, fallback = Self::default().as_str(), "using default strategy");
            Self::default()
        })
    }
}

impl FromStr for Strategy {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lz" | "lz-string" | "lzstring" => Ok(Self::Lz),
            "gzip" | "deflate" => Ok(Self::Gzip),
            "delta" => Ok(Self::Delta),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(CompressError::UnsupportedStrategy(s.to_string())),
        }
    }
}

impl From<String> for Strategy {
    fn from(value: String) -> Self {
        Self::parse_lenient(&value)
    }
}

impl From<Strategy> for String {
    fn from(value: Strategy) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Algorithm actually applied to a payload.
///
/// `hybrid` requests always resolve to a concrete tag here: `delta+gzip` when
/// the structural pass had something to work with, `gzip` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "lz")]
    Lz,
    #[serde(rename = "gzip")]
    Gzip,
    #[serde(rename = "delta")]
    Delta,
    #[serde(rename = "delta+gzip")]
    DeltaGzip,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz => "lz",
            Self::Gzip => "gzip",
            Self::Delta => "delta",
            Self::DeltaGzip => "delta+gzip",
        }
    }

    /// Resolve a requested strategy for a document.
    pub fn resolve(strategy: Strategy, has_structure: bool) -> Self {
        match strategy {
            Strategy::None => Self::None,
            Strategy::Lz => Self::Lz,
            Strategy::Gzip => Self::Gzip,
            Strategy::Delta => Self::Delta,
            Strategy::Hybrid if has_structure => Self::DeltaGzip,
            Strategy::Hybrid => Self::Gzip,
        }
    }

    /// Whether the level knob affects this algorithm.
    pub fn uses_level(self) -> bool {
        matches!(self, Self::Gzip | Self::DeltaGzip)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Algorithm-specific details of a compression call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionMetadata {
    /// Strategy the caller asked for.
    pub requested: Strategy,
    /// Level used, present whenever the algorithm honours it.
    pub level: Option<u8>,
    pub threshold: usize,
    /// Set when the encoder output was not smaller than its input and the
    /// raw bytes were kept instead.
    #[serde(default)]
    pub fallback: bool,
}

/// Outcome of compressing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionResult {
    pub algorithm: Algorithm,
    pub original_size: usize,
    pub compressed_size: usize,
    /// `compressed_size / original_size`, in `(0, 1]`.
    pub ratio: f64,
    pub duration: Duration,
    #[serde(with = "payload")]
    pub data: Vec<u8>,
    pub metadata: CompressionMetadata,
}

impl CompressionResult {
    pub(crate) fn new(
        algorithm: Algorithm,
        original_size: usize,
        data: Vec<u8>,
        duration: Duration,
        metadata: CompressionMetadata,
    ) -> Self {
        let compressed_size = data.len();
        let ratio = if algorithm == Algorithm::None || original_size == 0 {
            1.0
        } else {
            compressed_size as f64 / original_size as f64
        };
        Self {
            algorithm,
            original_size,
            compressed_size,
            ratio,
            duration,
            data,
            metadata,
        }
    }

    /// Build a result descriptor around an existing payload, e.g. one read
    /// back from an export envelope. Only `algorithm` and `data` matter for
    /// decoding.
    pub fn from_payload(algorithm: Algorithm, level: Option<u8>, data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            algorithm,
            original_size: size,
            compressed_size: size,
            ratio: 1.0,
            duration: Duration::ZERO,
            data,
            metadata: CompressionMetadata {
                level,
                ..Default::default()
            },
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.algorithm != Algorithm::None
    }
}

/// Binary payloads travel as base64 text in JSON.
mod payload {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
