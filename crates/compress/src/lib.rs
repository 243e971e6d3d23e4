//! Compression engine for world documents.
//!
//! Documents are serialized to their canonical JSON bytes and encoded with one
//! of a closed set of algorithms. Small documents bypass compression entirely.
//!
//! # Invariants
//! - Decoding a result reproduces a document structurally equal to the input.
//! - Compression never fails: any encoder problem degrades to `none`.
//! - Every non-`none` result has `0 < ratio < 1`.
//! - Metrics updates are atomic across concurrent calls.

pub mod algorithm;
mod codec;
mod delta;
pub mod engine;
pub mod error;
mod lzw;
pub mod metrics;
pub mod options;
pub mod recommend;

pub use algorithm::{Algorithm, CompressionMetadata, CompressionResult, Strategy};
pub use engine::{BenchmarkEntry, CompressionEngine, Decompressed};
pub use error::CompressError;
pub use metrics::CompressionMetrics;
pub use options::{CompressionOptions, DEFAULT_LEVEL, DEFAULT_THRESHOLD, Preset};
pub use recommend::{recommend, recommend_for};
