//! Persistence: versioned world records over a generic key-value backend,
//! checksum-verified export/import, debounced auto-save.
//!
//! # Invariants
//! - Every save advances `metadata.version` by exactly one.
//! - Writes to one world id are applied one at a time, in submission order.
//!   Different ids never wait on each other.
//! - Records carry a body hash; a load never returns bytes that fail it.
//! - Compression on the write path is best-effort; decompression failures on
//!   the read path are surfaced.

pub mod autosave;
pub mod backend;
pub mod config;
pub mod envelope;
pub mod error;
mod fs_backend;
mod locks;
mod record;
pub mod store;

pub use autosave::{AutoSaveErrorHandler, AutoSaveState};
pub use backend::{Backend, BackendError, MemoryBackend};
pub use config::{CompressMode, StoreConfig};
pub use envelope::{
    CompressionInfo, EXPORT_SCHEMA_VERSION, ExportEnvelope, ExportFormat, ImportOptions,
};
pub use error::{StoreError, ValidationError};
pub use fs_backend::FsBackend;
pub use record::RECORD_SCHEMA_VERSION;
pub use store::{SaveReceipt, WorldStore, WorldSummary};
