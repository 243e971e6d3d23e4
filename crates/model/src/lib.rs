//! World document model: the persisted scene graph, its branches and timelines.
//!
//! # Invariants
//! - `metadata.id` never changes once a document exists.
//! - `metadata.version` starts at 1 and only the store advances it.
//! - Branch parents are plain id values; lineage is resolved on demand.
//! - Every field has a default so incomplete documents still deserialize.

pub mod branch;
pub mod canonical;
pub mod element;
pub mod world;

pub use branch::{TimelineEvent, WorldBranch};
pub use canonical::{canonical_bytes, canonical_value};
pub use element::{ElementMetadata, Relationship, WorldElement};
pub use world::{LineageError, Visibility, WorldMetadata, WorldState};

/// Opaque JSON payload carried through the store without interpretation.
pub type Opaque = serde_json::Value;
