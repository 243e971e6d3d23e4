//! Canonical serialized form of a document.
//!
//! The canonical form goes through `serde_json::Value`, whose object maps are
//! sorted by key, so two structurally equal documents always produce the same
//! bytes regardless of struct field order. Sizes and checksums are computed
//! over these bytes.
//!
//! JSON has no encoding for NaN or infinity; serde_json would write `null`,
//! which no longer reads back as a float. Documents holding such values are
//! rejected instead.

use serde::ser::Error as _;
use serde_json::Value;

use crate::WorldState;

/// Convert a document into its canonical JSON tree.
pub fn canonical_value(doc: &WorldState) -> serde_json::Result<Value> {
    if let Some(field) = doc.non_finite_field() {
        return Err(serde_json::Error::custom(format!(
            "non-finite float at {field}"
        )));
    }
    serde_json::to_value(doc)
}

/// Canonical byte encoding of a document.
pub fn canonical_bytes(doc: &WorldState) -> serde_json::Result<Vec<u8>> {
    let tree = canonical_value(doc)?;
    serde_json::to_vec(&tree)
}
