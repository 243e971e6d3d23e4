//! Heuristic strategy choice from document shape.

use worldvault_model::WorldState;

use crate::Strategy;

const TINY_BYTES: usize = 1024;
const SMALL_BYTES: usize = 10 * 1024;
const MEDIUM_BYTES: usize = 100 * 1024;
const LARGE_BYTES: usize = 1024 * 1024;
const FEW_ELEMENTS: usize = 10;
const MANY_ELEMENTS: usize = 50;

/// Pick a strategy from serialized size, element count and timeline presence.
///
/// Small flat documents get cheap strategies; large documents and documents
/// with repeated structure (timelines, many elements) get the structural ones.
pub fn recommend(size_bytes: usize, element_count: usize, has_timeline: bool) -> Strategy {
    if size_bytes >= LARGE_BYTES {
        return Strategy::Hybrid;
    }
    if has_timeline || element_count >= MANY_ELEMENTS {
        return if size_bytes < MEDIUM_BYTES {
            Strategy::Delta
        } else {
            Strategy::Hybrid
        };
    }
    if size_bytes < TINY_BYTES && element_count < FEW_ELEMENTS {
        Strategy::None
    } else if size_bytes < SMALL_BYTES {
        Strategy::Lz
    } else {
        Strategy::Gzip
    }
}

/// [`recommend`] with inputs taken from a document. Returns the strategy and
/// the canonical size it was based on.
pub fn recommend_for(doc: &WorldState) -> (Strategy, usize) {
    let size = worldvault_model::canonical_bytes(doc)
        .map(|bytes| bytes.len())
        .unwrap_or(0);
    (
        recommend(size, doc.element_count(), doc.has_timeline()),
        size,
    )
}
