use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::{Opaque, WorldBranch, WorldElement};

/// Who may see a world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Unlisted,
    Public,
}

/// Identity and bookkeeping for a world document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Monotonic save counter, starting at 1.
    pub version: u64,
    pub branch_id: Option<String>,
    pub tags: Vec<String>,
    pub owner_id: Option<String>,
    pub visibility: Visibility,
}

impl Default for WorldMetadata {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: String::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            last_modified: DateTime::<Utc>::UNIX_EPOCH,
            version: 1,
            branch_id: None,
            tags: Vec::new(),
            owner_id: None,
            visibility: Visibility::Private,
        }
    }
}

/// The root persisted document.
///
/// Only `metadata`, `elements` and `branches` carry meaning for the store.
/// The remaining sections are opaque and round-trip unchanged, as do any
/// unknown top-level fields (kept in `extensions`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldState {
    pub metadata: WorldMetadata,
    #[serde(rename = "creativeDNA")]
    pub creative_dna: Opaque,
    pub elements: Vec<WorldElement>,
    pub branches: Vec<WorldBranch>,
    pub active_branch_id: Option<String>,
    pub settings: Opaque,
    pub statistics: Opaque,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

/// Failure while walking branch parents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineageError {
    #[error("branch not found: {0}")]
    UnknownBranch(String),
    #[error("branch {child} names missing parent {parent}")]
    MissingParent { child: String, parent: String },
    #[error("branch lineage loops back to {0}")]
    Cycle(String),
}

impl WorldState {
    /// Create a fresh world at version 1 with both timestamps set to now.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            metadata: WorldMetadata {
                id: id.into(),
                name: name.into(),
                created_at: now,
                last_modified: now,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn version(&self) -> u64 {
        self.metadata.version
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Whether any branch has recorded timeline events.
    pub fn has_timeline(&self) -> bool {
        self.branches.iter().any(|b| !b.timeline.is_empty())
    }

    /// Path of the first NaN or infinite float, if any.
    ///
    /// Positions and relationship strengths are the only typed floats; opaque
    /// sections are JSON values, which cannot hold non-finite numbers.
    pub fn non_finite_field(&self) -> Option<String> {
        for (i, element) in self.elements.iter().enumerate() {
            if !element.position.is_finite() {
                return Some(format!("elements[{i}].position"));
            }
            if let Some(j) = element
                .relationships
                .iter()
                .position(|r| !r.strength.is_finite())
            {
                return Some(format!("elements[{i}].relationships[{j}].strength"));
            }
        }
        None
    }

    pub fn element(&self, id: &str) -> Option<&WorldElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn branch(&self, id: &str) -> Option<&WorldBranch> {
        self.branches.iter().find(|b| b.id == id)
    }

    /// Resolve the parent chain of a branch, starting with the branch itself.
    ///
    /// Parent ids are not checked when a document is saved, so a dangling or
    /// looping reference only surfaces here.
    pub fn lineage(&self, branch_id: &str) -> Result<Vec<&WorldBranch>, LineageError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self
            .branch(branch_id)
            .ok_or_else(|| LineageError::UnknownBranch(branch_id.to_string()))?;

        loop {
            if !seen.insert(current.id.as_str()) {
                return Err(LineageError::Cycle(current.id.clone()));
            }
            chain.push(current);
            let Some(parent_id) = current.parent_id.as_deref() else {
                return Ok(chain);
            };
            current = self
                .branch(parent_id)
                .ok_or_else(|| LineageError::MissingParent {
                    child: current.id.clone(),
                    parent: parent_id.to_string(),
                })?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TimelineEvent, canonical_bytes};
    use glam::Vec3;
    use serde_json::json;

    fn branched_world() -> WorldState {
        let mut world = WorldState::new("w1", "Branching");
        world.branches.push(WorldBranch::new("main", None));
        world
            .branches
            .push(WorldBranch::new("feature", Some("main".into())));
        world
            .branches
            .push(WorldBranch::new("spike", Some("feature".into())));
        world
    }

    #[test]
    fn new_world_starts_at_version_one() {
        let world = WorldState::new("w1", "First");
        assert_eq!(world.version(), 1);
        assert_eq!(world.metadata.created_at, world.metadata.last_modified);
        assert!(!world.has_timeline());
    }

    #[test]
    fn lineage_walks_to_root() {
        let world = branched_world();
        let ids: Vec<_> = world
            .lineage("spike")
            .unwrap()
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(ids, ["spike", "feature", "main"]);
    }

    #[test]
    fn lineage_reports_dangling_parent() {
        let mut world = branched_world();
        world
            .branches
            .push(WorldBranch::new("orphan", Some("merged-away".into())));
        assert_eq!(
            world.lineage("orphan").unwrap_err(),
            LineageError::MissingParent {
                child: "orphan".into(),
                parent: "merged-away".into()
            }
        );
    }

    #[test]
    fn lineage_detects_cycles() {
        let mut world = WorldState::new("w1", "Loop");
        world.branches.push(WorldBranch::new("a", Some("b".into())));
        world.branches.push(WorldBranch::new("b", Some("a".into())));
        assert!(matches!(world.lineage("a"), Err(LineageError::Cycle(_))));
    }

    #[test]
    fn incomplete_document_is_accepted() {
        let world: WorldState = serde_json::from_value(json!({"metadata": {"id": "bare"}})).unwrap();
        assert_eq!(world.id(), "bare");
        assert_eq!(world.version(), 1);
        assert!(world.elements.is_empty());
    }

    #[test]
    fn unknown_fields_round_trip() {
        let world: WorldState = serde_json::from_value(json!({
            "metadata": {"id": "x"},
            "creativeDNA": {"patterns": [1, 2, 3]},
            "collaborators": ["ana", "ben"]
        }))
        .unwrap();
        assert_eq!(world.extensions["collaborators"], json!(["ana", "ben"]));

        let back = serde_json::to_value(&world).unwrap();
        assert_eq!(back["collaborators"], json!(["ana", "ben"]));
        assert_eq!(back["creativeDNA"]["patterns"], json!([1, 2, 3]));
    }

    #[test]
    fn canonical_round_trip_is_structural() {
        let mut world = branched_world();
        let mut element = WorldElement::new("e1", "crystal", Vec3::new(0.1, 2.5, -3.25));
        element.properties = json!({"visual": {"color": "#88ccff", "glow": 0.3}});
        world.elements.push(element);
        world.branches[0].timeline.push(TimelineEvent {
            id: "t1".into(),
            kind: "edit".into(),
            action: "place".into(),
            ..Default::default()
        });

        let bytes = canonical_bytes(&world).unwrap();
        let back: WorldState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, world);
        assert!(back.has_timeline());
    }
}
