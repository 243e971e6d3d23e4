use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::Opaque;

/// A divergent history of a world.
///
/// `parent_id` is a plain id value, not an owning link. It may name a branch
/// that has since been merged away.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldBranch {
    pub id: String,
    pub parent_id: Option<String>,
    pub divergence_point: DateTime<Utc>,
    /// Ids of the elements visible on this branch.
    pub elements: Vec<String>,
    pub timeline: Vec<TimelineEvent>,
    pub is_active: bool,
    pub merged_branches: BTreeSet<String>,
}

impl WorldBranch {
    pub fn new(id: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            parent_id,
            divergence_point: Utc::now(),
            ..Default::default()
        }
    }
}

/// One recorded action on a branch, with before/after snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimelineEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub parameters: Opaque,
    pub pre_state: Opaque,
    pub post_state: Opaque,
}
