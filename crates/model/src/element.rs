use chrono::{DateTime, Utc};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::Opaque;

/// A single placed element in a world.
///
/// `properties` holds the type-tagged visual/physics/behavior payload. The
/// store never looks inside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldElement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub position: Vec3,
    pub properties: Opaque,
    pub relationships: Vec<Relationship>,
    pub metadata: ElementMetadata,
}

impl WorldElement {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, position: Vec3) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            position,
            ..Default::default()
        }
    }
}

/// Directed link from one element to another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Relationship {
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Link strength in `[0, 1]`.
    pub strength: f32,
    pub bidirectional: bool,
    pub metadata: Opaque,
}

impl Relationship {
    /// Create a relationship, clamping `strength` into `[0, 1]`.
    pub fn new(target_id: impl Into<String>, kind: impl Into<String>, strength: f32) -> Self {
        let strength = if strength.is_nan() {
            0.0
        } else {
            strength.clamp(0.0, 1.0)
        };
        Self {
            target_id: target_id.into(),
            kind: kind.into(),
            strength,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElementMetadata {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub author_id: Option<String>,
    pub version: u64,
}

impl Default for ElementMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            tags: Vec::new(),
            created_at: None,
            updated_at: None,
            author_id: None,
            version: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_strength_is_clamped() {
        assert_eq!(Relationship::new("b", "near", 1.7).strength, 1.0);
        assert_eq!(Relationship::new("b", "near", -0.2).strength, 0.0);
        assert_eq!(Relationship::new("b", "near", f32::NAN).strength, 0.0);
        assert_eq!(Relationship::new("b", "near", 0.4).strength, 0.4);
    }

    #[test]
    fn element_uses_type_on_the_wire() {
        let element = WorldElement::new("e1", "tree", Vec3::new(1.0, 2.0, 3.0));
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["type"], "tree");
        assert_eq!(json["position"], serde_json::json!([1.0, 2.0, 3.0]));
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn element_tolerates_missing_fields() {
        let element: WorldElement = serde_json::from_str(r#"{"id":"only-id"}"#).unwrap();
        assert_eq!(element.id, "only-id");
        assert_eq!(element.position, Vec3::ZERO);
        assert_eq!(element.metadata.version, 1);
    }
}
