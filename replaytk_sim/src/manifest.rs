//! JSON scenario manifest.
//!
//! ```json
//! {
//!   "name": "Crossing",
//!   "uri": "scenarios/crossing",
//!   "z_up": true,
//!   "entities": [
//!     { "id": "ego", "log": "ego.log" },
//!     { "id": "truck", "transform": { "position": [100.0, 0.0, 0.0] } }
//!   ],
//!   "events": [
//!     { "uri": "events/brake", "category": "Braking", "time": "2024-01-01T00:00:12" }
//!   ]
//! }
//! ```

use crate::loader::LoadError;
use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use replaytk_env::{EntityId, LogSource};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Top-level scenario description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Display name of the simulation
    pub name: String,

    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub details: String,

    /// Whether the recorded logs use a Z-up basis (default: right-handed Y-up)
    #[serde(default)]
    pub z_up: bool,

    pub entities: Vec<EntitySpec>,

    #[serde(default)]
    pub events: Vec<EventSpec>,
}

/// One participating entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub id: EntityId,

    /// Log name, resolved by the log source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,

    /// Overrides the manifest-wide up axis for this entity's log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_up: Option<bool>,

    /// Fixed placement, used when the entity has no usable history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<StaticTransform>,
}

impl EntitySpec {
    /// Up-axis flag for this entity's log.
    pub fn z_up(&self, manifest_z_up: bool) -> bool {
        self.z_up.unwrap_or(manifest_z_up)
    }
}

/// Fixed local transform in the playback (Y-up) basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTransform {
    /// Parent entity id; empty, "none" or "world" mean world space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default)]
    pub position: [f64; 3],

    /// Roll, pitch, yaw in degrees
    #[serde(default)]
    pub rotation_deg: [f64; 3],
}

impl StaticTransform {
    pub fn parent_id(&self) -> Option<EntityId> {
        self.parent.as_deref().and_then(EntityId::parent_ref)
    }

    pub fn isometry(&self) -> Isometry3<f64> {
        let [x, y, z] = self.position;
        let [roll, pitch, yaw] = self.rotation_deg.map(f64::to_radians);
        Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        )
    }
}

/// A timestamped scenario annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    pub uri: String,

    #[serde(default)]
    pub category: String,

    /// Any timestamp format accepted by the log parser
    pub time: String,
}

impl Manifest {
    /// Parses and validates a manifest.
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        let manifest: Manifest = serde_json::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reads a manifest through a log source.
    pub fn load<S: LogSource + ?Sized>(source: &S, name: &str) -> Result<Self, LoadError> {
        Self::from_json(&source.read(name)?)
    }

    /// Rejects empty manifests, duplicate ids and static parents that name
    /// no entity.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.entities.is_empty() {
            return Err(LoadError::Empty);
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(&entity.id) {
                return Err(LoadError::DuplicateEntity(entity.id.clone()));
            }
        }

        for entity in &self.entities {
            let parent = entity.transform.as_ref().and_then(StaticTransform::parent_id);
            if let Some(parent) = parent {
                if !seen.contains(&parent) {
                    return Err(LoadError::UnknownParent {
                        entity: entity.id.clone(),
                        parent,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const CROSSING: &str = r#"{
        "name": "Crossing",
        "uri": "scenarios/crossing",
        "entities": [
            { "id": "ego", "log": "ego.log", "z_up": true },
            { "id": "truck", "transform": { "position": [100.0, 0.0, 0.0], "rotation_deg": [0.0, 90.0, 0.0] } },
            { "id": "trailer", "transform": { "parent": "truck", "position": [0.0, 0.0, -5.0] } }
        ],
        "events": [
            { "uri": "events/brake", "category": "Braking", "time": "2024-01-01T00:00:12" }
        ]
    }"#;

    #[test]
    fn test_parse_manifest_with_defaults() {
        let manifest = Manifest::from_json(CROSSING).unwrap();
        assert_eq!(manifest.name, "Crossing");
        assert!(!manifest.z_up);
        assert_eq!(manifest.description, "");
        assert_eq!(manifest.entities.len(), 3);
        assert!(manifest.entities[0].z_up(manifest.z_up));
        assert!(!manifest.entities[1].z_up(manifest.z_up));
        assert_eq!(manifest.events[0].category, "Braking");
    }

    #[test]
    fn test_static_transform() {
        let manifest = Manifest::from_json(CROSSING).unwrap();
        let truck = manifest.entities[1].transform.as_ref().unwrap();
        assert_eq!(truck.parent_id(), None);

        let iso = truck.isometry();
        assert_relative_eq!(iso.translation.vector, Vector3::new(100.0, 0.0, 0.0));
        assert_relative_eq!(iso.rotation.angle(), std::f64::consts::FRAC_PI_2, epsilon = 1e-12);

        let trailer = manifest.entities[2].transform.as_ref().unwrap();
        assert_eq!(trailer.parent_id(), Some(EntityId::new("truck")));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let text = r#"{ "name": "dup", "entities": [ { "id": "a" }, { "id": "a" } ] }"#;
        assert!(matches!(
            Manifest::from_json(text),
            Err(LoadError::DuplicateEntity(id)) if id.as_str() == "a"
        ));
    }

    #[test]
    fn test_unknown_static_parent_rejected() {
        let text = r#"{ "name": "orphan", "entities": [
            { "id": "a", "transform": { "parent": "ghost" } }
        ] }"#;
        assert!(matches!(Manifest::from_json(text), Err(LoadError::UnknownParent { .. })));
    }

    #[test]
    fn test_world_parent_keyword_is_not_an_entity() {
        let text = r#"{ "name": "w", "entities": [
            { "id": "a", "transform": { "parent": "world" } }
        ] }"#;
        assert!(Manifest::from_json(text).is_ok());
    }

    #[test]
    fn test_empty_and_malformed_manifests() {
        assert!(matches!(
            Manifest::from_json(r#"{ "name": "none", "entities": [] }"#),
            Err(LoadError::Empty)
        ));
        assert!(matches!(Manifest::from_json("{ not json"), Err(LoadError::Manifest(_))));
    }

    #[test]
    fn test_json_roundtrip_keeps_manifest() {
        let manifest = Manifest::from_json(CROSSING).unwrap();
        let again = Manifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(manifest, again);
    }
}
