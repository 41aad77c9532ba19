//! JSON exporter for played frames.
//!
//! Records the world position and parent of every scene node per frame so a
//! run can be inspected offline.

use crate::loader::ScenarioEvent;
use crate::scene::SceneGraph;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A single frame of playback data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Absolute timestamp (ISO 8601)
    pub timestamp: String,

    pub entities: Vec<EntityFrame>,

    /// Scenario events reported with this frame
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<ScenarioEvent>,
}

/// World placement of an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFrame {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl EntityFrame {
    pub fn new(id: &str, pos: Vector3<f64>, parent: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            x: pos.x,
            y: pos.y,
            z: pos.z,
            parent: parent.map(str::to_string),
        }
    }
}

impl PlaybackFrame {
    /// Captures every node of `scene`, sorted by id.
    pub fn capture(time_sec: f64, timestamp: String, scene: &SceneGraph) -> Self {
        let entities = scene
            .ids()
            .into_iter()
            .filter_map(|id| {
                let pos = scene.world_position(&id)?;
                let parent = scene.node(&id).and_then(|n| n.parent.as_ref());
                Some(EntityFrame::new(id.as_str(), pos, parent.map(|p| p.as_str())))
            })
            .collect();
        Self {
            time_sec,
            timestamp,
            entities,
            events: Vec::new(),
        }
    }
}

/// Complete playback export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackExport {
    /// Simulation name
    pub simulation: String,

    /// Simulation length in seconds
    pub duration_sec: f64,

    /// Playback speed
    pub speed: f64,

    pub frames: Vec<PlaybackFrame>,
}

impl PlaybackExport {
    pub fn new(simulation: &str, duration_sec: f64, speed: f64) -> Self {
        Self {
            simulation: simulation.to_string(),
            duration_sec,
            speed,
            frames: Vec::new(),
        }
    }

    pub fn add_frame(&mut self, frame: PlaybackFrame) {
        self.frames.push(frame);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;
    use replaytk_core::{Pose, PoseSink};
    use replaytk_env::EntityId;

    #[test]
    fn test_capture_and_write() {
        let mut scene = SceneGraph::new();
        scene.apply_pose(
            &EntityId::new("truck"),
            &Pose {
                position: Vector3::new(10.0, 0.0, 0.0),
                rotation: UnitQuaternion::identity(),
                parent: None,
            },
        );
        scene.apply_pose(
            &EntityId::new("ego"),
            &Pose {
                position: Vector3::new(1.0, 2.0, 3.0),
                rotation: UnitQuaternion::identity(),
                parent: Some(EntityId::new("truck")),
            },
        );

        let frame = PlaybackFrame::capture(1.5, "1970-01-01T00:00:01.500".to_string(), &scene);
        assert_eq!(frame.entities[0].id, "ego");
        assert_eq!(frame.entities[0].x, 11.0);
        assert_eq!(frame.entities[0].parent.as_deref(), Some("truck"));

        let mut export = PlaybackExport::new("ride", 10.0, 1.0);
        export.add_frame(frame);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.json");
        export.write_to_file(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["frames"][0]["entities"][1]["id"], "truck");
        assert!(value["frames"][0]["entities"][1].get("parent").is_none());
        assert!(value["frames"][0].get("events").is_none());
    }
}
