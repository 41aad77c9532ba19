//! Minimal scene graph receiving resolved poses.

use replaytk_core::{HistoryRegistry, Pose, PoseSink};
use replaytk_env::EntityId;
use nalgebra::{Isometry3, Vector3};
use std::collections::HashMap;

/// Placement of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    /// Transform relative to the parent
    pub local: Isometry3<f64>,

    /// Parent node (`None` = scene root)
    pub parent: Option<EntityId>,

    /// Number of poses applied to this node
    pub updates: u64,
}

/// Scene graph keyed by entity id.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: HashMap<EntityId, SceneNode>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scene holding the static frames of `registry`.
    pub fn from_registry(registry: &HistoryRegistry, ids: &[EntityId]) -> Self {
        let mut scene = Self::new();
        for id in ids {
            if let Some(frame) = registry.static_frame(id) {
                scene.nodes.insert(
                    id.clone(),
                    SceneNode {
                        local: frame.local,
                        parent: frame.parent.clone(),
                        updates: 0,
                    },
                );
            }
        }
        scene
    }

    pub fn node(&self, id: &EntityId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids, sorted.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// World transform of a node, composed up its parent chain.
    ///
    /// Unknown parents count as the scene root; a cyclic chain stops after
    /// visiting every node once.
    pub fn world_transform(&self, id: &EntityId) -> Option<Isometry3<f64>> {
        let mut node = self.nodes.get(id)?;
        let mut world = node.local;
        for _ in 0..self.nodes.len() {
            match node.parent.as_ref().and_then(|p| self.nodes.get(p)) {
                Some(parent) => {
                    world = parent.local * world;
                    node = parent;
                }
                None => break,
            }
        }
        Some(world)
    }

    pub fn world_position(&self, id: &EntityId) -> Option<Vector3<f64>> {
        self.world_transform(id).map(|iso| iso.translation.vector)
    }
}

impl PoseSink for SceneGraph {
    fn apply_pose(&mut self, entity: &EntityId, pose: &Pose) {
        let node = self.nodes.entry(entity.clone()).or_insert_with(|| SceneNode {
            local: Isometry3::identity(),
            parent: None,
            updates: 0,
        });
        node.local = pose.local_transform();
        node.parent = pose.parent.clone();
        node.updates += 1;
    }
}
