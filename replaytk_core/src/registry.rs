//! Entity registry: histories and static frames keyed by entity id.
//!
//! The registry is built once per load and shared read-only by every
//! executor. It is also the parent-frame provider used when a pose has to be
//! rebased into another parent's coordinate frame.

use crate::executor::resolve_pose;
use crate::history::EntityHistory;
use crate::time::Timestamp;
use nalgebra::Isometry3;
use replaytk_env::EntityId;
use std::collections::HashMap;
use tracing::{error, warn};

/// Resolves entity ids to world transforms at a given instant.
pub trait ParentFrames {
    /// Returns true if `id` names a known entity.
    fn contains(&self, id: &EntityId) -> bool;

    /// World transform of `id` at `time`, computed from recorded data only.
    ///
    /// Returns `None` for unknown entities or when nothing is recorded.
    fn world_transform(&self, id: &EntityId, time: Timestamp) -> Option<Isometry3<f64>>;
}

/// Fixed placement of an entity that has no recorded history.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticFrame {
    /// Parent entity (`None` = world space)
    pub parent: Option<EntityId>,

    /// Transform relative to the parent
    pub local: Isometry3<f64>,
}

impl StaticFrame {
    /// A frame placed directly in world space.
    pub fn world(local: Isometry3<f64>) -> Self {
        Self { parent: None, local }
    }
}

/// All entities taking part in a simulation.
#[derive(Debug, Default)]
pub struct HistoryRegistry {
    histories: HashMap<EntityId, EntityHistory>,
    statics: HashMap<EntityId, StaticFrame>,
}

impl HistoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a history, replacing any previous one for the same entity.
    pub fn insert_history(&mut self, history: EntityHistory) {
        self.histories.insert(history.entity_id().clone(), history);
    }

    /// Adds a static frame for an entity.
    ///
    /// Used whenever the entity's history is missing or empty.
    pub fn insert_static(&mut self, id: EntityId, frame: StaticFrame) {
        self.statics.insert(id, frame);
    }

    pub fn history(&self, id: &EntityId) -> Option<&EntityHistory> {
        self.histories.get(id)
    }

    pub fn static_frame(&self, id: &EntityId) -> Option<&StaticFrame> {
        self.statics.get(id)
    }

    /// Ids of the entities that own a history, sorted.
    pub fn history_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.histories.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn histories(&self) -> impl Iterator<Item = &EntityHistory> {
        self.histories.values()
    }

    /// Number of distinct entities (with a history, a static frame or both).
    pub fn len(&self) -> usize {
        self.histories.len()
            + self
                .statics
                .keys()
                .filter(|id| !self.histories.contains_key(*id))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest start and latest end over all non-empty histories.
    pub fn global_span(&self) -> Option<(Timestamp, Timestamp)> {
        let start = self.histories.values().filter_map(|h| h.start_time()).min()?;
        let end = self.histories.values().filter_map(|h| h.end_time()).max()?;
        Some((start, end))
    }

    fn world_transform_bounded(
        &self,
        id: &EntityId,
        time: Timestamp,
        budget: usize,
    ) -> Option<Isometry3<f64>> {
        if budget == 0 {
            warn!("Parent chain of '{}' is cyclic or too deep, stopping at world space", id);
            return None;
        }
        let frames = Bounded {
            registry: self,
            budget: budget - 1,
        };

        let recorded = match self.histories.get(id).filter(|h| !h.is_empty()) {
            Some(history) => match resolve_pose(history, time, &frames) {
                Ok(pose) => pose.map(|p| (p.local_transform(), p.parent)),
                Err(e) => {
                    error!("Cannot resolve parent frame: {}", e);
                    None
                }
            },
            None => None,
        };
        let (local, parent) = match recorded {
            Some(found) => found,
            None => {
                let frame = self.statics.get(id)?;
                (frame.local, frame.parent.clone())
            }
        };

        let parent_world = parent
            .and_then(|p| frames.world_transform(&p, time))
            .unwrap_or_else(Isometry3::identity);
        Some(parent_world * local)
    }
}

impl ParentFrames for HistoryRegistry {
    fn contains(&self, id: &EntityId) -> bool {
        self.histories.contains_key(id) || self.statics.contains_key(id)
    }

    fn world_transform(&self, id: &EntityId, time: Timestamp) -> Option<Isometry3<f64>> {
        self.world_transform_bounded(id, time, self.len() + 1)
    }
}

/// Registry view with a remaining parent-chain depth.
struct Bounded<'a> {
    registry: &'a HistoryRegistry,
    budget: usize,
}

impl ParentFrames for Bounded<'_> {
    fn contains(&self, id: &EntityId) -> bool {
        self.registry.contains(id)
    }

    fn world_transform(&self, id: &EntityId, time: Timestamp) -> Option<Isometry3<f64>> {
        self.registry.world_transform_bounded(id, time, self.budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EntityState;
    use crate::time::from_seconds;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Translation3, UnitQuaternion, Vector3};

    fn id(s: &str) -> EntityId {
        EntityId::new(s)
    }

    fn at(x: f64, y: f64, z: f64) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::new(x, y, z), UnitQuaternion::identity())
    }

    #[test]
    fn test_static_chain_composes() {
        let mut registry = HistoryRegistry::new();
        registry.insert_static(id("ship"), StaticFrame::world(at(100.0, 0.0, 0.0)));
        registry.insert_static(
            id("deck"),
            StaticFrame {
                parent: Some(id("ship")),
                local: at(0.0, 5.0, 0.0),
            },
        );

        let world = registry.world_transform(&id("deck"), from_seconds(0.0)).unwrap();
        assert_relative_eq!(world.transform_point(&Point3::origin()), Point3::new(100.0, 5.0, 0.0));
        assert!(registry.world_transform(&id("ghost"), from_seconds(0.0)).is_none());
    }

    #[test]
    fn test_history_parent_on_static_grandparent() {
        let mut registry = HistoryRegistry::new();
        registry.insert_static(id("ship"), StaticFrame::world(at(100.0, 0.0, 0.0)));
        registry.insert_history(EntityHistory::new(
            id("crane"),
            vec![EntityState {
                start_time: from_seconds(0.0),
                end_time: from_seconds(10.0),
                origin: "log".to_string(),
                position: Vector3::new(1.0, 2.0, 3.0),
                rotation: UnitQuaternion::identity(),
                parent_id: Some(id("ship")),
            }],
        ));

        let world = registry.world_transform(&id("crane"), from_seconds(5.0)).unwrap();
        assert_relative_eq!(world.translation.vector, Vector3::new(101.0, 2.0, 3.0));
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.global_span(),
            Some((from_seconds(0.0), from_seconds(10.0)))
        );
    }

    #[test]
    fn test_cyclic_parents_terminate() {
        let mut registry = HistoryRegistry::new();
        registry.insert_static(
            id("a"),
            StaticFrame {
                parent: Some(id("b")),
                local: at(1.0, 0.0, 0.0),
            },
        );
        registry.insert_static(
            id("b"),
            StaticFrame {
                parent: Some(id("a")),
                local: at(0.0, 1.0, 0.0),
            },
        );

        assert!(registry.world_transform(&id("a"), from_seconds(0.0)).is_some());
    }

    #[test]
    fn test_empty_history_falls_back_to_static() {
        let mut registry = HistoryRegistry::new();
        registry.insert_history(EntityHistory::empty(id("truck")));
        registry.insert_static(id("truck"), StaticFrame::world(at(7.0, 0.0, 0.0)));

        let world = registry.world_transform(&id("truck"), from_seconds(3.0)).unwrap();
        assert_relative_eq!(world.translation.vector, Vector3::new(7.0, 0.0, 0.0));
        assert_eq!(registry.len(), 1);
        assert!(registry.global_span().is_none());
    }
}
