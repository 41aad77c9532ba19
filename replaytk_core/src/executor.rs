//! Pose resolution and the per-entity executor.
//!
//! Given a playback instant, an entity's pose is either the exact recorded
//! pose (inside a window or past either end of the history) or a blend of
//! the two states around a gap. When the entity changes parent across the
//! gap, the later state is first re-expressed in the earlier parent's frame.

use crate::history::{EntityHistory, EntityState, HistoryError, Interval};
use crate::registry::{HistoryRegistry, ParentFrames};
use crate::time::{seconds_between, Timestamp};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use replaytk_env::EntityId;
use serde::{Deserialize, Serialize};
use tracing::error;

const SLERP_EPS: f64 = 1e-9;

/// A local pose together with the parent it is expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position relative to the parent
    pub position: Vector3<f64>,

    /// Rotation relative to the parent
    pub rotation: UnitQuaternion<f64>,

    /// Parent entity (`None` = world space)
    pub parent: Option<EntityId>,
}

impl Pose {
    pub fn local_transform(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position), self.rotation)
    }
}

/// Receives resolved poses, typically a scene graph.
pub trait PoseSink {
    /// Places `entity` at `pose` under `pose.parent`.
    fn apply_pose(&mut self, entity: &EntityId, pose: &Pose);
}

/// Fraction of the gap `[prev_end, next_start]` elapsed at `time`.
///
/// A zero-width gap yields 0. Times outside the gap are clamped to `[0, 1]`.
pub fn interpolation_fraction(prev_end: Timestamp, next_start: Timestamp, time: Timestamp) -> f64 {
    let gap = seconds_between(prev_end, next_start);
    if gap <= 0.0 {
        return 0.0;
    }
    (seconds_between(prev_end, time) / gap).clamp(0.0, 1.0)
}

/// Transform re-expressing coordinates of `next_parent`'s frame, as it stood
/// at `next_start`, in `prev_parent`'s frame as it stands at `time`.
///
/// A missing parent on either side means world space.
pub fn rebase_transform<F: ParentFrames + ?Sized>(
    prev_parent: Option<&EntityId>,
    next_parent: Option<&EntityId>,
    time: Timestamp,
    next_start: Timestamp,
    frames: &F,
) -> Isometry3<f64> {
    let world_to_prev = prev_parent
        .and_then(|id| frames.world_transform(id, time))
        .map(|world| world.inverse())
        .unwrap_or_else(Isometry3::identity);
    let next_to_world = next_parent
        .and_then(|id| frames.world_transform(id, next_start))
        .unwrap_or_else(Isometry3::identity);
    world_to_prev * next_to_world
}

fn resolve_parent<F: ParentFrames + ?Sized>(parent: &Option<EntityId>, frames: &F) -> Option<EntityId> {
    parent.as_ref().filter(|id| frames.contains(id)).cloned()
}

fn exact_pose<F: ParentFrames + ?Sized>(state: &EntityState, frames: &F) -> Pose {
    Pose {
        position: state.position,
        rotation: state.rotation,
        parent: resolve_parent(&state.parent_id, frames),
    }
}

fn interpolated_pose<F: ParentFrames + ?Sized>(
    prev: &EntityState,
    next: &EntityState,
    time: Timestamp,
    frames: &F,
) -> Pose {
    let prev_parent = resolve_parent(&prev.parent_id, frames);
    let next_parent = resolve_parent(&next.parent_id, frames);

    let (end_position, end_rotation) = if prev_parent == next_parent {
        (next.position, next.rotation)
    } else {
        let rebase = rebase_transform(
            prev_parent.as_ref(),
            next_parent.as_ref(),
            time,
            next.start_time,
            frames,
        );
        (
            rebase.transform_point(&Point3::from(next.position)).coords,
            rebase.rotation * next.rotation,
        )
    };

    let t = interpolation_fraction(prev.end_time, next.start_time, time);
    let rotation = prev
        .rotation
        .try_slerp(&end_rotation, t, SLERP_EPS)
        .unwrap_or(if t < 0.5 { prev.rotation } else { end_rotation });

    Pose {
        position: prev.position.lerp(&end_position, t),
        rotation,
        parent: prev_parent,
    }
}

/// Resolves the pose for an already located interval.
///
/// Returns `None` when the interval is empty.
pub fn resolve_interval<F: ParentFrames + ?Sized>(
    history: &EntityHistory,
    interval: &Interval,
    time: Timestamp,
    frames: &F,
) -> Option<Pose> {
    let state = |index: Option<usize>| index.and_then(|i| history.get(i));
    match (state(interval.current), state(interval.prev), state(interval.next)) {
        (Some(current), _, _) => Some(exact_pose(current, frames)),
        (None, Some(prev), Some(next)) => Some(interpolated_pose(prev, next, time, frames)),
        (None, Some(boundary), None) | (None, None, Some(boundary)) => {
            Some(exact_pose(boundary, frames))
        }
        (None, None, None) => None,
    }
}

/// Resolves an entity's local pose at `time`.
///
/// The result depends only on `time` and the recorded data; no state from
/// earlier calls is used.
pub fn resolve_pose<F: ParentFrames + ?Sized>(
    history: &EntityHistory,
    time: Timestamp,
    frames: &F,
) -> Result<Option<Pose>, HistoryError> {
    let interval = history.find_interval(time)?;
    Ok(resolve_interval(history, &interval, time, frames))
}

/// Diagnostic role of a state in the last update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StateLabel {
    #[default]
    Inactive,
    Previous,
    Next,
    Current,
}

impl std::fmt::Display for StateLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StateLabel::Inactive => "(inactive)",
            StateLabel::Previous => "<-- Previous",
            StateLabel::Next => "--> Next",
            StateLabel::Current => ">Current<",
        };
        f.write_str(label)
    }
}

/// Drives one entity from the shared playback clock.
///
/// The executor holds no clock of its own. It keeps the last located
/// interval purely for inspection.
#[derive(Debug, Clone)]
pub struct SimExecutor {
    entity_id: EntityId,
    running: bool,
    last_interval: Option<Interval>,
    last_time: Option<Timestamp>,
}

impl SimExecutor {
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            running: false,
            last_interval: None,
            last_time: None,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Interval located by the last update, if any.
    pub fn last_interval(&self) -> Option<Interval> {
        self.last_interval
    }

    /// Playback instant of the last update, if any.
    pub fn last_time(&self) -> Option<Timestamp> {
        self.last_time
    }

    /// Role of state `index` in the last update.
    pub fn state_label(&self, index: usize) -> StateLabel {
        let Some(interval) = self.last_interval else {
            return StateLabel::Inactive;
        };
        if interval.current == Some(index) {
            StateLabel::Current
        } else if interval.next == Some(index) {
            StateLabel::Next
        } else if interval.prev == Some(index) {
            StateLabel::Previous
        } else {
            StateLabel::Inactive
        }
    }

    /// Labels for every state of a history with `len` states.
    pub fn state_labels(&self, len: usize) -> Vec<StateLabel> {
        (0..len).map(|i| self.state_label(i)).collect()
    }

    /// Resolves the entity at `time` and hands the pose to `sink`.
    ///
    /// Returns false when nothing was applied: no history, an empty history,
    /// or a lookup fault. Faults are logged and swallowed so one corrupt
    /// entity cannot stall the others.
    pub fn update_target<S: PoseSink + ?Sized>(
        &mut self,
        registry: &HistoryRegistry,
        time: Timestamp,
        sink: &mut S,
    ) -> bool {
        let Some(history) = registry.history(&self.entity_id) else {
            return false;
        };
        if history.is_empty() {
            return false;
        }

        let interval = match history.find_interval(time) {
            Ok(interval) => interval,
            Err(e) => {
                error!("Skipping update of '{}': {}", self.entity_id, e);
                self.last_interval = None;
                return false;
            }
        };
        self.last_interval = Some(interval);
        self.last_time = Some(time);

        match resolve_interval(history, &interval, time, registry) {
            Some(pose) => {
                sink.apply_pose(&self.entity_id, &pose);
                true
            }
            None => false,
        }
    }
}
