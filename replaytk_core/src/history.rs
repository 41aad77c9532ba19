//! Per-entity recorded history and its time-indexed lookup.
//!
//! A history is an ordered, non-overlapping run of states. Gaps between two
//! consecutive states are unrecorded periods; the executor interpolates
//! across them.

use crate::coords::matrix_to_quaternion;
use crate::log_parser::{ParsedLog, StateRecord};
use crate::time::{seconds_between, Timestamp};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use replaytk_env::EntityId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Faults raised by history lookups.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The binary search did not converge within `len` iterations.
    ///
    /// Only a corrupt state array can cause this.
    #[error("interval search on '{entity}' did not converge after {iterations} iterations (first = {first}, last = {last})")]
    SearchDiverged {
        entity: EntityId,
        iterations: usize,
        first: isize,
        last: isize,
    },
}

/// A recorded pose with its validity window, in the playback basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Start of the validity window
    pub start_time: Timestamp,

    /// End of the validity window
    pub end_time: Timestamp,

    /// Producer tag copied from the log
    pub origin: String,

    /// Local position relative to the parent
    pub position: Vector3<f64>,

    /// Local rotation relative to the parent
    pub rotation: UnitQuaternion<f64>,

    /// Parent entity (`None` = world space)
    pub parent_id: Option<EntityId>,
}

impl EntityState {
    /// Builds a state from a parsed record.
    pub fn from_record(record: &StateRecord) -> Self {
        Self {
            start_time: record.start_time,
            end_time: record.end_time,
            origin: record.origin.clone(),
            position: record.position,
            rotation: matrix_to_quaternion(&record.rotation_matrix),
            parent_id: record.parent_id.clone(),
        }
    }

    /// Returns true if `time` falls inside `[start_time, end_time]`.
    pub fn contains(&self, time: Timestamp) -> bool {
        self.start_time <= time && time <= self.end_time
    }

    /// Local transform of this state.
    pub fn local_transform(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position), self.rotation)
    }
}

/// Result of an interval lookup, as indices into the state array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    /// State whose window contains the query time
    pub current: Option<usize>,

    /// Closest state before the query time (or before `current`)
    pub prev: Option<usize>,

    /// Closest state after the query time (or after `current`)
    pub next: Option<usize>,
}

/// The canonical shapes an [`Interval`] can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalShape {
    /// No states at all
    Empty,
    /// Inside a recorded window
    Current,
    /// Between two recorded windows
    Gap,
    /// Before the first window
    BeforeStart,
    /// After the last window
    AfterEnd,
}

impl Interval {
    /// Classifies the lookup result.
    pub fn shape(&self) -> IntervalShape {
        match (self.current, self.prev, self.next) {
            (Some(_), _, _) => IntervalShape::Current,
            (None, Some(_), Some(_)) => IntervalShape::Gap,
            (None, None, Some(_)) => IntervalShape::BeforeStart,
            (None, Some(_), None) => IntervalShape::AfterEnd,
            (None, None, None) => IntervalShape::Empty,
        }
    }
}

/// One entity's ordered recorded states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHistory {
    entity_id: EntityId,
    source: Option<String>,
    states: Vec<EntityState>,
}

impl EntityHistory {
    /// Builds a history, sorting the states by start time.
    ///
    /// Overlapping windows are kept but reported, since lookups inside an
    /// overlap are ambiguous.
    pub fn new(entity_id: EntityId, mut states: Vec<EntityState>) -> Self {
        states.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        let history = Self {
            entity_id,
            source: None,
            states,
        };
        for i in history.overlaps() {
            warn!(
                "History of '{}' has overlapping states {} and {}",
                history.entity_id,
                i,
                i + 1
            );
        }
        history
    }

    /// Builds a history from a parsed log.
    pub fn from_log(entity_id: EntityId, parsed: &ParsedLog) -> Self {
        let states = parsed.records.iter().map(EntityState::from_record).collect();
        Self::new(entity_id, states)
    }

    /// A history with no states.
    pub fn empty(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            source: None,
            states: Vec::new(),
        }
    }

    /// Records the log name this history was read from.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn states(&self) -> &[EntityState] {
        &self.states
    }

    pub fn get(&self, index: usize) -> Option<&EntityState> {
        self.states.get(index)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Start of the first recorded window.
    pub fn start_time(&self) -> Option<Timestamp> {
        self.states.first().map(|s| s.start_time)
    }

    /// Latest end over all recorded windows.
    pub fn end_time(&self) -> Option<Timestamp> {
        self.states.iter().map(|s| s.end_time).max()
    }

    /// Recorded span in seconds (0 for an empty history).
    pub fn duration_secs(&self) -> f64 {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => seconds_between(start, end),
            _ => 0.0,
        }
    }

    /// Seconds between the global simulation start and this history's start.
    pub fn start_offset(&self, global_start: Timestamp) -> f64 {
        self.start_time()
            .map_or(0.0, |start| seconds_between(global_start, start))
    }

    /// Indices `i` where state `i` ends after state `i + 1` starts.
    pub fn overlaps(&self) -> Vec<usize> {
        self.states
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| pair[0].end_time > pair[1].start_time)
            .map(|(i, _)| i)
            .collect()
    }

    /// Locates `time` among the recorded windows.
    ///
    /// Binary search, O(log n). Returns the containing state with its
    /// neighbours, the two states around a gap, or the single boundary state
    /// when `time` lies outside the recorded span. An empty history yields an
    /// all-`None` interval.
    pub fn find_interval(&self, time: Timestamp) -> Result<Interval, HistoryError> {
        let len = self.states.len();
        if len == 0 {
            return Ok(Interval::default());
        }

        let mut first: isize = 0;
        let mut last: isize = len as isize - 1;
        let mut iterations = 0;

        while first <= last {
            iterations += 1;
            if iterations > len {
                return Err(HistoryError::SearchDiverged {
                    entity: self.entity_id.clone(),
                    iterations,
                    first,
                    last,
                });
            }

            let middle = ((first + last) / 2) as usize;
            let state = &self.states[middle];
            if time > state.end_time {
                first = middle as isize + 1;
            } else if time < state.start_time {
                last = middle as isize - 1;
            } else {
                return Ok(Interval {
                    current: Some(middle),
                    prev: middle.checked_sub(1),
                    next: (middle + 1 < len).then_some(middle + 1),
                });
            }
        }

        // Every state before `first` ends before `time`, every state from
        // `first` on starts after it.
        let insertion = first as usize;
        Ok(Interval {
            current: None,
            prev: insertion.checked_sub(1),
            next: (insertion < len).then_some(insertion),
        })
    }

    /// The state whose window contains `time`, if any.
    pub fn state_at(&self, time: Timestamp) -> Result<Option<&EntityState>, HistoryError> {
        let interval = self.find_interval(time)?;
        Ok(interval.current.and_then(|i| self.states.get(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::from_seconds;
    use proptest::prelude::*;

    fn state(start: f64, end: f64, x: f64) -> EntityState {
        EntityState {
            start_time: from_seconds(start),
            end_time: from_seconds(end),
            origin: "test".to_string(),
            position: Vector3::new(x, 0.0, 0.0),
            rotation: UnitQuaternion::identity(),
            parent_id: None,
        }
    }

    fn abc() -> EntityHistory {
        EntityHistory::new(
            EntityId::new("e"),
            vec![state(0.0, 10.0, 0.0), state(20.0, 30.0, 1.0), state(40.0, 50.0, 2.0)],
        )
    }

    fn find(history: &EntityHistory, t: f64) -> Interval {
        history.find_interval(from_seconds(t)).unwrap()
    }

    #[test]
    fn test_inside_a_window() {
        let h = abc();
        assert_eq!(find(&h, 25.0), Interval { current: Some(1), prev: Some(0), next: Some(2) });
        assert_eq!(find(&h, 5.0), Interval { current: Some(0), prev: None, next: Some(1) });
        assert_eq!(find(&h, 45.0), Interval { current: Some(2), prev: Some(1), next: None });
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let h = abc();
        assert_eq!(find(&h, 0.0).current, Some(0));
        assert_eq!(find(&h, 10.0).current, Some(0));
        assert_eq!(find(&h, 50.0).current, Some(2));
    }

    #[test]
    fn test_gap() {
        let h = abc();
        let interval = find(&h, 15.0);
        assert_eq!(interval, Interval { current: None, prev: Some(0), next: Some(1) });
        assert_eq!(interval.shape(), IntervalShape::Gap);
        assert_eq!(find(&h, 35.0), Interval { current: None, prev: Some(1), next: Some(2) });
    }

    #[test]
    fn test_boundaries() {
        let h = abc();
        let before = find(&h, -5.0);
        assert_eq!(before, Interval { current: None, prev: None, next: Some(0) });
        assert_eq!(before.shape(), IntervalShape::BeforeStart);

        let after = find(&h, 1000.0);
        assert_eq!(after, Interval { current: None, prev: Some(2), next: None });
        assert_eq!(after.shape(), IntervalShape::AfterEnd);
    }

    #[test]
    fn test_gap_in_right_half_of_larger_history() {
        let states = (0..4).map(|i| state(i as f64 * 20.0, i as f64 * 20.0 + 10.0, i as f64)).collect();
        let h = EntityHistory::new(EntityId::new("e"), states);
        // between state 1 [20, 30] and state 2 [40, 50]
        assert_eq!(find(&h, 35.0), Interval { current: None, prev: Some(1), next: Some(2) });
    }

    #[test]
    fn test_empty_history() {
        let h = EntityHistory::empty(EntityId::new("e"));
        let interval = find(&h, 1.0);
        assert_eq!(interval, Interval::default());
        assert_eq!(interval.shape(), IntervalShape::Empty);
        assert_eq!(h.duration_secs(), 0.0);
    }

    #[test]
    fn test_unsorted_input_is_sorted_and_spanned() {
        let h = EntityHistory::new(
            EntityId::new("e"),
            vec![state(40.0, 50.0, 2.0), state(0.0, 10.0, 0.0), state(20.0, 30.0, 1.0)],
        );
        assert_eq!(h.get(0).unwrap().position.x, 0.0);
        assert_eq!(h.start_time(), Some(from_seconds(0.0)));
        assert_eq!(h.end_time(), Some(from_seconds(50.0)));
        assert_eq!(h.duration_secs(), 50.0);
        assert_eq!(h.start_offset(from_seconds(-5.0)), 5.0);
        assert!(h.overlaps().is_empty());
    }

    #[test]
    fn test_overlaps_are_reported() {
        let h = EntityHistory::new(
            EntityId::new("e"),
            vec![state(0.0, 25.0, 0.0), state(20.0, 30.0, 1.0), state(30.0, 40.0, 2.0)],
        );
        assert_eq!(h.overlaps(), vec![0]);
    }

    #[test]
    fn test_state_at() {
        let h = abc();
        assert_eq!(h.state_at(from_seconds(22.0)).unwrap().unwrap().position.x, 1.0);
        assert!(h.state_at(from_seconds(15.0)).unwrap().is_none());
    }

    fn linear_scan(history: &EntityHistory, t: Timestamp) -> Interval {
        let states = history.states();
        if let Some(i) = states.iter().position(|s| s.contains(t)) {
            return Interval {
                current: Some(i),
                prev: i.checked_sub(1),
                next: (i + 1 < states.len()).then_some(i + 1),
            };
        }
        let insertion = states.iter().take_while(|s| s.end_time < t).count();
        Interval {
            current: None,
            prev: insertion.checked_sub(1),
            next: (insertion < states.len()).then_some(insertion),
        }
    }

    proptest! {
        #[test]
        fn prop_lookup_matches_linear_scan(
            spans in proptest::collection::vec((1u32..50, 0u32..50), 1..40),
            query in -100i64..3000,
        ) {
            // (gap before, duration) pairs laid end to end
            let mut cursor = 0i64;
            let mut states = Vec::new();
            for (i, (gap, duration)) in spans.iter().enumerate() {
                let start = cursor + *gap as i64;
                let end = start + *duration as i64;
                states.push(state(start as f64, end as f64, i as f64));
                cursor = end;
            }
            let history = EntityHistory::new(EntityId::new("p"), states);
            let t = from_seconds(query as f64 / 2.0);

            let interval = history.find_interval(t).unwrap();
            prop_assert_eq!(interval, linear_scan(&history, t));

            match interval.shape() {
                IntervalShape::Current => {
                    prop_assert!(history.get(interval.current.unwrap()).unwrap().contains(t));
                }
                IntervalShape::Gap => {
                    let (p, n) = (interval.prev.unwrap(), interval.next.unwrap());
                    prop_assert_eq!(p + 1, n);
                    prop_assert!(history.get(p).unwrap().end_time < t);
                    prop_assert!(t < history.get(n).unwrap().start_time);
                }
                IntervalShape::BeforeStart => {
                    prop_assert!(t < history.get(0).unwrap().start_time);
                }
                IntervalShape::AfterEnd => {
                    prop_assert!(t > history.get(history.len() - 1).unwrap().end_time);
                }
                IntervalShape::Empty => prop_assert!(false, "non-empty history"),
            }
        }
    }
}
