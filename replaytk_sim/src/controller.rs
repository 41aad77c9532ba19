//! Global playback clock.
//!
//! The controller owns the loaded simulation and a single simulation time in
//! seconds. Every tick while playing it measures the wall time elapsed since
//! the last anchor, scales it by the playback speed and pushes the resulting
//! instant to every executor. Seeks move the simulation time directly.

use crate::events::{EventBus, PlaybackEvent};
use crate::loader::{LoadedSimulation, SimHistory};
use replaytk_core::{HistoryRegistry, PoseSink, SimExecutor, Timestamp};
use replaytk_env::ReplayContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Seek step of `increment_time`/`decrement_time`, as a fraction of the
/// duration.
pub const SEEK_STEP: f64 = 0.05;

/// Playback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        f.write_str(name)
    }
}

struct Loaded {
    history: SimHistory,
    registry: HistoryRegistry,
    executors: Vec<SimExecutor>,
}

/// Drives every executor of a loaded simulation from one clock.
pub struct SimController<C: ReplayContext, S: PoseSink> {
    context: Arc<C>,
    sink: S,
    simulation: Option<Loaded>,
    events: EventBus,

    state: PlaybackState,
    speed: f64,

    /// Current simulation time in seconds, within `[0, duration]`
    simulation_time: f64,

    /// Simulation time at the last anchor
    anchor_time: f64,

    /// Wall clock at the last anchor
    anchor_wall: Duration,

    /// Simulation time of the last executor broadcast
    last_broadcast: f64,
}

impl<C: ReplayContext, S: PoseSink> SimController<C, S> {
    /// Creates a controller with nothing loaded.
    pub fn new(context: Arc<C>, sink: S) -> Self {
        let anchor_wall = context.now();
        Self {
            context,
            sink,
            simulation: None,
            events: EventBus::new(),
            state: PlaybackState::Stopped,
            speed: 1.0,
            simulation_time: 0.0,
            anchor_time: 0.0,
            anchor_wall,
            last_broadcast: 0.0,
        }
    }

    /// Registers an event listener.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Installs a loaded simulation, replacing (and stopping) any previous one.
    pub fn load(&mut self, simulation: LoadedSimulation) {
        self.unload();
        let LoadedSimulation {
            history,
            registry,
            executors,
            ..
        } = simulation;
        self.events.emit(PlaybackEvent::Loaded {
            name: history.name.clone(),
            duration_secs: history.duration_secs(),
            entities: executors.len(),
        });
        self.simulation = Some(Loaded {
            history,
            registry,
            executors,
        });
    }

    /// Stops playback and drops the loaded simulation.
    pub fn unload(&mut self) {
        if self.simulation.is_some() {
            self.stop();
            self.simulation = None;
        }
    }

    /// True once a simulation with a non-empty span is loaded.
    pub fn is_valid(&self) -> bool {
        self.simulation.is_some()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// True while playing or paused.
    pub fn started(&self) -> bool {
        self.state != PlaybackState::Stopped
    }

    pub fn paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn simulation_time(&self) -> f64 {
        self.simulation_time
    }

    /// Length of the loaded simulation in seconds (0 when nothing is loaded).
    pub fn duration(&self) -> f64 {
        self.simulation
            .as_ref()
            .map_or(0.0, |sim| sim.history.duration_secs())
    }

    /// Simulation time as a fraction of the duration.
    pub fn progress(&self) -> f64 {
        let duration = self.duration();
        if duration > 0.0 {
            self.simulation_time / duration
        } else {
            0.0
        }
    }

    /// Absolute timestamp of the current simulation time.
    pub fn current_timestamp(&self) -> Option<Timestamp> {
        self.simulation
            .as_ref()
            .map(|sim| sim.history.date_time_at(self.simulation_time))
    }

    pub fn history(&self) -> Option<&SimHistory> {
        self.simulation.as_ref().map(|sim| &sim.history)
    }

    pub fn registry(&self) -> Option<&HistoryRegistry> {
        self.simulation.as_ref().map(|sim| &sim.registry)
    }

    pub fn executors(&self) -> &[SimExecutor] {
        self.simulation
            .as_ref()
            .map(|sim| sim.executors.as_slice())
            .unwrap_or_default()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Starts playback, or resumes it from the current time when paused.
    pub fn play(&mut self) {
        if !self.is_valid() {
            warn!("Ignoring play: no simulation loaded");
            return;
        }
        if self.state == PlaybackState::Playing {
            return;
        }
        debug!("Playback {} -> playing at {:.3}s", self.state, self.simulation_time);
        self.events.emit(PlaybackEvent::PlayRequested);
        self.state = PlaybackState::Playing;
        self.set_running(true);
        self.anchor();
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        debug!("Playback paused at {:.3}s", self.simulation_time);
        self.events.emit(PlaybackEvent::PauseRequested);
        self.state = PlaybackState::Paused;
    }

    /// Stops playback and rewinds to the start.
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Stopped {
            return;
        }
        debug!("Playback stopped at {:.3}s", self.simulation_time);
        self.state = PlaybackState::Stopped;
        self.set_running(false);
        self.simulation_time = 0.0;
        self.anchor();
        self.broadcast();
        self.events.emit(PlaybackEvent::Stopped);
    }

    /// Seeks to `secs`, clamped to the simulation span.
    ///
    /// Ignored while stopped. A resume after a seek continues from the
    /// seeked time.
    pub fn set_time(&mut self, secs: f64) {
        if !self.started() {
            debug!("Ignoring seek to {:.3}s while stopped", secs);
            return;
        }
        if !secs.is_finite() {
            warn!("Ignoring seek to non-finite time {}", secs);
            return;
        }
        self.simulation_time = secs.clamp(0.0, self.duration());
        self.anchor();
        self.events.emit(PlaybackEvent::TimeChanged {
            time_secs: self.simulation_time,
        });
        self.broadcast();
    }

    /// Seeks to a fraction of the duration.
    pub fn set_progress(&mut self, fraction: f64) {
        self.set_time(fraction * self.duration());
    }

    pub fn increment_time(&mut self) {
        self.set_time(self.simulation_time + SEEK_STEP * self.duration());
    }

    pub fn decrement_time(&mut self) {
        self.set_time(self.simulation_time - SEEK_STEP * self.duration());
    }

    pub fn reset_time(&mut self) {
        self.set_time(0.0);
    }

    pub fn complete_time(&mut self) {
        self.set_time(self.duration());
    }

    /// Changes the playback speed; negative speeds play backwards.
    pub fn set_speed(&mut self, speed: f64) {
        if !speed.is_finite() {
            warn!("Ignoring non-finite playback speed {}", speed);
            return;
        }
        if self.state == PlaybackState::Playing {
            self.advance();
        }
        self.speed = speed;
        self.anchor();
        if self.paused() {
            self.broadcast();
        }
    }

    /// Advances the clock while playing and updates every executor.
    ///
    /// Returns true if the executors were updated.
    pub fn tick(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        let overran = self.advance();
        self.broadcast();
        if overran {
            self.pause();
        }
        true
    }

    /// Plays `frames` frames (0 = until playback pauses or stops), sleeping
    /// one frame period on the context between ticks. `on_frame` runs after
    /// every tick with the frame index.
    pub async fn run_frames<F>(&mut self, frame: Duration, frames: u64, mut on_frame: F) -> u64
    where
        F: FnMut(&Self, u64),
    {
        let mut played = 0;
        while self.state == PlaybackState::Playing && (frames == 0 || played < frames) {
            self.context.sleep(frame).await;
            if self.tick() {
                on_frame(self, played);
                played += 1;
            }
        }
        played
    }

    fn anchor(&mut self) {
        self.anchor_time = self.simulation_time;
        self.anchor_wall = self.context.now();
    }

    /// Moves the simulation time to the anchored wall-clock position.
    ///
    /// Returns true when the span end in the direction of travel was reached.
    fn advance(&mut self) -> bool {
        let wall = self.context.now().saturating_sub(self.anchor_wall);
        let target = self.anchor_time + wall.as_secs_f64() * self.speed;
        let duration = self.duration();
        self.simulation_time = target.clamp(0.0, duration);
        (self.speed > 0.0 && target >= duration) || (self.speed < 0.0 && target <= 0.0)
    }

    fn broadcast(&mut self) {
        let Some(sim) = self.simulation.as_mut() else {
            return;
        };
        let time = self.simulation_time;
        let timestamp = sim.history.date_time_at(time);
        for executor in &mut sim.executors {
            executor.update_target(&sim.registry, timestamp, &mut self.sink);
        }
        let scenario_events = sim.history.events_between(self.last_broadcast, time);
        self.last_broadcast = time;
        self.events.emit(PlaybackEvent::Updated {
            time_secs: time,
            timestamp,
            scenario_events,
        });
    }

    fn set_running(&mut self, running: bool) {
        if let Some(sim) = self.simulation.as_mut() {
            for executor in &mut sim.executors {
                executor.set_running(running);
            }
        }
    }
}
